//! Feature extraction and encoding
//!
//! Converts raw episodes into model-ready features and labels.

pub mod episode_repr;
pub mod label;
pub mod scaler;

pub use episode_repr::{EpisodeFeatures, FEATURE_NAMES};
pub use label::LabelBlend;
pub use scaler::FeatureScaler;
