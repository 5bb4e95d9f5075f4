//! Model training
//!
//! Training pipeline, evaluation metrics and artifact persistence.

pub mod metrics;
pub mod persist;
pub mod trainer;

pub use metrics::RegressionMetrics;
pub use persist::{save_artifacts, SavedArtifacts};
pub use trainer::{run_training, Trainer, TrainingReport};
