//! Prediction and inference
//!
//! Run the converted graph, compare scores, and manage released artifacts.

pub mod artifacts;
pub mod inference;

pub use artifacts::{fetch_artifacts, ModelHealth};
pub use inference::{compare_predictions, Agreement, OnnxRunner, Predictor, ScoreComparison};
