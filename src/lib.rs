//! Fishing score model tooling
//!
//! Offline jobs that turn exported fishing episodes into a gradient-boosted
//! score model, and convert that model into a portable ONNX graph.

pub mod data;
pub mod export;
pub mod features;
pub mod model;
pub mod predict;
pub mod training;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// File name of the serialized regressor inside the output directory
pub const MODEL_FILE: &str = "pesca_model.pkl";
/// File name of the scaler statistics inside the output directory
pub const SCALER_FILE: &str = "scaler.json";
/// File name of the converted inference graph inside the output directory
pub const ONNX_FILE: &str = "pesca_model.onnx";

/// Application-wide errors
#[derive(Debug, Error)]
pub enum PescaError {
    #[error("Not enough data: {found} < {required}")]
    InsufficientData { found: usize, required: usize },

    #[error("No usable episodes: all {total} episodes were skipped")]
    NoUsableEpisodes { total: usize },

    #[error("Invalid episode at index {index}: {message}")]
    InvalidEpisode { index: usize, message: String },

    #[error("Model fit failed: {0}")]
    Fit(String),

    #[error("Model conversion failed: {0}")]
    Convert(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Model not found at {0} - run `pesca train` first")]
    NoModel(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, PescaError>;

/// Application configuration loaded from config.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub label: LabelConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub predict: PredictConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Episode export consumed by the trainer
    pub data_file: String,
    /// Directory receiving every model artifact
    pub output_dir: String,
    /// Minimum number of exported episodes required to train
    pub min_samples: usize,
    /// SQLite episode store used by `pesca data export`
    pub database_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub test_fraction: f64,
    pub seed: u64,
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

/// Weights blending the final score and the user feedback into the target
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelConfig {
    pub score_weight: f64,
    pub feedback_weight: f64,
    pub feedback_scale: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Feature count declared on the graph input
    pub input_width: usize,
    pub input_name: String,
    pub output_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictConfig {
    /// Base URL serving released artifacts
    pub release_url: String,
    pub min_score: f64,
    pub max_score: f64,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            data_file: "training_data.json".to_string(),
            output_dir: "./models".to_string(),
            min_samples: 100,
            database_path: "./data/memory/episodes.db".to_string(),
        }
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            test_fraction: 0.2,
            seed: 42,
            n_estimators: 100,
            max_depth: 5,
            learning_rate: 0.1,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

impl Default for LabelConfig {
    fn default() -> Self {
        LabelConfig {
            score_weight: 0.3,
            feedback_weight: 0.7,
            feedback_scale: 2.0,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        ExportConfig {
            input_width: 13,
            input_name: "input".to_string(),
            output_name: "output".to_string(),
        }
    }
}

impl Default for PredictConfig {
    fn default() -> Self {
        PredictConfig {
            release_url: "https://github.com/your-username/pesca-api/releases/latest/download"
                .to_string(),
            min_score: 0.0,
            max_score: 10.0,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data: DataConfig::default(),
            training: TrainingConfig::default(),
            label: LabelConfig::default(),
            export: ExportConfig::default(),
            predict: PredictConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PescaError::Config(format!("Failed to read config file {}: {}", path, e))
        })?;
        toml::from_str(&content)
            .map_err(|e| PescaError::Config(format!("Failed to parse config: {}", e)))
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| PescaError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn model_path(&self) -> PathBuf {
        PathBuf::from(&self.data.output_dir).join(MODEL_FILE)
    }

    pub fn scaler_path(&self) -> PathBuf {
        PathBuf::from(&self.data.output_dir).join(SCALER_FILE)
    }

    pub fn onnx_path(&self) -> PathBuf {
        PathBuf::from(&self.data.output_dir).join(ONNX_FILE)
    }
}
