//! Model artifact persistence

use std::path::{Path, PathBuf};

use crate::features::FeatureScaler;
use crate::model::GradientBoostingRegressor;
use crate::{Result, MODEL_FILE, SCALER_FILE};

/// Paths of the artifacts written by a training run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedArtifacts {
    pub model_path: PathBuf,
    pub scaler_path: PathBuf,
}

/// Write the regressor and the scaler into `output_dir`, replacing old files
pub fn save_artifacts<P: AsRef<Path>>(
    output_dir: P,
    model: &GradientBoostingRegressor,
    scaler: &FeatureScaler,
) -> Result<SavedArtifacts> {
    let output_dir = output_dir.as_ref();
    std::fs::create_dir_all(output_dir)?;

    let model_path = output_dir.join(MODEL_FILE);
    model.save(&model_path)?;
    log::info!("Model saved to {}", model_path.display());

    let scaler_path = output_dir.join(SCALER_FILE);
    scaler.save(&scaler_path)?;
    log::info!("Scaler saved to {}", scaler_path.display());

    Ok(SavedArtifacts {
        model_path,
        scaler_path,
    })
}
