//! Released artifact management

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{Config, Result, MODEL_FILE, ONNX_FILE, SCALER_FILE};

/// Files a serving runtime needs
pub const RELEASE_FILES: [&str; 2] = [ONNX_FILE, SCALER_FILE];

/// Presence of each artifact in the output directory
#[derive(Debug, Clone, Serialize)]
pub struct ModelHealth {
    pub output_dir: PathBuf,
    pub model_path: PathBuf,
    pub model_present: bool,
    pub scaler_path: PathBuf,
    pub scaler_present: bool,
    pub onnx_path: PathBuf,
    pub onnx_present: bool,
    /// Declared graph input shape, when the graph can be read
    pub onnx_input_shape: Option<Vec<Option<usize>>>,
    pub version: String,
}

impl ModelHealth {
    pub fn check(config: &Config) -> Self {
        let onnx_path = config.onnx_path();
        let onnx_input_shape = std::fs::read(&onnx_path)
            .ok()
            .and_then(|bytes| crate::export::onnx::read_input_signature(&bytes).ok())
            .map(|(_, dims)| dims);

        ModelHealth {
            output_dir: PathBuf::from(&config.data.output_dir),
            model_present: config.model_path().exists(),
            model_path: config.model_path(),
            scaler_present: config.scaler_path().exists(),
            scaler_path: config.scaler_path(),
            onnx_present: onnx_path.exists(),
            onnx_path,
            onnx_input_shape,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Both files needed for inference are present
    pub fn is_servable(&self) -> bool {
        self.onnx_present && self.scaler_present
    }
}

impl std::fmt::Display for ModelHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mark = |present: bool| if present { "ok" } else { "missing" };
        writeln!(f, "Output directory: {}", self.output_dir.display())?;
        writeln!(f, "  {:<18} {}", MODEL_FILE, mark(self.model_present))?;
        writeln!(f, "  {:<18} {}", SCALER_FILE, mark(self.scaler_present))?;
        write!(f, "  {:<18} {}", ONNX_FILE, mark(self.onnx_present))?;
        if let Some(shape) = &self.onnx_input_shape {
            let dims: Vec<String> = shape
                .iter()
                .map(|d| d.map_or("None".to_string(), |v| v.to_string()))
                .collect();
            write!(f, " (input: ({}))", dims.join(", "))?;
        }
        Ok(())
    }
}

/// Join a release base URL and a file name
pub fn release_url(base: &str, file: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), file)
}

/// Download the serving artifacts that are not already present
///
/// Returns the paths that were written. With `force`, existing files are
/// downloaded again.
pub fn fetch_artifacts(config: &Config, force: bool) -> Result<Vec<PathBuf>> {
    let output_dir = Path::new(&config.data.output_dir);
    let missing: Vec<&str> = RELEASE_FILES
        .iter()
        .copied()
        .filter(|f| force || !output_dir.join(f).exists())
        .collect();
    if missing.is_empty() {
        log::info!("Artifacts already present in {}", output_dir.display());
        return Ok(Vec::new());
    }

    std::fs::create_dir_all(output_dir)?;
    let client = reqwest::blocking::Client::builder()
        .user_agent(concat!("pesca/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(60))
        .build()?;

    let mut written = Vec::with_capacity(missing.len());
    for file in missing {
        let url = release_url(&config.predict.release_url, file);
        log::info!("Downloading {}", url);
        let body = client.get(&url).send()?.error_for_status()?.bytes()?;
        let dest = output_dir.join(file);
        std::fs::write(&dest, &body)?;
        log::info!("Saved {} ({} bytes)", dest.display(), body.len());
        written.push(dest);
    }
    Ok(written)
}
