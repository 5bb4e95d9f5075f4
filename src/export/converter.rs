//! Model conversion and verification

use std::path::PathBuf;

use crate::model::tensor_forest::{random_batch, tensor_to_vec, ForestBackend};
use crate::model::{CompiledEnsemble, GradientBoostingRegressor, TensorForest};
use crate::predict::OnnxRunner;
use crate::{Config, PescaError, Result};

use super::onnx::{encode_model, ensemble_graph, read_input_signature};

/// Outcome of a conversion run
#[derive(Debug, Clone)]
pub struct ConversionReport {
    pub onnx_path: PathBuf,
    /// Declared input shape read back from the written file
    pub input_shape: Vec<Option<usize>>,
    /// Features the regressor was trained on
    pub trained_features: usize,
    /// Declared width differs from the trained feature count
    pub width_mismatch: bool,
    /// Trained features the declared input does not carry
    pub pinned_features: Vec<usize>,
    pub n_trees: usize,
    /// Random verification batch, `[1, width]`
    pub test_input: Vec<f32>,
    /// Graph output for the verification batch
    pub test_output: Vec<f32>,
    /// Tensor evaluation of the same batch
    pub reference_output: Option<f32>,
}

/// Convert the persisted regressor and smoke-test the result
pub fn run_conversion(config: &Config) -> Result<ConversionReport> {
    let model_path = config.model_path();
    log::info!("Loading model from {}", model_path.display());
    let model = GradientBoostingRegressor::load(&model_path)?;

    let width = config.export.input_width;
    let trained_features = model.n_features();
    let width_mismatch = trained_features != width;
    if width_mismatch {
        log::warn!(
            "Model was trained on {} features but the graph input declares {}",
            trained_features,
            width
        );
    }

    let compiled = CompiledEnsemble::compile(&model, width)?;
    if !compiled.pinned_features.is_empty() {
        log::warn!(
            "Splits on features {:?} are fixed to their training mean",
            compiled.pinned_features
        );
    }

    let graph = ensemble_graph(&compiled, &config.export);
    let bytes = encode_model(&graph);
    std::fs::create_dir_all(&config.data.output_dir)?;
    let onnx_path = config.onnx_path();
    std::fs::write(&onnx_path, &bytes)?;
    log::info!("ONNX model saved to {} ({} bytes)", onnx_path.display(), bytes.len());

    let (_, input_shape) = read_input_signature(&bytes)?;
    let (test_input, test_output, reference_output) = verify(&onnx_path, &compiled)?;

    Ok(ConversionReport {
        onnx_path,
        input_shape,
        trained_features,
        width_mismatch,
        pinned_features: compiled.pinned_features.clone(),
        n_trees: compiled.n_trees,
        test_input,
        test_output,
        reference_output,
    })
}

/// Reload the graph and run one random `[1, width]` batch through it
fn verify(
    onnx_path: &std::path::Path,
    compiled: &CompiledEnsemble,
) -> Result<(Vec<f32>, Vec<f32>, Option<f32>)> {
    let device = Default::default();
    let batch = random_batch::<ForestBackend>(1, compiled.input_width, &device);
    let test_input = tensor_to_vec(batch.clone())?;

    let runner = OnnxRunner::load(onnx_path)
        .map_err(|e| PescaError::Convert(format!("reloading converted graph: {}", e)))?;
    let test_output = runner
        .run(&test_input)
        .map_err(|e| PescaError::Convert(format!("verification run: {}", e)))?;
    if test_output.len() != 1 {
        return Err(PescaError::Convert(format!(
            "expected one output value, got {}",
            test_output.len()
        )));
    }
    log::info!("Test prediction: {:.4}", test_output[0]);

    // Diagnostic only
    let forest = TensorForest::<ForestBackend>::new(compiled, &device);
    let reference_output = match tensor_to_vec(forest.forward(batch)) {
        Ok(values) => values.first().copied(),
        Err(e) => {
            log::warn!("Tensor evaluation failed: {}", e);
            None
        }
    };
    if let Some(reference) = reference_output {
        let diff = (reference - test_output[0]).abs();
        if diff > 1e-3 {
            log::warn!("Graph and tensor evaluation differ by {:.6}", diff);
        } else {
            log::debug!("Graph and tensor evaluation differ by {:.6}", diff);
        }
    }

    Ok((test_input, test_output, reference_output))
}
