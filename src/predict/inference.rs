//! ONNX inference for fishing scores

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tract_onnx::prelude::*;

use crate::data::episode::WeatherObservation;
use crate::export::onnx::read_input_signature;
use crate::features::{EpisodeFeatures, FeatureScaler};
use crate::{Config, PescaError, Result};

/// Optimized tract plan for a graph with a fixed `[1, width]` input
pub struct OnnxRunner {
    plan: SimplePlan<TypedFact, Box<dyn TypedOp>, TypedModel>,
    input_width: usize,
}

fn inference_error(e: TractError) -> PescaError {
    PescaError::Inference(format!("{e:#}"))
}

impl OnnxRunner {
    /// Load a graph and read its declared input width from the file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PescaError::NoModel(path.display().to_string()));
        }
        let bytes = std::fs::read(path)?;
        let (_, declared_shape) = read_input_signature(&bytes)?;
        let input_width = declared_shape
            .get(1)
            .copied()
            .flatten()
            .ok_or_else(|| PescaError::Parse("graph input has no fixed feature dimension".into()))?;

        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .and_then(|m| m.with_input_fact(0, f32::fact([1, input_width]).into()))
            // Output shape is declared over the symbolic batch dimension
            .and_then(|m| m.with_output_fact(0, InferenceFact::default()))
            .and_then(|m| m.into_optimized())
            .and_then(|m| m.into_runnable())
            .map_err(inference_error)?;

        log::debug!("Loaded ONNX graph {} (input {:?})", path.display(), declared_shape);
        Ok(OnnxRunner { plan, input_width })
    }

    pub fn input_width(&self) -> usize {
        self.input_width
    }

    /// Run one row through the graph and return every output value
    pub fn run(&self, row: &[f32]) -> Result<Vec<f32>> {
        if row.len() != self.input_width {
            return Err(PescaError::Inference(format!(
                "expected {} features, got {}",
                self.input_width,
                row.len()
            )));
        }
        let input = Tensor::from_shape(&[1, self.input_width], row).map_err(inference_error)?;
        let outputs = self.plan.run(tvec!(input.into())).map_err(inference_error)?;
        let output = outputs
            .first()
            .ok_or_else(|| PescaError::Inference("graph produced no output".to_string()))?;
        let view = output.to_array_view::<f32>().map_err(inference_error)?;
        Ok(view.iter().copied().collect())
    }
}

/// Score produced by the model for one set of conditions
#[derive(Debug, Clone, Serialize)]
pub struct ScorePrediction {
    /// Clamped into the configured score range
    pub score: f64,
    /// Raw graph output
    pub raw: f64,
    pub feature_names: Vec<String>,
    pub features: Vec<f64>,
}

/// Predictor over the converted graph and the scaler document
pub struct Predictor {
    runner: OnnxRunner,
    scaler: FeatureScaler,
    min_score: f64,
    max_score: f64,
}

impl Predictor {
    pub fn new(runner: OnnxRunner, scaler: FeatureScaler, min_score: f64, max_score: f64) -> Self {
        Predictor {
            runner,
            scaler,
            min_score,
            max_score,
        }
    }

    /// Load the artifacts from the configured output directory
    pub fn load(config: &Config) -> Result<Self> {
        let scaler_path = config.scaler_path();
        if !scaler_path.exists() {
            return Err(PescaError::NoModel(scaler_path.display().to_string()));
        }
        let runner = OnnxRunner::load(config.onnx_path())?;
        let scaler = FeatureScaler::load(&scaler_path)?;
        if runner.input_width() != scaler.dim() {
            log::warn!(
                "Graph reads {} features, scaler describes {}; extra features are dropped",
                runner.input_width(),
                scaler.dim()
            );
        }
        Ok(Self::new(
            runner,
            scaler,
            config.predict.min_score,
            config.predict.max_score,
        ))
    }

    /// Predict from live weather, location and time
    pub fn predict_conditions(
        &self,
        weather: &WeatherObservation,
        latitude: f64,
        longitude: f64,
        at: DateTime<Utc>,
    ) -> Result<ScorePrediction> {
        let features = EpisodeFeatures::from_conditions(weather, latitude, longitude, at);
        self.predict(&features)
    }

    pub fn predict(&self, features: &EpisodeFeatures) -> Result<ScorePrediction> {
        let values = features.to_vec();
        let scaled = self.scaler.transform_row(&values);

        // Columns past the graph input are not read
        let mut row: Vec<f32> = scaled.iter().map(|v| *v as f32).collect();
        row.resize(self.runner.input_width(), 0.0);

        let output = self.runner.run(&row)?;
        let raw = *output
            .first()
            .ok_or_else(|| PescaError::Inference("empty graph output".to_string()))?
            as f64;
        let score = raw.clamp(self.min_score, self.max_score);
        log::debug!("Prediction raw={:.3} clamped={:.3}", raw, score);

        Ok(ScorePrediction {
            score,
            raw,
            feature_names: EpisodeFeatures::names(),
            features: values,
        })
    }
}

/// Agreement between model and rule-based scores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Agreement {
    High,
    Medium,
    Low,
}

impl std::fmt::Display for Agreement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Agreement::High => write!(f, "high"),
            Agreement::Medium => write!(f, "medium"),
            Agreement::Low => write!(f, "low"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreComparison {
    pub ml_score: f64,
    pub rule_score: f64,
    pub difference: f64,
    pub agreement: Agreement,
}

/// Compare a model score with a rule-based score
pub fn compare_predictions(ml_score: f64, rule_score: f64) -> ScoreComparison {
    let difference = (ml_score - rule_score).abs();
    let agreement = if difference < 1.0 {
        Agreement::High
    } else if difference < 2.0 {
        Agreement::Medium
    } else {
        Agreement::Low
    };
    ScoreComparison {
        ml_score,
        rule_score,
        difference,
        agreement,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agreement_thresholds() {
        assert_eq!(compare_predictions(5.0, 5.5).agreement, Agreement::High);
        assert_eq!(compare_predictions(5.0, 6.0).agreement, Agreement::Medium);
        assert_eq!(compare_predictions(7.5, 6.0).agreement, Agreement::Medium);
        assert_eq!(compare_predictions(5.0, 7.0).agreement, Agreement::Low);
        assert_eq!(compare_predictions(9.0, 1.0).difference, 8.0);
    }

    #[test]
    fn test_comparison_json() {
        let value = serde_json::to_value(compare_predictions(4.0, 4.5)).unwrap();
        assert_eq!(value["agreement"], "high");
        assert_eq!(value["difference"], 0.5);
    }

    #[test]
    fn test_missing_graph_is_no_model() {
        assert!(matches!(
            OnnxRunner::load("/nonexistent/pesca_model.onnx"),
            Err(PescaError::NoModel(_))
        ));
    }
}
