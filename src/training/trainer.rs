//! Training pipeline: prepare, split, standardize, fit, evaluate, persist

use std::path::{Path, PathBuf};

use crate::data::dataset::{prepare_dataset, train_test_split, PreparationSummary};
use crate::data::episode::EpisodeExport;
use crate::features::{FeatureScaler, LabelBlend};
use crate::model::GradientBoostingRegressor;
use crate::training::metrics::RegressionMetrics;
use crate::training::persist::{save_artifacts, SavedArtifacts};
use crate::{Config, Result};

/// Outcome of a training run
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub summary: PreparationSummary,
    pub n_train: usize,
    pub n_test: usize,
    pub n_features: usize,
    pub train_metrics: RegressionMetrics,
    pub test_metrics: RegressionMetrics,
    pub artifacts: SavedArtifacts,
}

/// Fitted model and scaler before persistence
pub struct FittedPipeline {
    pub model: GradientBoostingRegressor,
    pub scaler: FeatureScaler,
    pub summary: PreparationSummary,
    pub n_train: usize,
    pub n_test: usize,
    pub train_metrics: RegressionMetrics,
    pub test_metrics: RegressionMetrics,
}

/// Gradient boosting trainer
pub struct Trainer {
    config: Config,
}

impl Trainer {
    pub fn new(config: Config) -> Self {
        Trainer { config }
    }

    /// Fit scaler and model on an export without touching the filesystem
    pub fn fit(&self, export: &EpisodeExport) -> Result<FittedPipeline> {
        let dataset = prepare_dataset(
            export,
            self.config.data.min_samples,
            &LabelBlend::from_config(&self.config.label),
        )?;

        let training = &self.config.training;
        let split = train_test_split(
            &dataset.features,
            &dataset.labels,
            training.test_fraction,
            training.seed,
        )?;

        // Statistics come from the training split only
        let scaler = FeatureScaler::fit(&split.train_features, &dataset.feature_names)?;
        let train_x = scaler.transform(&split.train_features);
        let test_x = scaler.transform(&split.test_features);

        let mut model = GradientBoostingRegressor::from_config(training);
        model.fit(&train_x, &split.train_labels)?;

        let train_metrics =
            RegressionMetrics::from_predictions(&split.train_labels, &model.predict(&train_x));
        let test_metrics =
            RegressionMetrics::from_predictions(&split.test_labels, &model.predict(&test_x));

        log::info!("Train: {}", train_metrics);
        log::info!("Test: {}", test_metrics);

        Ok(FittedPipeline {
            model,
            scaler,
            summary: dataset.summary,
            n_train: split.train_labels.len(),
            n_test: split.test_labels.len(),
            train_metrics,
            test_metrics,
        })
    }

    /// Load the export at `data_file`, fit and write artifacts
    pub fn run<P: AsRef<Path>>(&self, data_file: P) -> Result<TrainingReport> {
        let data_file = data_file.as_ref();
        log::info!("Loading episodes from {}", data_file.display());
        let export = EpisodeExport::load(data_file)?;
        log::info!("Loaded {} episodes", export.len());

        let fitted = self.fit(&export)?;
        let artifacts = save_artifacts(&self.config.data.output_dir, &fitted.model, &fitted.scaler)?;

        Ok(TrainingReport {
            summary: fitted.summary,
            n_train: fitted.n_train,
            n_test: fitted.n_test,
            n_features: fitted.model.n_features(),
            train_metrics: fitted.train_metrics,
            test_metrics: fitted.test_metrics,
            artifacts,
        })
    }
}

/// Train from the configured data file into the configured output directory
pub fn run_training(config: &Config) -> Result<TrainingReport> {
    Trainer::new(config.clone()).run(PathBuf::from(&config.data.data_file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fixtures::synthetic_export;
    use crate::PescaError;

    fn config_in(dir: &Path) -> Config {
        let mut config = Config::default();
        config.data.data_file = dir.join("training_data.json").display().to_string();
        config.data.output_dir = dir.join("models").display().to_string();
        config
    }

    #[test]
    fn test_end_to_end_training() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        synthetic_export(120).save(&config.data.data_file).unwrap();

        let report = run_training(&config).unwrap();
        assert_eq!(report.summary.used, 120);
        assert_eq!(report.n_train, 96);
        assert_eq!(report.n_test, 24);
        assert_eq!(report.n_features, 14);
        assert!(!report.test_metrics.r2().is_nan());
        assert!(report.test_metrics.mse().is_finite());

        let scaler = FeatureScaler::load(config.scaler_path()).unwrap();
        assert_eq!(scaler.mean.len(), 14);
        assert_eq!(scaler.std.len(), 14);
        assert_eq!(scaler.feature_names.len(), 14);

        let model = GradientBoostingRegressor::load(config.model_path()).unwrap();
        assert_eq!(model.trees().len(), 100);
    }

    #[test]
    fn test_insufficient_data_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        synthetic_export(50).save(&config.data.data_file).unwrap();

        let err = run_training(&config).unwrap_err();
        assert!(matches!(err, PescaError::InsufficientData { found: 50, .. }));
        assert!(!config.model_path().exists());
    }

    #[test]
    fn test_missing_data_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        assert!(matches!(run_training(&config), Err(PescaError::Io(_))));
    }

    #[test]
    fn test_fit_is_reproducible() {
        let mut config = Config::default();
        config.training.n_estimators = 20;
        let trainer = Trainer::new(config);
        let export = synthetic_export(120);

        let a = trainer.fit(&export).unwrap();
        let b = trainer.fit(&export).unwrap();
        assert_eq!(a.scaler, b.scaler);
        assert_eq!(a.test_metrics.mse(), b.test_metrics.mse());
    }
}
