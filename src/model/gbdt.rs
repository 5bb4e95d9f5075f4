//! Gradient-boosted regression ensemble
//!
//! Squared-error boosting: the ensemble starts from the label mean and every
//! stage fits a regression tree to the current residuals. Stage outputs are
//! added with shrinkage by the learning rate.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::tree::{RegressionTree, TreeParams};
use crate::{PescaError, Result, TrainingConfig};

/// Gradient-boosted ensemble of regression trees
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingRegressor {
    n_estimators: usize,
    learning_rate: f64,
    tree_params: TreeParams,
    seed: u64,
    /// Constant prediction before any stage (mean label)
    init_prediction: f64,
    n_features: usize,
    trees: Vec<RegressionTree>,
    /// Training MSE after each stage
    #[serde(default)]
    stage_losses: Vec<f64>,
}

impl Default for GradientBoostingRegressor {
    fn default() -> Self {
        Self::new()
    }
}

impl GradientBoostingRegressor {
    /// 100 stages, depth 5, learning rate 0.1, seed 42
    pub fn new() -> Self {
        GradientBoostingRegressor {
            n_estimators: 100,
            learning_rate: 0.1,
            tree_params: TreeParams::default(),
            seed: 42,
            init_prediction: 0.0,
            n_features: 0,
            trees: Vec::new(),
            stage_losses: Vec::new(),
        }
    }

    pub fn from_config(config: &TrainingConfig) -> Self {
        Self::new()
            .with_n_estimators(config.n_estimators)
            .with_learning_rate(config.learning_rate)
            .with_max_depth(config.max_depth)
            .with_min_samples_split(config.min_samples_split)
            .with_min_samples_leaf(config.min_samples_leaf)
            .with_seed(config.seed)
    }

    pub fn with_n_estimators(mut self, n_estimators: usize) -> Self {
        self.n_estimators = n_estimators;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.tree_params.max_depth = max_depth;
        self
    }

    pub fn with_min_samples_split(mut self, min_samples_split: usize) -> Self {
        self.tree_params.min_samples_split = min_samples_split;
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples_leaf: usize) -> Self {
        self.tree_params.min_samples_leaf = min_samples_leaf;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Fit the ensemble, replacing any previous fit
    pub fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<()> {
        validate_input(x, y)?;
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(PescaError::Fit(format!(
                "learning rate must be positive, got {}",
                self.learning_rate
            )));
        }

        let n = y.len();
        self.n_features = x[0].len();
        self.init_prediction = y.iter().sum::<f64>() / n as f64;
        self.trees = Vec::with_capacity(self.n_estimators);
        self.stage_losses = Vec::with_capacity(self.n_estimators);

        let mut rng = StdRng::seed_from_u64(self.seed);
        let indices: Vec<usize> = (0..n).collect();
        let mut predictions = vec![self.init_prediction; n];
        let mut residuals = vec![0.0; n];

        for stage in 0..self.n_estimators {
            for ((r, target), pred) in residuals.iter_mut().zip(y).zip(&predictions) {
                *r = target - pred;
            }

            let tree = RegressionTree::fit(x, &residuals, &indices, &self.tree_params, &mut rng);
            for (pred, row) in predictions.iter_mut().zip(x) {
                *pred += self.learning_rate * tree.predict_row(row);
            }
            self.trees.push(tree);

            let loss = mean_squared(y, &predictions);
            self.stage_losses.push(loss);
            if (stage + 1) % 10 == 0 || stage == 0 {
                log::debug!("Stage {}/{}: train MSE={:.4}", stage + 1, self.n_estimators, loss);
            }
        }

        log::info!(
            "Fitted {} trees on {} samples x {} features",
            self.trees.len(),
            n,
            self.n_features
        );
        Ok(())
    }

    pub fn predict_row(&self, row: &[f64]) -> f64 {
        self.init_prediction
            + self
                .trees
                .iter()
                .map(|t| self.learning_rate * t.predict_row(row))
                .sum::<f64>()
    }

    pub fn predict(&self, x: &[Vec<f64>]) -> Vec<f64> {
        x.iter().map(|row| self.predict_row(row)).collect()
    }

    pub fn is_fitted(&self) -> bool {
        self.n_features > 0
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_estimators(&self) -> usize {
        self.n_estimators
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn init_prediction(&self) -> f64 {
        self.init_prediction
    }

    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }

    pub fn stage_losses(&self) -> &[f64] {
        &self.stage_losses
    }

    /// Save the fitted ensemble
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, serde_json::to_vec(self)?)?;
        Ok(())
    }

    /// Load a fitted ensemble, rejecting documents with broken trees
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PescaError::NoModel(path.display().to_string()));
        }
        let bytes = std::fs::read(path)?;
        let model: GradientBoostingRegressor = serde_json::from_slice(&bytes)?;
        if !model.is_fitted() || !model.trees.iter().all(|t| t.is_well_formed()) {
            return Err(PescaError::Parse(format!(
                "{} does not hold a fitted ensemble",
                path.display()
            )));
        }
        Ok(model)
    }
}

fn validate_input(x: &[Vec<f64>], y: &[f64]) -> Result<()> {
    if x.is_empty() {
        return Err(PescaError::Fit("cannot fit on zero samples".to_string()));
    }
    if x.len() != y.len() {
        return Err(PescaError::Fit(format!(
            "{} feature rows but {} labels",
            x.len(),
            y.len()
        )));
    }
    let width = x[0].len();
    if width == 0 {
        return Err(PescaError::Fit("feature rows are empty".to_string()));
    }
    for (i, row) in x.iter().enumerate() {
        if row.len() != width {
            return Err(PescaError::Fit(format!(
                "row {} has {} features, expected {}",
                i,
                row.len(),
                width
            )));
        }
        if row.iter().any(|v| !v.is_finite()) {
            return Err(PescaError::Fit(format!("row {} has a non-finite feature", i)));
        }
    }
    if let Some(i) = y.iter().position(|v| !v.is_finite()) {
        return Err(PescaError::Fit(format!("label {} is not finite", i)));
    }
    Ok(())
}

fn mean_squared(y: &[f64], predictions: &[f64]) -> f64 {
    y.iter()
        .zip(predictions)
        .map(|(t, p)| (t - p).powi(2))
        .sum::<f64>()
        / y.len() as f64
}
