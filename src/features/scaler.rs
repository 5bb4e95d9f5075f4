//! Per-feature standardization
//!
//! The persisted document is the portable contract read by runtimes that
//! cannot load the native regressor.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{PescaError, Result};

/// Z-score normalization statistics fitted on the training split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScaler {
    pub mean: Vec<f64>,
    /// Population standard deviation; zero-variance features store 1.0
    pub std: Vec<f64>,
    pub feature_names: Vec<String>,
}

impl FeatureScaler {
    /// Fit mean and standard deviation per column
    pub fn fit(rows: &[Vec<f64>], feature_names: &[String]) -> Result<Self> {
        if rows.is_empty() {
            return Err(PescaError::Fit("cannot fit scaler on zero rows".to_string()));
        }
        let dim = feature_names.len();
        if let Some(bad) = rows.iter().position(|r| r.len() != dim) {
            return Err(PescaError::Fit(format!(
                "row {} has {} features, expected {}",
                bad,
                rows[bad].len(),
                dim
            )));
        }

        let n = rows.len() as f64;
        let mut mean = vec![0.0f64; dim];
        for row in rows {
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v;
            }
        }
        for m in mean.iter_mut() {
            *m /= n;
        }

        let mut var = vec![0.0f64; dim];
        for row in rows {
            for ((acc, v), m) in var.iter_mut().zip(row).zip(&mean) {
                *acc += (v - m).powi(2);
            }
        }
        let std = var
            .into_iter()
            .map(|s| {
                let sd = (s / n).sqrt();
                if sd > f64::EPSILON {
                    sd
                } else {
                    1.0
                }
            })
            .collect();

        Ok(FeatureScaler {
            mean,
            std,
            feature_names: feature_names.to_vec(),
        })
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// Normalize a single row: (x - mean) / std
    ///
    /// Columns beyond the fitted statistics pass through with mean 0 and std 1.
    pub fn transform_row(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .enumerate()
            .map(|(i, v)| {
                let mean = self.mean.get(i).copied().unwrap_or(0.0);
                let std = self.std.get(i).copied().unwrap_or(1.0);
                (v - mean) / std
            })
            .collect()
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        rows.iter().map(|r| self.transform_row(r)).collect()
    }

    /// Check that the three arrays describe the same feature count
    pub fn validate(&self) -> Result<()> {
        if self.mean.len() != self.std.len() || self.mean.len() != self.feature_names.len() {
            return Err(PescaError::Parse(format!(
                "scaler arrays disagree: mean={}, std={}, feature_names={}",
                self.mean.len(),
                self.std.len(),
                self.feature_names.len()
            )));
        }
        Ok(())
    }

    /// Write the scaler document as pretty JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let scaler: FeatureScaler = serde_json::from_str(&content)?;
        scaler.validate()?;
        Ok(scaler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("f{}", i)).collect()
    }

    #[test]
    fn test_fit_transform_zero_mean_unit_variance() {
        let rows: Vec<Vec<f64>> = (0..50)
            .map(|i| {
                let x = i as f64;
                vec![x, x * x * 0.1 - 3.0, (x * 0.7).sin() * 12.0 + 1013.0]
            })
            .collect();
        let scaler = FeatureScaler::fit(&rows, &names(3)).unwrap();
        let scaled = scaler.transform(&rows);

        for col in 0..3 {
            let values: Vec<f64> = scaled.iter().map(|r| r[col]).collect();
            let n = values.len() as f64;
            let mean = values.iter().sum::<f64>() / n;
            let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            assert!(mean.abs() < 1e-9, "column {} mean {}", col, mean);
            assert!((var - 1.0).abs() < 1e-9, "column {} variance {}", col, var);
        }
    }

    #[test]
    fn test_constant_column_uses_unit_std() {
        let rows = vec![vec![5.0, 1.0], vec![5.0, 3.0]];
        let scaler = FeatureScaler::fit(&rows, &names(2)).unwrap();
        assert_eq!(scaler.std[0], 1.0);
        assert_eq!(scaler.transform_row(&[5.0, 2.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let rows = vec![vec![1.0, 2.0], vec![1.0]];
        assert!(matches!(
            FeatureScaler::fit(&rows, &names(2)),
            Err(PescaError::Fit(_))
        ));
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scaler.json");

        let rows = vec![vec![1.5, -2.0, 1013.25], vec![0.1, 4.0, 1009.0], vec![7.0, 0.3, 1020.5]];
        let scaler = FeatureScaler::fit(&rows, &names(3)).unwrap();
        scaler.save(&path).unwrap();

        let loaded = FeatureScaler::load(&path).unwrap();
        for (a, b) in loaded.mean.iter().chain(&loaded.std).zip(scaler.mean.iter().chain(&scaler.std)) {
            assert!((a - b).abs() < 1e-12);
        }
        assert_eq!(loaded.feature_names, scaler.feature_names);
    }

    #[test]
    fn test_document_keys() {
        let scaler = FeatureScaler::fit(&[vec![1.0], vec![3.0]], &names(1)).unwrap();
        let value: serde_json::Value = serde_json::to_value(&scaler).unwrap();
        assert_eq!(value["mean"][0], 2.0);
        assert_eq!(value["std"][0], 1.0);
        assert_eq!(value["feature_names"][0], "f0");
    }

    #[test]
    fn test_load_rejects_mismatched_arrays() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scaler.json");
        std::fs::write(&path, r#"{"mean": [0.0, 1.0], "std": [1.0], "feature_names": ["a", "b"]}"#)
            .unwrap();
        assert!(FeatureScaler::load(&path).is_err());
    }
}
