//! Regression evaluation metrics

use std::fmt;

/// Error statistics accumulated over predictions
#[derive(Debug, Clone, Default)]
pub struct RegressionMetrics {
    /// Sum of squared errors
    pub sse: f64,
    /// Sum of absolute errors
    pub sae: f64,
    /// Sum of targets
    pub target_sum: f64,
    /// Sum of squared targets
    pub target_sq_sum: f64,
    pub count: usize,
}

impl RegressionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from aligned targets and predictions
    pub fn from_predictions(targets: &[f64], predictions: &[f64]) -> Self {
        let mut metrics = Self::new();
        for (t, p) in targets.iter().zip(predictions) {
            metrics.update(*t, *p);
        }
        metrics
    }

    pub fn update(&mut self, target: f64, prediction: f64) {
        let err = target - prediction;
        self.sse += err * err;
        self.sae += err.abs();
        self.target_sum += target;
        self.target_sq_sum += target * target;
        self.count += 1;
    }

    /// Mean squared error
    pub fn mse(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sse / self.count as f64
        }
    }

    pub fn rmse(&self) -> f64 {
        self.mse().sqrt()
    }

    /// Mean absolute error
    pub fn mae(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sae / self.count as f64
        }
    }

    /// Coefficient of determination
    ///
    /// A constant target gives 1.0 for a perfect fit and 0.0 otherwise.
    pub fn r2(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let n = self.count as f64;
        let ss_tot = (self.target_sq_sum - self.target_sum * self.target_sum / n).max(0.0);
        if ss_tot <= f64::EPSILON * self.target_sq_sum.max(1.0) {
            return if self.sse <= f64::EPSILON { 1.0 } else { 0.0 };
        }
        1.0 - self.sse / ss_tot
    }
}

impl fmt::Display for RegressionMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MSE: {:.4} | RMSE: {:.4} | MAE: {:.4} | R²: {:.4} (n={})",
            self.mse(),
            self.rmse(),
            self.mae(),
            self.r2(),
            self.count
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_predictions() {
        let y = [1.0, 2.0, 3.0, 4.0];
        let m = RegressionMetrics::from_predictions(&y, &y);
        assert_eq!(m.mse(), 0.0);
        assert!((m.r2() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_known_values() {
        let y = [1.0, 2.0, 3.0, 4.0];
        let p = [1.5, 2.0, 2.5, 4.0];
        let m = RegressionMetrics::from_predictions(&y, &p);
        assert!((m.mse() - 0.125).abs() < 1e-12);
        assert!((m.mae() - 0.25).abs() < 1e-12);
        // ss_tot = 5.0, ss_res = 0.5
        assert!((m.r2() - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_mean_predictor_has_zero_r2() {
        let y = [2.0, 4.0, 6.0];
        let m = RegressionMetrics::from_predictions(&y, &[4.0, 4.0, 4.0]);
        assert!(m.r2().abs() < 1e-12);
    }

    #[test]
    fn test_constant_target_is_never_nan() {
        let y = [3.0, 3.0, 3.0];
        let exact = RegressionMetrics::from_predictions(&y, &y);
        let off = RegressionMetrics::from_predictions(&y, &[3.0, 2.0, 3.5]);
        assert_eq!(exact.r2(), 1.0);
        assert_eq!(off.r2(), 0.0);
        assert_eq!(RegressionMetrics::new().r2(), 0.0);
    }
}
