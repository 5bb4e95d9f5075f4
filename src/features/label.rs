//! Target label blending

use crate::LabelConfig;

/// Blends the final score and the user feedback into one training target
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelBlend {
    pub score_weight: f64,
    pub feedback_weight: f64,
    /// Feedback is rated on a smaller scale than the score
    pub feedback_scale: f64,
}

impl Default for LabelBlend {
    fn default() -> Self {
        Self::from_config(&LabelConfig::default())
    }
}

impl LabelBlend {
    pub fn from_config(config: &LabelConfig) -> Self {
        LabelBlend {
            score_weight: config.score_weight,
            feedback_weight: config.feedback_weight,
            feedback_scale: config.feedback_scale,
        }
    }

    pub fn target(&self, score_final: f64, user_feedback: f64) -> f64 {
        self.score_weight * score_final + self.feedback_weight * (self.feedback_scale * user_feedback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_blend_formula() {
        let blend = LabelBlend::default();
        for (score, feedback) in [(0.0, 0.0), (7.5, 4.0), (10.0, 1.0), (3.2, 5.0)] {
            let expected = 0.3 * score + 0.7 * (2.0 * feedback);
            assert_eq!(blend.target(score, feedback), expected);
        }
    }

    #[test]
    fn test_custom_weights() {
        let blend = LabelBlend::from_config(&LabelConfig {
            score_weight: 1.0,
            feedback_weight: 0.0,
            feedback_scale: 2.0,
        });
        assert_eq!(blend.target(6.0, 5.0), 6.0);
    }
}
