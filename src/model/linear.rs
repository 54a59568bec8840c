//! Logistic-regression scorer
//!
//! Attributions follow the exact linear decomposition around the training
//! means: `contribution[i] = coef[i] * (x[i] - mean[i])`, with baseline
//! `intercept + Σ coef[i] * mean[i]`.

use super::ensemble::sigmoid;
use super::{ModelSummary, Scorer};
use crate::error::PredictError;
use crate::types::{Attribution, FEATURE_COUNT};

#[derive(Debug, Clone, PartialEq)]
pub struct LinearScorer {
    coefficients: [f64; FEATURE_COUNT],
    intercept: f64,
    feature_means: [f64; FEATURE_COUNT],
}

impl LinearScorer {
    pub fn new(
        coefficients: &[f64],
        intercept: f64,
        feature_means: &[f64],
    ) -> Result<Self, PredictError> {
        let to_array = |name: &str, values: &[f64]| -> Result<[f64; FEATURE_COUNT], PredictError> {
            values.try_into().map_err(|_| {
                PredictError::InvalidArtifact(format!(
                    "{} has {} entries, expected {}",
                    name,
                    values.len(),
                    FEATURE_COUNT
                ))
            })
        };

        Ok(Self {
            coefficients: to_array("coefficients", coefficients)?,
            intercept,
            feature_means: to_array("feature_means", feature_means)?,
        })
    }

    fn baseline(&self) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(self.feature_means.iter())
                .map(|(c, m)| c * m)
                .sum::<f64>()
    }
}

impl Scorer for LinearScorer {
    fn margin(&self, features: &[f64; FEATURE_COUNT]) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(features.iter())
                .map(|(c, x)| c * x)
                .sum::<f64>()
    }

    fn predict_probability(&self, features: &[f64; FEATURE_COUNT]) -> f64 {
        sigmoid(self.margin(features))
    }

    fn attribute(&self, features: &[f64; FEATURE_COUNT]) -> Attribution {
        let mut contributions = [0.0; FEATURE_COUNT];
        for (i, c) in contributions.iter_mut().enumerate() {
            *c = self.coefficients[i] * (features[i] - self.feature_means[i]);
        }
        Attribution {
            baseline: self.baseline(),
            contributions,
        }
    }

    fn summary(&self) -> ModelSummary {
        ModelSummary {
            kind: "logistic_regression".to_string(),
            trees: 0,
            max_depth: 0,
            leaves: 0,
            baseline: self.baseline(),
        }
    }
}
