//! Scoring & attribution engine
//!
//! Wraps a loaded [`Scorer`] and turns a feature vector into the probability of
//! the female class plus an additive attribution of the model margin.

use std::sync::Arc;

use crate::error::PredictError;
use crate::model::{ModelSummary, Scorer};
use crate::types::{Feature, FeatureVector, Scored};

/// Relative tolerance for `baseline + Σ contributions == margin`
pub const ADDITIVITY_TOLERANCE: f64 = 1e-6;

/// Immutable handle over a loaded classifier. Cloning shares the model.
#[derive(Clone)]
pub struct ScoringEngine {
    scorer: Arc<dyn Scorer>,
}

impl ScoringEngine {
    pub fn new(scorer: Arc<dyn Scorer>) -> Self {
        Self { scorer }
    }

    pub fn summary(&self) -> ModelSummary {
        self.scorer.summary()
    }

    /// Score a derived feature vector.
    ///
    /// Non-finite values are rejected with `InvalidFeatureVector` rather than
    /// routed down the trees' missing-value branches.
    pub fn score(&self, features: &FeatureVector) -> Result<Scored, PredictError> {
        if let Some((feature, value)) = features.iter().find(|(_, v)| !v.is_finite()) {
            return Err(PredictError::InvalidFeatureVector(format!(
                "{} is {}",
                feature, value
            )));
        }

        let x = features.as_array();
        let margin = self.scorer.margin(x);
        let probability_male = self.scorer.predict_probability(x).clamp(0.0, 1.0);
        let attribution = self.scorer.attribute(x);

        let additivity_gap = (attribution.reconstructed_margin() - margin).abs();
        if additivity_gap > ADDITIVITY_TOLERANCE * margin.abs().max(1.0) {
            tracing::warn!(
                margin,
                reconstructed = attribution.reconstructed_margin(),
                gap = additivity_gap,
                "attribution does not add up to the model margin"
            );
        }

        tracing::debug!(
            probability_female = 1.0 - probability_male,
            margin,
            baseline = attribution.baseline,
            "scored feature vector"
        );

        Ok(Scored {
            probability_female: 1.0 - probability_male,
            probability_male,
            margin,
            attribution,
            additivity_gap,
        })
    }

    /// Score a positional vector; it must hold exactly eleven values
    pub fn score_slice(&self, values: &[f64]) -> Result<Scored, PredictError> {
        self.score(&FeatureVector::from_slice(values)?)
    }
}

impl std::fmt::Debug for ScoringEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoringEngine")
            .field("model", &self.scorer.summary())
            .finish()
    }
}

/// Column names in scoring order, for callers that label attribution charts
pub fn feature_names() -> [&'static str; crate::types::FEATURE_COUNT] {
    Feature::ALL.map(|f| f.name())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelSummary, Scorer};
    use crate::testing::{demo_engine, demo_features};
    use crate::types::{Attribution, FEATURE_COUNT};
    use proptest::prelude::*;

    /// Stub scorer: margin is the stature column minus 1700, scaled
    struct StatureStub;

    impl Scorer for StatureStub {
        fn margin(&self, features: &[f64; FEATURE_COUNT]) -> f64 {
            (features[10] - 1700.0) / 100.0
        }

        fn predict_probability(&self, features: &[f64; FEATURE_COUNT]) -> f64 {
            1.0 / (1.0 + (-self.margin(features)).exp())
        }

        fn attribute(&self, features: &[f64; FEATURE_COUNT]) -> Attribution {
            let mut contributions = [0.0; FEATURE_COUNT];
            contributions[10] = self.margin(features);
            Attribution {
                baseline: 0.0,
                contributions,
            }
        }

        fn summary(&self) -> ModelSummary {
            ModelSummary {
                kind: "stub".to_string(),
                trees: 0,
                max_depth: 0,
                leaves: 0,
                baseline: 0.0,
            }
        }
    }

    #[test]
    fn test_female_probability_is_class_zero() {
        let engine = ScoringEngine::new(Arc::new(StatureStub));
        let mut values = [0.5; FEATURE_COUNT];
        values[10] = 1900.0;

        let scored = engine.score(&FeatureVector::new(values)).unwrap();
        assert!(scored.probability_male > 0.5);
        assert!((scored.probability_female + scored.probability_male - 1.0).abs() < 1e-12);
        assert!(scored.attribution.contribution(Feature::Stature) > 0.0);
    }

    #[test]
    fn test_rejects_wrong_arity() {
        let engine = demo_engine();
        let err = engine.score_slice(&[0.5; 12]).unwrap_err();
        assert!(matches!(err, PredictError::InvalidFeatureVector(_)));
    }

    #[test]
    fn test_rejects_non_finite() {
        let engine = demo_engine();
        let mut values = *demo_features().as_array();
        values[3] = f64::INFINITY;
        let err = engine.score_slice(&values).unwrap_err();
        assert!(err.to_string().contains("FSR"));
    }

    #[test]
    fn test_demo_engine_is_additive() {
        let scored = demo_engine().score(&demo_features()).unwrap();
        assert!(scored.additivity_gap < 1e-9);
        assert!((scored.margin - 0.69).abs() < 1e-12);
    }

    #[test]
    fn test_engine_shared_across_threads() {
        let engine = demo_engine();
        let expected = engine.score(&demo_features()).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let engine = engine.clone();
                std::thread::spawn(move || engine.score(&demo_features()).unwrap())
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    }

    #[test]
    fn test_feature_names_order() {
        let names = feature_names();
        assert_eq!(names[0], "WHR");
        assert_eq!(names[10], "stature");
    }

    proptest! {
        #[test]
        fn prop_probability_bounded_and_additive(
            whr in 0.6f64..1.1,
            cs in 0.4f64..0.7,
            fsr in 0.13f64..0.2,
            bbhb in 1.0f64..1.5,
            stature in 1400.0f64..2000.0,
        ) {
            let mut values = *demo_features().as_array();
            values[Feature::Whr.index()] = whr;
            values[Feature::Cs.index()] = cs;
            values[Feature::Fsr.index()] = fsr;
            values[Feature::Bbhb.index()] = bbhb;
            values[Feature::Stature.index()] = stature;

            let scored = demo_engine().score_slice(&values).unwrap();
            prop_assert!((0.0..=1.0).contains(&scored.probability_female));
            prop_assert!(scored.additivity_gap <= ADDITIVITY_TOLERANCE * scored.margin.abs().max(1.0));
        }
    }
}
