//! Pipeline orchestration
//!
//! This module provides the public API for ratio-lens. It runs a measurement
//! record through every stage and returns either the bare prediction or the
//! full JSON payload.

use crate::config::RatioLensConfig;
use crate::encoder::{PredictionContext, PredictionEncoder};
use crate::engine::ScoringEngine;
use crate::error::PredictError;
use crate::features::FeatureDeriver;
use crate::model::load_artifact;
use crate::normalizer::Normalizer;
use crate::schema::{MeasurementInput, MeasurementInputAdapter};
use crate::types::{
    FeatureVector, LengthUnit, MeasurementRecord, NormalizedMeasurements, PredictionPayload,
    FEATURE_COUNT,
};

/// Probability of female plus the attribution behind it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub probability_female: f64,
    /// Per-feature contributions in column order, positive leans male
    pub attributions: [f64; FEATURE_COUNT],
    pub baseline: f64,
    pub features: FeatureVector,
}

/// Predict from twelve raw measurements already in millimetres.
///
/// # Example
/// ```ignore
/// let engine = ScoringEngine::new(load_artifact(Path::new("models/demo_gbt.json"))?);
/// let prediction = predict(&engine, record)?;
/// println!("{:.1}%", prediction.probability_female * 100.0);
/// ```
pub fn predict(engine: &ScoringEngine, record: MeasurementRecord) -> Result<Prediction, PredictError> {
    let features = FeatureDeriver::derive(record);
    let scored = engine.score(&features)?;
    Ok(Prediction {
        probability_female: scored.probability_female,
        attributions: scored.attribution.contributions,
        baseline: scored.attribution.baseline,
        features,
    })
}

/// Validate, convert to millimetres and derive features, without a model
pub fn derive_features(
    input: &MeasurementInput,
    default_unit: LengthUnit,
    strict: bool,
) -> Result<(NormalizedMeasurements, FeatureVector), PredictError> {
    let record = input.to_record(strict)?;
    let normalized = Normalizer::normalize(&record, input.unit.unwrap_or(default_unit));
    let features = FeatureDeriver::derive(normalized.record);
    Ok((normalized, features))
}

/// Loaded model plus settings, reusable across many records.
///
/// Scoring only borrows `self`, so one predictor can serve several threads.
pub struct Predictor {
    engine: ScoringEngine,
    config: RatioLensConfig,
    encoder: PredictionEncoder,
}

impl Predictor {
    pub fn new(engine: ScoringEngine, config: RatioLensConfig) -> Self {
        Self {
            engine,
            config,
            encoder: PredictionEncoder::new(),
        }
    }

    /// Load the artifact named in `config`
    pub fn from_config(config: RatioLensConfig) -> Result<Self, PredictError> {
        let scorer = load_artifact(&config.model_path)?;
        Ok(Self::new(ScoringEngine::new(scorer), config))
    }

    pub fn with_encoder(mut self, encoder: PredictionEncoder) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn engine(&self) -> &ScoringEngine {
        &self.engine
    }

    pub fn config(&self) -> &RatioLensConfig {
        &self.config
    }

    /// Run a record in `unit` through normalization, derivation and scoring
    pub fn predict_record(
        &self,
        record: &MeasurementRecord,
        unit: LengthUnit,
        subject_id: Option<&str>,
    ) -> Result<PredictionPayload, PredictError> {
        let normalized = Normalizer::normalize(record, unit);
        let features = FeatureDeriver::derive(normalized.record);
        self.encode(subject_id, &normalized, &features)
    }

    pub fn predict_input(&self, input: &MeasurementInput) -> Result<PredictionPayload, PredictError> {
        let (normalized, features) =
            derive_features(input, self.config.input_unit, self.config.strict_zero_check)?;
        self.encode(input.subject_id.as_deref(), &normalized, &features)
    }

    /// One JSON record in, one pretty-printed payload out
    pub fn predict_json(&self, json: &str) -> Result<String, PredictError> {
        let input = MeasurementInputAdapter::parse_one(json)?;
        let payload = self.predict_input(&input)?;
        serde_json::to_string_pretty(&payload).map_err(|e| PredictError::EncodingError(e.to_string()))
    }

    /// NDJSON in, one compact payload per input line out.
    ///
    /// Stops at the first record that fails.
    pub fn predict_ndjson(&self, ndjson: &str) -> Result<Vec<String>, PredictError> {
        let inputs = MeasurementInputAdapter::parse_ndjson(ndjson)?;
        inputs
            .iter()
            .map(|input| {
                let payload = self.predict_input(input)?;
                serde_json::to_string(&payload).map_err(|e| PredictError::EncodingError(e.to_string()))
            })
            .collect()
    }

    fn encode(
        &self,
        subject_id: Option<&str>,
        normalized: &NormalizedMeasurements,
        features: &FeatureVector,
    ) -> Result<PredictionPayload, PredictError> {
        let scored = self.engine.score(features)?;
        let model = self.engine.summary();

        tracing::debug!(
            subject_id = subject_id.unwrap_or("-"),
            probability_female = scored.probability_female,
            flags = normalized.quality_flags.len(),
            "prediction complete"
        );

        Ok(self.encoder.encode(&PredictionContext {
            subject_id,
            normalized,
            features,
            scored: &scored,
            model: &model,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{demo_engine, sample_measurements_json, sample_record};
    use crate::types::{Feature, MeasurementKey};
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn demo_predictor() -> Predictor {
        Predictor::new(demo_engine(), RatioLensConfig::default())
    }

    #[test]
    fn test_predict_reference_subject() {
        let prediction = predict(&demo_engine(), sample_record()).unwrap();

        let margin = prediction.baseline + prediction.attributions.iter().sum::<f64>();
        assert!((margin - 0.69).abs() < 1e-9);
        assert!((prediction.probability_female - 1.0 / (1.0 + 0.69f64.exp())).abs() < 1e-12);
        assert!(prediction.attributions[Feature::Bbhb.index()] > 0.0);
        assert!(prediction.attributions[Feature::Whr.index()] < 0.0);
    }

    #[test]
    fn test_predict_with_zero_waist() {
        let record = sample_record().with(MeasurementKey::WaistCircumference, 0.0);
        let prediction = predict(&demo_engine(), record).unwrap();
        assert!((prediction.features.get(Feature::Whr) - 0.1 / 980.0).abs() < 1e-15);
    }

    #[test]
    fn test_units_do_not_change_prediction() {
        let predictor = demo_predictor();
        let cm = sample_record().map_values(|v| v / 10.0);

        let from_mm = predictor
            .predict_record(&sample_record(), LengthUnit::Mm, None)
            .unwrap();
        let from_cm = predictor.predict_record(&cm, LengthUnit::Cm, None).unwrap();

        assert!(
            (from_mm.prediction.probability_female - from_cm.prediction.probability_female).abs()
                < 1e-12
        );
        assert_eq!(from_cm.provenance.source_unit, "cm");
    }

    #[test]
    fn test_predict_json() {
        let json = demo_predictor()
            .predict_json(&sample_measurements_json())
            .unwrap();
        let payload: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(payload["provenance"]["subject_id"], "subject-1");
    }

    #[test]
    fn test_predict_ndjson() {
        let line = serde_json::to_string(&sample_record().to_map()).unwrap();
        let ndjson = format!("{}\n{}\n", line, sample_measurements_json());

        let outputs = demo_predictor().predict_ndjson(&ndjson).unwrap();
        assert_eq!(outputs.len(), 2);
        assert!(outputs.iter().all(|o| !o.contains('\n')));
    }

    #[test]
    fn test_strict_mode_rejects_zero() {
        let config = RatioLensConfig {
            strict_zero_check: true,
            ..RatioLensConfig::default()
        };
        let predictor = Predictor::new(demo_engine(), config);

        let mut map = sample_record().to_map();
        map.insert("hipbreadth".to_string(), 0.0);
        let err = predictor
            .predict_json(&serde_json::to_string(&map).unwrap())
            .unwrap_err();
        assert!(matches!(err, PredictError::MissingMeasurement(ref k) if k == "hipbreadth"));
    }

    #[test]
    fn test_invalid_json() {
        let err = demo_predictor().predict_json("not json").unwrap_err();
        assert!(matches!(err, PredictError::ParseError(_)));
    }

    #[test]
    fn test_from_config_missing_model() {
        let config = RatioLensConfig {
            model_path: PathBuf::from("/nonexistent/model.json"),
            ..RatioLensConfig::default()
        };
        let err = Predictor::from_config(config).err().unwrap();
        assert_eq!(err.code(), "ARTIFACT_LOAD_FAILURE");
    }

    #[test]
    fn test_from_config_demo_model() {
        let config = RatioLensConfig {
            model_path: PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/models/demo_gbt.json")),
            ..RatioLensConfig::default()
        };
        let predictor = Predictor::from_config(config).unwrap();
        assert_eq!(predictor.engine().summary().trees, 3);
    }

    #[test]
    fn test_derive_features_default_unit() {
        let cm = sample_record().map_values(|v| v / 10.0);
        let input = MeasurementInput {
            unit: None,
            ..MeasurementInput::new(&cm, LengthUnit::Cm)
        };

        let (normalized, features) = derive_features(&input, LengthUnit::Cm, false).unwrap();
        assert_eq!(normalized.source_unit, LengthUnit::Cm);
        assert!((features.get(Feature::Stature) - 1700.0).abs() < 1e-9);
    }
}
