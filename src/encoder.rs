//! Prediction payload encoding
//!
//! Wraps a scored prediction with producer, provenance and quality metadata
//! and serialises it to JSON.

use crate::error::PredictError;
use crate::explain::Explanation;
use crate::model::ModelSummary;
use crate::types::{
    FeatureVector, NormalizedMeasurements, PredictionPayload, PredictionSummary, Producer,
    Provenance, Quality, Scored,
};
use crate::{PRODUCER_NAME, RATIO_LENS_VERSION};
use chrono::Utc;
use uuid::Uuid;

/// Schema version of the prediction payload
pub const PAYLOAD_VERSION: &str = "ratio_lens.prediction.v1";

/// Everything the encoder needs for one subject
pub struct PredictionContext<'a> {
    pub subject_id: Option<&'a str>,
    pub normalized: &'a NormalizedMeasurements,
    pub features: &'a FeatureVector,
    pub scored: &'a Scored,
    pub model: &'a ModelSummary,
}

/// Encoder for prediction payloads
pub struct PredictionEncoder {
    instance_id: String,
}

impl Default for PredictionEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl PredictionEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn encode(&self, ctx: &PredictionContext<'_>) -> PredictionPayload {
        let producer = Producer {
            name: PRODUCER_NAME.to_string(),
            version: RATIO_LENS_VERSION.to_string(),
            instance_id: self.instance_id.clone(),
        };

        let provenance = Provenance {
            subject_id: ctx.subject_id.map(str::to_string),
            source_unit: ctx.normalized.source_unit.as_str().to_string(),
            model_kind: ctx.model.kind.clone(),
            model_trees: ctx.model.trees,
            computed_at_utc: Utc::now().to_rfc3339(),
        };

        let quality = Quality {
            flags: ctx
                .normalized
                .quality_flags
                .iter()
                .map(|f| f.label())
                .collect(),
            additivity_gap: ctx.scored.additivity_gap,
        };

        let explanation = Explanation::from_scored(ctx.features, ctx.scored);

        PredictionPayload {
            schema_version: PAYLOAD_VERSION.to_string(),
            producer,
            provenance,
            quality,
            features: *ctx.features,
            prediction: PredictionSummary {
                probability_female: ctx.scored.probability_female,
                probability_male: ctx.scored.probability_male,
                passing_percent: explanation.passing_percent,
                margin: ctx.scored.margin,
            },
            attribution: ctx.scored.attribution,
            explanation: explanation.influences,
        }
    }

    /// Encode to JSON string
    pub fn encode_to_json(&self, ctx: &PredictionContext<'_>) -> Result<String, PredictError> {
        let payload = self.encode(ctx);
        serde_json::to_string_pretty(&payload)
            .map_err(|e| PredictError::EncodingError(e.to_string()))
    }
}
