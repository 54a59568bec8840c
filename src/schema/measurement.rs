//! Measurement input records

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::PredictError;
use crate::types::{LengthUnit, MeasurementKey, MeasurementRecord};

/// Schema version for measurement input
pub const SCHEMA_VERSION: &str = "ratio_lens.measurements.v1";

fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

/// One subject's raw measurements as supplied by a caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementInput {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,

    /// Caller-chosen identifier, echoed in the prediction provenance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,

    /// Unit of every value; falls back to the configured input unit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<LengthUnit>,

    pub measurements: BTreeMap<String, f64>,
}

impl MeasurementInput {
    pub fn new(record: &MeasurementRecord, unit: LengthUnit) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            subject_id: None,
            unit: Some(unit),
            measurements: record.to_map(),
        }
    }

    pub fn with_subject_id(mut self, subject_id: impl Into<String>) -> Self {
        self.subject_id = Some(subject_id.into());
        self
    }

    /// Validate the record.
    ///
    /// With `strict` set, a value of exactly 0 counts as not provided, the way
    /// the data-entry form treats untouched fields.
    pub fn validate(&self, strict: bool) -> Result<(), ValidationError> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(ValidationError::InvalidSchemaVersion {
                expected: SCHEMA_VERSION.to_string(),
                actual: self.schema_version.clone(),
            });
        }

        let unknown: Vec<String> = self
            .measurements
            .keys()
            .filter(|name| MeasurementKey::parse(name).is_none())
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(ValidationError::UnknownMeasurements(unknown));
        }

        let missing: Vec<String> = MeasurementKey::ALL
            .iter()
            .filter(|key| !self.measurements.contains_key(key.as_str()))
            .map(|key| key.as_str().to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ValidationError::MissingMeasurements(missing));
        }

        if strict {
            let zeros: Vec<String> = MeasurementKey::ALL
                .iter()
                .filter(|key| self.measurements.get(key.as_str()) == Some(&0.0))
                .map(|key| key.as_str().to_string())
                .collect();
            if !zeros.is_empty() {
                return Err(ValidationError::ZeroMeasurements(zeros));
            }
        }

        Ok(())
    }

    /// Validate and convert to a record in the input's own unit
    pub fn to_record(&self, strict: bool) -> Result<MeasurementRecord, PredictError> {
        self.validate(strict)?;
        MeasurementRecord::from_map(&self.measurements)
    }
}

/// Validation errors for measurement input
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid schema version: expected {expected}, got {actual}")]
    InvalidSchemaVersion { expected: String, actual: String },

    #[error("Missing measurements: {}", .0.join(", "))]
    MissingMeasurements(Vec<String>),

    #[error("Unknown measurements: {}", .0.join(", "))]
    UnknownMeasurements(Vec<String>),

    #[error("Measurements not provided (value is 0): {}", .0.join(", "))]
    ZeroMeasurements(Vec<String>),
}

impl From<ValidationError> for PredictError {
    fn from(e: ValidationError) -> Self {
        match e {
            ValidationError::MissingMeasurements(keys) | ValidationError::ZeroMeasurements(keys) => {
                PredictError::MissingMeasurement(keys.join(", "))
            }
            ValidationError::UnknownMeasurements(keys) => {
                PredictError::UnknownMeasurement(keys.join(", "))
            }
            other @ ValidationError::InvalidSchemaVersion { .. } => {
                PredictError::ParseError(other.to_string())
            }
        }
    }
}
