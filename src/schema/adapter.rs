//! Parsing of measurement documents
//!
//! Accepts a single object, a JSON array or NDJSON. Each object is either a
//! `MeasurementInput` envelope or a bare `{ "stature": ..., ... }` map.

use serde::Deserialize;
use std::collections::BTreeMap;

use super::measurement::{MeasurementInput, ValidationError, SCHEMA_VERSION};
use crate::error::PredictError;

#[derive(Deserialize)]
#[serde(untagged)]
enum InputDocument {
    Envelope(MeasurementInput),
    Flat(BTreeMap<String, f64>),
}

impl From<InputDocument> for MeasurementInput {
    fn from(doc: InputDocument) -> Self {
        match doc {
            InputDocument::Envelope(input) => input,
            InputDocument::Flat(measurements) => MeasurementInput {
                schema_version: SCHEMA_VERSION.to_string(),
                subject_id: None,
                unit: None,
                measurements,
            },
        }
    }
}

/// Adapter for reading measurement inputs
pub struct MeasurementInputAdapter;

impl MeasurementInputAdapter {
    /// Parse a single JSON object
    pub fn parse_one(json: &str) -> Result<MeasurementInput, PredictError> {
        let doc: InputDocument = serde_json::from_str(json.trim()).map_err(|e| {
            PredictError::ParseError(format!("not a measurement record: {}", e))
        })?;
        Ok(doc.into())
    }

    /// Parse a JSON string containing an array of inputs
    pub fn parse_array(json: &str) -> Result<Vec<MeasurementInput>, PredictError> {
        let docs: Vec<InputDocument> = serde_json::from_str(json).map_err(|e| {
            PredictError::ParseError(format!("not an array of measurement records: {}", e))
        })?;
        Ok(docs.into_iter().map(MeasurementInput::from).collect())
    }

    /// Parse NDJSON (newline-delimited JSON) containing inputs
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<MeasurementInput>, PredictError> {
        let mut inputs = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<InputDocument>(trimmed) {
                Ok(doc) => inputs.push(doc.into()),
                Err(e) => {
                    return Err(PredictError::ParseError(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(inputs)
    }

    /// Validate every input, returning only the failures
    pub fn validate_inputs(inputs: &[MeasurementInput], strict: bool) -> Vec<ValidationResult> {
        inputs
            .iter()
            .enumerate()
            .filter_map(|(idx, input)| {
                input.validate(strict).err().map(|error| ValidationResult {
                    index: idx,
                    subject_id: input.subject_id.clone(),
                    error,
                })
            })
            .collect()
    }
}

/// A failed input validation
#[derive(Debug)]
pub struct ValidationResult {
    pub index: usize,
    pub subject_id: Option<String>,
    pub error: ValidationError,
}
