//! Error types for ratio-lens

use thiserror::Error;

/// Errors that can occur while deriving, scoring or encoding a prediction
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("Missing measurement: {0}")]
    MissingMeasurement(String),

    #[error("Unknown measurement: {0}")]
    UnknownMeasurement(String),

    #[error("Invalid feature vector: {0}")]
    InvalidFeatureVector(String),

    #[error("Failed to load model artifact {path}: {reason}")]
    ArtifactLoadFailure { path: String, reason: String },

    #[error("Invalid model artifact: {0}")]
    InvalidArtifact(String),

    #[error("Failed to parse input: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid unit: {0}")]
    InvalidUnit(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PredictError {
    /// Stable machine-readable code, used by the CLI and FFI error reports
    pub fn code(&self) -> &'static str {
        match self {
            PredictError::MissingMeasurement(_) => "MISSING_MEASUREMENT",
            PredictError::UnknownMeasurement(_) => "UNKNOWN_MEASUREMENT",
            PredictError::InvalidFeatureVector(_) => "INVALID_FEATURE_VECTOR",
            PredictError::ArtifactLoadFailure { .. } => "ARTIFACT_LOAD_FAILURE",
            PredictError::InvalidArtifact(_) => "INVALID_ARTIFACT",
            PredictError::ParseError(_) => "PARSE_ERROR",
            PredictError::JsonError(_) => "JSON_ERROR",
            PredictError::InvalidUnit(_) => "INVALID_UNIT",
            PredictError::ConfigError(_) => "CONFIG_ERROR",
            PredictError::EncodingError(_) => "ENCODING_ERROR",
            PredictError::Io(_) => "IO_ERROR",
        }
    }
}
