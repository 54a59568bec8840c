//! ratio-lens - Sex prediction from anthropometric ratios with exact attributions
//!
//! Twelve body measurements go through a deterministic pipeline: schema
//! validation → unit normalization → ratio derivation → tree-ensemble scoring
//! → TreeSHAP attribution → JSON encoding.
//!
//! ## Modules
//!
//! - **Features**: ten fixed ratios plus stature, with zero substitution
//! - **Model**: gradient-boosted, random-forest and linear scorers behind one trait
//! - **Engine**: probability of the female class and an additive per-feature attribution

pub mod config;
pub mod encoder;
pub mod engine;
pub mod error;
pub mod explain;
pub mod features;
pub mod model;
pub mod normalizer;
pub mod pipeline;
pub mod schema;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

#[cfg(test)]
mod testing;

pub use config::RatioLensConfig;
pub use encoder::{PredictionEncoder, PAYLOAD_VERSION};
pub use engine::ScoringEngine;
pub use error::PredictError;
pub use explain::Explanation;
pub use features::FeatureDeriver;
pub use model::{load_artifact, ModelArtifact, Scorer};
pub use pipeline::{predict, Prediction, Predictor};

// Schema exports
pub use schema::{MeasurementInput, MeasurementInputAdapter, SCHEMA_VERSION};

/// Library version embedded in every prediction payload
pub const RATIO_LENS_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for prediction payloads
pub const PRODUCER_NAME: &str = "ratio-lens";
