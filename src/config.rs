//! Runtime configuration
//!
//! Settings come from three layers, later ones winning: built-in defaults, an
//! optional JSON file, then `RATIO_LENS_*` environment variables. The CLI
//! applies its own flags on top.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::PredictError;
use crate::types::LengthUnit;

pub const ENV_MODEL: &str = "RATIO_LENS_MODEL";
pub const ENV_INPUT_UNIT: &str = "RATIO_LENS_INPUT_UNIT";
pub const ENV_STRICT: &str = "RATIO_LENS_STRICT";
pub const ENV_LOG: &str = "RATIO_LENS_LOG";

/// Default artifact location, relative to the working directory
pub const DEFAULT_MODEL_PATH: &str = "models/demo_gbt.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatioLensConfig {
    /// Path to the model artifact JSON
    pub model_path: PathBuf,
    /// Unit assumed for inputs that don't declare one
    pub input_unit: LengthUnit,
    /// Treat a measurement of exactly 0 as not provided
    pub strict_zero_check: bool,
    /// `tracing` filter directive, e.g. `info` or `ratio_lens=debug`
    pub log_filter: String,
}

impl Default for RatioLensConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            input_unit: LengthUnit::Mm,
            strict_zero_check: false,
            log_filter: "info".to_string(),
        }
    }
}

impl RatioLensConfig {
    pub fn from_json(json: &str) -> Result<Self, PredictError> {
        serde_json::from_str(json).map_err(|e| PredictError::ConfigError(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, PredictError> {
        serde_json::to_string_pretty(self).map_err(|e| PredictError::EncodingError(e.to_string()))
    }

    /// Read a JSON config file
    pub fn from_file(path: &Path) -> Result<Self, PredictError> {
        let json = fs::read_to_string(path).map_err(|e| {
            PredictError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    /// Defaults, then `path` if given, then the process environment
    pub fn load(path: Option<&Path>) -> Result<Self, PredictError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from `lookup`, which maps an env var name to its value
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, PredictError> {
        if let Some(model) = lookup(ENV_MODEL) {
            self.model_path = PathBuf::from(model);
        }
        if let Some(unit) = lookup(ENV_INPUT_UNIT) {
            self.input_unit = LengthUnit::parse(&unit)?;
        }
        if let Some(strict) = lookup(ENV_STRICT) {
            self.strict_zero_check = parse_bool(ENV_STRICT, &strict)?;
        }
        if let Some(filter) = lookup(ENV_LOG) {
            self.log_filter = filter;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), PredictError> {
        if self.model_path.as_os_str().is_empty() {
            return Err(PredictError::ConfigError(
                "model_path must not be empty".to_string(),
            ));
        }
        if self.log_filter.trim().is_empty() {
            return Err(PredictError::ConfigError(
                "log_filter must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool, PredictError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(PredictError::ConfigError(format!(
            "{} must be a boolean, got {:?}",
            name, other
        ))),
    }
}
