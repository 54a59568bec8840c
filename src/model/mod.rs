//! Trained classifier capability and artifact loading
//!
//! The scoring engine only sees the [`Scorer`] trait. Concrete scorers:
//!
//! - [`TreeEnsemble`]: gradient-boosted or random-forest trees, attributed with
//!   exact TreeSHAP
//! - [`LinearScorer`]: logistic regression, attributed around the training means
//!
//! Artifacts are JSON documents tagged by `kind`; see [`ModelArtifact`].

pub mod ensemble;
pub mod linear;
pub mod tree;
pub mod treeshap;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::error::PredictError;
use crate::types::{Attribution, Feature, FEATURE_COUNT};

pub use ensemble::{EnsembleKind, TreeEnsemble};
pub use linear::LinearScorer;
pub use tree::{DumpNode, Node, Tree};

/// A loaded classifier. Class 1 is male, class 0 is female.
///
/// Implementations are immutable after construction, so a single instance can
/// serve any number of threads.
pub trait Scorer: Send + Sync {
    /// Raw model output before the link function
    fn margin(&self, features: &[f64; FEATURE_COUNT]) -> f64;

    /// Probability of class 1 (male)
    fn predict_probability(&self, features: &[f64; FEATURE_COUNT]) -> f64;

    /// Additive decomposition of `margin`; positive contributions lean male
    fn attribute(&self, features: &[f64; FEATURE_COUNT]) -> Attribution;

    fn summary(&self) -> ModelSummary;
}

/// Shape of a loaded model, for diagnostics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub kind: String,
    pub trees: usize,
    pub max_depth: usize,
    pub leaves: usize,
    /// Expected margin
    pub baseline: f64,
}

fn default_base_score() -> f64 {
    0.5
}

/// On-disk model artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelArtifact {
    GradientBoosted {
        #[serde(default = "default_base_score")]
        base_score: f64,
        feature_names: Vec<String>,
        trees: Vec<DumpNode>,
    },
    RandomForest {
        feature_names: Vec<String>,
        trees: Vec<DumpNode>,
    },
    LogisticRegression {
        feature_names: Vec<String>,
        coefficients: Vec<f64>,
        intercept: f64,
        feature_means: Vec<f64>,
    },
}

impl ModelArtifact {
    pub fn from_json(json: &str) -> Result<Self, PredictError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn feature_names(&self) -> &[String] {
        match self {
            ModelArtifact::GradientBoosted { feature_names, .. }
            | ModelArtifact::RandomForest { feature_names, .. }
            | ModelArtifact::LogisticRegression { feature_names, .. } => feature_names,
        }
    }

    /// Check the column order and build the scorer
    pub fn into_scorer(self) -> Result<Arc<dyn Scorer>, PredictError> {
        check_feature_names(self.feature_names())?;

        let scorer: Arc<dyn Scorer> = match self {
            ModelArtifact::GradientBoosted {
                base_score, trees, ..
            } => Arc::new(TreeEnsemble::from_dumps(
                EnsembleKind::GradientBoosted,
                &trees,
                base_score,
            )?),
            ModelArtifact::RandomForest { trees, .. } => Arc::new(TreeEnsemble::from_dumps(
                EnsembleKind::RandomForest,
                &trees,
                default_base_score(),
            )?),
            ModelArtifact::LogisticRegression {
                coefficients,
                intercept,
                feature_means,
                ..
            } => Arc::new(LinearScorer::new(&coefficients, intercept, &feature_means)?),
        };
        Ok(scorer)
    }
}

/// The artifact's columns must match the derived feature order exactly
fn check_feature_names(names: &[String]) -> Result<(), PredictError> {
    let expected: Vec<&str> = Feature::ALL.iter().map(|f| f.name()).collect();
    if names.iter().map(String::as_str).ne(expected.iter().copied()) {
        return Err(PredictError::InvalidArtifact(format!(
            "feature_names {:?} do not match column order {:?}",
            names, expected
        )));
    }
    Ok(())
}

/// Parse an artifact from a JSON string
pub fn scorer_from_json(json: &str) -> Result<Arc<dyn Scorer>, PredictError> {
    ModelArtifact::from_json(json)?.into_scorer()
}

/// Load the artifact at `path`. Any failure is reported as
/// `ArtifactLoadFailure`; callers should treat it as fatal.
pub fn load_artifact(path: &Path) -> Result<Arc<dyn Scorer>, PredictError> {
    let failure = |reason: String| PredictError::ArtifactLoadFailure {
        path: path.display().to_string(),
        reason,
    };

    let json = fs::read_to_string(path).map_err(|e| failure(e.to_string()))?;
    let scorer = scorer_from_json(&json).map_err(|e| failure(e.to_string()))?;

    let summary = scorer.summary();
    tracing::info!(
        path = %path.display(),
        kind = %summary.kind,
        trees = summary.trees,
        max_depth = summary.max_depth,
        "loaded model artifact"
    );
    Ok(scorer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::demo_artifact;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_demo_artifact_loads() {
        let scorer = scorer_from_json(demo_artifact()).unwrap();
        let summary = scorer.summary();
        assert_eq!(summary.kind, "gradient_boosted");
        assert_eq!(summary.trees, 3);
    }

    #[test]
    fn test_rejects_reordered_columns() {
        let mut value: serde_json::Value = serde_json::from_str(demo_artifact()).unwrap();
        value["feature_names"][0] = serde_json::json!("HBS");
        value["feature_names"][1] = serde_json::json!("WHR");

        let err = scorer_from_json(&value.to_string()).err().unwrap();
        assert!(matches!(err, PredictError::InvalidArtifact(_)));
    }

    #[test]
    fn test_logistic_regression_artifact() {
        let json = serde_json::json!({
            "kind": "logistic_regression",
            "feature_names": Feature::ALL.iter().map(|f| f.name()).collect::<Vec<_>>(),
            "coefficients": [1.5, 0.0, 2.0, 0.0, 0.0, 0.0, 3.0, 0.0, 0.0, 0.0, 0.001],
            "intercept": -6.0,
            "feature_means": [0.8, 0.18, 0.53, 0.16, 0.37, 0.22, 1.2, 0.13, 0.27, 0.095, 1700.0]
        });
        let scorer = scorer_from_json(&json.to_string()).unwrap();
        assert_eq!(scorer.summary().kind, "logistic_regression");
    }

    #[test]
    fn test_missing_file_is_load_failure() {
        let err = load_artifact(Path::new("/nonexistent/model.json")).err().unwrap();
        assert!(matches!(err, PredictError::ArtifactLoadFailure { .. }));
    }

    #[test]
    fn test_corrupt_file_is_load_failure() {
        let path = std::env::temp_dir().join(format!("ratio-lens-corrupt-{}.json", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"{\"kind\": \"gradient_boosted\", \"trees\": [").unwrap();
        drop(file);

        let err = load_artifact(&path).err().unwrap();
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, PredictError::ArtifactLoadFailure { .. }));
    }
}
