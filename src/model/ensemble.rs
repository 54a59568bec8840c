//! Tree ensemble scoring
//!
//! Two aggregation schemes share the same tree storage and attribution code:
//!
//! ```text
//! gradient boosted: margin = logit(base_score) + Σ tree(x)     P(male) = sigmoid(margin)
//! random forest:    margin = (1/n) Σ tree(x)                   P(male) = clamp(margin, 0, 1)
//! ```

use serde::{Deserialize, Serialize};

use super::tree::{DumpNode, Tree};
use super::treeshap;
use super::{ModelSummary, Scorer};
use crate::error::PredictError;
use crate::types::{Attribution, FEATURE_COUNT};

/// How per-tree outputs are combined into a margin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnsembleKind {
    /// Summed log-odds with a logistic link
    GradientBoosted,
    /// Averaged class-1 probabilities with an identity link
    RandomForest,
}

impl EnsembleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnsembleKind::GradientBoosted => "gradient_boosted",
            EnsembleKind::RandomForest => "random_forest",
        }
    }
}

/// An immutable tree ensemble
#[derive(Debug, Clone)]
pub struct TreeEnsemble {
    kind: EnsembleKind,
    trees: Vec<Tree>,
    base_margin: f64,
}

impl TreeEnsemble {
    /// Gradient-boosted ensemble. `base_score` is a probability, as XGBoost
    /// stores it for `binary:logistic`.
    pub fn gradient_boosted(trees: Vec<Tree>, base_score: f64) -> Result<Self, PredictError> {
        if !(base_score > 0.0 && base_score < 1.0) {
            return Err(PredictError::InvalidArtifact(format!(
                "base_score must lie in (0, 1), got {}",
                base_score
            )));
        }
        Self::build(EnsembleKind::GradientBoosted, trees, logit(base_score))
    }

    pub fn random_forest(trees: Vec<Tree>) -> Result<Self, PredictError> {
        Self::build(EnsembleKind::RandomForest, trees, 0.0)
    }

    /// Flatten dumped trees and build an ensemble of `kind`
    pub fn from_dumps(
        kind: EnsembleKind,
        dumps: &[DumpNode],
        base_score: f64,
    ) -> Result<Self, PredictError> {
        let trees = dumps
            .iter()
            .enumerate()
            .map(|(i, dump)| {
                Tree::from_dump(dump).map_err(|e| {
                    PredictError::InvalidArtifact(format!("tree {}: {}", i, e))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        match kind {
            EnsembleKind::GradientBoosted => Self::gradient_boosted(trees, base_score),
            EnsembleKind::RandomForest => Self::random_forest(trees),
        }
    }

    fn build(kind: EnsembleKind, trees: Vec<Tree>, base_margin: f64) -> Result<Self, PredictError> {
        if trees.is_empty() {
            return Err(PredictError::InvalidArtifact(
                "ensemble has no trees".to_string(),
            ));
        }
        Ok(Self {
            kind,
            trees,
            base_margin,
        })
    }

    pub fn kind(&self) -> EnsembleKind {
        self.kind
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    /// Weight applied to every tree output
    fn tree_scale(&self) -> f64 {
        match self.kind {
            EnsembleKind::GradientBoosted => 1.0,
            EnsembleKind::RandomForest => 1.0 / self.trees.len() as f64,
        }
    }

    /// Expected margin over the training distribution
    pub fn expected_margin(&self) -> f64 {
        let scale = self.tree_scale();
        self.base_margin + self.trees.iter().map(|t| t.expected_value() * scale).sum::<f64>()
    }
}

impl Scorer for TreeEnsemble {
    fn margin(&self, features: &[f64; FEATURE_COUNT]) -> f64 {
        let scale = self.tree_scale();
        self.base_margin + self.trees.iter().map(|t| t.predict(features) * scale).sum::<f64>()
    }

    fn predict_probability(&self, features: &[f64; FEATURE_COUNT]) -> f64 {
        let margin = self.margin(features);
        match self.kind {
            EnsembleKind::GradientBoosted => sigmoid(margin),
            EnsembleKind::RandomForest => margin.clamp(0.0, 1.0),
        }
    }

    fn attribute(&self, features: &[f64; FEATURE_COUNT]) -> Attribution {
        let scale = self.tree_scale();
        let mut contributions = [0.0; FEATURE_COUNT];
        for tree in &self.trees {
            treeshap::accumulate(tree, features, scale, &mut contributions);
        }

        Attribution {
            baseline: self.expected_margin(),
            contributions,
        }
    }

    fn summary(&self) -> ModelSummary {
        ModelSummary {
            kind: self.kind.as_str().to_string(),
            trees: self.trees.len(),
            max_depth: self.trees.iter().map(Tree::depth).max().unwrap_or(0),
            leaves: self.trees.iter().map(Tree::leaf_count).sum(),
            baseline: self.expected_margin(),
        }
    }
}

pub(crate) fn sigmoid(margin: f64) -> f64 {
    1.0 / (1.0 + (-margin).exp())
}

fn logit(p: f64) -> f64 {
    (p / (1.0 - p)).ln()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelArtifact;
    use crate::testing::{demo_artifact, demo_features};
    use crate::types::Feature;

    fn demo_ensemble() -> TreeEnsemble {
        match ModelArtifact::from_json(demo_artifact()).unwrap() {
            ModelArtifact::GradientBoosted {
                base_score, trees, ..
            } => TreeEnsemble::from_dumps(EnsembleKind::GradientBoosted, &trees, base_score)
                .unwrap(),
            other => panic!("unexpected artifact {:?}", other),
        }
    }

    #[test]
    fn test_margin_sums_tree_outputs() {
        let model = demo_ensemble();
        let x = demo_features();

        // BBHB >= 1.18, WHR < 0.83 -> 0.12; CS >= 0.54 -> 0.27; stature >= 1700 -> 0.3
        assert!((model.margin(x.as_array()) - 0.69).abs() < 1e-12);
        assert!((model.predict_probability(x.as_array()) - sigmoid(0.69)).abs() < 1e-12);
    }

    #[test]
    fn test_attribution_is_additive() {
        let model = demo_ensemble();
        let x = demo_features();
        let attribution = model.attribute(x.as_array());

        let margin = model.margin(x.as_array());
        assert!((attribution.reconstructed_margin() - margin).abs() < 1e-9);
    }

    #[test]
    fn test_sign_follows_male_direction() {
        let model = demo_ensemble();
        let x = demo_features();
        let attribution = model.attribute(x.as_array());

        // Broad shoulders relative to hips push toward male in every tree
        assert!(attribution.contribution(Feature::Bbhb) > 0.0);
        // Low waist-to-buttock ratio lands in the smaller leaf of tree 0
        assert!(attribution.contribution(Feature::Whr) < 0.0);
    }

    #[test]
    fn test_random_forest_averages() {
        let leaf = |v: f64| {
            Tree::new(vec![super::super::tree::Node::Leaf { value: v, cover: 1.0 }]).unwrap()
        };
        let model = TreeEnsemble::random_forest(vec![leaf(0.2), leaf(0.6)]).unwrap();
        let x = [0.0; FEATURE_COUNT];

        assert!((model.margin(&x) - 0.4).abs() < 1e-12);
        assert!((model.predict_probability(&x) - 0.4).abs() < 1e-12);
        assert!((model.attribute(&x).baseline - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_degenerate_base_score() {
        let result = TreeEnsemble::gradient_boosted(demo_ensemble().trees().to_vec(), 1.0);
        assert!(matches!(result, Err(PredictError::InvalidArtifact(_))));
    }

    #[test]
    fn test_summary() {
        let summary = demo_ensemble().summary();
        assert_eq!(summary.kind, "gradient_boosted");
        assert_eq!(summary.trees, 3);
        assert_eq!(summary.max_depth, 3);
        assert_eq!(summary.leaves, 11);
    }
}
