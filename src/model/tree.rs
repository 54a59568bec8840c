//! Decision tree storage and traversal
//!
//! Trees are read from the XGBoost JSON dump format
//! (`dump_model(..., dump_format="json", with_stats=True)`) and flattened into
//! an arena in depth-first order, so node ids may have gaps. Thresholds are
//! kept in single precision and inputs are narrowed before comparing, which
//! is how XGBoost itself routes values. Cover statistics are required because the
//! attribution algorithm weights unseen branches by the share of training
//! samples that reached them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::PredictError;
use crate::types::{Feature, FEATURE_COUNT};

/// One node of an XGBoost JSON tree dump
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DumpNode {
    pub nodeid: usize,
    pub split: Option<String>,
    pub split_condition: Option<f64>,
    pub yes: Option<usize>,
    pub no: Option<usize>,
    pub missing: Option<usize>,
    pub leaf: Option<f64>,
    pub cover: Option<f64>,
    #[serde(default)]
    pub children: Vec<DumpNode>,
}

/// Flattened tree node
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Split {
        feature: Feature,
        /// Values strictly below the threshold go to `yes`, compared as f32
        threshold: f32,
        yes: usize,
        no: usize,
        /// Child taken for NaN input; always one of `yes` / `no`
        missing: usize,
        cover: f64,
    },
    Leaf {
        value: f64,
        cover: f64,
    },
}

impl Node {
    pub fn cover(&self) -> f64 {
        match self {
            Node::Split { cover, .. } | Node::Leaf { cover, .. } => *cover,
        }
    }
}

/// A single regression tree, root at index 0
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    /// Build a tree from flattened nodes, checking that every reachable index
    /// is in range and visited exactly once.
    pub fn new(nodes: Vec<Node>) -> Result<Self, PredictError> {
        if nodes.is_empty() {
            return Err(PredictError::InvalidArtifact("tree has no nodes".to_string()));
        }

        let mut visited = vec![false; nodes.len()];
        let mut stack = vec![0usize];
        while let Some(idx) = stack.pop() {
            let node = nodes.get(idx).ok_or_else(|| {
                PredictError::InvalidArtifact(format!("child index {} out of range", idx))
            })?;
            if visited[idx] {
                return Err(PredictError::InvalidArtifact(format!(
                    "node {} is reachable twice",
                    idx
                )));
            }
            visited[idx] = true;

            if !(node.cover() > 0.0) {
                return Err(PredictError::InvalidArtifact(format!(
                    "node {} has non-positive cover",
                    idx
                )));
            }

            if let Node::Split {
                yes, no, missing, ..
            } = node
            {
                if *missing != *yes && *missing != *no {
                    return Err(PredictError::InvalidArtifact(format!(
                        "node {} routes missing values to a third child",
                        idx
                    )));
                }
                stack.push(*yes);
                stack.push(*no);
            }
        }

        Ok(Self { nodes })
    }

    /// Flatten an XGBoost dump tree
    pub fn from_dump(root: &DumpNode) -> Result<Self, PredictError> {
        let mut order = Vec::new();
        let mut index_of: HashMap<usize, usize> = HashMap::new();
        collect_nodes(root, &mut order, &mut index_of)?;

        let nodes = order
            .iter()
            .map(|dump| convert_node(dump, &index_of))
            .collect::<Result<Vec<_>, _>>()?;

        Tree::new(nodes)
    }

    pub fn node(&self, idx: usize) -> &Node {
        &self.nodes[idx]
    }

    pub fn cover(&self, idx: usize) -> f64 {
        self.nodes[idx].cover()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }

    /// Number of split levels on the longest root-to-leaf path
    pub fn depth(&self) -> usize {
        self.depth_from(0)
    }

    fn depth_from(&self, idx: usize) -> usize {
        match &self.nodes[idx] {
            Node::Leaf { .. } => 0,
            Node::Split { yes, no, .. } => 1 + self.depth_from(*yes).max(self.depth_from(*no)),
        }
    }

    /// Child of a split node that `features` follows
    pub fn next_child(&self, idx: usize, features: &[f64; FEATURE_COUNT]) -> usize {
        match &self.nodes[idx] {
            Node::Split {
                feature,
                threshold,
                yes,
                no,
                missing,
                ..
            } => {
                let x = features[feature.index()];
                if x.is_nan() {
                    *missing
                } else if (x as f32) < *threshold {
                    *yes
                } else {
                    *no
                }
            }
            Node::Leaf { .. } => idx,
        }
    }

    /// Leaf value reached by `features`
    pub fn predict(&self, features: &[f64; FEATURE_COUNT]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value, .. } => return *value,
                Node::Split { .. } => idx = self.next_child(idx, features),
            }
        }
    }

    /// Cover-weighted mean of the leaf values
    pub fn expected_value(&self) -> f64 {
        self.expected_from(0)
    }

    fn expected_from(&self, idx: usize) -> f64 {
        match &self.nodes[idx] {
            Node::Leaf { value, .. } => *value,
            Node::Split { yes, no, cover, .. } => {
                (self.cover(*yes) * self.expected_from(*yes) + self.cover(*no) * self.expected_from(*no))
                    / cover
            }
        }
    }
}

fn collect_nodes<'a>(
    node: &'a DumpNode,
    order: &mut Vec<&'a DumpNode>,
    index_of: &mut HashMap<usize, usize>,
) -> Result<(), PredictError> {
    if index_of.insert(node.nodeid, order.len()).is_some() {
        return Err(PredictError::InvalidArtifact(format!(
            "duplicate node id {}",
            node.nodeid
        )));
    }
    order.push(node);
    for child in &node.children {
        collect_nodes(child, order, index_of)?;
    }
    Ok(())
}

fn convert_node(dump: &DumpNode, index_of: &HashMap<usize, usize>) -> Result<Node, PredictError> {
    let cover = dump.cover.ok_or_else(|| {
        PredictError::InvalidArtifact(format!(
            "node {} has no cover; dump the model with_stats=True",
            dump.nodeid
        ))
    })?;

    if let Some(value) = dump.leaf {
        return Ok(Node::Leaf { value, cover });
    }

    let missing_field = |field: &str| {
        PredictError::InvalidArtifact(format!("split node {} has no {}", dump.nodeid, field))
    };

    let split = dump.split.as_deref().ok_or_else(|| missing_field("split"))?;
    let feature = Feature::parse(split).ok_or_else(|| {
        PredictError::InvalidArtifact(format!(
            "node {} splits on unknown feature {}",
            dump.nodeid, split
        ))
    })?;
    let threshold = dump
        .split_condition
        .ok_or_else(|| missing_field("split_condition"))? as f32;

    let child = |id: usize| {
        index_of.get(&id).copied().ok_or_else(|| {
            PredictError::InvalidArtifact(format!(
                "node {} refers to unknown node {}",
                dump.nodeid, id
            ))
        })
    };
    let yes_id = dump.yes.ok_or_else(|| missing_field("yes"))?;
    let yes = child(yes_id)?;
    let no = child(dump.no.ok_or_else(|| missing_field("no"))?)?;
    let missing = child(dump.missing.unwrap_or(yes_id))?;

    Ok(Node::Split {
        feature,
        threshold,
        yes,
        no,
        missing,
        cover,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stump() -> Tree {
        Tree::new(vec![
            Node::Split {
                feature: Feature::Whr,
                threshold: 0.8,
                yes: 1,
                no: 2,
                missing: 2,
                cover: 10.0,
            },
            Node::Leaf {
                value: -1.0,
                cover: 4.0,
            },
            Node::Leaf {
                value: 2.0,
                cover: 6.0,
            },
        ])
        .unwrap()
    }

    #[test]
    fn test_predict_threshold_is_strict() {
        let tree = stump();
        let mut x = [0.0; FEATURE_COUNT];

        x[0] = 0.79;
        assert_eq!(tree.predict(&x), -1.0);
        x[0] = 0.8;
        assert_eq!(tree.predict(&x), 2.0);
        x[0] = f64::NAN;
        assert_eq!(tree.predict(&x), 2.0);
    }

    #[test]
    fn test_threshold_compared_in_single_precision() {
        let dump: DumpNode = serde_json::from_str(
            r#"{"nodeid": 0, "split": "WHR", "split_condition": 0.1, "yes": 1, "no": 2,
                "missing": 1, "cover": 2.0,
                "children": [{"nodeid": 1, "leaf": -1.0, "cover": 1.0},
                             {"nodeid": 2, "leaf": 1.0, "cover": 1.0}]}"#,
        )
        .unwrap();
        let tree = Tree::from_dump(&dump).unwrap();
        let mut x = [0.0; FEATURE_COUNT];

        // Rounds to 0.1f32, so it is not below the threshold
        x[0] = 0.1 - 1e-12;
        assert_eq!(tree.predict(&x), 1.0);
        x[0] = 0.0999;
        assert_eq!(tree.predict(&x), -1.0);
    }

    #[test]
    fn test_from_dump_accepts_gaps_in_node_ids() {
        let dump: DumpNode = serde_json::from_str(
            r#"{"nodeid": 0, "split": "CS", "split_condition": 0.5, "yes": 3, "no": 8,
                "missing": 8, "cover": 10.0,
                "children": [
                    {"nodeid": 3, "leaf": -0.5, "cover": 4.0},
                    {"nodeid": 8, "split": "stature", "split_condition": 1650.0,
                     "yes": 11, "no": 12, "missing": 12, "cover": 6.0,
                     "children": [{"nodeid": 11, "leaf": 0.2, "cover": 2.0},
                                  {"nodeid": 12, "leaf": 0.7, "cover": 4.0}]}]}"#,
        )
        .unwrap();
        let tree = Tree::from_dump(&dump).unwrap();
        assert_eq!(tree.len(), 5);
        assert_eq!(tree.depth(), 2);

        let mut x = [0.0; FEATURE_COUNT];
        x[Feature::Cs.index()] = 0.3;
        assert_eq!(tree.predict(&x), -0.5);
        x[Feature::Cs.index()] = 0.6;
        x[Feature::Stature.index()] = 1700.0;
        assert_eq!(tree.predict(&x), 0.7);
        x[Feature::Stature.index()] = f64::NAN;
        assert_eq!(tree.predict(&x), 0.7);
    }

    #[test]
    fn test_from_dump_rejects_dangling_child() {
        let dump: DumpNode = serde_json::from_str(
            r#"{"nodeid": 0, "split": "CS", "split_condition": 0.5, "yes": 1, "no": 5,
                "cover": 2.0,
                "children": [{"nodeid": 1, "leaf": 0.1, "cover": 1.0},
                             {"nodeid": 2, "leaf": 0.2, "cover": 1.0}]}"#,
        )
        .unwrap();
        let err = Tree::from_dump(&dump).unwrap_err();
        assert!(err.to_string().contains("unknown node 5"));
    }

    #[test]
    fn test_expected_value_is_cover_weighted() {
        // (4 * -1 + 6 * 2) / 10
        assert!((stump().expected_value() - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_out_of_range_child() {
        let result = Tree::new(vec![Node::Split {
            feature: Feature::Cs,
            threshold: 0.5,
            yes: 1,
            no: 7,
            missing: 1,
            cover: 1.0,
        }]);
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_cycle() {
        let result = Tree::new(vec![
            Node::Split {
                feature: Feature::Cs,
                threshold: 0.5,
                yes: 1,
                no: 0,
                missing: 1,
                cover: 1.0,
            },
            Node::Leaf {
                value: 0.0,
                cover: 1.0,
            },
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_from_dump_requires_cover() {
        let dump: DumpNode = serde_json::from_str(
            r#"{"nodeid": 0, "split": "f2", "split_condition": 0.5, "yes": 1, "no": 2,
                "children": [{"nodeid": 1, "leaf": 0.1}, {"nodeid": 2, "leaf": 0.2}]}"#,
        )
        .unwrap();
        let err = Tree::from_dump(&dump).unwrap_err();
        assert!(err.to_string().contains("cover"));
    }

    #[test]
    fn test_from_dump_positional_feature_names() {
        let dump: DumpNode = serde_json::from_str(
            r#"{"nodeid": 0, "split": "f6", "split_condition": 1.2, "yes": 1, "no": 2, "missing": 1,
                "cover": 5.0,
                "children": [{"nodeid": 1, "leaf": -0.3, "cover": 2.0},
                             {"nodeid": 2, "leaf": 0.4, "cover": 3.0}]}"#,
        )
        .unwrap();
        let tree = Tree::from_dump(&dump).unwrap();

        assert_eq!(tree.len(), 3);
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.leaf_count(), 2);
        match tree.node(0) {
            Node::Split { feature, .. } => assert_eq!(*feature, Feature::Bbhb),
            other => panic!("expected split, got {:?}", other),
        }
    }
}
