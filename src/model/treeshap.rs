//! Exact path-dependent TreeSHAP
//!
//! Computes Shapley values for a single tree in O(leaves * depth^2) by walking
//! every root-to-leaf path once while tracking, for each distinct feature on
//! the path, the fraction of "absent" samples (cover share) and "present"
//! samples (1 if the input follows the branch, else 0), together with the
//! permutation weights of every subset size.
//!
//! Reference: Lundberg, Erion & Lee, "Consistent Individualized Feature
//! Attribution for Tree Ensembles", Algorithm 2.

use super::tree::{Node, Tree};
use crate::types::FEATURE_COUNT;

#[derive(Debug, Clone, Copy, Default)]
struct PathElement {
    /// `None` for the synthetic root element
    feature: Option<usize>,
    zero_fraction: f64,
    one_fraction: f64,
    weight: f64,
}

/// Add `scale` times the tree's Shapley values for `features` into `phi`.
///
/// The sum of the added values equals
/// `scale * (tree.predict(features) - tree.expected_value())`.
pub fn accumulate(
    tree: &Tree,
    features: &[f64; FEATURE_COUNT],
    scale: f64,
    phi: &mut [f64; FEATURE_COUNT],
) {
    let mut walker = Walker {
        tree,
        features,
        scale,
        phi,
    };
    walker.recurse(0, &[], 0, 1.0, 1.0, None);
}

struct Walker<'a> {
    tree: &'a Tree,
    features: &'a [f64; FEATURE_COUNT],
    scale: f64,
    phi: &'a mut [f64; FEATURE_COUNT],
}

impl Walker<'_> {
    fn recurse(
        &mut self,
        node: usize,
        parent_path: &[PathElement],
        unique_depth: usize,
        zero_fraction: f64,
        one_fraction: f64,
        feature: Option<usize>,
    ) {
        let mut path = Vec::with_capacity(unique_depth + 1);
        path.extend_from_slice(&parent_path[..unique_depth]);
        path.push(PathElement::default());
        extend(&mut path, unique_depth, zero_fraction, one_fraction, feature);

        let tree = self.tree;
        match tree.node(node) {
            Node::Leaf { value, .. } => {
                for i in 1..=unique_depth {
                    let w = unwound_sum(&path, unique_depth, i);
                    let el = path[i];
                    if let Some(f) = el.feature {
                        self.phi[f] += w * (el.one_fraction - el.zero_fraction) * value * self.scale;
                    }
                }
            }
            Node::Split {
                feature: split,
                yes,
                no,
                cover,
                ..
            } => {
                let split_index = split.index();
                let hot = tree.next_child(node, self.features);
                let cold = if hot == *yes { *no } else { *yes };
                let hot_zero_fraction = tree.cover(hot) / cover;
                let cold_zero_fraction = tree.cover(cold) / cover;

                let mut depth = unique_depth;
                let mut incoming_zero = 1.0;
                let mut incoming_one = 1.0;

                // A feature seen earlier on the path is merged rather than
                // counted twice.
                if let Some(k) = (1..=depth).find(|&k| path[k].feature == Some(split_index)) {
                    incoming_zero = path[k].zero_fraction;
                    incoming_one = path[k].one_fraction;
                    unwind(&mut path, depth, k);
                    depth -= 1;
                }

                self.recurse(
                    hot,
                    &path,
                    depth + 1,
                    hot_zero_fraction * incoming_zero,
                    incoming_one,
                    Some(split_index),
                );
                self.recurse(
                    cold,
                    &path,
                    depth + 1,
                    cold_zero_fraction * incoming_zero,
                    0.0,
                    Some(split_index),
                );
            }
        }
    }
}

fn extend(
    path: &mut [PathElement],
    unique_depth: usize,
    zero_fraction: f64,
    one_fraction: f64,
    feature: Option<usize>,
) {
    path[unique_depth] = PathElement {
        feature,
        zero_fraction,
        one_fraction,
        weight: if unique_depth == 0 { 1.0 } else { 0.0 },
    };

    let denom = (unique_depth + 1) as f64;
    for i in (0..unique_depth).rev() {
        path[i + 1].weight += one_fraction * path[i].weight * (i + 1) as f64 / denom;
        path[i].weight = zero_fraction * path[i].weight * (unique_depth - i) as f64 / denom;
    }
}

fn unwind(path: &mut [PathElement], unique_depth: usize, path_index: usize) {
    let one_fraction = path[path_index].one_fraction;
    let zero_fraction = path[path_index].zero_fraction;
    let denom = (unique_depth + 1) as f64;
    let mut next_one_portion = path[unique_depth].weight;

    for i in (0..unique_depth).rev() {
        if one_fraction != 0.0 {
            let previous = path[i].weight;
            path[i].weight = next_one_portion * denom / ((i + 1) as f64 * one_fraction);
            next_one_portion =
                previous - path[i].weight * zero_fraction * (unique_depth - i) as f64 / denom;
        } else {
            path[i].weight = path[i].weight * denom / (zero_fraction * (unique_depth - i) as f64);
        }
    }

    for i in path_index..unique_depth {
        path[i].feature = path[i + 1].feature;
        path[i].zero_fraction = path[i + 1].zero_fraction;
        path[i].one_fraction = path[i + 1].one_fraction;
    }
}

/// Total permutation weight of the path with element `path_index` removed
fn unwound_sum(path: &[PathElement], unique_depth: usize, path_index: usize) -> f64 {
    let one_fraction = path[path_index].one_fraction;
    let zero_fraction = path[path_index].zero_fraction;
    let denom = (unique_depth + 1) as f64;
    let mut next_one_portion = path[unique_depth].weight;
    let mut total = 0.0;

    for i in (0..unique_depth).rev() {
        if one_fraction != 0.0 {
            let tmp = next_one_portion * denom / ((i + 1) as f64 * one_fraction);
            total += tmp;
            next_one_portion = path[i].weight - tmp * zero_fraction * (unique_depth - i) as f64 / denom;
        } else {
            total += path[i].weight / zero_fraction / ((unique_depth - i) as f64 / denom);
        }
    }

    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tree::DumpNode;
    use crate::testing::{brute_force_shapley, demo_artifact};
    use crate::types::Feature;

    fn demo_trees() -> Vec<Tree> {
        let value: serde_json::Value = serde_json::from_str(demo_artifact()).unwrap();
        let dumps: Vec<DumpNode> = serde_json::from_value(value["trees"].clone()).unwrap();
        dumps.iter().map(|d| Tree::from_dump(d).unwrap()).collect()
    }

    fn shap(tree: &Tree, x: &[f64; FEATURE_COUNT]) -> [f64; FEATURE_COUNT] {
        let mut phi = [0.0; FEATURE_COUNT];
        accumulate(tree, x, 1.0, &mut phi);
        phi
    }

    fn inputs() -> Vec<[f64; FEATURE_COUNT]> {
        let base = [0.8163, 0.1824, 0.5588, 0.1647, 0.3673, 0.2235, 1.2258, 0.1294, 0.2706, 0.0941, 1700.0];
        let mut female = base;
        female[Feature::Bbhb.index()] = 1.10;
        female[Feature::Cs.index()] = 0.50;
        female[Feature::Stature.index()] = 1580.0;
        let mut mixed = base;
        mixed[Feature::Fsr.index()] = 0.17;
        mixed[Feature::Stature.index()] = 1620.0;
        mixed[Feature::Whr.index()] = 0.9;
        let mut missing = base;
        missing[Feature::Whr.index()] = f64::NAN;
        vec![base, female, mixed, missing]
    }

    #[test]
    fn test_single_split_attribution() {
        let tree = Tree::new(vec![
            Node::Split {
                feature: Feature::Whr,
                threshold: 0.8,
                yes: 1,
                no: 2,
                missing: 1,
                cover: 10.0,
            },
            Node::Leaf { value: -1.0, cover: 4.0 },
            Node::Leaf { value: 2.0, cover: 6.0 },
        ])
        .unwrap();

        let mut x = [0.0; FEATURE_COUNT];
        x[Feature::Whr.index()] = 0.9;
        let phi = shap(&tree, &x);

        // f(x) = 2.0, E[f] = 0.8, all credit to WHR
        assert!((phi[Feature::Whr.index()] - 1.2).abs() < 1e-12);
        assert!(phi.iter().enumerate().all(|(i, v)| i == Feature::Whr.index() || *v == 0.0));
    }

    #[test]
    fn test_local_accuracy_per_tree() {
        for tree in demo_trees() {
            for x in inputs() {
                let phi = shap(&tree, &x);
                let total: f64 = phi.iter().sum();
                let expected = tree.predict(&x) - tree.expected_value();
                assert!((total - expected).abs() < 1e-12, "{} vs {}", total, expected);
            }
        }
    }

    #[test]
    fn test_matches_brute_force_shapley() {
        for tree in demo_trees() {
            for x in inputs() {
                let fast = shap(&tree, &x);
                let exact = brute_force_shapley(&tree, &x);
                for i in 0..FEATURE_COUNT {
                    assert!(
                        (fast[i] - exact[i]).abs() < 1e-10,
                        "feature {}: {} vs {}",
                        i,
                        fast[i],
                        exact[i]
                    );
                }
            }
        }
    }

    #[test]
    fn test_unused_features_get_zero() {
        let trees = demo_trees();
        let x = inputs()[0];
        for tree in &trees {
            let phi = shap(tree, &x);
            assert_eq!(phi[Feature::Ankls.index()], 0.0);
            assert_eq!(phi[Feature::Wcs.index()], 0.0);
        }
    }

    #[test]
    fn test_scale_is_linear() {
        let tree = &demo_trees()[2];
        let x = inputs()[2];
        let mut half = [0.0; FEATURE_COUNT];
        accumulate(tree, &x, 0.5, &mut half);
        let full = shap(tree, &x);
        for i in 0..FEATURE_COUNT {
            assert!((half[i] * 2.0 - full[i]).abs() < 1e-12);
        }
    }
}
