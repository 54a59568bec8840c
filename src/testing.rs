//! Shared fixtures for unit tests

use crate::engine::ScoringEngine;
use crate::features::FeatureDeriver;
use crate::model::{scorer_from_json, Node, Tree};
use crate::types::{FeatureVector, MeasurementRecord, FEATURE_COUNT};

/// Reference subject, all values in millimetres
pub fn sample_record() -> MeasurementRecord {
    MeasurementRecord::new([
        1700.0, // stature
        380.0,  // biacromialbreadth
        950.0,  // chestcircumference
        980.0,  // buttockcircumference
        800.0,  // waistcircumference
        310.0,  // hipbreadth
        280.0,  // forearmcircumferenceflexed
        160.0,  // wristcircumference
        360.0,  // calfcircumference
        220.0,  // anklecircumference
        250.0,  // footlength
        460.0,  // forearmhandlength
    ])
}

pub fn sample_measurements_json() -> String {
    serde_json::json!({
        "schema_version": crate::schema::SCHEMA_VERSION,
        "subject_id": "subject-1",
        "unit": "mm",
        "measurements": sample_record().to_map(),
    })
    .to_string()
}

pub fn demo_features() -> FeatureVector {
    FeatureDeriver::derive(sample_record())
}

pub fn demo_artifact() -> &'static str {
    include_str!("../models/demo_gbt.json")
}

pub fn demo_engine() -> ScoringEngine {
    ScoringEngine::new(scorer_from_json(demo_artifact()).unwrap())
}

/// E[f(x) | x_S] under the tree's cover distribution
fn conditional_expectation(tree: &Tree, idx: usize, x: &[f64; FEATURE_COUNT], subset: u32) -> f64 {
    match tree.node(idx) {
        Node::Leaf { value, .. } => *value,
        Node::Split {
            feature,
            yes,
            no,
            cover,
            ..
        } => {
            if subset & (1 << feature.index()) != 0 {
                conditional_expectation(tree, tree.next_child(idx, x), x, subset)
            } else {
                (tree.cover(*yes) * conditional_expectation(tree, *yes, x, subset)
                    + tree.cover(*no) * conditional_expectation(tree, *no, x, subset))
                    / cover
            }
        }
    }
}

fn factorial(n: u32) -> f64 {
    (1..=n).map(f64::from).product()
}

/// Shapley values by enumerating every feature subset
pub fn brute_force_shapley(tree: &Tree, x: &[f64; FEATURE_COUNT]) -> [f64; FEATURE_COUNT] {
    let m = FEATURE_COUNT as u32;
    let mut phi = [0.0; FEATURE_COUNT];

    for (i, slot) in phi.iter_mut().enumerate() {
        let bit = 1u32 << i;
        for subset in 0..(1u32 << m) {
            if subset & bit != 0 {
                continue;
            }
            let size = subset.count_ones();
            let weight = factorial(size) * factorial(m - size - 1) / factorial(m);
            let with = conditional_expectation(tree, 0, x, subset | bit);
            let without = conditional_expectation(tree, 0, x, subset);
            *slot += weight * (with - without);
        }
    }

    phi
}
