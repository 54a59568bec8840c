//! Feature derivation
//!
//! This module derives the ten body-proportion ratios the classifier was fit on,
//! plus the stature passthrough:
//! - Zero values are replaced with a small epsilon before any division
//! - Ratios are driven by the fixed `RATIO_TABLE`
//! - Foot length is collected but not used by any ratio

use crate::types::{Feature, FeatureVector, MeasurementKey, MeasurementRecord, FEATURE_COUNT};

/// Substitute for measurements that are exactly zero, in the record's unit
pub const ZERO_EPSILON: f64 = 0.1;

/// A ratio column: feature, numerator measurement, denominator measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatioSpec {
    pub feature: Feature,
    pub numerator: MeasurementKey,
    pub denominator: MeasurementKey,
}

const fn ratio(feature: Feature, numerator: MeasurementKey, denominator: MeasurementKey) -> RatioSpec {
    RatioSpec {
        feature,
        numerator,
        denominator,
    }
}

/// The ten ratio features in model column order
pub const RATIO_TABLE: [RatioSpec; 10] = [
    ratio(Feature::Whr, MeasurementKey::WaistCircumference, MeasurementKey::ButtockCircumference),
    ratio(Feature::Hbs, MeasurementKey::HipBreadth, MeasurementKey::Stature),
    ratio(Feature::Cs, MeasurementKey::ChestCircumference, MeasurementKey::Stature),
    ratio(Feature::Fsr, MeasurementKey::ForearmCircumferenceFlexed, MeasurementKey::Stature),
    ratio(Feature::Cbr, MeasurementKey::CalfCircumference, MeasurementKey::ButtockCircumference),
    ratio(Feature::Bbsr, MeasurementKey::BiacromialBreadth, MeasurementKey::Stature),
    ratio(Feature::Bbhb, MeasurementKey::BiacromialBreadth, MeasurementKey::HipBreadth),
    ratio(Feature::Ankls, MeasurementKey::AnkleCircumference, MeasurementKey::Stature),
    ratio(Feature::Fls, MeasurementKey::ForearmHandLength, MeasurementKey::Stature),
    ratio(Feature::Wcs, MeasurementKey::WristCircumference, MeasurementKey::Stature),
];

/// Feature deriver for computing the model input vector
pub struct FeatureDeriver;

impl FeatureDeriver {
    /// Derive the eleven-column feature vector from raw measurements.
    ///
    /// No validation happens here: negative or non-finite input flows through
    /// into the ratios unchanged.
    pub fn derive(measurements: MeasurementRecord) -> FeatureVector {
        let record = substitute_zeros(&measurements);

        let mut values = [0.0; FEATURE_COUNT];
        for spec in RATIO_TABLE.iter() {
            values[spec.feature.index()] = record.get(spec.numerator) / record.get(spec.denominator);
        }
        values[Feature::Stature.index()] = record.get(MeasurementKey::Stature);

        FeatureVector::new(values)
    }
}

/// Replace every exact zero with `ZERO_EPSILON`
pub fn substitute_zeros(record: &MeasurementRecord) -> MeasurementRecord {
    record.map_values(|v| if v == 0.0 { ZERO_EPSILON } else { v })
}

/// Measurements that feed at least one model column
pub fn used_measurements() -> Vec<MeasurementKey> {
    MeasurementKey::ALL
        .iter()
        .copied()
        .filter(|key| {
            *key == MeasurementKey::Stature
                || RATIO_TABLE
                    .iter()
                    .any(|spec| spec.numerator == *key || spec.denominator == *key)
        })
        .collect()
}
