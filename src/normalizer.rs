//! Measurement normalization
//!
//! This module brings caller measurements into the model unit before ratios are
//! derived.
//! - Lengths converted to millimetres (ratios don't care, stature does)
//! - Quality flags for zero, negative and non-finite values

use crate::types::{LengthUnit, MeasurementRecord, NormalizedMeasurements, QualityFlag};

/// Normalizer for converting caller measurements to the model unit
pub struct Normalizer;

impl Normalizer {
    /// Convert `record` from `unit` to millimetres and flag suspicious values.
    ///
    /// Flags are informational; the values themselves are passed on unchanged
    /// apart from the unit conversion.
    pub fn normalize(record: &MeasurementRecord, unit: LengthUnit) -> NormalizedMeasurements {
        let factor = unit.to_mm_factor();
        let mut quality_flags = Vec::new();

        for (key, value) in record.iter() {
            if !value.is_finite() {
                quality_flags.push(QualityFlag::NonFiniteValue(key));
            } else if value == 0.0 {
                quality_flags.push(QualityFlag::ZeroSubstituted(key));
            } else if value < 0.0 {
                quality_flags.push(QualityFlag::NegativeValue(key));
            }
        }

        for flag in &quality_flags {
            tracing::warn!(flag = %flag.label(), "measurement quality issue");
        }

        NormalizedMeasurements {
            record: record.map_values(|v| v * factor),
            source_unit: unit,
            quality_flags,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_record;
    use crate::types::MeasurementKey;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_centimetres_scaled_to_millimetres() {
        let cm = sample_record().map_values(|v| v / 10.0);
        let normalized = Normalizer::normalize(&cm, LengthUnit::Cm);

        for (key, value) in normalized.record.iter() {
            let expected = sample_record().get(key);
            assert!((value - expected).abs() < 1e-9, "{}: {} vs {}", key, value, expected);
        }
        assert!(normalized.quality_flags.is_empty());
        assert_eq!(normalized.source_unit, LengthUnit::Cm);
    }

    #[test]
    fn test_millimetres_untouched() {
        let normalized = Normalizer::normalize(&sample_record(), LengthUnit::Mm);
        assert_eq!(normalized.record, sample_record());
    }

    #[test]
    fn test_quality_flags() {
        let record = sample_record()
            .with(MeasurementKey::WaistCircumference, 0.0)
            .with(MeasurementKey::HipBreadth, -3.0)
            .with(MeasurementKey::FootLength, f64::NAN);
        let normalized = Normalizer::normalize(&record, LengthUnit::Mm);

        assert_eq!(
            normalized.quality_flags,
            vec![
                QualityFlag::ZeroSubstituted(MeasurementKey::WaistCircumference),
                QualityFlag::NegativeValue(MeasurementKey::HipBreadth),
                QualityFlag::NonFiniteValue(MeasurementKey::FootLength),
            ]
        );
    }
}
