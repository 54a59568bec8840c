//! Core types for the ratio-lens pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: raw measurement records, the eleven-column feature vector,
//! attributions and the encoded prediction payload.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::PredictError;

/// Number of raw body measurements collected per subject
pub const MEASUREMENT_COUNT: usize = 12;

/// Number of model input columns (ten ratios plus stature)
pub const FEATURE_COUNT: usize = 11;

/// Body measurement identifiers, named as in the ANSUR-derived training data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasurementKey {
    Stature,
    BiacromialBreadth,
    ChestCircumference,
    ButtockCircumference,
    WaistCircumference,
    HipBreadth,
    ForearmCircumferenceFlexed,
    WristCircumference,
    CalfCircumference,
    AnkleCircumference,
    FootLength,
    ForearmHandLength,
}

impl MeasurementKey {
    /// All keys in record order
    pub const ALL: [MeasurementKey; MEASUREMENT_COUNT] = [
        MeasurementKey::Stature,
        MeasurementKey::BiacromialBreadth,
        MeasurementKey::ChestCircumference,
        MeasurementKey::ButtockCircumference,
        MeasurementKey::WaistCircumference,
        MeasurementKey::HipBreadth,
        MeasurementKey::ForearmCircumferenceFlexed,
        MeasurementKey::WristCircumference,
        MeasurementKey::CalfCircumference,
        MeasurementKey::AnkleCircumference,
        MeasurementKey::FootLength,
        MeasurementKey::ForearmHandLength,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MeasurementKey::Stature => "stature",
            MeasurementKey::BiacromialBreadth => "biacromialbreadth",
            MeasurementKey::ChestCircumference => "chestcircumference",
            MeasurementKey::ButtockCircumference => "buttockcircumference",
            MeasurementKey::WaistCircumference => "waistcircumference",
            MeasurementKey::HipBreadth => "hipbreadth",
            MeasurementKey::ForearmCircumferenceFlexed => "forearmcircumferenceflexed",
            MeasurementKey::WristCircumference => "wristcircumference",
            MeasurementKey::CalfCircumference => "calfcircumference",
            MeasurementKey::AnkleCircumference => "anklecircumference",
            MeasurementKey::FootLength => "footlength",
            MeasurementKey::ForearmHandLength => "forearmhandlength",
        }
    }

    /// Human-readable label used by text output
    pub fn label(&self) -> &'static str {
        match self {
            MeasurementKey::Stature => "Stature",
            MeasurementKey::BiacromialBreadth => "Biacromial Breadth",
            MeasurementKey::ChestCircumference => "Chest Circumference",
            MeasurementKey::ButtockCircumference => "Buttock Circumference",
            MeasurementKey::WaistCircumference => "Waist Circumference",
            MeasurementKey::HipBreadth => "Hip Breadth",
            MeasurementKey::ForearmCircumferenceFlexed => "Forearm Circumference Flexed",
            MeasurementKey::WristCircumference => "Wrist Circumference",
            MeasurementKey::CalfCircumference => "Calf Circumference",
            MeasurementKey::AnkleCircumference => "Ankle Circumference",
            MeasurementKey::FootLength => "Foot Length",
            MeasurementKey::ForearmHandLength => "Forearm-Hand Length",
        }
    }

    /// Look up a key by its serialized name
    pub fn parse(name: &str) -> Option<MeasurementKey> {
        MeasurementKey::ALL.iter().copied().find(|k| k.as_str() == name)
    }

    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for MeasurementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A complete set of twelve raw measurements in one linear unit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, f64>",
    into = "BTreeMap<String, f64>"
)]
pub struct MeasurementRecord {
    values: [f64; MEASUREMENT_COUNT],
}

impl MeasurementRecord {
    /// Build a record from values in `MeasurementKey::ALL` order
    pub fn new(values: [f64; MEASUREMENT_COUNT]) -> Self {
        Self { values }
    }

    pub fn get(&self, key: MeasurementKey) -> f64 {
        self.values[key.index()]
    }

    pub fn set(&mut self, key: MeasurementKey, value: f64) {
        self.values[key.index()] = value;
    }

    /// Builder-style setter
    pub fn with(mut self, key: MeasurementKey, value: f64) -> Self {
        self.set(key, value);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (MeasurementKey, f64)> + '_ {
        MeasurementKey::ALL.iter().map(move |k| (*k, self.get(*k)))
    }

    /// Apply `f` to every value
    pub fn map_values(&self, f: impl Fn(f64) -> f64) -> Self {
        let mut values = self.values;
        for v in values.iter_mut() {
            *v = f(*v);
        }
        Self { values }
    }

    /// Build a record from a name → value map.
    ///
    /// Every key must be present; unknown names are rejected so that a typo
    /// cannot silently leave a measurement at its default.
    pub fn from_map(map: &BTreeMap<String, f64>) -> Result<Self, PredictError> {
        if let Some(unknown) = map.keys().find(|name| MeasurementKey::parse(name).is_none()) {
            return Err(PredictError::UnknownMeasurement(unknown.clone()));
        }

        let mut values = [0.0; MEASUREMENT_COUNT];
        for key in MeasurementKey::ALL {
            values[key.index()] = *map
                .get(key.as_str())
                .ok_or_else(|| PredictError::MissingMeasurement(key.as_str().to_string()))?;
        }
        Ok(Self { values })
    }

    pub fn to_map(&self) -> BTreeMap<String, f64> {
        self.iter().map(|(k, v)| (k.as_str().to_string(), v)).collect()
    }
}

impl TryFrom<BTreeMap<String, f64>> for MeasurementRecord {
    type Error = PredictError;

    fn try_from(map: BTreeMap<String, f64>) -> Result<Self, Self::Error> {
        MeasurementRecord::from_map(&map)
    }
}

impl From<MeasurementRecord> for BTreeMap<String, f64> {
    fn from(record: MeasurementRecord) -> Self {
        record.to_map()
    }
}

/// Linear unit of a measurement record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthUnit {
    #[default]
    Mm,
    Cm,
    M,
    In,
}

impl LengthUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            LengthUnit::Mm => "mm",
            LengthUnit::Cm => "cm",
            LengthUnit::M => "m",
            LengthUnit::In => "in",
        }
    }

    /// Multiplier converting a value in this unit to millimetres
    pub fn to_mm_factor(&self) -> f64 {
        match self {
            LengthUnit::Mm => 1.0,
            LengthUnit::Cm => 10.0,
            LengthUnit::M => 1000.0,
            LengthUnit::In => 25.4,
        }
    }

    pub fn parse(s: &str) -> Result<LengthUnit, PredictError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mm" | "millimeters" | "millimetres" => Ok(LengthUnit::Mm),
            "cm" | "centimeters" | "centimetres" => Ok(LengthUnit::Cm),
            "m" | "meters" | "metres" => Ok(LengthUnit::M),
            "in" | "inch" | "inches" => Ok(LengthUnit::In),
            other => Err(PredictError::InvalidUnit(other.to_string())),
        }
    }
}

/// Model input columns, in the order the classifier was fit on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Feature {
    #[serde(rename = "WHR")]
    Whr,
    #[serde(rename = "HBS")]
    Hbs,
    #[serde(rename = "CS")]
    Cs,
    #[serde(rename = "FSR")]
    Fsr,
    #[serde(rename = "CBR")]
    Cbr,
    #[serde(rename = "BBSR")]
    Bbsr,
    #[serde(rename = "BBHB")]
    Bbhb,
    #[serde(rename = "ANKLS")]
    Ankls,
    #[serde(rename = "FLS")]
    Fls,
    #[serde(rename = "WCS")]
    Wcs,
    #[serde(rename = "stature")]
    Stature,
}

impl Feature {
    /// Column order of the model input
    pub const ALL: [Feature; FEATURE_COUNT] = [
        Feature::Whr,
        Feature::Hbs,
        Feature::Cs,
        Feature::Fsr,
        Feature::Cbr,
        Feature::Bbsr,
        Feature::Bbhb,
        Feature::Ankls,
        Feature::Fls,
        Feature::Wcs,
        Feature::Stature,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Feature::Whr => "WHR",
            Feature::Hbs => "HBS",
            Feature::Cs => "CS",
            Feature::Fsr => "FSR",
            Feature::Cbr => "CBR",
            Feature::Bbsr => "BBSR",
            Feature::Bbhb => "BBHB",
            Feature::Ankls => "ANKLS",
            Feature::Fls => "FLS",
            Feature::Wcs => "WCS",
            Feature::Stature => "stature",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Feature::Whr => "waist to buttock circumference",
            Feature::Hbs => "hip breadth to stature",
            Feature::Cs => "chest circumference to stature",
            Feature::Fsr => "flexed forearm circumference to stature",
            Feature::Cbr => "calf to buttock circumference",
            Feature::Bbsr => "biacromial breadth to stature",
            Feature::Bbhb => "biacromial breadth to hip breadth",
            Feature::Ankls => "ankle circumference to stature",
            Feature::Fls => "forearm-hand length to stature",
            Feature::Wcs => "wrist circumference to stature",
            Feature::Stature => "stature",
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Resolve a column name or an `f<index>` reference
    pub fn parse(name: &str) -> Option<Feature> {
        if let Some(found) = Feature::ALL.iter().copied().find(|f| f.name() == name) {
            return Some(found);
        }
        name.strip_prefix('f')
            .and_then(|idx| idx.parse::<usize>().ok())
            .and_then(|idx| Feature::ALL.get(idx).copied())
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn serialize_feature_values<S>(values: &[f64; FEATURE_COUNT], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut map = serializer.serialize_map(Some(FEATURE_COUNT))?;
    for feature in Feature::ALL {
        map.serialize_entry(feature.name(), &values[feature.index()])?;
    }
    map.end()
}

/// Eleven model inputs: ten ratios followed by stature
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector {
    values: [f64; FEATURE_COUNT],
}

impl Serialize for FeatureVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_feature_values(&self.values, serializer)
    }
}

impl FeatureVector {
    pub fn new(values: [f64; FEATURE_COUNT]) -> Self {
        Self { values }
    }

    /// Build a vector from a positional slice; the length must be exactly eleven
    pub fn from_slice(values: &[f64]) -> Result<Self, PredictError> {
        let values: [f64; FEATURE_COUNT] = values.try_into().map_err(|_| {
            PredictError::InvalidFeatureVector(format!(
                "expected {} values, got {}",
                FEATURE_COUNT,
                values.len()
            ))
        })?;
        Ok(Self { values })
    }

    pub fn get(&self, feature: Feature) -> f64 {
        self.values[feature.index()]
    }

    pub fn as_array(&self) -> &[f64; FEATURE_COUNT] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (Feature, f64)> + '_ {
        Feature::ALL.iter().map(move |f| (*f, self.get(*f)))
    }
}

/// Additive decomposition of a model margin
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Attribution {
    /// Expected model margin over the training distribution
    pub baseline: f64,
    /// Per-feature contribution, positive values lean toward male
    #[serde(serialize_with = "serialize_feature_values")]
    pub contributions: [f64; FEATURE_COUNT],
}

impl Attribution {
    pub fn contribution(&self, feature: Feature) -> f64 {
        self.contributions[feature.index()]
    }

    pub fn total(&self) -> f64 {
        self.contributions.iter().sum()
    }

    /// Margin implied by the decomposition
    pub fn reconstructed_margin(&self) -> f64 {
        self.baseline + self.total()
    }
}

/// Result of scoring one feature vector
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Scored {
    /// Probability mass on class 0 (female)
    pub probability_female: f64,
    /// Probability mass on class 1 (male)
    pub probability_male: f64,
    /// Raw model output before the link function
    pub margin: f64,
    pub attribution: Attribution,
    /// |baseline + Σ contributions - margin|
    pub additivity_gap: f64,
}

/// Data issues detected before derivation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "flag", content = "measurement", rename_all = "snake_case")]
pub enum QualityFlag {
    ZeroSubstituted(MeasurementKey),
    NegativeValue(MeasurementKey),
    NonFiniteValue(MeasurementKey),
}

impl QualityFlag {
    pub fn label(&self) -> String {
        match self {
            QualityFlag::ZeroSubstituted(k) => format!("zero_substituted:{}", k),
            QualityFlag::NegativeValue(k) => format!("negative_value:{}", k),
            QualityFlag::NonFiniteValue(k) => format!("non_finite_value:{}", k),
        }
    }
}

/// Measurements converted to the model unit together with quality flags
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedMeasurements {
    /// Values in millimetres
    pub record: MeasurementRecord,
    /// Unit the caller supplied
    pub source_unit: LengthUnit,
    pub quality_flags: Vec<QualityFlag>,
}

/// Producer metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Producer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Provenance of one prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    pub subject_id: Option<String>,
    pub source_unit: String,
    pub model_kind: String,
    pub model_trees: usize,
    pub computed_at_utc: String,
}

/// Quality section of the payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quality {
    pub flags: Vec<String>,
    pub additivity_gap: f64,
}

/// Probability section of the payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionSummary {
    pub probability_female: f64,
    pub probability_male: f64,
    /// Probability of passing as female, in percent
    pub passing_percent: f64,
    pub margin: f64,
}

/// One ranked feature influence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureInfluence {
    pub feature: Feature,
    pub value: f64,
    pub contribution: f64,
    pub lean: Lean,
}

/// Direction a contribution pushes the prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lean {
    Male,
    Female,
    Neutral,
}

/// Complete prediction payload
#[derive(Debug, Clone, Serialize)]
pub struct PredictionPayload {
    pub schema_version: String,
    pub producer: Producer,
    pub provenance: Provenance,
    pub quality: Quality,
    pub features: FeatureVector,
    pub prediction: PredictionSummary,
    pub attribution: Attribution,
    pub explanation: Vec<FeatureInfluence>,
}
