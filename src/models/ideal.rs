use super::reading::Attribute;
use crate::error::{CropError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Inclusive ideal bounds for one attribute. `min <= max` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IdealRange {
    min: f64,
    max: f64,
}

/// Watering range applied to every crop.
pub const SOIL_MOISTURE_RANGE: IdealRange = IdealRange {
    min: 30.0,
    max: 70.0,
};

impl IdealRange {
    pub fn new(min: f64, max: f64) -> Result<Self> {
        if !min.is_finite() || !max.is_finite() {
            return Err(CropError::InvalidData(format!(
                "range bounds must be finite (min {}, max {})",
                min, max
            )));
        }
        if min > max {
            return Err(CropError::InvalidData(format!(
                "range minimum {} exceeds maximum {}",
                min, max
            )));
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn contains(&self, value: f64) -> bool {
        self.min <= value && value <= self.max
    }
}

impl<'de> Deserialize<'de> for IdealRange {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct RawRange {
            #[serde(deserialize_with = "crate::models::reading::deserialize_lenient_f64")]
            min: f64,
            #[serde(deserialize_with = "crate::models::reading::deserialize_lenient_f64")]
            max: f64,
        }

        let raw = RawRange::deserialize(deserializer)?;
        IdealRange::new(raw.min, raw.max).map_err(serde::de::Error::custom)
    }
}

/// Ideal ranges for one crop. Any of the five ranged attributes may be absent;
/// callers must check `is_complete` before comparing against it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CropProfile {
    pub name: String,
    ranges: BTreeMap<Attribute, IdealRange>,
}

impl CropProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ranges: BTreeMap::new(),
        }
    }

    pub fn with_range(mut self, attribute: Attribute, range: IdealRange) -> Self {
        self.ranges.insert(attribute, range);
        self
    }

    pub fn range(&self, attribute: Attribute) -> Option<IdealRange> {
        self.ranges.get(&attribute).copied()
    }

    pub fn missing_attributes(&self) -> Vec<Attribute> {
        Attribute::CROP_RANGED
            .into_iter()
            .filter(|a| !self.ranges.contains_key(a))
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing_attributes().is_empty()
    }
}

/// Crop name to ideal ranges, loaded once and shared read-only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdealConditionsTable {
    profiles: BTreeMap<String, CropProfile>,
}

impl IdealConditionsTable {
    /// Parse the ideal-conditions document:
    /// `{"rice": {"N": {"min": 60, "max": 99}, ...}, ...}`
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        let raw: BTreeMap<String, BTreeMap<String, serde_json::Value>> =
            serde_json::from_value(value)
                .map_err(|e| CropError::InvalidData(format!("ideal conditions: {}", e)))?;

        let mut profiles = BTreeMap::new();
        for (crop, attributes) in raw {
            let mut profile = CropProfile::new(crop.clone());
            for (key, range_value) in attributes {
                let Some(attribute) =
                    Attribute::from_key(&key).filter(|a| Attribute::CROP_RANGED.contains(a))
                else {
                    tracing::debug!(crop = %crop, key = %key, "ignoring unknown ideal-condition key");
                    continue;
                };
                if range_value.is_null() {
                    continue;
                }
                let range: IdealRange = serde_json::from_value(range_value).map_err(|e| {
                    CropError::InvalidData(format!("{} {}: {}", crop, key, e))
                })?;
                profile = profile.with_range(attribute, range);
            }
            if !profile.is_complete() {
                tracing::warn!(
                    crop = %crop,
                    missing = ?profile.missing_attributes(),
                    "crop profile is incomplete"
                );
            }
            profiles.insert(crop, profile);
        }

        Ok(Self { profiles })
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Self::from_json(serde_json::from_str(json)?)
    }

    pub fn get(&self, crop: &str) -> Option<&CropProfile> {
        self.profiles.get(crop)
    }

    pub fn crop_names(&self) -> Vec<&str> {
        self.profiles.keys().map(String::as_str).collect()
    }

    pub fn profiles(&self) -> impl Iterator<Item = &CropProfile> {
        self.profiles.values()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "rice": {
            "N": {"min": 60, "max": 99},
            "P": {"min": 35, "max": 60},
            "K": {"min": 35, "max": 45},
            "temperature": {"min": 20.04, "max": 26.93},
            "humidity": {"min": 80.12, "max": 84.97}
        },
        "maize": {
            "N": {"min": 60, "max": 100},
            "P": {"min": 35, "max": 60},
            "temperature": {"min": 18.04, "max": 26.55}
        }
    }"#;

    #[test]
    fn range_rejects_inverted_bounds() {
        assert!(IdealRange::new(10.0, 5.0).is_err());
        assert!(IdealRange::new(f64::NAN, 5.0).is_err());
        let degenerate = IdealRange::new(5.0, 5.0).unwrap();
        assert!(degenerate.contains(5.0));
    }

    #[test]
    fn range_contains_is_inclusive() {
        let range = IdealRange::new(80.0, 120.0).unwrap();
        assert!(range.contains(80.0));
        assert!(range.contains(120.0));
        assert!(!range.contains(79.99));
        assert!(!range.contains(120.01));
    }

    #[test]
    fn table_parses_complete_and_incomplete_profiles() {
        let table = IdealConditionsTable::from_json_str(SAMPLE).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.crop_names(), vec!["maize", "rice"]);

        let rice = table.get("rice").unwrap();
        assert!(rice.is_complete());
        assert_eq!(rice.range(Attribute::N).unwrap().max(), 99.0);

        let maize = table.get("maize").unwrap();
        assert!(!maize.is_complete());
        assert_eq!(
            maize.missing_attributes(),
            vec![Attribute::K, Attribute::Humidity]
        );
    }

    #[test]
    fn table_rejects_inverted_range() {
        let json = r#"{"rice": {"N": {"min": 99, "max": 60}}}"#;
        let err = IdealConditionsTable::from_json_str(json).unwrap_err();
        assert!(matches!(err, CropError::InvalidData(_)));
    }

    #[test]
    fn null_range_is_treated_as_missing() {
        let json = r#"{"rice": {"N": null, "P": {"min": 1, "max": 2}}}"#;
        let table = IdealConditionsTable::from_json_str(json).unwrap();
        let rice = table.get("rice").unwrap();
        assert!(rice.range(Attribute::N).is_none());
        assert!(rice.range(Attribute::P).is_some());
    }

    #[test]
    fn soil_moisture_range_is_global() {
        assert_eq!(SOIL_MOISTURE_RANGE.min(), 30.0);
        assert_eq!(SOIL_MOISTURE_RANGE.max(), 70.0);
    }
}
