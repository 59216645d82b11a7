use crate::error::{CropError, Result};
use crate::models::{Attribute, SensorReading};
use serde_json::Value;

/// Ordered feature keys the classifier was trained on. Soil moisture is a
/// watering concern and is not part of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureSchema {
    attributes: &'static [Attribute],
}

impl FeatureSchema {
    pub const DECLARED: FeatureSchema = FeatureSchema {
        attributes: &[
            Attribute::N,
            Attribute::P,
            Attribute::K,
            Attribute::Temperature,
            Attribute::Humidity,
        ],
    };

    pub fn attributes(&self) -> &'static [Attribute] {
        self.attributes
    }

    pub fn keys(&self) -> Vec<&'static str> {
        self.attributes.iter().map(|a| a.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn matches(&self, keys: &[String]) -> bool {
        keys.len() == self.len() && keys.iter().zip(self.attributes).all(|(k, a)| k == a.key())
    }
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self::DECLARED
    }
}

/// Feature values in schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    values: Vec<f64>,
}

impl FeatureVector {
    pub fn from_reading(schema: &FeatureSchema, reading: &SensorReading) -> Self {
        Self {
            values: schema
                .attributes()
                .iter()
                .map(|a| reading.value(*a))
                .collect(),
        }
    }

    /// Build from a structured request object. Every schema key must be
    /// present and numeric (a JSON number or a numeric string); extra keys
    /// are ignored.
    pub fn from_json(schema: &FeatureSchema, request: &Value) -> Result<Self> {
        let object = request
            .as_object()
            .ok_or_else(|| CropError::InvalidInput("request must be a JSON object".into()))?;

        let mut values = Vec::with_capacity(schema.len());
        for attribute in schema.attributes() {
            let key = attribute.key();
            let raw = object
                .get(key)
                .ok_or_else(|| CropError::InvalidInput(format!("missing feature '{}'", key)))?;
            let value = match raw {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            }
            .filter(|v| v.is_finite())
            .ok_or_else(|| {
                CropError::InvalidInput(format!("feature '{}' is not numeric: {}", key, raw))
            })?;
            values.push(value);
        }

        Ok(Self { values })
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }
}
