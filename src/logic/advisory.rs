use crate::error::{CropError, Result};
use crate::models::{
    Advice, AdjustmentSuggestion, Attribute, CropProfile, Direction, IdealConditionsTable,
    IdealRange, SensorReading, WateringStatus, SOIL_MOISTURE_RANGE,
};
use std::sync::Arc;

/// Soil moisture below this level raises the watering alert.
pub const WATERING_ALERT_THRESHOLD: f64 = 41.0;

enum RangeSource {
    Crop,
    Fixed(IdealRange),
}

struct AttributeRule {
    attribute: Attribute,
    value: fn(&SensorReading) -> f64,
    range: RangeSource,
    increase_hint: &'static str,
    decrease_verb: &'static str,
    decrease_hint: &'static str,
}

/// Evaluation order is part of the output contract.
const RULES: [AttributeRule; 6] = [
    AttributeRule {
        attribute: Attribute::N,
        value: |r| r.n,
        range: RangeSource::Crop,
        increase_hint: "",
        decrease_verb: "Decrease",
        decrease_hint: "",
    },
    AttributeRule {
        attribute: Attribute::P,
        value: |r| r.p,
        range: RangeSource::Crop,
        increase_hint: "",
        decrease_verb: "Decrease",
        decrease_hint: "",
    },
    AttributeRule {
        attribute: Attribute::K,
        value: |r| r.k,
        range: RangeSource::Crop,
        increase_hint: "",
        decrease_verb: "Decrease",
        decrease_hint: "",
    },
    AttributeRule {
        attribute: Attribute::Temperature,
        value: |r| r.temperature,
        range: RangeSource::Crop,
        increase_hint: " (warm environment)",
        decrease_verb: "Decrease",
        decrease_hint: " (cooling needed)",
    },
    AttributeRule {
        attribute: Attribute::Humidity,
        value: |r| r.humidity,
        range: RangeSource::Crop,
        increase_hint: "",
        decrease_verb: "Decrease",
        decrease_hint: "",
    },
    AttributeRule {
        attribute: Attribute::SoilMoisture,
        value: |r| r.soil_moisture,
        range: RangeSource::Fixed(SOIL_MOISTURE_RANGE),
        increase_hint: " (more watering)",
        decrease_verb: "Reduce",
        decrease_hint: " (less watering)",
    },
];

impl AttributeRule {
    fn evaluate(&self, reading: &SensorReading, range: IdealRange) -> Option<AdjustmentSuggestion> {
        let current = (self.value)(reading);
        if range.contains(current) {
            return None;
        }

        let (direction, verb, hint) = if current < range.min() {
            (Direction::Increase, "Increase", self.increase_hint)
        } else {
            (Direction::Decrease, self.decrease_verb, self.decrease_hint)
        };
        let message = format!(
            "{} {}{}: current {}, ideal {}-{}.",
            verb,
            self.attribute.display_name(),
            hint,
            self.attribute.format_value(current),
            self.attribute.format_value(range.min()),
            self.attribute.format_value(range.max()),
        );

        Some(AdjustmentSuggestion {
            attribute: self.attribute,
            direction,
            current,
            range,
            message,
        })
    }
}

/// Compare a reading against the selected crop's ideal ranges.
///
/// Fails with `NoSelection` when no profile is given and with
/// `IncompleteProfile` when any crop range is missing; no default ranges are
/// ever substituted. Returns `Advice::Optimal` rather than an empty list when
/// nothing is out of range.
pub fn adjustments_for(reading: &SensorReading, profile: Option<&CropProfile>) -> Result<Advice> {
    let profile = profile.ok_or(CropError::NoSelection)?;

    let missing = profile.missing_attributes();
    if !missing.is_empty() {
        return Err(CropError::IncompleteProfile {
            crop: profile.name.clone(),
            missing,
        });
    }

    let mut suggestions = Vec::new();
    for rule in &RULES {
        let range = match &rule.range {
            RangeSource::Fixed(range) => *range,
            RangeSource::Crop => match profile.range(rule.attribute) {
                Some(range) => range,
                None => {
                    return Err(CropError::IncompleteProfile {
                        crop: profile.name.clone(),
                        missing: vec![rule.attribute],
                    })
                }
            },
        };
        if let Some(suggestion) = rule.evaluate(reading, range) {
            suggestions.push(suggestion);
        }
    }

    if suggestions.is_empty() {
        Ok(Advice::Optimal)
    } else {
        Ok(Advice::Adjust(suggestions))
    }
}

pub fn watering_status(reading: &SensorReading) -> WateringStatus {
    if reading.soil_moisture < WATERING_ALERT_THRESHOLD {
        WateringStatus::NeedsWater
    } else {
        WateringStatus::Healthy
    }
}

/// Resolves crop selections against the shared ideal-conditions table.
#[derive(Clone)]
pub struct AdvisoryEngine {
    table: Arc<IdealConditionsTable>,
}

impl AdvisoryEngine {
    pub fn new(table: Arc<IdealConditionsTable>) -> Self {
        Self { table }
    }

    /// Crops a selection can resolve to.
    pub fn crop_names(&self) -> Vec<&str> {
        self.table.crop_names()
    }

    pub fn advise(&self, reading: &SensorReading, selected_crop: Option<&str>) -> Result<Advice> {
        let profile = match selected_crop.map(str::trim).filter(|c| !c.is_empty()) {
            None => None,
            Some(crop) => Some(
                self.table
                    .get(crop)
                    .ok_or_else(|| CropError::NotFound(format!("crop '{}'", crop)))?,
            ),
        };
        adjustments_for(reading, profile)
    }
}
