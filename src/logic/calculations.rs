use crate::models::{Attribute, TimestampedReading};

/// Statistics for one attribute over a set of historical readings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttributeSummary {
    pub attribute: Attribute,
    pub min: f64,
    pub max: f64,
    pub average: f64,
    pub latest: f64,
}

/// Mean of the values, `None` for an empty set
pub fn average(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Summarize one attribute. `latest` is the entry with the newest timestamp.
pub fn summarize_attribute(
    entries: &[&TimestampedReading],
    attribute: Attribute,
) -> Option<AttributeSummary> {
    let values: Vec<f64> = entries.iter().map(|e| e.reading.value(attribute)).collect();
    let average = average(&values)?;

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let latest = entries
        .iter()
        .max_by_key(|e| e.timestamp)
        .map(|e| e.reading.value(attribute))?;

    Some(AttributeSummary {
        attribute,
        min,
        max,
        average,
        latest,
    })
}

/// Summaries for every attribute, in attribute order. Empty input gives an
/// empty result.
pub fn summarize(entries: &[&TimestampedReading]) -> Vec<AttributeSummary> {
    Attribute::ALL
        .into_iter()
        .filter_map(|attribute| summarize_attribute(entries, attribute))
        .collect()
}
