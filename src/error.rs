use crate::models::Attribute;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CropError {
    #[error("Model unavailable: classifier is not loaded yet")]
    ModelUnavailable,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Prediction failed: {0}")]
    PredictionFailed(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("No crop selected")]
    NoSelection,

    #[error("Incomplete ideal conditions for {crop}: missing {}", format_attributes(.missing))]
    IncompleteProfile {
        crop: String,
        missing: Vec<Attribute>,
    },

    #[error("Model load error: {0}")]
    ModelLoad(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl CropError {
    /// True for the failures that leave the recommendation surface in an
    /// "unavailable" state rather than showing a crop label.
    pub fn is_prediction_error(&self) -> bool {
        matches!(
            self,
            CropError::ModelUnavailable
                | CropError::InvalidInput(_)
                | CropError::PredictionFailed(_)
        )
    }
}

fn format_attributes(attributes: &[Attribute]) -> String {
    attributes
        .iter()
        .map(|a| a.key())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, CropError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incomplete_profile_lists_missing_keys() {
        let err = CropError::IncompleteProfile {
            crop: "rice".into(),
            missing: vec![Attribute::K, Attribute::Humidity],
        };
        assert_eq!(
            err.to_string(),
            "Incomplete ideal conditions for rice: missing K, humidity"
        );
    }

    #[test]
    fn prediction_errors_are_classified() {
        assert!(CropError::ModelUnavailable.is_prediction_error());
        assert!(CropError::InvalidInput("N".into()).is_prediction_error());
        assert!(CropError::PredictionFailed("nan".into()).is_prediction_error());
        assert!(!CropError::NoSelection.is_prediction_error());
        assert!(!CropError::UpstreamUnavailable("down".into()).is_prediction_error());
    }
}
