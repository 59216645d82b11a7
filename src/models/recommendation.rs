use super::ideal::IdealRange;
use super::reading::Attribute;
use serde::{Deserialize, Serialize};

/// Classifier output for one reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    /// `None` when the loaded model carries no label table.
    pub crop_label: Option<String>,
    pub class_index: usize,
}

impl Recommendation {
    pub fn display_label(&self) -> String {
        match &self.crop_label {
            Some(label) => label.clone(),
            None => format!("class #{}", self.class_index),
        }
    }
}

/// What the recommendation surface shows. Never a crop label unless a
/// prediction actually succeeded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RecommendationStatus {
    #[default]
    Loading,
    Unavailable(String),
    Ready(Recommendation),
}

impl std::fmt::Display for RecommendationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecommendationStatus::Loading => write!(f, "Loading prediction..."),
            RecommendationStatus::Unavailable(reason) => {
                write!(f, "Recommendation unavailable ({})", reason)
            }
            RecommendationStatus::Ready(rec) => write!(f, "{}", rec.display_label()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Increase,
    Decrease,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Increase => "increase",
            Direction::Decrease => "decrease",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Direction::Increase => "↑",
            Direction::Decrease => "↓",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdjustmentSuggestion {
    pub attribute: Attribute,
    pub direction: Direction,
    pub current: f64,
    pub range: IdealRange,
    pub message: String,
}

/// Result of a successful advisory pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "suggestions", rename_all = "lowercase")]
pub enum Advice {
    /// Out-of-range attributes, in fixed attribute order.
    Adjust(Vec<AdjustmentSuggestion>),
    /// Every attribute sits inside its ideal range.
    Optimal,
}

impl Advice {
    pub const OPTIMAL_MESSAGE: &'static str = "Conditions are optimal.";

    pub fn suggestions(&self) -> &[AdjustmentSuggestion] {
        match self {
            Advice::Adjust(suggestions) => suggestions,
            Advice::Optimal => &[],
        }
    }

    pub fn is_optimal(&self) -> bool {
        matches!(self, Advice::Optimal)
    }
}

impl std::fmt::Display for Advice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Advice::Optimal => write!(f, "{}", Self::OPTIMAL_MESSAGE),
            Advice::Adjust(suggestions) => {
                let messages: Vec<&str> = suggestions.iter().map(|s| s.message.as_str()).collect();
                write!(f, "{}", messages.join(" "))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WateringStatus {
    NeedsWater,
    Healthy,
}

impl WateringStatus {
    pub fn message(&self) -> &'static str {
        match self {
            WateringStatus::NeedsWater => "Soil moisture is too low! You need to water the crop.",
            WateringStatus::Healthy => "Soil moisture is at a healthy level.",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            WateringStatus::NeedsWater => "⚠",
            WateringStatus::Healthy => "✓",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display_never_shows_label_unless_ready() {
        assert_eq!(RecommendationStatus::Loading.to_string(), "Loading prediction...");
        let unavailable = RecommendationStatus::Unavailable("model not loaded".into());
        assert!(unavailable.to_string().contains("unavailable"));
        assert!(!matches!(unavailable, RecommendationStatus::Ready(_)));

        let ready = RecommendationStatus::Ready(Recommendation {
            crop_label: Some("rice".into()),
            class_index: 20,
        });
        assert_eq!(ready.to_string(), "rice");
    }

    #[test]
    fn unlabelled_recommendation_shows_index() {
        let rec = Recommendation {
            crop_label: None,
            class_index: 3,
        };
        assert_eq!(rec.display_label(), "class #3");
    }

    #[test]
    fn recommendation_serializes_camel_case() {
        let rec = Recommendation {
            crop_label: None,
            class_index: 3,
        };
        let value = serde_json::to_value(&rec).unwrap();
        assert!(value["cropLabel"].is_null());
        assert_eq!(value["classIndex"], 3);
    }

    #[test]
    fn optimal_advice_has_canonical_text() {
        assert_eq!(Advice::Optimal.to_string(), "Conditions are optimal.");
        assert!(Advice::Optimal.suggestions().is_empty());
        assert!(Advice::Optimal.is_optimal());
    }
}
