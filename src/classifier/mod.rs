pub mod model;
pub mod schema;

pub use model::{argmax, DenseModel};
pub use schema::{FeatureSchema, FeatureVector};

use crate::error::{CropError, Result};
use crate::models::{Recommendation, SensorReading};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;

/// Owns the trained model and gates every prediction on readiness.
///
/// The model cell is filled exactly once by a load step that runs outside
/// request handling. Until then `predict` fails immediately with
/// `ModelUnavailable`; it never waits for the load to finish.
#[derive(Debug, Default)]
pub struct ClassifierPipeline {
    schema: FeatureSchema,
    model: OnceLock<DenseModel>,
}

impl ClassifierPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn is_ready(&self) -> bool {
        self.model.get().is_some()
    }

    /// Validate and install a model. Only the first install succeeds.
    pub fn install(&self, model: DenseModel) -> Result<()> {
        model.validate(&self.schema)?;
        let classes = model.num_classes();
        self.model
            .set(model)
            .map_err(|_| CropError::ModelLoad("a model is already loaded".into()))?;
        tracing::info!(classes, "crop classifier ready");
        Ok(())
    }

    pub async fn load_from_path(&self, path: &Path) -> Result<()> {
        tracing::info!(path = %path.display(), "loading crop classifier");
        let json = tokio::fs::read_to_string(path).await.map_err(|e| {
            CropError::ModelLoad(format!("failed to read {}: {}", path.display(), e))
        })?;
        self.install(DenseModel::from_json_str(&json)?)
    }

    /// Class labels of the loaded model, empty while unloaded.
    pub fn labels(&self) -> &[String] {
        self.model.get().map(|m| m.labels.as_slice()).unwrap_or(&[])
    }

    /// Recommend a crop from a structured request carrying the declared
    /// feature keys.
    pub fn predict(&self, request: &serde_json::Value) -> Result<Recommendation> {
        let model = self.model.get().ok_or(CropError::ModelUnavailable)?;
        let features = FeatureVector::from_json(&self.schema, request)?;
        classify(model, &features)
    }

    pub fn predict_reading(&self, reading: &SensorReading) -> Result<Recommendation> {
        let model = self.model.get().ok_or(CropError::ModelUnavailable)?;
        let features = FeatureVector::from_reading(&self.schema, reading);
        classify(model, &features)
    }
}

fn classify(model: &DenseModel, features: &FeatureVector) -> Result<Recommendation> {
    let probabilities = model.forward(features)?;
    let class_index = argmax(&probabilities)
        .ok_or_else(|| CropError::PredictionFailed("model produced no classes".into()))?;

    tracing::debug!(
        class_index,
        confidence = probabilities[class_index],
        "classified reading"
    );

    Ok(Recommendation {
        crop_label: model.labels.get(class_index).cloned(),
        class_index,
    })
}

/// Wire shape of a prediction reply: `{"recommendedCrop": ...}` on success,
/// `{"error": ...}` otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredictResponse {
    Success {
        /// Crop label, or the bare class index for unlabelled models
        #[serde(rename = "recommendedCrop")]
        recommended_crop: serde_json::Value,
    },
    Failure {
        error: String,
    },
}

impl PredictResponse {
    pub fn from_result(result: &Result<Recommendation>) -> Self {
        match result {
            Ok(rec) => PredictResponse::Success {
                recommended_crop: match &rec.crop_label {
                    Some(label) => serde_json::Value::from(label.as_str()),
                    None => serde_json::Value::from(rec.class_index),
                },
            },
            Err(e) => PredictResponse::Failure {
                error: e.to_string(),
            },
        }
    }

    /// HTTP status a transport layer should attach.
    pub fn status_code(&self) -> u16 {
        match self {
            PredictResponse::Success { .. } => 200,
            PredictResponse::Failure { .. } => 500,
        }
    }
}
