//! Feed-forward network evaluated on the CPU.
//!
//! Models are exported from the training pipeline as JSON. Batch
//! normalisation is folded into the dense weights at export time and dropout
//! is an inference no-op, so only dense layers remain:
//!
//! ```json
//! {
//!   "features": ["N", "P", "K", "temperature", "humidity"],
//!   "labels": ["apple", "banana", "..."],
//!   "normalization": {"mean": [..], "scale": [..]},
//!   "layers": [
//!     {"weights": [[..], ..], "bias": [..], "activation": "relu"},
//!     {"weights": [[..], ..], "bias": [..], "activation": "softmax"}
//!   ]
//! }
//! ```
//!
//! `weights[i][j]` connects input `i` to output `j`.

use super::schema::{FeatureSchema, FeatureVector};
use crate::error::{CropError, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Relu,
    Linear,
    Softmax,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DenseLayer {
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
    pub activation: Activation,
}

impl DenseLayer {
    fn input_width(&self) -> usize {
        self.weights.len()
    }

    fn output_width(&self) -> usize {
        self.bias.len()
    }

    fn apply(&self, input: &[f64]) -> Vec<f64> {
        let mut output = self.bias.clone();
        for (x, row) in input.iter().zip(&self.weights) {
            for (out, w) in output.iter_mut().zip(row) {
                *out += x * w;
            }
        }
        match self.activation {
            Activation::Relu => output.iter_mut().for_each(|v| *v = v.max(0.0)),
            Activation::Linear => {}
            Activation::Softmax => softmax_in_place(&mut output),
        }
        output
    }
}

/// Per-feature standardisation applied before the first layer.
#[derive(Debug, Clone, Deserialize)]
pub struct Normalization {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DenseModel {
    pub features: Vec<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub normalization: Option<Normalization>,
    pub layers: Vec<DenseLayer>,
}

impl DenseModel {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| CropError::ModelLoad(format!("parse: {}", e)))
    }

    pub fn num_classes(&self) -> usize {
        self.layers.last().map(DenseLayer::output_width).unwrap_or(0)
    }

    /// Structural checks run once at load time, so `forward` never has to
    /// deal with mismatched shapes.
    pub fn validate(&self, schema: &FeatureSchema) -> Result<()> {
        if !schema.matches(&self.features) {
            return Err(CropError::ModelLoad(format!(
                "model features {:?} do not match declared schema {:?}",
                self.features,
                schema.keys()
            )));
        }

        if self.layers.is_empty() {
            return Err(CropError::ModelLoad("model has no layers".into()));
        }

        let mut width = schema.len();
        if let Some(norm) = &self.normalization {
            if norm.mean.len() != width || norm.scale.len() != width {
                return Err(CropError::ModelLoad(format!(
                    "normalization expects {} features",
                    width
                )));
            }
            if norm.scale.iter().any(|s| *s == 0.0 || !s.is_finite()) {
                return Err(CropError::ModelLoad(
                    "normalization scale must be finite and non-zero".into(),
                ));
            }
        }

        let last = self.layers.len() - 1;
        for (index, layer) in self.layers.iter().enumerate() {
            if layer.input_width() != width {
                return Err(CropError::ModelLoad(format!(
                    "layer {} expects {} inputs, previous layer produces {}",
                    index,
                    layer.input_width(),
                    width
                )));
            }
            if layer.output_width() == 0 {
                return Err(CropError::ModelLoad(format!("layer {} has no outputs", index)));
            }
            if let Some(row) = layer
                .weights
                .iter()
                .position(|row| row.len() != layer.output_width())
            {
                return Err(CropError::ModelLoad(format!(
                    "layer {} weight row {} has wrong width",
                    index, row
                )));
            }
            if layer.activation == Activation::Softmax && index != last {
                return Err(CropError::ModelLoad(format!(
                    "softmax is only allowed on the output layer (found on layer {})",
                    index
                )));
            }
            if index == last && layer.activation == Activation::Relu {
                return Err(CropError::ModelLoad(
                    "output layer must be softmax or linear".into(),
                ));
            }
            width = layer.output_width();
        }

        if !self.labels.is_empty() && self.labels.len() != width {
            return Err(CropError::ModelLoad(format!(
                "{} labels for {} output classes",
                self.labels.len(),
                width
            )));
        }

        Ok(())
    }

    /// Class probabilities for one feature vector.
    pub fn forward(&self, features: &FeatureVector) -> Result<Vec<f64>> {
        let mut activations: Vec<f64> = match &self.normalization {
            Some(norm) => features
                .as_slice()
                .iter()
                .zip(norm.mean.iter().zip(&norm.scale))
                .map(|(x, (mean, scale))| (x - mean) / scale)
                .collect(),
            None => features.as_slice().to_vec(),
        };

        for (index, layer) in self.layers.iter().enumerate() {
            activations = layer.apply(&activations);
            if activations.iter().any(|v| !v.is_finite()) {
                return Err(CropError::PredictionFailed(format!(
                    "non-finite activation in layer {}",
                    index
                )));
            }
        }

        if self
            .layers
            .last()
            .is_some_and(|l| l.activation == Activation::Linear)
        {
            softmax_in_place(&mut activations);
        }

        if activations.iter().any(|v| !v.is_finite()) {
            return Err(CropError::PredictionFailed(
                "non-finite class probability".into(),
            ));
        }
        Ok(activations)
    }
}

fn softmax_in_place(values: &mut [f64]) {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    values.iter_mut().for_each(|v| *v = (*v - max).exp());
    let sum: f64 = values.iter().sum();
    values.iter_mut().for_each(|v| *v /= sum);
}

/// Index of the largest value; ties go to the lowest index.
pub fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (index, value) in values.iter().copied().enumerate() {
        match best {
            Some((_, current)) if value <= current => {}
            _ => best = Some((index, value)),
        }
    }
    best.map(|(index, _)| index)
}
