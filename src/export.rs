//! Browser inference model: the JSON weights file the web client loads.
//!
//! Layout:
//! `{"model_type": "mlp", "input_size": 63, "labels": [...], "layers": [...]}` where every
//! layer is `{"name", "input_size", "output_size", "activation", "weights", "biases"}`.
//! `weights` holds `input_size` rows of `output_size` numbers (`weights[i][o]` connects
//! input `i` to unit `o`). The softmax head is exported as `"linear"`: the client only
//! needs the argmax of the logits.

use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{Error, Result};
use crate::feedforward::{Activation, Net};

pub const MODEL_TYPE: &str = "mlp";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerActivation {
    Relu,
    Linear,
}

impl From<Activation> for LayerActivation {
    fn from(activation: Activation) -> Self {
        match activation {
            Activation::Relu => LayerActivation::Relu,
            Activation::Softmax => LayerActivation::Linear,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserLayer {
    pub name: String,
    pub input_size: usize,
    pub output_size: usize,
    pub activation: LayerActivation,
    /// Shape: `[input_size][output_size]`.
    pub weights: Vec<Vec<f64>>,
    /// Shape: `[output_size]`.
    pub biases: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserModel {
    pub model_type: String,
    pub input_size: usize,
    pub labels: Vec<String>,
    pub layers: Vec<BrowserLayer>,
}

/// `dense_<units>` for hidden layers, `dense_logits` for the classification head.
fn layer_name(index: usize, layers_count: usize, units: usize) -> String {
    if index + 1 == layers_count {
        "dense_logits".to_string()
    } else {
        format!("dense_{}", units)
    }
}

impl BrowserModel {
    /// Captures the coefficients of `net`, one entry of `labels` per output class.
    pub fn from_net(net: &Net, labels: &[String]) -> Result<BrowserModel> {
        if labels.len() != net.outputs_count() {
            return Err(Error::model(format!(
                "{} labels for {} output classes",
                labels.len(),
                net.outputs_count()
            )));
        }

        let views = net.layers();
        let layers_count = views.len();
        let layers = views
            .iter()
            .enumerate()
            .map(|(i, view)| BrowserLayer {
                name: layer_name(i, layers_count, view.output_size),
                input_size: view.input_size,
                output_size: view.output_size,
                activation: view.activation.into(),
                weights: (0..view.input_size)
                    .map(|input| {
                        (0..view.output_size)
                            .map(|neuron| view.weight(neuron, input))
                            .collect()
                    })
                    .collect(),
                biases: (0..view.output_size).map(|n| view.bias(n)).collect(),
            })
            .collect();

        Ok(BrowserModel {
            model_type: MODEL_TYPE.to_string(),
            input_size: net.inputs_count(),
            labels: labels.to_vec(),
            layers,
        })
    }

    /// Writes the model as a single JSON object, creating parent directories as needed.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    pub fn from_file(path: &Path) -> Result<BrowserModel> {
        let content = fs::read_to_string(path)?;
        let model: BrowserModel = serde_json::from_str(&content)?;
        model.validate()?;
        Ok(model)
    }

    /// Checks that layer shapes chain from `input_size` to one output per label.
    pub fn validate(&self) -> Result<()> {
        if self.model_type != MODEL_TYPE {
            return Err(Error::model(format!(
                "model_type must be \"{}\", got \"{}\"",
                MODEL_TYPE, self.model_type
            )));
        }
        if self.layers.is_empty() {
            return Err(Error::model("layers must not be empty"));
        }

        let mut expected_in = self.input_size;
        for (idx, layer) in self.layers.iter().enumerate() {
            if layer.input_size != expected_in {
                return Err(Error::model(format!(
                    "layer[{}] input_size {} != {}",
                    idx, layer.input_size, expected_in
                )));
            }
            if layer.weights.len() != layer.input_size {
                return Err(Error::model(format!(
                    "layer[{}] has {} weight rows, expected {}",
                    idx,
                    layer.weights.len(),
                    layer.input_size
                )));
            }
            if let Some(r) = layer
                .weights
                .iter()
                .position(|row| row.len() != layer.output_size)
            {
                return Err(Error::model(format!(
                    "layer[{}] weight row {} has {} values, expected {}",
                    idx,
                    r,
                    layer.weights[r].len(),
                    layer.output_size
                )));
            }
            if layer.biases.len() != layer.output_size {
                return Err(Error::model(format!(
                    "layer[{}] has {} biases, expected {}",
                    idx,
                    layer.biases.len(),
                    layer.output_size
                )));
            }
            expected_in = layer.output_size;
        }

        if expected_in != self.labels.len() {
            return Err(Error::model(format!(
                "final layer has {} outputs for {} labels",
                expected_in,
                self.labels.len()
            )));
        }
        Ok(())
    }

    /// Logits of the final layer for one landmark vector.
    pub fn forward(&self, x: &[f64]) -> Result<Vec<f64>> {
        if x.len() != self.input_size {
            return Err(Error::model(format!(
                "input has {} values, expected {}",
                x.len(),
                self.input_size
            )));
        }

        let mut activations = x.to_vec();
        for layer in &self.layers {
            let mut next = layer.biases.clone();
            for (a, row) in activations.iter().zip(layer.weights.iter()) {
                for (n, w) in next.iter_mut().zip(row.iter()) {
                    *n += a * w;
                }
            }
            if layer.activation == LayerActivation::Relu {
                next.iter_mut().for_each(|v| *v = v.max(0.0));
            }
            activations = next;
        }
        Ok(activations)
    }

    /// Most likely label for one landmark vector.
    pub fn predict(&self, x: &[f64]) -> Result<&str> {
        let logits = self.forward(x)?;
        let best = Net::argmax(&logits);
        self.labels
            .get(best)
            .map(String::as_str)
            .ok_or_else(|| Error::model("model has no labels"))
    }
}
