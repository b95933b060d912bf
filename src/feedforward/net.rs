use rand::distributions::{Distribution, Uniform};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::mem;
use thiserror::Error;

use super::adam::Adam;
use super::trainer::Trainer;

/// Lower bound applied to a probability before taking its logarithm.
pub const PROBABILITY_EPSILON: f64 = 1e-7;

/// Activation applied to the pre-activations of a dense layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// `max(0, x)`, used by every hidden layer.
    Relu,
    /// Normalized exponentials over the whole layer, used by the output layer.
    Softmax,
}

/// Neural network structure
#[derive(Debug)]
pub struct Net {
    /// The number of neurons in each layer.
    pub(super) geometry: Box<[usize]>,

    /// Array of coefficients (weights & biases).
    ///
    /// We will store all coefficients of all neurons of all layers here altogether:
    /// `coeffs = [layer_1][layer_2] ... [layer_N]`
    /// `layer = [neuron_1][neuron_2] ... [neuron_N]`
    /// `neuron = [weights]bias`
    /// So, `coeffs` will look like this:
    /// `[weights_1]bias_1[weights_2]bias_2 ...`
    pub(super) coeffs: Box<[f64]>,

    /// Two halves of the size of the biggest layer:
    /// `buffer = [old activations][new activations]`.
    ///
    /// `Net::process` ping-pongs activations between them, `Trainer::train` reuses them
    /// for the per-layer error terms in exactly the same manner.
    pub(super) buffer: Box<[f64]>,
}

/// Borrowed view of a single dense layer of a `Net`.
#[derive(Debug, Clone, Copy)]
pub struct LayerView<'a> {
    pub input_size: usize,
    pub output_size: usize,
    pub activation: Activation,
    /// `[weights]bias` per neuron, see `Net::coeffs`.
    coeffs: &'a [f64],
}

impl<'a> LayerView<'a> {
    /// Weight connecting input `input` to neuron `neuron`.
    pub fn weight(&self, neuron: usize, input: usize) -> f64 {
        self.coeffs[neuron * (self.input_size + 1) + input]
    }

    pub fn bias(&self, neuron: usize) -> f64 {
        self.coeffs[neuron * (self.input_size + 1) + self.input_size]
    }
}

/// Loss and accuracy of a network over a set of labelled samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Mean cross-entropy.
    pub loss: f64,
    /// Share of samples whose most probable class is the target.
    pub accuracy: f64,
    /// Most probable class for every sample, in input order.
    pub predictions: Vec<usize>,
}

impl Net {
    /// Returns network for given geometry.
    /// Without coefficients, weights are Glorot-uniform random and biases are zero.
    ///
    /// # Arguments
    /// * `geometry` - a number slice that holds a desired number of neurons in each layer;
    /// * `coefficients` - slice of neurons coefficients (optional).
    ///
    /// # Returns
    /// * `Ok(Net)` if amount of coefficients is right, or no coefficients provided;
    /// * `Err(NewNetError)` otherwise.
    ///
    /// # Examples
    /// * Using random coefficients
    /// ```
    /// # use asl_mlp::feedforward::Net;
    /// let net = Net::new(&[63, 128, 64, 24], None).unwrap();
    /// assert_eq!(net.geometry(), &[63, 128, 64, 24]);
    /// ```
    /// * Using given coefficients
    /// ```
    /// # use asl_mlp::feedforward::Net;
    /// let coefficients = [0.27, 0.3, 7.5, 0.0, 1.1, -0.4];
    /// let net = Net::new(&[2, 1, 2], Some(Box::new(coefficients))).unwrap();
    /// ```
    pub fn new(geometry: &[usize], coefficients: Option<Box<[f64]>>) -> Result<Net, NewNetError> {
        Net::build(geometry, coefficients, &mut rand::thread_rng())
    }

    /// Same as `Net::new` without coefficients, but reproducible for a given seed.
    ///
    /// ```
    /// # use asl_mlp::feedforward::Net;
    /// let a = Net::seeded(&[4, 3, 2], 42).unwrap();
    /// let b = Net::seeded(&[4, 3, 2], 42).unwrap();
    /// assert_eq!(a.coefficients(), b.coefficients());
    /// ```
    pub fn seeded(geometry: &[usize], seed: u64) -> Result<Net, NewNetError> {
        Net::with_rng(geometry, &mut ChaCha8Rng::seed_from_u64(seed))
    }

    /// Random network drawing its initial weights from `rng`.
    pub fn with_rng<R: Rng + ?Sized>(geometry: &[usize], rng: &mut R) -> Result<Net, NewNetError> {
        Net::build(geometry, None, rng)
    }

    fn build<R: Rng + ?Sized>(
        geometry: &[usize],
        coefficients: Option<Box<[f64]>>,
        rng: &mut R,
    ) -> Result<Net, NewNetError> {
        if geometry.len() < 2 {
            return Err(NewNetError::BadGeometry(geometry.len()));
        }
        if let Some(layer) = geometry.iter().position(|&size| size == 0) {
            return Err(NewNetError::EmptyLayer(layer));
        }

        let coeffs_total = Net::coeffs_count(geometry);
        let max_layer_size = geometry.iter().copied().max().unwrap_or(0);

        let coeffs: Box<[f64]> = if let Some(coeffs) = coefficients {
            if coeffs.len() != coeffs_total {
                return Err(NewNetError::BadCoefficients(SizeMismatch {
                    expected: coeffs_total,
                    got: coeffs.len(),
                }));
            }
            coeffs
        } else {
            let mut coeffs = Vec::with_capacity(coeffs_total);

            for pair in geometry.windows(2) {
                let (old_layer_size, layer_size) = (pair[0], pair[1]);
                // Glorot uniform: limit = sqrt(6 / (fan_in + fan_out))
                let limit = (6.0 / (old_layer_size + layer_size) as f64).sqrt();
                let weights_between = Uniform::from(-limit..=limit);

                // For each neuron in layer
                for _ in 0..layer_size {
                    // Weights will be random
                    coeffs.extend(weights_between.sample_iter(&mut *rng).take(old_layer_size));
                    // But bias will be zero
                    coeffs.push(0.0);
                }
            }

            coeffs.into_boxed_slice()
        };

        Ok(Net {
            geometry: geometry.to_owned().into_boxed_slice(),
            coeffs,
            buffer: vec![0.0; max_layer_size * 2].into_boxed_slice(),
        })
    }

    /// Number of coefficients (weights + biases) of all neurons in all layers.
    pub fn coeffs_count(geometry: &[usize]) -> usize {
        geometry
            .windows(2)
            // Each of [layer_size] neurons has [old_layer_size] weights + 1 bias
            .map(|pair| pair[1] * (pair[0] + 1))
            .sum()
    }

    pub fn geometry(&self) -> &[usize] {
        &self.geometry
    }

    pub fn inputs_count(&self) -> usize {
        self.geometry[0]
    }

    pub fn outputs_count(&self) -> usize {
        self.geometry[self.geometry.len() - 1]
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coeffs
    }

    /// Overwrites all coefficients, e.g. to restore a snapshot taken with `Net::coefficients`.
    pub fn set_coefficients(&mut self, coefficients: &[f64]) -> Result<(), SizeMismatch> {
        if coefficients.len() != self.coeffs.len() {
            return Err(SizeMismatch {
                expected: self.coeffs.len(),
                got: coefficients.len(),
            });
        }
        self.coeffs.copy_from_slice(coefficients);
        Ok(())
    }

    /// Activation of the `layer`-th dense layer (counting from 0, input layer excluded).
    pub fn activation(&self, layer: usize) -> Activation {
        if layer + 2 == self.geometry.len() {
            Activation::Softmax
        } else {
            Activation::Relu
        }
    }

    /// Views of all dense layers, from the first hidden layer to the output layer.
    ///
    /// ```
    /// # use asl_mlp::feedforward::{Activation, Net};
    /// let net = Net::seeded(&[63, 128, 64, 5], 1).unwrap();
    /// let layers = net.layers();
    /// assert_eq!(layers.len(), 3);
    /// assert_eq!(layers[1].input_size, 128);
    /// assert_eq!(layers[2].activation, Activation::Softmax);
    /// ```
    pub fn layers(&self) -> Vec<LayerView<'_>> {
        let mut remaining_coeffs = self.coeffs.as_ref();
        self.geometry
            .windows(2)
            .enumerate()
            .map(|(i, pair)| {
                let (layer_coeffs, tail) = remaining_coeffs.split_at(pair[1] * (pair[0] + 1));
                remaining_coeffs = tail;
                LayerView {
                    input_size: pair[0],
                    output_size: pair[1],
                    activation: self.activation(i),
                    coeffs: layer_coeffs,
                }
            })
            .collect()
    }

    pub(super) fn relu(values: &mut [f64]) {
        for v in values.iter_mut() {
            if *v < 0.0 {
                *v = 0.0;
            }
        }
    }

    /// Numerically stable softmax, in place.
    pub(super) fn softmax(values: &mut [f64]) {
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mut sum = 0.0;
        for v in values.iter_mut() {
            *v = (*v - max).exp();
            sum += *v;
        }
        for v in values.iter_mut() {
            *v /= sum;
        }
    }

    /// Used in Net::process and Trainer::train for activations computing iterations.
    ///
    /// # Arguments
    /// * `prev_activations` - activations of previous layer;
    /// * `layer_coeffs` - `[weights]bias` of every neuron of the layer;
    /// * `activation` - activation of the layer;
    /// * `buffer` - slice that receives the layer's activations.
    pub(super) fn process_layer(
        prev_activations: &[f64],
        layer_coeffs: &[f64],
        activation: Activation,
        buffer: &mut [f64],
    ) {
        for (b, neuron) in buffer
            .iter_mut()
            .zip(layer_coeffs.chunks_exact(prev_activations.len() + 1))
        {
            let (weights, bias) = neuron.split_at(prev_activations.len());
            *b = prev_activations
                .iter()
                .zip(weights.iter())
                .map(|(a, w)| a * w)
                .sum::<f64>()
                + bias[0];
        }

        match activation {
            Activation::Relu => Net::relu(buffer),
            Activation::Softmax => Net::softmax(buffer),
        }
    }

    /// Calculates class probabilities of the network using given input.
    ///
    /// # Arguments
    /// * `inputs` - Slice that holds activations of input neurons;
    /// * `outputs` - Mutable slice that will be filled with probabilities of output classes.
    ///
    /// # Returns
    /// * `Ok(())` if amount of imputs size of the outputs is right;
    /// * `Err(ProcessError)` otherwise.
    ///
    /// # Examples
    /// ```
    /// # use asl_mlp::feedforward::Net;
    /// let mut net = Net::new(&[10, 20, 20, 3], None).unwrap();
    /// let inputs = [1.0; 10];
    /// let mut outputs = [0.0, 0.0, 0.0];
    /// net.process(&inputs, &mut outputs).unwrap();
    /// assert!((outputs.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    /// ```
    pub fn process(&mut self, inputs: &[f64], outputs: &mut [f64]) -> Result<(), ProcessError> {
        let layers_count = self.geometry.len();

        if inputs.len() != self.geometry[0] {
            return Err(ProcessError::BadInputs(SizeMismatch {
                expected: self.geometry[0],
                got: inputs.len(),
            }));
        }
        if outputs.len() != self.geometry[layers_count - 1] {
            return Err(ProcessError::BadOutputs(SizeMismatch {
                expected: self.geometry[layers_count - 1],
                got: outputs.len(),
            }));
        }

        // Splitting Net::buffer in two, see Net::buffer documentation
        let half = self.buffer.len() / 2;
        let (mut old_buffer, mut buffer) = self.buffer.split_at_mut(half);

        let mut remaining_coeffs = self.coeffs.as_ref();
        let mut old_layer_size = self.geometry[0];

        for (i, &layer_size) in self.geometry[1..].iter().enumerate() {
            let (layer_coeffs, tail) = remaining_coeffs.split_at(layer_size * (old_layer_size + 1));
            remaining_coeffs = tail;

            let activation = if i + 2 == layers_count {
                Activation::Softmax
            } else {
                Activation::Relu
            };
            let prev: &[f64] = if i == 0 {
                inputs
            } else {
                &old_buffer[..old_layer_size]
            };

            if i + 2 == layers_count {
                // Last iteration: old_buffer -> outputs
                Net::process_layer(prev, layer_coeffs, activation, outputs);
            } else {
                Net::process_layer(prev, layer_coeffs, activation, &mut buffer[..layer_size]);
                mem::swap(&mut buffer, &mut old_buffer);
            }
            old_layer_size = layer_size;
        }
        Ok(())
    }

    /// Index of the most probable class; ties resolve to the lowest index.
    pub fn argmax(outputs: &[f64]) -> usize {
        outputs
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |(best, best_p), (i, &p)| {
                if p > best_p {
                    (i, p)
                } else {
                    (best, best_p)
                }
            })
            .0
    }

    /// Sparse categorical cross-entropy of a probability vector against a target class.
    ///
    /// # Examples
    /// ```
    /// # use asl_mlp::feedforward::Net;
    /// let loss = Net::calc_cost(&[0.25, 0.5, 0.25], 1).unwrap();
    /// assert!((loss - 2f64.ln()).abs() < 1e-12);
    /// ```
    pub fn calc_cost(outputs: &[f64], target: usize) -> Result<f64, ProcessError> {
        if target >= outputs.len() {
            return Err(ProcessError::BadTarget {
                target,
                classes: outputs.len(),
            });
        }
        Ok(-outputs[target].max(PROBABILITY_EPSILON).ln())
    }

    /// Runs every sample of `all_inputs` (joined row by row) through the network and
    /// compares predictions with `targets`.
    pub fn evaluate(
        &mut self,
        all_inputs: &[f64],
        targets: &[usize],
    ) -> Result<Evaluation, ProcessError> {
        let inputs_len = self.inputs_count();
        if all_inputs.len() != targets.len() * inputs_len {
            return Err(ProcessError::BadInputs(SizeMismatch {
                expected: targets.len() * inputs_len,
                got: all_inputs.len(),
            }));
        }

        let mut outputs = vec![0.0; self.outputs_count()];
        let mut predictions = Vec::with_capacity(targets.len());
        let mut loss_sum = 0.0;
        let mut correct = 0;

        for (inputs, &target) in all_inputs.chunks_exact(inputs_len).zip(targets.iter()) {
            self.process(inputs, &mut outputs)?;
            loss_sum += Net::calc_cost(&outputs, target)?;
            let predicted = Net::argmax(&outputs);
            if predicted == target {
                correct += 1;
            }
            predictions.push(predicted);
        }

        let n = targets.len().max(1) as f64;
        Ok(Evaluation {
            loss: loss_sum / n,
            accuracy: correct as f64 / n,
            predictions,
        })
    }

    /// Consumes `Net` and builds `Trainer` object containing it.
    /// See `Trainer`'s documentation for details.
    pub fn build_trainer(self, learning_rate: f64) -> Trainer {
        let optimizer = Adam::new(self.coeffs.len(), learning_rate);
        Trainer::build(self, optimizer)
    }
}

/// Error structure for `Net::new`
#[derive(Debug, Clone, Error)]
pub enum NewNetError {
    #[error(
        "Net must have at least two layers (input and output), but got geometry with len {0}!"
    )]
    BadGeometry(usize),
    #[error("Layer {0} has no neurons!")]
    EmptyLayer(usize),
    #[error("Expected {} coefficients because of provided geometry, but got {}!", .0.expected, .0.got)]
    BadCoefficients(SizeMismatch),
}

/// Error structure for `Net::process`
#[derive(Debug, Clone, Error)]
pub enum ProcessError {
    #[error("Expected {} input(s), but got {}!", .0.expected, .0.got)]
    BadInputs(SizeMismatch),
    #[error("Expected {} output(s), but got {}!", .0.expected, .0.got)]
    BadOutputs(SizeMismatch),
    #[error("Target class must be below {classes}, but got {target}!")]
    BadTarget { target: usize, classes: usize },
}

/// Error structure for collections size mismatch
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Expected {expected} values, but got {got}!")]
pub struct SizeMismatch {
    pub expected: usize,
    pub got: usize,
}
