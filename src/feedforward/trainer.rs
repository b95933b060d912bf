use rand::seq::SliceRandom;
use rand::Rng;
use std::mem;
use thiserror::Error;

use super::adam::Adam;
use super::net::{Activation, Net, ProcessError, SizeMismatch};

/// Net trainer structure.
///
/// To train Net, additional buffers are needed. We will contain them in this structure.
/// Training procedure will look like this:
/// * One allocates additional buffers by calling `Net::build_trainer`, which will consume `Net`
/// and return `Trainer` object.
/// (Consuming `Net` is needed to prevent one from building another concurrent `Trainer`s.)
/// * Training data is processed via `Trainer::train` and `Trainer::apply_training` methods,
/// or in one go via `Trainer::train_batch` / `Trainer::train_shuffled`.
/// Also, at any time one can call `Trainer::net_mut` to get access to `Net::process`.
/// * Loss estimation on held-out data is done with `Net::evaluate`.
/// * Once finished training, one can use `Trainer::teardown` to free all the additional
/// buffers, allocated in Trainer, and get `Net` object back.
pub struct Trainer {
    /// The network object trainer posesses.
    /// (Its buffer will be used for error terms in the same manner as it's used
    /// for the activations in `Net::process`).
    pub(crate) net: Net,

    /// Since we will need to store activations of all hidden layers for backpropagation,
    /// this is the buffer that will hold them:
    /// `buffer = [layer_1][layer_2] ... [layer_N-1]`
    pub(crate) buffer: Box<[f64]>,

    /// Buffer with equivalent structure and size as `Net::coeffs`, that will hold it's
    /// gradient changes
    pub(crate) gradient_buffer: Box<[f64]>,

    // Samples counter for mean gradient
    pub(crate) gradient_counter: usize,

    /// Output probabilities of the last processed sample.
    pub(crate) outputs: Box<[f64]>,

    pub(crate) optimizer: Adam,
}

/// Summary of training over a number of samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainOutcome {
    /// Mean cross-entropy over the processed samples (measured before each update).
    pub loss: f64,
    /// Share of processed samples that were classified correctly.
    pub accuracy: f64,
    pub samples: usize,
}

impl Trainer {
    /// Consumes `Net` and builds `Trainer` object containing it.
    pub(super) fn build(net: Net, optimizer: Adam) -> Trainer {
        // Buffer for activations will hold all layers, except 0 (input) and N (output)
        let buffer_size: usize = net.geometry[1..net.geometry.len() - 1].iter().sum();
        let outputs_size = net.outputs_count();
        let coeffs_size = net.coeffs.len();

        Trainer {
            net,
            buffer: vec![0.0; buffer_size].into_boxed_slice(),
            // Gradient buffer contains changes to Net::coeffs, so it is the same size
            gradient_buffer: vec![0.0; coeffs_size].into_boxed_slice(),
            gradient_counter: 0,
            outputs: vec![0.0; outputs_size].into_boxed_slice(),
            optimizer,
        }
    }

    /// Returns reference to contained `Net`.
    pub fn net_ref(&self) -> &Net {
        &self.net
    }

    /// Returns mutable reference to contained `Net`, allowing the use of `Net::process`.
    pub fn net_mut(&mut self) -> &mut Net {
        &mut self.net
    }

    pub fn optimizer(&self) -> &Adam {
        &self.optimizer
    }

    /// Used in Trainer::train to update neuron gradient buffer.
    ///
    /// # Arguments
    /// * `coeff` - multiplier coefficient (the neuron's error term);
    /// * `gradbuf` - gradient buffer of the neuron (`[weights]bias`);
    /// * `prev_activations` - slice that holds activations feeding the neuron.
    fn update_gradbuf(coeff: f64, gradbuf: &mut [f64], prev_activations: &[f64]) {
        for (gc, &a) in gradbuf[..prev_activations.len()]
            .iter_mut()
            .zip(prev_activations.iter())
        {
            *gc += coeff * a;
        }
        gradbuf[prev_activations.len()] += coeff;
    }

    /// Performs training process on a given sample, updating `Trainer`'s internal gradient buffer.
    /// Note that coefficient updates are not done by this method, allowing one to average
    /// gradients over a mini-batch. (`Trainer::train_batch` does this.)
    /// To finally apply changes, call `Trainer::apply_training`.
    ///
    /// # Arguments
    /// * `inputs` - slice that holds activations of input neurons;
    /// * `outputs` - mutable slice that will be filled with output probabilities;
    /// * `target` - index of the desired class.
    ///
    /// # Returns
    /// * The cross-entropy of resulting `outputs` for the `target` class.
    ///
    /// # Examples
    /// ```
    /// # use asl_mlp::feedforward::Net;
    /// let mut trainer = Net::new(&[10, 20, 20, 3], None).unwrap().build_trainer(1e-3);
    /// let inputs = [1.0; 10];
    /// let mut outputs = [0.0, 0.0, 0.0];
    /// let loss = trainer.train(&inputs, &mut outputs, 2).unwrap();
    /// assert!(loss > 0.0);
    /// ```
    pub fn train(
        &mut self,
        inputs: &[f64],
        outputs: &mut [f64],
        target: usize,
    ) -> Result<f64, TrainError> {
        let layers_count = self.net.geometry.len();
        let outputs_len = self.net.geometry[layers_count - 1];

        if inputs.len() != self.net.geometry[0] {
            return Err(TrainError::BadInputs(SizeMismatch {
                expected: self.net.geometry[0],
                got: inputs.len(),
            }));
        }
        if outputs.len() != outputs_len {
            return Err(TrainError::BadOutputs(SizeMismatch {
                expected: outputs_len,
                got: outputs.len(),
            }));
        }
        if target >= outputs_len {
            return Err(TrainError::BadTarget {
                target,
                classes: outputs_len,
            });
        }

        let geometry = &self.net.geometry;
        let coeffs = &self.net.coeffs;

        // Forward activations calculation, hidden layers are kept in Trainer::buffer
        let mut remaining_coeffs = coeffs.as_ref();
        let mut act_offset = 0;
        for (i, pair) in geometry.windows(2).enumerate() {
            let (old_layer_size, layer_size) = (pair[0], pair[1]);
            let (layer_coeffs, tail) = remaining_coeffs.split_at(layer_size * (old_layer_size + 1));
            remaining_coeffs = tail;

            let (done, rest) = self.buffer.split_at_mut(act_offset);
            let prev: &[f64] = if i == 0 {
                inputs
            } else {
                &done[act_offset - old_layer_size..]
            };

            if i + 2 == layers_count {
                // Last iteration: buffer -> outputs
                Net::process_layer(prev, layer_coeffs, Activation::Softmax, outputs);
            } else {
                Net::process_layer(
                    prev,
                    layer_coeffs,
                    Activation::Relu,
                    &mut rest[..layer_size],
                );
                act_offset += layer_size;
            }
        }

        let cost = Net::calc_cost(outputs, target)?;

        // Backpropagation
        let half = self.net.buffer.len() / 2;
        let (mut delta, mut prev_delta) = self.net.buffer.split_at_mut(half);

        // Error terms of the output layer: softmax + cross-entropy gives `p - onehot(target)`
        for (o, (d, &p)) in delta.iter_mut().zip(outputs.iter()).enumerate() {
            *d = if o == target { p - 1.0 } else { p };
        }

        // Going in reverse order, we'll cut corresponding pieces from the right
        let mut coeffs_end = coeffs.len();
        let mut act_end = self.buffer.len();
        for layer in (1..layers_count).rev() {
            let (old_layer_size, layer_size) = (geometry[layer - 1], geometry[layer]);
            let coeffs_start = coeffs_end - layer_size * (old_layer_size + 1);
            let layer_coeffs = &coeffs[coeffs_start..coeffs_end];
            let layer_gradbuf = &mut self.gradient_buffer[coeffs_start..coeffs_end];

            let prev: &[f64] = if layer == 1 {
                inputs
            } else {
                &self.buffer[act_end - old_layer_size..act_end]
            };

            // For each neuron in layer
            for (current_gradbuf, &der) in layer_gradbuf
                .chunks_exact_mut(old_layer_size + 1)
                .zip(delta[..layer_size].iter())
            {
                Trainer::update_gradbuf(der, current_gradbuf, prev);
            }

            if layer > 1 {
                // Error terms of the previous layer, gated by the ReLU derivative
                for (j, (pd, &a)) in prev_delta[..old_layer_size]
                    .iter_mut()
                    .zip(prev.iter())
                    .enumerate()
                {
                    *pd = if a > 0.0 {
                        delta[..layer_size]
                            .iter()
                            .enumerate()
                            .map(|(k, &d)| d * layer_coeffs[k * (old_layer_size + 1) + j])
                            .sum()
                    } else {
                        0.0
                    };
                }
                mem::swap(&mut delta, &mut prev_delta);
                act_end -= old_layer_size;
            }
            coeffs_end = coeffs_start;
        }

        self.gradient_counter += 1;

        Ok(cost)
    }

    /// Applies training, previously done by `Trainer::train`: the accumulated gradient is
    /// averaged over the samples and handed to the optimizer.
    pub fn apply_training(&mut self) {
        if self.gradient_counter > 0 {
            let n = self.gradient_counter as f64;
            for g in self.gradient_buffer.iter_mut() {
                *g /= n;
            }
            self.optimizer
                .step(&mut self.net.coeffs, &self.gradient_buffer);
            for g in self.gradient_buffer.iter_mut() {
                *g = 0.0;
            }
            self.gradient_counter = 0;
        }
    }

    /// Performs training for every data sample in a given batch, then applies.
    /// (It is equivalent to calling `Trainer::train` repeatedly, and then `Trainer::apply_training`.)
    ///
    /// # Arguments
    /// * `all_inputs` - slice of all samples' inputs, joined;
    /// * `targets` - desired class of every sample.
    ///
    /// # Examples
    /// ```
    /// # use asl_mlp::feedforward::Net;
    /// let mut trainer = Net::seeded(&[2, 10, 10, 2], 0).unwrap().build_trainer(1e-2);
    /// let inputs = [0.0, 1.0, 1.0, 0.0, 0.0, 2.0];
    /// let targets = [0, 1, 0];
    /// let outcome = trainer.train_batch(&inputs, &targets).unwrap();
    /// assert_eq!(outcome.samples, 3);
    /// ```
    pub fn train_batch(
        &mut self,
        all_inputs: &[f64],
        targets: &[usize],
    ) -> Result<TrainOutcome, TrainError> {
        let inputs_len = self.net.inputs_count();

        if all_inputs.len() != targets.len() * inputs_len {
            return Err(TrainError::BadInputs(SizeMismatch {
                expected: targets.len() * inputs_len,
                got: all_inputs.len(),
            }));
        }

        if targets.is_empty() {
            return Ok(TrainOutcome {
                loss: 0.0,
                accuracy: 0.0,
                samples: 0,
            });
        }

        let mut outputs = mem::take(&mut self.outputs);
        let mut costs_sum = 0.0;
        let mut correct = 0;
        let mut result = Ok(());

        for (inputs, &target) in all_inputs.chunks_exact(inputs_len).zip(targets.iter()) {
            match self.train(inputs, &mut outputs, target) {
                Ok(cost) => costs_sum += cost,
                Err(err) => {
                    result = Err(err);
                    break;
                }
            }
            if Net::argmax(&outputs) == target {
                correct += 1;
            }
        }
        self.outputs = outputs;

        if let Err(err) = result {
            // Don't leave a partial batch behind
            self.gradient_buffer.iter_mut().for_each(|g| *g = 0.0);
            self.gradient_counter = 0;
            return Err(err);
        }

        self.apply_training();

        Ok(TrainOutcome {
            loss: costs_sum / targets.len() as f64,
            accuracy: correct as f64 / targets.len() as f64,
            samples: targets.len(),
        })
    }

    /// One pass over all samples in an order shuffled by `rng`, applying training after
    /// every `batch_size` samples (the last batch may be smaller).
    ///
    /// # Arguments
    /// * `batch_size` - number of samples in batch;
    /// * `all_inputs` - slice of all samples' inputs, joined;
    /// * `targets` - desired class of every sample;
    /// * `rng` - source of the sample order.
    ///
    /// # Examples
    /// ```
    /// # use asl_mlp::feedforward::Net;
    /// # use rand::SeedableRng;
    /// let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(1);
    /// let mut trainer = Net::seeded(&[2, 10, 10, 2], 0).unwrap().build_trainer(1e-2);
    /// let inputs = [0.0, 1.0, 1.0, 0.0, 0.0, 2.0];
    /// let targets = [0, 1, 0];
    /// let outcome = trainer.train_shuffled(2, &inputs, &targets, &mut rng).unwrap();
    /// assert_eq!(outcome.samples, 3);
    /// assert_eq!(trainer.optimizer().steps(), 2);
    /// ```
    pub fn train_shuffled<R: Rng + ?Sized>(
        &mut self,
        batch_size: usize,
        all_inputs: &[f64],
        targets: &[usize],
        rng: &mut R,
    ) -> Result<TrainOutcome, TrainError> {
        let inputs_len = self.net.inputs_count();
        let samples_count = targets.len();

        if batch_size == 0 {
            return Err(TrainError::BadBatchSize(batch_size));
        }
        if all_inputs.len() != samples_count * inputs_len {
            return Err(TrainError::BadInputs(SizeMismatch {
                expected: samples_count * inputs_len,
                got: all_inputs.len(),
            }));
        }

        let mut order: Vec<usize> = (0..samples_count).collect();
        order.shuffle(rng);

        let mut batch_inputs = Vec::with_capacity(batch_size * inputs_len);
        let mut batch_targets = Vec::with_capacity(batch_size);
        let mut costs_sum = 0.0;
        let mut correct_sum = 0.0;

        for chunk in order.chunks(batch_size) {
            batch_inputs.clear();
            batch_targets.clear();
            for &index in chunk {
                batch_inputs
                    .extend_from_slice(&all_inputs[index * inputs_len..(index + 1) * inputs_len]);
                batch_targets.push(targets[index]);
            }
            let outcome = self.train_batch(&batch_inputs, &batch_targets)?;
            costs_sum += outcome.loss * outcome.samples as f64;
            correct_sum += outcome.accuracy * outcome.samples as f64;
        }

        let n = samples_count.max(1) as f64;
        Ok(TrainOutcome {
            loss: costs_sum / n,
            accuracy: correct_sum / n,
            samples: samples_count,
        })
    }

    /// Frees training buffers, consuming `Trainer` object, and returns contained `Net` back.
    /// Note that all unapplied training, done by `Trainer::train` will be lost,
    /// so don't forget to call `Trainer::apply_training` before!
    pub fn teardown(self) -> Net {
        self.net
    }
}

#[derive(Debug, Clone, Error)]
pub enum TrainError {
    #[error("Expected {} input(s), but got {}!", .0.expected, .0.got)]
    BadInputs(SizeMismatch),
    #[error("Expected {} output(s), but got {}!", .0.expected, .0.got)]
    BadOutputs(SizeMismatch),
    #[error("Target class must be below {classes}, but got {target}!")]
    BadTarget { target: usize, classes: usize },
    #[error("Batch size must be at least 1, but got {0}!")]
    BadBatchSize(usize),
    #[error(transparent)]
    Process(#[from] ProcessError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    /// Loss of a single sample under the given coefficients.
    fn loss_at(geometry: &[usize], coeffs: &[f64], inputs: &[f64], target: usize) -> f64 {
        let mut net = Net::new(geometry, Some(coeffs.to_vec().into_boxed_slice())).unwrap();
        let mut outputs = vec![0.0; *geometry.last().unwrap()];
        net.process(inputs, &mut outputs).unwrap();
        Net::calc_cost(&outputs, target).unwrap()
    }

    #[test]
    fn gradient_matches_finite_differences() {
        let geometry = [3, 4, 3, 2];
        let net = Net::seeded(&geometry, 11).unwrap();
        let coeffs = net.coefficients().to_vec();
        let inputs = [0.3, -0.7, 1.1];
        let target = 1;

        let mut trainer = net.build_trainer(1e-3);
        let mut outputs = [0.0; 2];
        trainer.train(&inputs, &mut outputs, target).unwrap();
        let analytic = trainer.gradient_buffer.to_vec();

        let h = 1e-6;
        for i in 0..coeffs.len() {
            let mut plus = coeffs.clone();
            plus[i] += h;
            let mut minus = coeffs.clone();
            minus[i] -= h;
            let numeric = (loss_at(&geometry, &plus, &inputs, target)
                - loss_at(&geometry, &minus, &inputs, target))
                / (2.0 * h);
            assert!(
                (numeric - analytic[i]).abs() < 1e-5,
                "coefficient {}: numeric {} vs analytic {}",
                i,
                numeric,
                analytic[i]
            );
        }
    }

    #[test]
    fn train_outputs_match_process() {
        let mut trainer = Net::seeded(&[4, 5, 3], 2).unwrap().build_trainer(1e-3);
        let inputs = [0.1, 0.2, -0.3, 0.4];
        let mut trained = [0.0; 3];
        trainer.train(&inputs, &mut trained, 0).unwrap();
        let mut processed = [0.0; 3];
        trainer.net_mut().process(&inputs, &mut processed).unwrap();
        assert_eq!(trained, processed);
    }

    #[test]
    fn rejects_out_of_range_target() {
        let mut trainer = Net::seeded(&[2, 2], 0).unwrap().build_trainer(1e-3);
        let mut outputs = [0.0; 2];
        assert!(matches!(
            trainer.train(&[0.0, 0.0], &mut outputs, 2),
            Err(TrainError::BadTarget { target: 2, classes: 2 })
        ));
    }

    #[test]
    fn failed_batch_leaves_no_pending_gradient() {
        let mut trainer = Net::seeded(&[2, 2], 0).unwrap().build_trainer(1e-3);
        let before = trainer.net_ref().coefficients().to_vec();
        assert!(trainer.train_batch(&[0.0, 1.0, 1.0, 0.0], &[0, 5]).is_err());
        assert_eq!(trainer.gradient_counter, 0);
        assert!(trainer.gradient_buffer.iter().all(|&g| g == 0.0));
        assert_eq!(trainer.net_ref().coefficients(), before.as_slice());
    }

    #[test]
    fn rejects_zero_batch_size() {
        let mut trainer = Net::seeded(&[2, 2], 0).unwrap().build_trainer(1e-3);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert!(matches!(
            trainer.train_shuffled(0, &[0.0, 1.0], &[0], &mut rng),
            Err(TrainError::BadBatchSize(0))
        ));
    }

    #[test]
    fn learns_two_separable_clusters() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut inputs = Vec::new();
        let mut targets = Vec::new();
        for i in 0..40 {
            let class = i % 2;
            let center = if class == 0 { -1.0 } else { 1.0 };
            let jitter = (i as f64 * 0.37).sin() * 0.2;
            inputs.extend_from_slice(&[center + jitter, center - jitter]);
            targets.push(class);
        }

        let mut trainer = Net::seeded(&[2, 8, 2], 3).unwrap().build_trainer(1e-2);
        for _ in 0..100 {
            trainer
                .train_shuffled(8, &inputs, &targets, &mut rng)
                .unwrap();
        }
        let eval = trainer.net_mut().evaluate(&inputs, &targets).unwrap();
        assert_eq!(eval.accuracy, 1.0);
    }
}
