//! End-to-end training run: dataset → split → training → report → browser export.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::dataset::{
    build_xy, load_samples, stratified_split, Arrays, DEFAULT_VAL_FRACTION, FEATURE_COUNT,
};
use crate::error::{Error, Result};
use crate::export::BrowserModel;
use crate::feedforward::{Adam, Net};
use crate::metrics::{ClassificationReport, ConfusionMatrix};

/// Units of the hidden layers, input to output.
pub const HIDDEN_LAYERS: [usize; 2] = [128, 64];

/// Every knob of a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Captured dataset (JSON array of samples).
    pub dataset: PathBuf,
    /// Where the browser model JSON goes.
    pub output: PathBuf,
    /// Keep the motion letters J and Z.
    pub include_jz: bool,
    pub epochs: usize,
    pub batch_size: usize,
    /// Drives the split, weight initialisation and batch order.
    pub seed: u64,
    /// Epochs without validation accuracy improvement before stopping.
    pub patience: usize,
    pub learning_rate: f64,
    pub val_fraction: f64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            dataset: PathBuf::from("asl_dataset.json"),
            output: PathBuf::from("src/models/asl_mlp_weights.json"),
            include_jz: false,
            epochs: 60,
            batch_size: 32,
            seed: 42,
            patience: 8,
            learning_rate: Adam::DEFAULT_LEARNING_RATE,
            val_fraction: DEFAULT_VAL_FRACTION,
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(Error::config("epochs must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(Error::config("batch size must be at least 1"));
        }
        if self.patience == 0 {
            return Err(Error::config("patience must be at least 1"));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(Error::config(format!(
                "learning rate must be a positive number, got {}",
                self.learning_rate
            )));
        }
        if !(self.val_fraction > 0.0 && self.val_fraction < 1.0) {
            return Err(Error::config(format!(
                "validation fraction must be in (0, 1), got {}",
                self.val_fraction
            )));
        }
        Ok(())
    }
}

/// Metrics of one training epoch (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub loss: f64,
    pub accuracy: f64,
    pub val_loss: f64,
    pub val_accuracy: f64,
}

/// Stops training once validation accuracy hasn't improved for `patience` epochs,
/// keeping the coefficients of the best epoch.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    best: Option<f64>,
    best_epoch: usize,
    epochs_without_improvement: usize,
    best_coeffs: Option<Vec<f64>>,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            best: None,
            best_epoch: 0,
            epochs_without_improvement: 0,
            best_coeffs: None,
        }
    }

    /// Records the validation accuracy of `epoch`; returns true when training should stop.
    pub fn record(&mut self, epoch: usize, val_accuracy: f64, coeffs: &[f64]) -> bool {
        let improved = self.best.map_or(true, |best| val_accuracy > best);
        if improved {
            self.best = Some(val_accuracy);
            self.best_epoch = epoch;
            self.epochs_without_improvement = 0;
            self.best_coeffs = Some(coeffs.to_vec());
        } else {
            self.epochs_without_improvement += 1;
        }
        self.epochs_without_improvement >= self.patience
    }

    pub fn best_epoch(&self) -> usize {
        self.best_epoch
    }

    pub fn best_accuracy(&self) -> Option<f64> {
        self.best
    }

    /// Coefficients of the best epoch, if any epoch was recorded.
    pub fn into_best(self) -> Option<Vec<f64>> {
        self.best_coeffs
    }
}

/// Outcome of `fit`.
#[derive(Debug, Clone)]
pub struct FitHistory {
    pub epochs: Vec<EpochMetrics>,
    pub best_epoch: usize,
    pub stopped_early: bool,
}

/// Trains a fresh `63 → 128 → 64 → classes` network on `train`, validating on `val`
/// after every epoch. The returned network carries the best epoch's coefficients.
pub fn fit(
    config: &TrainConfig,
    train: &Arrays,
    val: &Arrays,
    classes: usize,
) -> Result<(Net, FitHistory)> {
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);

    let mut geometry = vec![FEATURE_COUNT];
    geometry.extend_from_slice(&HIDDEN_LAYERS);
    geometry.push(classes);

    let net = Net::with_rng(&geometry, &mut rng)?;
    let mut trainer = net.build_trainer(config.learning_rate);
    let mut stopping = EarlyStopping::new(config.patience);
    let mut epochs = Vec::with_capacity(config.epochs);
    let mut stopped_early = false;

    tracing::info!(?geometry, train = train.len(), val = val.len(), "training");

    for epoch in 1..=config.epochs {
        let outcome = trainer.train_shuffled(
            config.batch_size,
            &train.features,
            &train.targets,
            &mut rng,
        )?;
        let evaluation = trainer.net_mut().evaluate(&val.features, &val.targets)?;

        let metrics = EpochMetrics {
            epoch,
            loss: outcome.loss,
            accuracy: outcome.accuracy,
            val_loss: evaluation.loss,
            val_accuracy: evaluation.accuracy,
        };
        tracing::info!(
            "epoch {}/{} - loss: {:.4} - accuracy: {:.4} - val_loss: {:.4} - val_accuracy: {:.4}",
            epoch,
            config.epochs,
            metrics.loss,
            metrics.accuracy,
            metrics.val_loss,
            metrics.val_accuracy
        );
        epochs.push(metrics);

        if stopping.record(epoch, evaluation.accuracy, trainer.net_ref().coefficients()) {
            tracing::info!(
                epoch,
                best_epoch = stopping.best_epoch(),
                "validation accuracy stopped improving, stopping early"
            );
            stopped_early = true;
            break;
        }
    }

    let best_epoch = stopping.best_epoch();
    tracing::debug!(steps = trainer.optimizer().steps(), "optimizer finished");
    let mut net = trainer.teardown();
    if let Some(best) = stopping.into_best() {
        tracing::info!(best_epoch, "restoring best weights");
        net.set_coefficients(&best)
            .map_err(|err| Error::model(err.to_string()))?;
    }

    Ok((
        net,
        FitHistory {
            epochs,
            best_epoch,
            stopped_early,
        },
    ))
}

/// Everything a run produced, printable as the final console report.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub labels: Vec<String>,
    pub train_samples: usize,
    pub val_samples: usize,
    pub history: FitHistory,
    pub val_loss: f64,
    pub val_accuracy: f64,
    pub report: ClassificationReport,
    pub confusion: ConfusionMatrix,
    pub output: PathBuf,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "Validation accuracy: {:.4}", self.val_accuracy)?;
        writeln!(f, "Validation loss: {:.4}", self.val_loss)?;
        writeln!(f)?;
        writeln!(f, "Classification report:")?;
        writeln!(f, "{}", self.report)?;
        writeln!(f, "Confusion matrix (rows=true, cols=pred):")?;
        writeln!(f, "{}", self.confusion)?;
        writeln!(f)?;
        write!(
            f,
            "Exported browser model JSON to: {}",
            self.output.display()
        )
    }
}

/// Runs the whole pipeline for `config` and writes the browser model.
pub fn run(config: &TrainConfig) -> Result<RunSummary> {
    config.validate()?;

    tracing::info!(dataset = %config.dataset.display(), "loading samples");
    let samples = load_samples(&config.dataset, config.include_jz)?;
    let (arrays, index) = build_xy(&samples)?;
    let labels = index.names();
    tracing::info!(samples = arrays.len(), labels = ?labels, "dataset ready");

    let split = stratified_split(&arrays.targets, config.val_fraction, config.seed)?;
    let train = arrays.select(&split.train);
    let val = arrays.select(&split.validation);

    let (mut net, history) = fit(config, &train, &val, index.len())?;

    let evaluation = net.evaluate(&val.features, &val.targets)?;
    let confusion = ConfusionMatrix::new(index.len(), &val.targets, &evaluation.predictions);
    let report = ClassificationReport::from_confusion(&confusion, &labels);

    let model = BrowserModel::from_net(&net, &labels)?;
    model.write(&config.output)?;
    tracing::info!(output = %config.output.display(), "wrote browser model");

    Ok(RunSummary {
        labels,
        train_samples: train.len(),
        val_samples: val.len(),
        history,
        val_loss: evaluation.loss,
        val_accuracy: evaluation.accuracy,
        report,
        confusion,
        output: config.output.clone(),
    })
}
