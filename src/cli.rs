//! Command-line arguments of `train-asl`.

use clap::Parser;
use std::path::PathBuf;

use asl_mlp::TrainConfig;

/// Train the sign-letter MLP classifier for browser inference.
#[derive(Parser, Debug)]
#[command(name = "train-asl", version, about)]
pub struct Cli {
    /// Path to captured dataset JSON
    #[arg(long, env = "ASL_DATASET", default_value = "asl_dataset.json")]
    pub dataset: PathBuf,

    /// Output model JSON path
    #[arg(
        long,
        env = "ASL_OUTPUT",
        default_value = "src/models/asl_mlp_weights.json"
    )]
    pub output: PathBuf,

    /// Include J and Z classes (excluded by default)
    #[arg(long, env = "ASL_INCLUDE_JZ")]
    pub include_jz: bool,

    /// Training epochs
    #[arg(long, env = "ASL_EPOCHS", default_value_t = 60)]
    pub epochs: usize,

    /// Batch size
    #[arg(long, env = "ASL_BATCH_SIZE", default_value_t = 32)]
    pub batch_size: usize,

    /// Random seed
    #[arg(long, env = "ASL_SEED", default_value_t = 42)]
    pub seed: u64,

    /// Epochs without validation accuracy improvement before stopping
    #[arg(long, env = "ASL_PATIENCE", default_value_t = 8)]
    pub patience: usize,

    /// Adam learning rate
    #[arg(long, env = "ASL_LEARNING_RATE", default_value_t = 1e-3)]
    pub learning_rate: f64,

    /// Share of every class held out for validation
    #[arg(long, env = "ASL_VAL_FRACTION", default_value_t = 0.2)]
    pub val_fraction: f64,
}

impl From<Cli> for TrainConfig {
    fn from(cli: Cli) -> Self {
        TrainConfig {
            dataset: cli.dataset,
            output: cli.output,
            include_jz: cli.include_jz,
            epochs: cli.epochs,
            batch_size: cli.batch_size,
            seed: cli.seed,
            patience: cli.patience,
            learning_rate: cli.learning_rate,
            val_fraction: cli.val_fraction,
        }
    }
}
