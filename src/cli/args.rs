use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::train::train_config::TrainConfig;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Train (optionally resuming from `--model`), then report accuracies.
    Train,
    /// Load `--model` and report accuracies without training.
    Eval,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "fer-cnn", about = "Train and evaluate a small CNN on FER-2013 emotions")]
pub struct Args {
    #[arg(value_enum)]
    pub action: Action,
    /// Checkpoint to resume from (train) or to evaluate (eval).
    #[arg(long)]
    pub model: Option<PathBuf>,
    /// Directory holding the train-/test- IDX files.
    #[arg(long, default_value = ".")]
    pub data_dir: PathBuf,
    /// Where the best checkpoint is written during training.
    #[arg(long, default_value = "checkpoint.json")]
    pub checkpoint: PathBuf,
    #[arg(long, default_value_t = 20)]
    pub epochs: usize,
    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,
    #[arg(long = "lr", default_value_t = 0.001)]
    pub learning_rate: f64,
    #[arg(long, default_value_t = 0.9)]
    pub momentum: f64,
    /// Batches between status reports.
    #[arg(long, default_value_t = 100)]
    pub report_every: usize,
    /// Fixes weight init and shuffling.
    #[arg(long)]
    pub seed: Option<u64>,
}

impl Args {
    pub fn train_config(&self) -> TrainConfig {
        TrainConfig {
            epochs: self.epochs,
            batch_size: self.batch_size,
            learning_rate: self.learning_rate,
            momentum: self.momentum,
            report_every: self.report_every,
            seed: self.seed,
            ..TrainConfig::default()
        }
    }
}
