use crate::error::{FerError, Result};

/// Hyper-parameters for a [`Trainer`](crate::train::trainer::Trainer) run.
///
/// # Fields
/// - `epochs`          — epochs to run past the start (or resume) epoch
/// - `batch_size`      — samples per mini-batch
/// - `learning_rate`   — SGD step size
/// - `momentum`        — SGD momentum coefficient, in `[0, 1)`
/// - `report_every`    — a status report (and possible checkpoint) follows
///                       every `report_every`-th batch of an epoch
/// - `eval_batch_size` — chunk size used when scoring the validation set
/// - `seed`            — fixes shuffling when set; otherwise seeded from the OS
#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub momentum: f64,
    pub report_every: usize,
    pub eval_batch_size: usize,
    pub seed: Option<u64>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig {
            epochs: 20,
            batch_size: 32,
            learning_rate: 0.001,
            momentum: 0.9,
            report_every: 100,
            eval_batch_size: 256,
            seed: None,
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 || self.eval_batch_size == 0 {
            return Err(FerError::Config("batch sizes must be at least 1".into()));
        }
        if self.report_every == 0 {
            return Err(FerError::Config("report interval must be at least 1 batch".into()));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(FerError::Config(format!(
                "learning rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !(0.0..1.0).contains(&self.momentum) {
            return Err(FerError::Config(format!(
                "momentum must be in [0, 1), got {}",
                self.momentum
            )));
        }
        Ok(())
    }
}
