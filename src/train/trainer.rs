use log::{debug, info, warn};
use rand::{rngs::StdRng, SeedableRng};

use crate::checkpoint::{record::CheckpointRecord, store::CheckpointStore};
use crate::data::{dataset::Dataset, loader::shuffled_batches};
use crate::error::{FerError, Result};
use crate::eval::accuracy::{accuracy, dataset_accuracy};
use crate::loss::cross_entropy::CrossEntropyLoss;
use crate::network::network::Network;
use crate::optim::sgd::Sgd;
use crate::train::status::StatusReport;
use crate::train::train_config::TrainConfig;

/// Where the trainer is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingEpoch { epoch: usize },
    RunningEpoch { epoch: usize },
    Evaluating { epoch: usize, batch: usize },
    Checkpointing { epoch: usize, batch: usize },
    Done,
}

/// Highest validation accuracy seen so far. Starts at 0 and lives as long
/// as the trainer, across epochs.
#[derive(Debug, Clone, Copy, Default)]
pub struct BestTracker {
    best: f64,
}

impl BestTracker {
    pub fn best(&self) -> f64 {
        self.best
    }

    /// Records `accuracy`; returns `true` when it strictly beats the best.
    pub fn observe(&mut self, accuracy: f64) -> bool {
        if accuracy > self.best {
            self.best = accuracy;
            true
        } else {
            false
        }
    }
}

/// Loss accumulated since the last status report.
#[derive(Debug, Clone, Copy, Default)]
struct RunningLoss {
    sum: f64,
    batches: usize,
}

impl RunningLoss {
    fn push(&mut self, loss: f64) {
        self.sum += loss;
        self.batches += 1;
    }

    fn mean(&self) -> f64 {
        if self.batches == 0 { 0.0 } else { self.sum / self.batches as f64 }
    }

    fn reset(&mut self) {
        *self = RunningLoss::default();
    }
}

/// What a completed run did.
#[derive(Debug, Default)]
pub struct TrainSummary {
    /// Epochs executed, in order (0-based).
    pub epochs: Vec<usize>,
    pub reports: Vec<StatusReport>,
    pub checkpoints_written: usize,
    /// Checkpoint writes that failed; training carried on after each.
    pub checkpoint_failures: Vec<FerError>,
    pub best_val_accuracy: f64,
}

/// Owns the model, its optimizer and the run's progress for the duration
/// of training.
pub struct Trainer {
    network: Network,
    optimizer: Sgd,
    config: TrainConfig,
    start_epoch: usize,
    best: BestTracker,
    rng: StdRng,
    phase: Phase,
}

impl Trainer {
    /// Builds a trainer around `network`. With `resume`, the network and the
    /// optimizer are seeded from the record and training starts at the
    /// record's epoch; otherwise it starts at epoch 0.
    pub fn new(
        mut network: Network,
        config: TrainConfig,
        resume: Option<&CheckpointRecord>,
    ) -> Result<Trainer> {
        config.validate()?;
        let mut optimizer = Sgd::new(config.learning_rate, config.momentum);
        let start_epoch = match resume {
            Some(record) => {
                record.restore(&mut network, &mut optimizer)?;
                info!("resuming training at epoch {}", record.epoch + 1);
                record.epoch
            }
            None => 0,
        };
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Trainer {
            network,
            optimizer,
            config,
            start_epoch,
            best: BestTracker::default(),
            rng,
            phase: Phase::AwaitingEpoch { epoch: start_epoch },
        })
    }

    pub fn start_epoch(&self) -> usize {
        self.start_epoch
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn best_val_accuracy(&self) -> f64 {
        self.best.best()
    }

    /// Hands the trained model back to the caller.
    pub fn into_network(self) -> Network {
        self.network
    }

    fn enter(&mut self, phase: Phase) {
        debug!("trainer: {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    /// Runs `config.epochs` epochs starting at the start epoch.
    ///
    /// Numeric failures abort the run with the error. A failed checkpoint
    /// write is logged and recorded in the summary, and training continues.
    pub fn run(
        &mut self,
        train: &Dataset,
        validation: &Dataset,
        store: &CheckpointStore,
    ) -> Result<TrainSummary> {
        if train.is_empty() {
            return Err(FerError::load("training set", "no samples"));
        }
        if validation.is_empty() {
            return Err(FerError::load("validation set", "no samples"));
        }

        let mut summary = TrainSummary::default();
        let end = self.start_epoch + self.config.epochs;
        for epoch in self.start_epoch..end {
            self.enter(Phase::RunningEpoch { epoch });
            self.run_epoch(epoch, train, validation, store, &mut summary)?;
            summary.epochs.push(epoch);
            self.enter(Phase::AwaitingEpoch { epoch: epoch + 1 });
        }
        self.enter(Phase::Done);

        summary.best_val_accuracy = self.best.best();
        Ok(summary)
    }

    fn run_epoch(
        &mut self,
        epoch: usize,
        train: &Dataset,
        validation: &Dataset,
        store: &CheckpointStore,
        summary: &mut TrainSummary,
    ) -> Result<()> {
        let mut running = RunningLoss::default();
        let batches = shuffled_batches(train.len(), self.config.batch_size, &mut self.rng);

        for (i, batch) in batches.iter().enumerate() {
            let (images, labels) = train.gather(batch)?;

            let (logits, trace) = self.network.forward_train(&images)?;
            let loss = CrossEntropyLoss::loss(&logits, &labels)?;
            let grad = CrossEntropyLoss::derivative(&logits, &labels)?;
            let grads = self.network.backward(&trace, &grad)?;
            self.optimizer.step(&mut self.network, &grads)?;
            running.push(loss);

            if (i + 1) % self.config.report_every == 0 {
                self.enter(Phase::Evaluating { epoch, batch: i });
                let report = StatusReport {
                    epoch,
                    batch: i,
                    mean_loss: running.mean(),
                    train_accuracy: accuracy(&logits, &labels)?,
                    val_accuracy: dataset_accuracy(&self.network, validation, self.config.eval_batch_size)?,
                };
                running.reset();
                self.record_report(report, store, summary);
            }
        }
        Ok(())
    }

    /// Logs `report` and, when its validation accuracy beats the best so far,
    /// saves a record that resumes at the following epoch. A failed save does
    /// not stop training.
    fn record_report(&mut self, report: StatusReport, store: &CheckpointStore, summary: &mut TrainSummary) {
        info!("{report}");
        if self.best.observe(report.val_accuracy) {
            self.enter(Phase::Checkpointing { epoch: report.epoch, batch: report.batch });
            let record = CheckpointRecord::capture(report.epoch + 1, &self.network, &self.optimizer);
            match store.save(&record) {
                Ok(()) => summary.checkpoints_written += 1,
                Err(e) => {
                    warn!("checkpoint for val acc {:.3} was not saved: {e}", report.val_accuracy);
                    summary.checkpoint_failures.push(e);
                }
            }
        }
        self.enter(Phase::RunningEpoch { epoch: report.epoch });
        summary.reports.push(report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::math::volume::Volume;
    use crate::network::network::INPUT_SIZE;
    use rand::Rng;

    fn noise(rng: &mut StdRng) -> Volume {
        let pixels = (0..INPUT_SIZE * INPUT_SIZE).map(|_| rng.gen::<f64>()).collect();
        Volume::grayscale(INPUT_SIZE, INPUT_SIZE, pixels).unwrap()
    }

    fn train_set(n: usize) -> Dataset {
        let mut rng = StdRng::seed_from_u64(11);
        let images = (0..n).map(|_| noise(&mut rng)).collect();
        Dataset::new(images, (0..n).map(|i| i % 3).collect()).unwrap()
    }

    // One image under every label: whatever the model predicts, exactly one
    // of the three is right.
    fn third_right_val_set() -> Dataset {
        let image = noise(&mut StdRng::seed_from_u64(12));
        Dataset::new(vec![image.clone(), image.clone(), image], vec![0, 1, 2]).unwrap()
    }

    fn config(epochs: usize) -> TrainConfig {
        TrainConfig {
            epochs,
            batch_size: 2,
            report_every: 1,
            seed: Some(7),
            ..TrainConfig::default()
        }
    }

    fn network() -> Network {
        Network::new(&mut StdRng::seed_from_u64(3))
    }

    #[test]
    fn best_accuracy_only_moves_up() {
        let mut best = BestTracker::default();
        let saved: Vec<bool> = [0.40, 0.55, 0.50, 0.70].iter().map(|&a| best.observe(a)).collect();
        assert_eq!(saved, vec![true, true, false, true]);
        assert_eq!(best.best(), 0.70);
        assert!(!best.observe(0.70));
    }

    #[test]
    fn running_loss_is_mean_since_reset() {
        let mut running = RunningLoss::default();
        assert_eq!(running.mean(), 0.0);
        running.push(1.0);
        running.push(2.0);
        assert_eq!(running.mean(), 1.5);
        running.reset();
        running.push(4.0);
        assert_eq!(running.mean(), 4.0);
    }

    #[test]
    fn reports_every_batch_and_saves_on_improvement() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("checkpoint.json"));
        let mut trainer = Trainer::new(network(), config(2), None).unwrap();
        assert_eq!(trainer.phase(), Phase::AwaitingEpoch { epoch: 0 });

        let summary = trainer.run(&train_set(6), &third_right_val_set(), &store).unwrap();

        assert_eq!(summary.epochs, vec![0, 1]);
        assert_eq!(summary.reports.len(), 6);
        assert!(summary.reports.iter().all(|r| (r.val_accuracy - 1.0 / 3.0).abs() < 1e-12));
        // 1/3 beats the initial 0 once and never again.
        assert_eq!(summary.checkpoints_written, 1);
        assert!(summary.checkpoint_failures.is_empty());
        assert_eq!(trainer.phase(), Phase::Done);

        let saved = CheckpointStore::load(store.path(), trainer.network()).unwrap();
        assert_eq!(saved.epoch, 1);
    }

    #[test]
    fn reports_follow_every_nth_batch_counted_from_zero() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("checkpoint.json"));
        let cfg = TrainConfig { report_every: 2, ..config(1) };
        let mut trainer = Trainer::new(network(), cfg, None).unwrap();

        // 10 samples in batches of 2: batches 0..=4, reports after 1 and 3.
        let summary = trainer.run(&train_set(10), &third_right_val_set(), &store).unwrap();
        let batches: Vec<usize> = summary.reports.iter().map(|r| r.batch).collect();
        assert_eq!(batches, vec![1, 3]);
        assert!(summary.reports.iter().all(|r| r.epoch == 0));
    }

    #[test]
    fn checkpoints_land_on_improving_reports_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("checkpoint.json"));
        let mut trainer = Trainer::new(network(), config(1), None).unwrap();
        let mut summary = TrainSummary::default();

        let mut written = Vec::new();
        for (batch, val_accuracy) in [0.40, 0.55, 0.50, 0.70].into_iter().enumerate() {
            let report = StatusReport { epoch: 2, batch, mean_loss: 1.0, train_accuracy: 0.5, val_accuracy };
            trainer.record_report(report, &store, &mut summary);
            written.push(summary.checkpoints_written);
        }

        assert_eq!(written, vec![1, 2, 2, 3]);
        assert_eq!(summary.reports.len(), 4);
        assert_eq!(trainer.best_val_accuracy(), 0.70);
        assert_eq!(trainer.phase(), Phase::RunningEpoch { epoch: 2 });
        assert_eq!(CheckpointStore::read(store.path()).unwrap().epoch, 3);
    }

    #[test]
    fn resume_starts_at_recorded_epoch() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("checkpoint.json"));
        let donor = network();
        let record = CheckpointRecord::capture(3, &donor, &Sgd::new(0.001, 0.9));

        let mut trainer = Trainer::new(Network::new(&mut StdRng::seed_from_u64(99)), config(1), Some(&record)).unwrap();
        assert_eq!(trainer.start_epoch(), 3);
        assert_eq!(trainer.network().state_dict(), donor.state_dict());

        let summary = trainer.run(&train_set(4), &third_right_val_set(), &store).unwrap();
        assert_eq!(summary.epochs, vec![3]);
        assert!(summary.reports.iter().all(|r| r.epoch == 3));

        let saved = CheckpointStore::read(store.path()).unwrap();
        assert_eq!(saved.epoch, 4);
    }

    #[test]
    fn failed_save_is_reported_and_training_continues() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"").unwrap();
        let store = CheckpointStore::new(blocker.join("checkpoint.json"));

        let mut trainer = Trainer::new(network(), config(2), None).unwrap();
        let summary = trainer.run(&train_set(4), &third_right_val_set(), &store).unwrap();

        assert_eq!(summary.epochs, vec![0, 1]);
        assert_eq!(summary.checkpoints_written, 0);
        assert_eq!(summary.checkpoint_failures.len(), 1);
        assert_eq!(summary.checkpoint_failures[0].kind(), ErrorKind::Persistence);
        assert!(summary.best_val_accuracy > 0.3);
    }

    #[test]
    fn empty_training_set_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("checkpoint.json"));
        let empty = Dataset::new(Vec::new(), Vec::new()).unwrap();
        let mut trainer = Trainer::new(network(), config(1), None).unwrap();
        let err = trainer.run(&empty, &third_right_val_set(), &store).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Load);
        assert!(!store.path().exists());
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let cfg = TrainConfig { batch_size: 0, ..TrainConfig::default() };
        assert!(matches!(Trainer::new(network(), cfg, None), Err(FerError::Config(_))));
    }
}
