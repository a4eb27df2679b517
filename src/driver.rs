//! Wires datasets, model, trainer and checkpoint store together for the two
//! command-line actions.

use log::info;
use rand::{rngs::StdRng, SeedableRng};
use std::path::Path;

use crate::checkpoint::{record::CheckpointRecord, store::CheckpointStore};
use crate::cli::args::{Action, Args};
use crate::data::dataset::{Dataset, SplitPaths};
use crate::error::{FerError, Result};
use crate::eval::accuracy::dataset_accuracy;
use crate::network::network::Network;
use crate::optim::sgd::Sgd;
use crate::train::trainer::{TrainSummary, Trainer};

/// Final accuracies of a driver run, plus the training summary when the
/// action trained.
#[derive(Debug)]
pub struct DriverReport {
    pub train_accuracy: f64,
    pub val_accuracy: f64,
    pub summary: Option<TrainSummary>,
}

pub fn run(args: &Args) -> Result<DriverReport> {
    let config = args.train_config();
    config.validate()?;
    if args.action == Action::Eval && args.model.is_none() {
        return Err(FerError::Config("eval needs a checkpoint: pass --model <path>".into()));
    }

    let train_set = Dataset::load(&SplitPaths::in_dir(&args.data_dir, "train"))?;
    let test_set = Dataset::load(&SplitPaths::in_dir(&args.data_dir, "test"))?;

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut network = Network::new(&mut rng);
    check_dims(&network, &train_set, "train")?;
    check_dims(&network, &test_set, "test")?;

    let resume = match &args.model {
        Some(path) => Some(CheckpointStore::load(path, &network)?),
        None => None,
    };

    let summary = match args.action {
        Action::Train => {
            let store = CheckpointStore::new(&args.checkpoint);
            let mut trainer = Trainer::new(network, config.clone(), resume.as_ref())?;
            let summary = trainer.run(&train_set, &test_set, &store)?;
            info!(
                "trained {} epochs, {} checkpoints written, best val acc {:.3}",
                summary.epochs.len(),
                summary.checkpoints_written,
                summary.best_val_accuracy
            );
            network = trainer.into_network();
            Some(summary)
        }
        Action::Eval => {
            if let Some(record) = &resume {
                restore_for_eval(record, &mut network, config.learning_rate, config.momentum)?;
            }
            None
        }
    };

    Ok(DriverReport {
        train_accuracy: dataset_accuracy(&network, &train_set, config.eval_batch_size)?,
        val_accuracy: dataset_accuracy(&network, &test_set, config.eval_batch_size)?,
        summary,
    })
}

fn restore_for_eval(record: &CheckpointRecord, network: &mut Network, lr: f64, momentum: f64) -> Result<()> {
    let mut optimizer = Sgd::new(lr, momentum);
    record.restore(network, &mut optimizer)?;
    info!("evaluating checkpoint saved for epoch {}", record.epoch);
    Ok(())
}

fn check_dims(network: &Network, dataset: &Dataset, split: &str) -> Result<()> {
    match dataset.image_dims() {
        Some(dims) if dims != network.input_dims() => Err(FerError::load(
            Path::new(split),
            format!("images are {:?}, model expects {:?}", dims, network.input_dims()),
        )),
        _ => Ok(()),
    }
}
