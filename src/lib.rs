pub mod math;
pub mod activation;
pub mod layers;
pub mod network;
pub mod loss;
pub mod optim;
pub mod data;
pub mod eval;
pub mod checkpoint;
pub mod train;
pub mod cli;
pub mod driver;
pub mod error;

// Convenience re-exports
pub use checkpoint::{CheckpointRecord, CheckpointStore};
pub use data::{Dataset, SplitPaths};
pub use error::{ErrorKind, FerError, Result};
pub use network::{Emotion, Network};
pub use optim::Sgd;
pub use train::{TrainConfig, TrainSummary, Trainer};
