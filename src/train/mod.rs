pub mod status;
pub mod train_config;
pub mod trainer;

pub use status::StatusReport;
pub use train_config::TrainConfig;
pub use trainer::{BestTracker, Phase, TrainSummary, Trainer};
