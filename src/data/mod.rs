pub mod dataset;
pub mod idx;
pub mod loader;

pub use dataset::{Dataset, Sample, SplitPaths};
pub use loader::shuffled_batches;
