pub mod sgd;

pub use sgd::{OptimizerState, Sgd};
