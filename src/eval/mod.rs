pub mod accuracy;

pub use accuracy::{accuracy, argmax, dataset_accuracy};
