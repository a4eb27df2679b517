pub mod args;

pub use args::{Action, Args};
