pub mod emotion;
pub mod network;

pub use emotion::Emotion;
pub use network::{Gradients, ModelState, Network, INPUT_SIZE, NUM_CLASSES};
