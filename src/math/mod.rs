pub mod matrix;
pub mod tensor;
pub mod volume;

pub use matrix::Matrix;
pub use tensor::Tensor;
pub use volume::Volume;
