pub mod conv;
pub mod dense;
pub mod grads;
pub mod pool;

pub use conv::Conv2d;
pub use dense::Dense;
pub use grads::LayerGrads;
pub use pool::MaxPool2d;
