use crate::math::tensor::Tensor;

/// Gradients of the loss with respect to one layer's weights and biases,
/// shaped exactly like the parameters they belong to.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerGrads {
    pub weights: Tensor,
    pub biases: Tensor,
}

impl LayerGrads {
    pub fn zeros_like(weights: &Tensor, biases: &Tensor) -> LayerGrads {
        LayerGrads {
            weights: Tensor::zeros(&weights.shape),
            biases: Tensor::zeros(&biases.shape),
        }
    }
}
