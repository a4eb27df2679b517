use rand::Rng;

use crate::activation::activation::ActivationFunction;
use crate::error::{FerError, Result};
use crate::layers::grads::LayerGrads;
use crate::math::{matrix::Matrix, tensor::Tensor};

/// Fully-connected layer: `a = f(x·Wᵀ + b)` over a batch of row vectors.
///
/// `weights` has shape `[out, in]` and `biases` shape `[out]`, matching the
/// parameter layout stored in checkpoints.
#[derive(Debug, Clone)]
pub struct Dense {
    pub in_features: usize,
    pub out_features: usize,
    pub weights: Tensor,
    pub biases: Tensor,
    pub activator: ActivationFunction,
}

/// Values recorded during a training forward pass and consumed by `backward`.
#[derive(Debug, Clone)]
pub struct DenseCache {
    input: Matrix,
    pre_activation: Matrix, // z = xWᵀ + b, needed for σ'(z)
}

impl Dense {
    pub fn new<R: Rng + ?Sized>(
        in_features: usize,
        out_features: usize,
        activation: ActivationFunction,
        rng: &mut R,
    ) -> Dense {
        Dense {
            in_features,
            out_features,
            weights: Tensor::he(&[out_features, in_features], in_features, rng),
            biases: Tensor::zeros(&[out_features]),
            activator: activation,
        }
    }

    fn linear(&self, input: &Matrix) -> Result<Matrix> {
        if input.cols != self.in_features {
            return Err(FerError::computation(format!(
                "dense layer expects {} input features, got {}",
                self.in_features, input.cols
            )));
        }
        let mut z = Matrix::zeros(input.rows, self.out_features);
        for b in 0..input.rows {
            let x = input.row(b);
            let out = z.row_mut(b);
            for (o, slot) in out.iter_mut().enumerate() {
                let w = &self.weights.data[o * self.in_features..(o + 1) * self.in_features];
                *slot = self.biases.data[o] + w.iter().zip(x).map(|(w, x)| w * x).sum::<f64>();
            }
        }
        Ok(z)
    }

    pub fn forward(&self, input: &Matrix) -> Result<Matrix> {
        let z = self.linear(input)?;
        Ok(z.map(|x| self.activator.function(x)))
    }

    pub fn forward_cached(&self, input: &Matrix) -> Result<(Matrix, DenseCache)> {
        let z = self.linear(input)?;
        let a = z.map(|x| self.activator.function(x));
        Ok((a, DenseCache { input: input.clone(), pre_activation: z }))
    }

    /// Computes parameter gradients and the gradient w.r.t. the layer input.
    /// `grad_out` is ∂L/∂a for this layer (error in activation space).
    pub fn backward(&self, cache: &DenseCache, grad_out: &Matrix) -> Result<(LayerGrads, Matrix)> {
        let act_derivative = cache.pre_activation.map(|x| self.activator.derivative(x));
        // δ = error ⊙ σ'(z)
        let delta = grad_out.hadamard(&act_derivative)?;

        let mut grads = LayerGrads::zeros_like(&self.weights, &self.biases);
        let mut grad_in = Matrix::zeros(cache.input.rows, self.in_features);

        for b in 0..delta.rows {
            let x = cache.input.row(b);
            let d = delta.row(b);
            let gx = grad_in.row_mut(b);
            for (o, &d_o) in d.iter().enumerate() {
                if d_o == 0.0 {
                    continue;
                }
                grads.biases.data[o] += d_o;
                let base = o * self.in_features;
                let gw = &mut grads.weights.data[base..base + self.in_features];
                let w = &self.weights.data[base..base + self.in_features];
                for i in 0..self.in_features {
                    gw[i] += d_o * x[i];
                    gx[i] += d_o * w[i];
                }
            }
        }

        Ok((grads, grad_in))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_layer(activation: ActivationFunction) -> Dense {
        Dense {
            in_features: 2,
            out_features: 2,
            weights: Tensor::new(vec![2, 2], vec![1.0, -1.0, 0.5, 2.0]).unwrap(),
            biases: Tensor::new(vec![2], vec![0.0, -10.0]).unwrap(),
            activator: activation,
        }
    }

    #[test]
    fn forward_applies_affine_then_activation() {
        let layer = fixed_layer(ActivationFunction::ReLU);
        let x = Matrix::from_rows(vec![vec![3.0, 1.0]]).unwrap();
        let a = layer.forward(&x).unwrap();
        // z = [3 - 1, 1.5 + 2 - 10] = [2, -6.5]
        assert_eq!(a.data, vec![2.0, 0.0]);
    }

    #[test]
    fn backward_matches_hand_computation() {
        let layer = fixed_layer(ActivationFunction::Identity);
        let x = Matrix::from_rows(vec![vec![3.0, 1.0]]).unwrap();
        let (_, cache) = layer.forward_cached(&x).unwrap();
        let g = Matrix::from_rows(vec![vec![1.0, 2.0]]).unwrap();
        let (grads, grad_in) = layer.backward(&cache, &g).unwrap();
        assert_eq!(grads.weights.data, vec![3.0, 1.0, 6.0, 2.0]);
        assert_eq!(grads.biases.data, vec![1.0, 2.0]);
        // Wᵀ·g = [1*1 + 0.5*2, -1*1 + 2*2]
        assert_eq!(grad_in.data, vec![2.0, 3.0]);
    }

    #[test]
    fn wrong_input_width_is_a_computation_error() {
        let layer = fixed_layer(ActivationFunction::ReLU);
        let x = Matrix::from_rows(vec![vec![1.0, 2.0, 3.0]]).unwrap();
        assert!(matches!(layer.forward(&x), Err(FerError::Computation(_))));
    }
}
