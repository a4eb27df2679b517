use rand::Rng;

use crate::activation::activation::ActivationFunction;
use crate::error::{FerError, Result};
use crate::layers::grads::LayerGrads;
use crate::math::{tensor::Tensor, volume::Volume};

/// 2-D convolution with a square kernel, stride 1 and no padding, followed
/// by an element-wise activation.
///
/// `weights` has shape `[out, in, k, k]`, `biases` shape `[out]`.
#[derive(Debug, Clone)]
pub struct Conv2d {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel: usize,
    pub weights: Tensor,
    pub biases: Tensor,
    pub activator: ActivationFunction,
}

#[derive(Debug, Clone)]
pub struct ConvCache {
    input: Volume,
    pre_activation: Volume,
}

impl Conv2d {
    pub fn new<R: Rng + ?Sized>(
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        activation: ActivationFunction,
        rng: &mut R,
    ) -> Conv2d {
        let fan_in = in_channels * kernel * kernel;
        Conv2d {
            in_channels,
            out_channels,
            kernel,
            weights: Tensor::he(&[out_channels, in_channels, kernel, kernel], fan_in, rng),
            biases: Tensor::zeros(&[out_channels]),
            activator: activation,
        }
    }

    /// Spatial size of the output for an `h × w` input.
    pub fn output_size(&self, h: usize, w: usize) -> (usize, usize) {
        (h + 1 - self.kernel, w + 1 - self.kernel)
    }

    #[inline]
    fn w_index(&self, o: usize, c: usize, ky: usize, kx: usize) -> usize {
        ((o * self.in_channels + c) * self.kernel + ky) * self.kernel + kx
    }

    fn check_input(&self, input: &Volume) -> Result<()> {
        if input.channels != self.in_channels
            || input.height < self.kernel
            || input.width < self.kernel
        {
            return Err(FerError::computation(format!(
                "conv layer expects {} channels of at least {}x{}, got {:?}",
                self.in_channels, self.kernel, self.kernel, input.dims()
            )));
        }
        Ok(())
    }

    fn linear(&self, input: &Volume) -> Result<Volume> {
        self.check_input(input)?;
        let (oh, ow) = self.output_size(input.height, input.width);
        let mut z = Volume::zeros(self.out_channels, oh, ow);
        for o in 0..self.out_channels {
            let bias = self.biases.data[o];
            for y in 0..oh {
                for x in 0..ow {
                    let mut sum = bias;
                    for c in 0..self.in_channels {
                        for ky in 0..self.kernel {
                            for kx in 0..self.kernel {
                                sum += self.weights.data[self.w_index(o, c, ky, kx)]
                                    * input.at(c, y + ky, x + kx);
                            }
                        }
                    }
                    *z.at_mut(o, y, x) = sum;
                }
            }
        }
        Ok(z)
    }

    pub fn forward(&self, input: &Volume) -> Result<Volume> {
        let z = self.linear(input)?;
        Ok(z.map(|x| self.activator.function(x)))
    }

    pub fn forward_cached(&self, input: &Volume) -> Result<(Volume, ConvCache)> {
        let z = self.linear(input)?;
        let a = z.map(|x| self.activator.function(x));
        Ok((a, ConvCache { input: input.clone(), pre_activation: z }))
    }

    /// Adds this sample's parameter gradients into `grads` and returns ∂L/∂input.
    pub fn backward(
        &self,
        cache: &ConvCache,
        grad_out: &Volume,
        grads: &mut LayerGrads,
    ) -> Result<Volume> {
        let z = &cache.pre_activation;
        if grad_out.dims() != z.dims() {
            return Err(FerError::computation(format!(
                "conv gradient has shape {:?}, expected {:?}",
                grad_out.dims(), z.dims()
            )));
        }
        let input = &cache.input;
        let mut grad_in = Volume::zeros(input.channels, input.height, input.width);

        for o in 0..self.out_channels {
            for y in 0..z.height {
                for x in 0..z.width {
                    let delta = grad_out.at(o, y, x) * self.activator.derivative(z.at(o, y, x));
                    if delta == 0.0 {
                        continue;
                    }
                    grads.biases.data[o] += delta;
                    for c in 0..self.in_channels {
                        for ky in 0..self.kernel {
                            for kx in 0..self.kernel {
                                let wi = self.w_index(o, c, ky, kx);
                                grads.weights.data[wi] += delta * input.at(c, y + ky, x + kx);
                                *grad_in.at_mut(c, y + ky, x + kx) += delta * self.weights.data[wi];
                            }
                        }
                    }
                }
            }
        }

        Ok(grad_in)
    }
}
