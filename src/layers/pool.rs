use crate::error::{FerError, Result};
use crate::math::volume::Volume;

/// Non-overlapping max pooling (window = stride = `size`). Trailing rows or
/// columns that do not fill a window are dropped.
#[derive(Debug, Clone, Copy)]
pub struct MaxPool2d {
    pub size: usize,
}

/// Flat input offset of the winning element for every pooled output.
#[derive(Debug, Clone)]
pub struct PoolCache {
    input_dims: (usize, usize, usize),
    switches: Vec<usize>,
}

impl MaxPool2d {
    pub fn new(size: usize) -> MaxPool2d {
        MaxPool2d { size }
    }

    pub fn output_size(&self, h: usize, w: usize) -> (usize, usize) {
        (h / self.size, w / self.size)
    }

    fn pool(&self, input: &Volume) -> Result<(Volume, Vec<usize>)> {
        let (oh, ow) = self.output_size(input.height, input.width);
        if oh == 0 || ow == 0 {
            return Err(FerError::computation(format!(
                "cannot {}x{}-pool a {}x{} map",
                self.size, self.size, input.height, input.width
            )));
        }
        let mut out = Volume::zeros(input.channels, oh, ow);
        let mut switches = Vec::with_capacity(out.data.len());
        for c in 0..input.channels {
            for py in 0..oh {
                for px in 0..ow {
                    // Strict `>` keeps the first maximum in row-major order.
                    let mut best = f64::NEG_INFINITY;
                    let mut best_at = (c * input.height + py * self.size) * input.width + px * self.size;
                    for dy in 0..self.size {
                        for dx in 0..self.size {
                            let (y, x) = (py * self.size + dy, px * self.size + dx);
                            let v = input.at(c, y, x);
                            if v > best {
                                best = v;
                                best_at = (c * input.height + y) * input.width + x;
                            }
                        }
                    }
                    *out.at_mut(c, py, px) = best;
                    switches.push(best_at);
                }
            }
        }
        Ok((out, switches))
    }

    pub fn forward(&self, input: &Volume) -> Result<Volume> {
        self.pool(input).map(|(out, _)| out)
    }

    pub fn forward_cached(&self, input: &Volume) -> Result<(Volume, PoolCache)> {
        let (out, switches) = self.pool(input)?;
        Ok((out, PoolCache { input_dims: input.dims(), switches }))
    }

    /// Routes each pooled gradient back to the element that won its window.
    pub fn backward(&self, cache: &PoolCache, grad_out: &Volume) -> Result<Volume> {
        if grad_out.data.len() != cache.switches.len() {
            return Err(FerError::computation(format!(
                "pool gradient has {} values, expected {}",
                grad_out.data.len(), cache.switches.len()
            )));
        }
        let (c, h, w) = cache.input_dims;
        let mut grad_in = Volume::zeros(c, h, w);
        for (&at, &g) in cache.switches.iter().zip(&grad_out.data) {
            grad_in.data[at] += g;
        }
        Ok(grad_in)
    }
}
