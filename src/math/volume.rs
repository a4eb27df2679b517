use crate::error::{FerError, Result};

/// A `channels × height × width` feature map, stored channel-major.
///
/// Input images are single-channel volumes with intensities in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
    pub data: Vec<f64>,
}

impl Volume {
    pub fn zeros(channels: usize, height: usize, width: usize) -> Volume {
        Volume {
            channels,
            height,
            width,
            data: vec![0.0; channels * height * width],
        }
    }

    pub fn new(channels: usize, height: usize, width: usize, data: Vec<f64>) -> Result<Volume> {
        if data.len() != channels * height * width {
            return Err(FerError::computation(format!(
                "volume {}x{}x{} needs {} values, got {}",
                channels, height, width, channels * height * width, data.len()
            )));
        }
        Ok(Volume { channels, height, width, data })
    }

    /// Single-channel image from row-major pixels.
    pub fn grayscale(height: usize, width: usize, pixels: Vec<f64>) -> Result<Volume> {
        Volume::new(1, height, width, pixels)
    }

    #[inline]
    fn offset(&self, c: usize, y: usize, x: usize) -> usize {
        (c * self.height + y) * self.width + x
    }

    #[inline]
    pub fn at(&self, c: usize, y: usize, x: usize) -> f64 {
        self.data[self.offset(c, y, x)]
    }

    #[inline]
    pub fn at_mut(&mut self, c: usize, y: usize, x: usize) -> &mut f64 {
        let i = self.offset(c, y, x);
        &mut self.data[i]
    }

    pub fn dims(&self) -> (usize, usize, usize) {
        (self.channels, self.height, self.width)
    }

    pub fn map<F>(&self, functor: F) -> Volume
    where
        F: Fn(f64) -> f64,
    {
        Volume {
            channels: self.channels,
            height: self.height,
            width: self.width,
            data: self.data.iter().map(|&x| functor(x)).collect(),
        }
    }
}
