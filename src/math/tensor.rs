use serde::{Serialize, Deserialize};

use crate::math::matrix::Matrix;

/// A batch of feature maps in NHWC layout over a flat `f32` buffer.
///
/// The channels of one pixel are contiguous, and one sample occupies a
/// contiguous `height * width * channels` block, so flattening a batch into
/// `[batch, features]` is a reinterpretation of the same buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor4 {
    pub batch: usize,
    pub height: usize,
    pub width: usize,
    pub channels: usize,
    pub data: Vec<f32>,
}

impl Tensor4 {
    pub fn zeros(batch: usize, height: usize, width: usize, channels: usize) -> Tensor4 {
        Tensor4 {
            batch,
            height,
            width,
            channels,
            data: vec![0.0; batch * height * width * channels],
        }
    }

    /// Wraps an existing buffer. Panics if the length does not match the shape.
    pub fn from_vec(
        batch: usize,
        height: usize,
        width: usize,
        channels: usize,
        data: Vec<f32>,
    ) -> Tensor4 {
        assert_eq!(
            data.len(),
            batch * height * width * channels,
            "buffer does not match [{batch}, {height}, {width}, {channels}]"
        );
        Tensor4 { batch, height, width, channels, data }
    }

    pub fn shape(&self) -> [usize; 4] {
        [self.batch, self.height, self.width, self.channels]
    }

    /// Same-shape tensor filled with zeros.
    pub fn zeros_like(&self) -> Tensor4 {
        Tensor4::zeros(self.batch, self.height, self.width, self.channels)
    }

    #[inline]
    pub fn offset(&self, b: usize, y: usize, x: usize) -> usize {
        ((b * self.height + y) * self.width + x) * self.channels
    }

    #[inline]
    pub fn get(&self, b: usize, y: usize, x: usize, c: usize) -> f32 {
        self.data[self.offset(b, y, x) + c]
    }

    /// All channels of one pixel.
    #[inline]
    pub fn pixel(&self, b: usize, y: usize, x: usize) -> &[f32] {
        let o = self.offset(b, y, x);
        &self.data[o..o + self.channels]
    }

    #[inline]
    pub fn pixel_mut(&mut self, b: usize, y: usize, x: usize) -> &mut [f32] {
        let o = self.offset(b, y, x);
        &mut self.data[o..o + self.channels]
    }

    /// Features per sample once flattened.
    pub fn sample_len(&self) -> usize {
        self.height * self.width * self.channels
    }

    /// `[B, H, W, C]` -> `[B, H*W*C]`.
    pub fn flatten(self) -> Matrix {
        let cols = self.sample_len();
        Matrix::from_vec(self.batch, cols, self.data)
    }

    /// Inverse of `flatten`.
    pub fn unflatten(m: Matrix, height: usize, width: usize, channels: usize) -> Tensor4 {
        Tensor4::from_vec(m.rows, height, width, channels, m.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channels_of_a_pixel_are_contiguous() {
        let data: Vec<f32> = (0..2 * 2 * 3 * 2).map(|x| x as f32).collect();
        let t = Tensor4::from_vec(2, 2, 3, 2, data);
        assert_eq!(t.pixel(1, 1, 2), &[22.0, 23.0]);
        assert_eq!(t.get(0, 1, 0, 1), 7.0);
    }

    #[test]
    fn flatten_keeps_one_row_per_sample() {
        let t = Tensor4::from_vec(2, 1, 2, 2, (0..8).map(|x| x as f32).collect());
        let m = t.clone().flatten();
        assert_eq!((m.rows, m.cols), (2, 4));
        assert_eq!(m.row(1), &[4.0, 5.0, 6.0, 7.0]);
        assert_eq!(Tensor4::unflatten(m, 1, 2, 2), t);
    }
}
