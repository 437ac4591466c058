use crate::math::tensor::Tensor4;

/// Side of the residual filter.
pub const KERNEL_SIZE: usize = 5;

/// The 5x5 high-pass residual kernel, before the 1/12 normalization.
#[rustfmt::skip]
const KERNEL: [[f32; KERNEL_SIZE]; KERNEL_SIZE] = [
    [-1.0,  2.0,  -2.0,  2.0, -1.0],
    [ 2.0, -6.0,   8.0, -6.0,  2.0],
    [-2.0,  8.0, -12.0,  8.0, -2.0],
    [ 2.0, -6.0,   8.0, -6.0,  2.0],
    [-1.0,  2.0,  -2.0,  2.0, -1.0],
];

const NORMALIZATION: f32 = 1.0 / 12.0;

/// Fixed preprocessing filter applied before the trainable layers.
///
/// Every channel is convolved on its own with the same normalized kernel,
/// zero same-padding, stride 1. Low-frequency image content is suppressed and
/// the noise residual, where embedding artifacts live, is kept. The layer has
/// no parameters, so it is never checkpointed or updated.
///
/// Channels are not mixed: output channel `c` depends only on input channel
/// `c`. A full `[5, 5, 3, 3]` kernel built from the same 5x5 taps would
/// instead sum all three filtered channels into every output channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HighPass;

impl HighPass {
    /// Normalized kernel coefficient at row `ky`, column `kx`.
    pub fn coefficient(ky: usize, kx: usize) -> f32 {
        KERNEL[ky][kx] * NORMALIZATION
    }

    /// Filters `input`; the output has exactly the input's shape.
    pub fn apply(&self, input: &Tensor4) -> Tensor4 {
        let pad = (KERNEL_SIZE - 1) / 2;
        let (h, w) = (input.height as isize, input.width as isize);
        let mut out = input.zeros_like();

        for b in 0..input.batch {
            for y in 0..input.height {
                for x in 0..input.width {
                    let o = out.offset(b, y, x);
                    for ky in 0..KERNEL_SIZE {
                        let iy = y as isize + ky as isize - pad as isize;
                        if iy < 0 || iy >= h {
                            continue;
                        }
                        for kx in 0..KERNEL_SIZE {
                            let ix = x as isize + kx as isize - pad as isize;
                            if ix < 0 || ix >= w {
                                continue;
                            }
                            let k = Self::coefficient(ky, kx);
                            let src = input.pixel(b, iy as usize, ix as usize);
                            for (acc, v) in out.data[o..o + input.channels].iter_mut().zip(src) {
                                *acc += k * v;
                            }
                        }
                    }
                }
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_keeps_input_shape() {
        for &(b, h, w) in &[(1, 1, 1), (2, 3, 7), (3, 8, 8), (1, 16, 5)] {
            let input = Tensor4::zeros(b, h, w, 3);
            assert_eq!(HighPass.apply(&input).shape(), [b, h, w, 3]);
        }
    }

    #[test]
    fn flat_regions_are_suppressed() {
        // The kernel sums to zero, so the interior of a constant image maps to 0.
        let input = Tensor4::from_vec(1, 9, 9, 3, vec![0.7; 9 * 9 * 3]);
        let out = HighPass.apply(&input);
        for c in 0..3 {
            assert!(out.get(0, 4, 4, c).abs() < 1e-6);
        }
    }

    #[test]
    fn channels_are_filtered_independently() {
        // An impulse in channel 1 only must not leak into channels 0 and 2.
        let mut input = Tensor4::zeros(1, 5, 5, 3);
        input.pixel_mut(0, 2, 2)[1] = 12.0;
        let out = HighPass.apply(&input);

        assert!((out.get(0, 2, 2, 1) - -12.0).abs() < 1e-5);
        assert!((out.get(0, 0, 0, 1) - -1.0).abs() < 1e-5);
        assert!(out.data.iter().enumerate().all(|(i, v)| i % 3 == 1 || *v == 0.0));
    }
}
