use serde::{Serialize, Deserialize};

use crate::layers::conv2d::same_padding;
use crate::math::tensor::Tensor4;

/// Max-pooling with a square window, stride 1, same-padding.
///
/// Padded cells never take part in the max, so border outputs are the max
/// over the part of the window that lies inside the input. A NaN anywhere in
/// the window wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaxPool2d {
    pub window: usize,
}

/// Pooled activations plus, for every output element, the flat index of the
/// input element that won the max (needed to route gradients back).
#[derive(Debug, Clone)]
pub struct PoolOutput {
    pub output: Tensor4,
    pub argmax: Vec<usize>,
}

impl MaxPool2d {
    pub fn new(window: usize) -> MaxPool2d {
        MaxPool2d { window }
    }

    pub fn forward(&self, input: &Tensor4) -> PoolOutput {
        let pad = same_padding(self.window);
        let c = input.channels;
        let mut output = input.zeros_like();
        let mut argmax = vec![0usize; input.data.len()];

        for b in 0..input.batch {
            for y in 0..input.height {
                let y0 = y.saturating_sub(pad);
                let y1 = (y + self.window - pad).min(input.height);
                for x in 0..input.width {
                    let x0 = x.saturating_sub(pad);
                    let x1 = (x + self.window - pad).min(input.width);
                    let o = output.offset(b, y, x);

                    for ch in 0..c {
                        let mut best_idx = input.offset(b, y0, x0) + ch;
                        let mut best = input.data[best_idx];
                        for iy in y0..y1 {
                            for ix in x0..x1 {
                                let idx = input.offset(b, iy, ix) + ch;
                                let v = input.data[idx];
                                if v > best || (v.is_nan() && !best.is_nan()) {
                                    best = v;
                                    best_idx = idx;
                                }
                            }
                        }
                        output.data[o + ch] = best;
                        argmax[o + ch] = best_idx;
                    }
                }
            }
        }

        PoolOutput { output, argmax }
    }

    /// Routes each output gradient to the input element that produced the max.
    pub fn backward(&self, input_shape: [usize; 4], argmax: &[usize], grad_output: &Tensor4) -> Tensor4 {
        let [b, h, w, c] = input_shape;
        let mut grad_input = Tensor4::zeros(b, h, w, c);
        for (g, &idx) in grad_output.data.iter().zip(argmax) {
            grad_input.data[idx] += g;
        }
        grad_input
    }
}
