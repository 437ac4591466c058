use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::activation::activation::ActivationFunction;
use crate::math::init::{truncated_normal_vec, WEIGHT_STDDEV};
use crate::math::tensor::Tensor4;

/// Padding placed before the input for a stride-1 "same" window of size `k`.
///
/// Even windows put the extra row/column after the input, so a 4-wide
/// window reaches one cell back and two cells forward.
#[inline]
pub fn same_padding(k: usize) -> usize {
    (k - 1) / 2
}

/// Trainable 2-D convolution, stride 1, zero same-padding.
///
/// Weights are laid out `[kernel, kernel, in_channels, filters]`, so for one
/// kernel tap and one input channel the weights of all filters are
/// contiguous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conv2d {
    pub kernel: usize,
    pub in_channels: usize,
    pub filters: usize,
    pub weights: Vec<f32>,
    pub biases: Vec<f32>,
    pub activator: ActivationFunction,
}

/// Gradients of the loss w.r.t. one `Conv2d`'s parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvGradients {
    pub weights: Vec<f32>,
    pub biases: Vec<f32>,
}

impl Conv2d {
    pub fn new<R: Rng + ?Sized>(
        rng: &mut R,
        kernel: usize,
        in_channels: usize,
        filters: usize,
        activation: ActivationFunction,
    ) -> Conv2d {
        let weights = truncated_normal_vec(rng, kernel * kernel * in_channels * filters, WEIGHT_STDDEV);
        Conv2d {
            kernel,
            in_channels,
            filters,
            weights,
            biases: vec![0.0; filters],
            activator: activation,
        }
    }

    #[inline]
    fn weight_row(&self, ky: usize, kx: usize, c: usize) -> usize {
        ((ky * self.kernel + kx) * self.in_channels + c) * self.filters
    }

    /// Linear part of the layer: z = W * x + b, before the activation.
    pub fn pre_activation(&self, input: &Tensor4) -> Tensor4 {
        assert_eq!(input.channels, self.in_channels, "conv input channel mismatch");

        let k = self.kernel;
        let pad = same_padding(k) as isize;
        let (h, w) = (input.height as isize, input.width as isize);
        let mut out = Tensor4::zeros(input.batch, input.height, input.width, self.filters);

        for b in 0..input.batch {
            for y in 0..input.height {
                for x in 0..input.width {
                    let o = out.offset(b, y, x);
                    let out_px = &mut out.data[o..o + self.filters];
                    out_px.copy_from_slice(&self.biases);

                    for ky in 0..k {
                        let iy = y as isize + ky as isize - pad;
                        if iy < 0 || iy >= h {
                            continue;
                        }
                        for kx in 0..k {
                            let ix = x as isize + kx as isize - pad;
                            if ix < 0 || ix >= w {
                                continue;
                            }
                            let in_px = input.pixel(b, iy as usize, ix as usize);
                            for (c, &v) in in_px.iter().enumerate() {
                                if v == 0.0 {
                                    continue;
                                }
                                let row = self.weight_row(ky, kx, c);
                                let w_row = &self.weights[row..row + self.filters];
                                for (acc, wv) in out_px.iter_mut().zip(w_row) {
                                    *acc += v * wv;
                                }
                            }
                        }
                    }
                }
            }
        }

        out
    }

    pub fn activate(&self, pre_activation: &Tensor4) -> Tensor4 {
        let mut out = pre_activation.clone();
        self.activator.apply_in_place(&mut out.data);
        out
    }

    /// Inference-only forward pass.
    pub fn forward(&self, input: &Tensor4) -> Tensor4 {
        let mut out = self.pre_activation(input);
        self.activator.apply_in_place(&mut out.data);
        out
    }

    /// Backpropagates `grad_output` (dL/d output activation).
    ///
    /// Returns the parameter gradients and dL/d input.
    pub fn backward(
        &self,
        input: &Tensor4,
        pre_activation: &Tensor4,
        mut grad_output: Tensor4,
    ) -> (ConvGradients, Tensor4) {
        assert_eq!(grad_output.shape(), pre_activation.shape(), "conv gradient shape mismatch");
        self.activator.backprop_in_place(&mut grad_output.data, &pre_activation.data);
        let delta = grad_output;

        let k = self.kernel;
        let pad = same_padding(k) as isize;
        let (h, w) = (input.height as isize, input.width as isize);
        let mut grads = ConvGradients {
            weights: vec![0.0; self.weights.len()],
            biases: vec![0.0; self.filters],
        };
        let mut grad_input = input.zeros_like();

        for b in 0..input.batch {
            for y in 0..input.height {
                for x in 0..input.width {
                    let d = delta.pixel(b, y, x);
                    for (g, dv) in grads.biases.iter_mut().zip(d) {
                        *g += dv;
                    }

                    for ky in 0..k {
                        let iy = y as isize + ky as isize - pad;
                        if iy < 0 || iy >= h {
                            continue;
                        }
                        for kx in 0..k {
                            let ix = x as isize + kx as isize - pad;
                            if ix < 0 || ix >= w {
                                continue;
                            }
                            let in_off = input.offset(b, iy as usize, ix as usize);
                            for c in 0..self.in_channels {
                                let v = input.data[in_off + c];
                                let row = self.weight_row(ky, kx, c);
                                let w_row = &self.weights[row..row + self.filters];
                                let gw_row = &mut grads.weights[row..row + self.filters];

                                let mut gi = 0.0;
                                for o in 0..self.filters {
                                    gw_row[o] += v * d[o];
                                    gi += w_row[o] * d[o];
                                }
                                grad_input.data[in_off + c] += gi;
                            }
                        }
                    }
                }
            }
        }

        (grads, grad_input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn identity_conv(kernel: usize) -> Conv2d {
        // Single filter that copies the centre tap of channel 0.
        let mut weights = vec![0.0; kernel * kernel];
        let c = same_padding(kernel);
        weights[c * kernel + c] = 1.0;
        Conv2d {
            kernel,
            in_channels: 1,
            filters: 1,
            weights,
            biases: vec![0.5],
            activator: ActivationFunction::Identity,
        }
    }

    #[test]
    fn same_padding_preserves_spatial_shape() {
        let mut rng = StdRng::seed_from_u64(1);
        let conv = Conv2d::new(&mut rng, 7, 3, 10, ActivationFunction::ReLU);
        let out = conv.forward(&Tensor4::zeros(2, 5, 9, 3));
        assert_eq!(out.shape(), [2, 5, 9, 10]);
    }

    #[test]
    fn centre_tap_copies_input_plus_bias() {
        let conv = identity_conv(3);
        let input = Tensor4::from_vec(1, 2, 2, 1, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(conv.forward(&input).data, vec![1.5, 2.5, 3.5, 4.5]);
    }

    #[test]
    fn weight_gradient_matches_finite_difference() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut conv = Conv2d::new(&mut rng, 3, 2, 2, ActivationFunction::Tanh);
        conv.weights.iter_mut().for_each(|w| *w *= 20.0);
        let input = Tensor4::from_vec(1, 3, 3, 2, (0..18).map(|i| (i as f32 * 0.37).sin()).collect());

        // L = sum(output), so dL/d output is all ones.
        let loss = |c: &Conv2d| c.forward(&input).data.iter().sum::<f32>();
        let pre = conv.pre_activation(&input);
        let ones = Tensor4::from_vec(1, 3, 3, 2, vec![1.0; 18]);
        let (grads, grad_input) = conv.backward(&input, &pre, ones);

        let eps = 1e-2;
        for &i in &[0, 5, 17, 30] {
            let mut plus = conv.clone();
            plus.weights[i] += eps;
            let mut minus = conv.clone();
            minus.weights[i] -= eps;
            let numeric = (loss(&plus) - loss(&minus)) / (2.0 * eps);
            assert!(
                (numeric - grads.weights[i]).abs() < 1e-2,
                "weight {i}: numeric {numeric} vs analytic {}",
                grads.weights[i]
            );
        }
        assert_eq!(grad_input.shape(), input.shape());
    }
}
