use serde::{Serialize, Deserialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivationFunction {
    ReLU,
    Tanh,
    Identity,
    /// Softmax is a vector-valued activation; it is applied row-wise by
    /// `softmax_rows()`. The element-wise `function()` and `derivative()`
    /// methods are therefore not used for this variant.
    Softmax,
}

impl ActivationFunction {
    /// Element-wise activation. For `Softmax`, call `softmax_rows()`.
    pub fn function(&self, x: f32) -> f32 {
        match self {
            // NaN passes through so a poisoned input still shows up in the loss.
            ActivationFunction::ReLU => if x > 0.0 || x.is_nan() { x } else { 0.0 },
            ActivationFunction::Tanh => x.tanh(),
            ActivationFunction::Identity => x,
            ActivationFunction::Softmax => {
                panic!("ActivationFunction::Softmax::function() must not be called directly; \
                        use softmax_rows() which applies the full-vector softmax.")
            }
        }
    }

    /// Element-wise derivative evaluated at the pre-activation `x`.
    ///
    /// For `Softmax`, the output layer is always paired with cross-entropy and
    /// the combined gradient `predicted - expected` is produced by the loss.
    /// Returning `1.0` passes that delta through unchanged.
    pub fn derivative(&self, x: f32) -> f32 {
        match self {
            ActivationFunction::ReLU => if x > 0.0 { 1.0 } else { 0.0 },
            ActivationFunction::Tanh => {
                let t = x.tanh();
                1.0 - t * t
            }
            ActivationFunction::Identity => 1.0,
            ActivationFunction::Softmax => 1.0,
        }
    }

    /// Applies the activation in place over a flat buffer of pre-activations.
    pub fn apply_in_place(&self, values: &mut [f32]) {
        match self {
            ActivationFunction::Identity => {}
            ActivationFunction::Softmax => {
                panic!("softmax needs a row length; use softmax_rows()")
            }
            _ => values.iter_mut().for_each(|v| *v = self.function(*v)),
        }
    }

    /// Multiplies `delta` (gradient w.r.t. the activation output) by the
    /// activation derivative at `pre_activation`, turning it into the gradient
    /// w.r.t. the pre-activation.
    pub fn backprop_in_place(&self, delta: &mut [f32], pre_activation: &[f32]) {
        assert_eq!(delta.len(), pre_activation.len());
        if matches!(self, ActivationFunction::Identity | ActivationFunction::Softmax) {
            return;
        }
        for (d, &z) in delta.iter_mut().zip(pre_activation) {
            *d *= self.derivative(z);
        }
    }
}

/// Row-wise softmax over `values`, interpreted as rows of length `row_len`.
///
/// Each row is shifted by its maximum before exponentiation so large logits
/// cannot overflow.
pub fn softmax_rows(values: &mut [f32], row_len: usize) {
    for row in values.chunks_exact_mut(row_len) {
        let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mut sum = 0.0;
        for v in row.iter_mut() {
            *v = (*v - max).exp();
            sum += *v;
        }
        for v in row.iter_mut() {
            *v /= sum;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relu_masks_negative_inputs() {
        let mut v = [-1.0, 0.0, 2.5];
        ActivationFunction::ReLU.apply_in_place(&mut v);
        assert_eq!(v, [0.0, 0.0, 2.5]);

        let mut delta = [1.0, 1.0, 1.0];
        ActivationFunction::ReLU.backprop_in_place(&mut delta, &[-1.0, 0.0, 2.5]);
        assert_eq!(delta, [0.0, 0.0, 1.0]);
    }

    #[test]
    fn relu_keeps_nan() {
        let mut v = [f32::NAN, -1.0];
        ActivationFunction::ReLU.apply_in_place(&mut v);
        assert!(v[0].is_nan());
        assert_eq!(v[1], 0.0);
    }

    #[test]
    fn tanh_derivative_is_one_at_origin() {
        assert!((ActivationFunction::Tanh.derivative(0.0) - 1.0).abs() < 1e-6);
        assert!(ActivationFunction::Tanh.derivative(3.0) < 0.01);
    }

    #[test]
    fn softmax_rows_sum_to_one_even_for_large_logits() {
        let mut v = [1000.0, 1001.0, -5.0, 5.0];
        softmax_rows(&mut v, 2);
        assert!((v[0] + v[1] - 1.0).abs() < 1e-6);
        assert!((v[2] + v[3] - 1.0).abs() < 1e-6);
        assert!(v[1] > v[0]);
        assert!(v.iter().all(|x| x.is_finite()));
    }
}
