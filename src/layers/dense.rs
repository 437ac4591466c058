use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::activation::activation::{softmax_rows, ActivationFunction};
use crate::math::init::{truncated_normal_vec, WEIGHT_STDDEV};
use crate::math::matrix::Matrix;

/// Fully-connected layer operating on a whole batch at once.
///
/// `weights` is `(input_size, size)`, so a `[batch, input_size]` input maps to
/// `[batch, size]` with a single matrix product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dense {
    pub size: usize,
    pub input_size: usize,
    pub weights: Matrix,
    pub biases: Vec<f32>,
    pub activator: ActivationFunction,
}

/// Gradients of the loss w.r.t. one `Dense` layer's parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseGradients {
    pub weights: Matrix,
    pub biases: Vec<f32>,
}

impl Dense {
    pub fn new<R: Rng + ?Sized>(
        rng: &mut R,
        size: usize,
        input_size: usize,
        activation: ActivationFunction,
    ) -> Dense {
        let weights = Matrix::from_vec(
            input_size,
            size,
            truncated_normal_vec(rng, input_size * size, WEIGHT_STDDEV),
        );

        Dense {
            size,
            input_size,
            weights,
            biases: vec![0.0; size],
            activator: activation,
        }
    }

    /// z = x W + b
    pub fn pre_activation(&self, input: &Matrix) -> Matrix {
        assert_eq!(input.cols, self.input_size, "dense input width mismatch");
        let mut z = input * &self.weights;
        z.add_row_vector(&self.biases);
        z
    }

    pub fn activate(&self, pre_activation: &Matrix) -> Matrix {
        let mut a = pre_activation.clone();
        match self.activator {
            ActivationFunction::Softmax => softmax_rows(&mut a.data, self.size),
            activator => activator.apply_in_place(&mut a.data),
        }
        a
    }

    pub fn forward(&self, input: &Matrix) -> Matrix {
        self.activate(&self.pre_activation(input))
    }

    /// Computes gradient adjustments for a batch.
    ///
    /// `delta` is dL/da for this layer (error in activation space), one row per
    /// sample. Returns the parameter gradients summed over the batch and
    /// dL/d input, the delta for the previous layer.
    pub fn compute_gradients(
        &self,
        delta: Matrix,
        pre_activation: &Matrix,
        inputs: &Matrix,
    ) -> (DenseGradients, Matrix) {
        // Use pre-activation z so that derivative(z) = σ'(z) is computed correctly
        let mut layer_delta = delta;
        self.activator.backprop_in_place(&mut layer_delta.data, &pre_activation.data);

        let weights_grad = &inputs.transpose() * &layer_delta;
        let biases_grad = layer_delta.column_sums();
        let input_delta = &layer_delta * &self.weights.transpose();

        (DenseGradients { weights: weights_grad, biases: biases_grad }, input_delta)
    }
}
