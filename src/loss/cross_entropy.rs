use crate::math::matrix::Matrix;

/// Softmax cross-entropy computed directly from logits.
///
/// Softmax and the log are fused through log-sum-exp, so large logits never
/// produce `log(0)` or overflow.
pub struct CrossEntropyLoss;

impl CrossEntropyLoss {
    /// Mean over the batch of `-sum(target * log_softmax(logits))`.
    ///
    /// `logits` and `targets` are both `[batch, n_classes]`.
    pub fn loss(logits: &Matrix, targets: &Matrix) -> f32 {
        assert_eq!((logits.rows, logits.cols), (targets.rows, targets.cols));
        if logits.rows == 0 {
            return 0.0;
        }

        let total: f32 = (0..logits.rows)
            .map(|r| {
                let z = logits.row(r);
                let lse = log_sum_exp(z);
                z.iter()
                    .zip(targets.row(r))
                    .map(|(zi, ti)| -ti * (zi - lse))
                    .sum::<f32>()
            })
            .sum();

        total / logits.rows as f32
    }

    /// Gradient of the mean loss w.r.t. the logits:
    ///   ∂L/∂z = (softmax(z) - target) / batch
    pub fn derivative(logits: &Matrix, targets: &Matrix) -> Matrix {
        assert_eq!((logits.rows, logits.cols), (targets.rows, targets.cols));
        let inv_batch = 1.0 / logits.rows.max(1) as f32;
        let mut grad = Matrix::zeros(logits.rows, logits.cols);

        for r in 0..logits.rows {
            let z = logits.row(r);
            let lse = log_sum_exp(z);
            let t = targets.row(r);
            for (c, g) in grad.row_mut(r).iter_mut().enumerate() {
                *g = ((z[c] - lse).exp() - t[c]) * inv_batch;
            }
        }

        grad
    }
}

fn log_sum_exp(z: &[f32]) -> f32 {
    let max = z.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    max + z.iter().map(|v| (v - max).exp()).sum::<f32>().ln()
}
