use serde::{Serialize, Deserialize};

/// Adam optimizer: first-order, per-parameter adaptive step sizes.
///
/// Moment buffers are created lazily on the first step, one per parameter
/// tensor, and are matched to parameters by position. They are serializable
/// so a resumed run continues with the same moment estimates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adam {
    pub learning_rate: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
    time: u64,
    moment_1: Vec<Vec<f32>>,
    moment_2: Vec<Vec<f32>>,
}

impl Adam {
    pub const DEFAULT_BETA2: f32 = 0.999;
    pub const DEFAULT_EPSILON: f32 = 1e-8;

    pub fn new(learning_rate: f32, beta1: f32) -> Adam {
        Adam {
            learning_rate,
            beta1,
            beta2: Self::DEFAULT_BETA2,
            epsilon: Self::DEFAULT_EPSILON,
            time: 0,
            moment_1: Vec::new(),
            moment_2: Vec::new(),
        }
    }

    /// Number of steps taken so far.
    pub fn time(&self) -> u64 {
        self.time
    }

    /// Checks that saved moment buffers line up with parameter buffers of the
    /// given lengths. An optimizer that has not stepped yet always fits.
    pub fn check_moments(&self, lens: &[usize]) -> std::result::Result<(), String> {
        if self.moment_1.is_empty() && self.moment_2.is_empty() {
            return Ok(());
        }
        let fits = |moments: &[Vec<f32>]| {
            moments.len() == lens.len() && moments.iter().zip(lens).all(|(m, &n)| m.len() == n)
        };
        if fits(&self.moment_1[..]) && fits(&self.moment_2[..]) {
            Ok(())
        } else {
            Err("optimizer moments do not match the network parameters".into())
        }
    }

    /// Applies one update to every parameter tensor.
    ///
    /// `params[i]` is updated with `grads[i]`; both lists must keep the same
    /// order and lengths across calls.
    pub fn step(&mut self, params: Vec<&mut [f32]>, grads: Vec<&[f32]>) {
        assert_eq!(params.len(), grads.len(), "one gradient per parameter tensor");

        if self.moment_1.is_empty() {
            self.moment_1 = grads.iter().map(|g| vec![0.0; g.len()]).collect();
            self.moment_2 = self.moment_1.clone();
        }
        assert_eq!(self.moment_1.len(), params.len(), "parameter set changed between steps");

        self.time += 1;
        let t = self.time as i32;
        let correction = (1.0 - self.beta2.powi(t)).sqrt() / (1.0 - self.beta1.powi(t));
        let lr_t = self.learning_rate * correction;
        let (b1, b2, eps) = (self.beta1, self.beta2, self.epsilon);

        for (((param, grad), m), v) in params
            .into_iter()
            .zip(grads)
            .zip(self.moment_1.iter_mut())
            .zip(self.moment_2.iter_mut())
        {
            assert_eq!(param.len(), grad.len());
            for i in 0..param.len() {
                let g = grad[i];
                m[i] = b1 * m[i] + (1.0 - b1) * g;
                v[i] = b2 * v[i] + (1.0 - b2) * g * g;
                param[i] -= lr_t * m[i] / (v[i].sqrt() + eps);
            }
        }
    }
}
