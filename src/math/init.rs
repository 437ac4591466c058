use rand::Rng;
use std::f32::consts::PI;

/// Standard deviation used for every convolutional and dense weight.
pub const WEIGHT_STDDEV: f32 = 0.02;

/// Samples a single value from N(0, 1) using the Box-Muller transform.
fn sample_standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f32 {
    // Draw two independent uniform samples in (0, 1] to avoid log(0).
    let u1: f32 = 1.0 - rng.gen::<f32>();
    let u2: f32 = 1.0 - rng.gen::<f32>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

/// Samples from N(0, std_dev) truncated to two standard deviations.
///
/// Values that land outside `[-2σ, 2σ]` are discarded and redrawn, so the
/// result is never further than two deviations from zero.
pub fn truncated_normal<R: Rng + ?Sized>(rng: &mut R, std_dev: f32) -> f32 {
    loop {
        let z = sample_standard_normal(rng);
        if z.abs() <= 2.0 {
            return z * std_dev;
        }
    }
}

/// A buffer of `len` truncated-normal weights.
pub fn truncated_normal_vec<R: Rng + ?Sized>(rng: &mut R, len: usize, std_dev: f32) -> Vec<f32> {
    (0..len).map(|_| truncated_normal(rng, std_dev)).collect()
}
