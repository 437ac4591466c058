use std::path::Path;

use crate::data::batch::{batch_count, plan_batches};
use crate::data::image_source::list_images;
use crate::data::sample::Sample;
use crate::error::Result;
use crate::math::matrix::Matrix;
use crate::train::trainer::Steganalyzer;

/// Fraction of rows whose predicted class (arg-max of `probabilities`)
/// equals the true class (arg-max of the one-hot `targets`).
pub fn batch_accuracy(probabilities: &Matrix, targets: &Matrix) -> f64 {
    assert_eq!(probabilities.rows, targets.rows, "one prediction per target");
    if targets.rows == 0 {
        return 0.0;
    }

    let correct = (0..targets.rows)
        .filter(|&r| probabilities.argmax_row(r) == targets.argmax_row(r))
        .count();
    correct as f64 / targets.rows as f64
}

/// Unweighted mean of per-batch accuracies; `None` when no batch was scored.
///
/// All scored batches have the same size, so this equals the per-sample
/// accuracy over the evaluated samples.
pub fn mean_accuracy(batch_accuracies: &[f64]) -> Option<f64> {
    if batch_accuracies.is_empty() {
        return None;
    }
    Some(batch_accuracies.iter().sum::<f64>() / batch_accuracies.len() as f64)
}

/// `"87.5%"`, or `"n/a"` when nothing was evaluated.
pub fn format_accuracy(accuracy: Option<f64>) -> String {
    match accuracy {
        Some(a) => format!("{:3.1}%", 100.0 * a),
        None => "n/a".into(),
    }
}

impl Steganalyzer {
    /// Inference-only accuracy over the images in `test_dir`.
    ///
    /// At most `n_files` files are considered (all when `None`), in path
    /// order. They are scored in complete batches of `batch_size`, capped by
    /// `train_size` like training; leftover files are skipped. Returns the
    /// mean of the per-batch accuracies, or `None` if not even one batch fits.
    pub fn accuracy(&self, test_dir: &Path, n_files: Option<usize>, absolute: bool) -> Result<Option<f64>> {
        let mut files = list_images(test_dir, &self.config.img_format, absolute)?;
        if let Some(n) = n_files {
            files.truncate(n);
        }
        log::info!("[TEST], test data folder: {}, n_files: {}", test_dir.display(), files.len());

        let samples: Vec<Sample> = files.into_iter().map(Sample::new).collect();
        let batch_size = self.config.batch_size;
        let n_batches = batch_count(samples.len(), self.config.train_size_cap(), batch_size);

        let mut accuracies = Vec::with_capacity(n_batches);
        for batch in self.batch_stream(plan_batches(&samples, n_batches, batch_size)) {
            let batch = batch?;
            let probabilities = self.network.forward(&batch.images)?;
            accuracies.push(batch_accuracy(&probabilities, &batch.targets));
        }

        Ok(mean_accuracy(&accuracies))
    }
}
