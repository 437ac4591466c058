use crate::data::image_source::ImageSource;
use crate::data::sample::Sample;
use crate::error::Result;
use crate::math::matrix::Matrix;
use crate::math::tensor::Tensor4;
use crate::network::spec::N_CLASSES;

/// Number of complete batches in one pass over `available` samples, capped
/// at `cap` samples. The remainder is dropped, never padded.
pub fn batch_count(available: usize, cap: usize, batch_size: usize) -> usize {
    available.min(cap) / batch_size
}

/// One-hot targets, one row per sample with the 1 at the sample's label.
pub fn one_hot_targets(samples: &[Sample]) -> Matrix {
    let mut targets = Matrix::zeros(samples.len(), N_CLASSES);
    for (row, sample) in samples.iter().enumerate() {
        targets.set(row, sample.label(), 1.0);
    }
    targets
}

/// A materialized mini-batch.
#[derive(Debug, Clone)]
pub struct Batch {
    /// `[batch, height, width, 3]`
    pub images: Tensor4,
    /// `[batch, 2]`
    pub targets: Matrix,
}

impl Batch {
    /// Decodes every sample, in order. The first failing file aborts the batch.
    pub fn load(samples: &[Sample], source: &ImageSource) -> Result<Batch> {
        let shape = source.shape;
        let mut data = Vec::with_capacity(samples.len() * shape.len());
        for sample in samples {
            data.extend(source.decode(&sample.path)?);
        }

        Ok(Batch {
            images: Tensor4::from_vec(samples.len(), shape.height, shape.width, shape.channels, data),
            targets: one_hot_targets(samples),
        })
    }

    pub fn len(&self) -> usize {
        self.images.batch
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Splits the first `n_batches * batch_size` samples into consecutive batches.
pub fn plan_batches(samples: &[Sample], n_batches: usize, batch_size: usize) -> Vec<Vec<Sample>> {
    samples
        .chunks_exact(batch_size)
        .take(n_batches)
        .map(|chunk| chunk.to_vec())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::sample::{CLEAN, STEGO};

    #[test]
    fn batch_count_drops_the_remainder() {
        assert_eq!(batch_count(8, usize::MAX, 2), 4);
        assert_eq!(batch_count(9, usize::MAX, 2), 4);
        assert_eq!(batch_count(1, usize::MAX, 2), 0);
        assert_eq!(batch_count(0, usize::MAX, 2), 0);
    }

    #[test]
    fn batch_count_respects_the_cap() {
        assert_eq!(batch_count(100, 10, 3), 3);
        assert_eq!(batch_count(100, 12, 3), 4);
        assert_eq!(batch_count(5, 12, 3), 1);
    }

    #[test]
    fn one_hot_rows_mark_the_derived_label() {
        let samples = vec![
            Sample::new("d/stego_1.png"),
            Sample::new("d/1.png"),
            Sample::new("d/x_stego_2.png"),
            Sample::new("stego_d/2.png"),
        ];
        let targets = one_hot_targets(&samples);
        assert_eq!((targets.rows, targets.cols), (4, 2));

        for (row, sample) in samples.iter().enumerate() {
            assert_eq!(targets.row(row).iter().sum::<f32>(), 1.0);
            assert_eq!(targets.get(row, sample.label()), 1.0);
        }
        assert_eq!(targets.row(0), &[0.0, 1.0]);
        assert_eq!(samples[3].label(), CLEAN);
        assert_eq!(samples[2].label(), STEGO);
    }

    #[test]
    fn plan_keeps_order_and_complete_batches_only() {
        let samples: Vec<Sample> = (0..7).map(|i| Sample::new(format!("{i}.png"))).collect();
        let plan = plan_batches(&samples, batch_count(samples.len(), usize::MAX, 3), 3);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[1][0], samples[3]);
        assert!(plan.iter().all(|b| b.len() == 3));
    }
}
