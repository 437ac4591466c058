use std::path::{Path, PathBuf};

use serde::{Serialize, Deserialize};

use crate::error::{Error, Result};

/// Per-epoch training statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    /// 1-based epoch number.
    pub epoch: usize,
    /// Total epochs requested for this run.
    pub total_epochs: usize,
    /// Complete batches processed this epoch.
    pub batches: usize,
    /// Mean training loss over the epoch's batches; `None` if no batch ran.
    pub train_loss: Option<f64>,
    /// Wall-clock duration of this single epoch in milliseconds.
    pub elapsed_ms: u64,
}

/// Held-out accuracy measured at one global step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracySnapshot {
    pub step: usize,
    /// 1-based epoch in which the check ran.
    pub epoch: usize,
    /// Accuracy on the test folder; `None` when it holds less than one batch.
    pub test_accuracy: Option<f64>,
    /// Accuracy on each generated-sample folder, in the order supplied.
    pub generated: Vec<(PathBuf, Option<f64>)>,
}

/// Mutable bookkeeping of a training run.
#[derive(Debug, Clone, Default)]
pub struct TrainingState {
    /// 0-based index of the running epoch.
    pub epoch: usize,
    pub global_step: usize,
    /// Losses of the batches run so far in the current epoch.
    pub epoch_losses: Vec<f32>,
    pub epochs: Vec<EpochStats>,
    pub snapshots: Vec<AccuracySnapshot>,
}

impl TrainingState {
    pub fn starting_at(step: usize) -> TrainingState {
        TrainingState { global_step: step, ..TrainingState::default() }
    }

    /// Mean of `epoch_losses`, or `None` for an empty epoch.
    pub fn epoch_mean_loss(&self) -> Option<f64> {
        if self.epoch_losses.is_empty() {
            return None;
        }
        let sum: f64 = self.epoch_losses.iter().map(|&l| l as f64).sum();
        Some(sum / self.epoch_losses.len() as f64)
    }

    /// Snapshot with the highest test accuracy; the earliest wins ties.
    pub fn best_snapshot(&self) -> Option<&AccuracySnapshot> {
        let mut best: Option<&AccuracySnapshot> = None;
        for snap in &self.snapshots {
            let Some(acc) = snap.test_accuracy else { continue };
            if best.and_then(|b| b.test_accuracy).map_or(true, |b| acc > b) {
                best = Some(snap);
            }
        }
        best
    }

    pub fn into_report(self) -> TrainingReport {
        let best = self.best_snapshot().cloned();
        TrainingReport {
            final_step: self.global_step,
            epochs: self.epochs,
            snapshots: self.snapshots,
            best,
        }
    }
}

/// Summary handed back when `train` completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub final_step: usize,
    pub epochs: Vec<EpochStats>,
    pub snapshots: Vec<AccuracySnapshot>,
    pub best: Option<AccuracySnapshot>,
}

impl TrainingReport {
    /// Serializes the report to a pretty-printed JSON file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path).map_err(|e| Error::io(path, e))?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(step: usize, acc: Option<f64>) -> AccuracySnapshot {
        AccuracySnapshot { step, epoch: 1, test_accuracy: acc, generated: vec![] }
    }

    #[test]
    fn mean_loss_of_an_empty_epoch_is_none() {
        let mut state = TrainingState::starting_at(1);
        assert_eq!(state.epoch_mean_loss(), None);
        state.epoch_losses = vec![1.0, 2.0, 4.5];
        assert_eq!(state.epoch_mean_loss(), Some(2.5));
    }

    #[test]
    fn best_snapshot_skips_missing_and_keeps_earliest_tie() {
        let mut state = TrainingState::starting_at(1);
        state.snapshots = vec![snap(300, None), snap(600, Some(0.7)), snap(900, Some(0.7)), snap(1200, Some(0.4))];
        assert_eq!(state.best_snapshot().map(|s| s.step), Some(600));

        let report = state.into_report();
        assert_eq!(report.best.map(|s| s.step), Some(600));
        assert_eq!(report.final_step, 1);
    }
}
