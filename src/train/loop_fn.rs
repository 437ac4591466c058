use std::path::PathBuf;
use std::time::Instant;

use rand::seq::SliceRandom;

use crate::data::batch::{batch_count, plan_batches, Batch};
use crate::data::image_source::list_images;
use crate::data::prefetch::Prefetcher;
use crate::data::sample::Sample;
use crate::error::Result;
use crate::train::epoch_stats::{AccuracySnapshot, EpochStats, TrainingReport, TrainingState};
use crate::train::evaluator::format_accuracy;
use crate::train::trainer::Steganalyzer;

// ---------------------------------------------------------------------------
// Public entry point
// ---------------------------------------------------------------------------

impl Steganalyzer {
    /// Trains for `config.epoch` epochs and returns the run's report.
    ///
    /// # Arguments
    /// - `counter`  — global step to start from; with `need_to_load` it is also
    ///                the checkpoint step restored before training
    /// - `gen_dirs` — extra folders of generated samples, scored alongside the
    ///                test folder at every accuracy check
    ///
    /// Every `eval_every` global steps the test folder and each generated
    /// folder are scored and logged. With `save_checkpoints` a checkpoint is
    /// written at every such check and once more at the end.
    ///
    /// # Errors
    /// A missing train, test or generated folder fails before the first step.
    /// Any unreadable image, size mismatch, failed checkpoint load or
    /// non-finite loss aborts the run.
    pub fn train(&mut self, counter: usize, gen_dirs: &[PathBuf]) -> Result<TrainingReport> {
        let t_start = Instant::now();
        log::info!("Training started");

        if self.config.need_to_load {
            self.load(counter)?;
        }

        self.data = list_images(&self.config.train_dir(), &self.config.img_format, false)?
            .into_iter()
            .map(Sample::new)
            .collect();
        log::info!("Total amount of images: {}", self.data.len());

        // Evaluation folders are first scored at step `eval_every`; check them now.
        list_images(&self.test_dir, &self.config.img_format, false)?;
        for dir in gen_dirs {
            list_images(&self.config.resolve_dir(dir), &self.config.img_format, false)?;
        }

        let n_batches = batch_count(self.data.len(), self.config.train_size_cap(), self.config.batch_size);
        let mut state = TrainingState::starting_at(counter);

        for epoch in 0..self.config.epoch {
            state.epoch = epoch;
            self.run_one_epoch(&mut state, n_batches, gen_dirs)?;
        }

        if self.config.save_checkpoints {
            self.save(state.global_step)?;
        }

        log::info!(
            "Training finished in {:.1}s, {} steps",
            t_start.elapsed().as_secs_f64(),
            state.global_step - counter
        );
        Ok(state.into_report())
    }

    /// Batches for `plan`, decoded on a worker thread when `prefetch_depth`
    /// is non-zero and inline otherwise. Either way they arrive in plan order.
    pub(crate) fn batch_stream(&self, plan: Vec<Vec<Sample>>) -> Box<dyn Iterator<Item = Result<Batch>>> {
        let source = self.source;
        if self.config.prefetch_depth > 0 {
            Box::new(Prefetcher::spawn(plan, source, self.config.prefetch_depth))
        } else {
            Box::new(plan.into_iter().map(move |samples| Batch::load(&samples, &source)))
        }
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

impl Steganalyzer {
    /// Shuffles the sample list and runs `n_batches` optimizer steps.
    fn run_one_epoch(&mut self, state: &mut TrainingState, n_batches: usize, gen_dirs: &[PathBuf]) -> Result<()> {
        let t_start = Instant::now();
        self.data.shuffle(&mut self.rng);
        state.epoch_losses.clear();

        log::info!("Starting epoch {}", state.epoch);

        let plan = plan_batches(&self.data, n_batches, self.config.batch_size);
        for (idx, batch) in self.batch_stream(plan).enumerate() {
            let batch = batch?;
            let loss = self.train_step(&batch, state.global_step)?;
            state.epoch_losses.push(loss);

            log::debug!(
                "[ITERATION] Epoch [{:2}], iteration [{:4}/{:4}] time: {:4.4}, loss: {:8.6}",
                state.epoch,
                idx,
                n_batches,
                t_start.elapsed().as_secs_f64(),
                loss
            );

            state.global_step += 1;
            if state.global_step % self.config.eval_every == 0 {
                self.check_accuracy(state, gen_dirs)?;
            }
        }

        state.epochs.push(EpochStats {
            epoch: state.epoch + 1,
            total_epochs: self.config.epoch,
            batches: state.epoch_losses.len(),
            train_loss: state.epoch_mean_loss(),
            elapsed_ms: t_start.elapsed().as_millis() as u64,
        });
        Ok(())
    }

    /// Scores the test folder and every generated folder, records a snapshot
    /// and optionally checkpoints.
    fn check_accuracy(&self, state: &mut TrainingState, gen_dirs: &[PathBuf]) -> Result<()> {
        log::info!("------");

        let test_accuracy = self.accuracy(&self.test_dir, None, false)?;
        log::info!("[TEST] Epoch {:2} accuracy: {}", state.epoch + 1, format_accuracy(test_accuracy));

        let mut generated = Vec::with_capacity(gen_dirs.len());
        for dir in gen_dirs {
            let dir = self.config.resolve_dir(dir);
            let accuracy = self.accuracy(&dir, None, false)?;
            log::info!("[GEN_TEST] Folder {}, accuracy: {}", dir.display(), format_accuracy(accuracy));
            generated.push((dir, accuracy));
        }

        state.snapshots.push(AccuracySnapshot {
            step: state.global_step,
            epoch: state.epoch + 1,
            test_accuracy,
            generated,
        });

        if self.config.save_checkpoints {
            self.save(state.global_step)?;
        }
        Ok(())
    }
}
