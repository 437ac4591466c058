use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use crate::data::batch::Batch;
use crate::data::image_source::ImageSource;
use crate::data::sample::Sample;
use crate::error::Result;

/// Decodes an epoch's batches on a background thread.
///
/// One producer walks the batch plan in order and pushes into a
/// `sync_channel` of capacity `depth`, so at most `depth` decoded batches
/// wait in memory and the consumer sees them in plan order. The producer
/// stops after the first error or when the consumer goes away.
pub struct Prefetcher {
    rx: Option<mpsc::Receiver<Result<Batch>>>,
    handle: Option<JoinHandle<()>>,
}

impl Prefetcher {
    pub fn spawn(plan: Vec<Vec<Sample>>, source: ImageSource, depth: usize) -> Prefetcher {
        let (tx, rx) = mpsc::sync_channel(depth.max(1));

        let handle = thread::spawn(move || {
            for samples in plan {
                let batch = Batch::load(&samples, &source);
                let failed = batch.is_err();
                // A send error means the receiver was dropped.
                if tx.send(batch).is_err() || failed {
                    break;
                }
            }
        });

        Prefetcher { rx: Some(rx), handle: Some(handle) }
    }
}

impl Iterator for Prefetcher {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rx.as_ref()?.recv().ok()
    }
}

impl Drop for Prefetcher {
    fn drop(&mut self) {
        // Drop the receiver first so a producer blocked on a full channel wakes up.
        self.rx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("batch prefetch thread panicked");
            }
        }
    }
}
