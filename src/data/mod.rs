pub mod batch;
pub mod image_source;
pub mod prefetch;
pub mod sample;

pub use batch::{batch_count, one_hot_targets, plan_batches, Batch};
pub use image_source::{list_images, ImageSource};
pub use prefetch::Prefetcher;
pub use sample::{label_for_path, Sample};
