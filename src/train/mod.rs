pub mod epoch_stats;
pub mod evaluator;
pub mod loop_fn;
pub mod train_config;
pub mod trainer;

pub use epoch_stats::{AccuracySnapshot, EpochStats, TrainingReport, TrainingState};
pub use evaluator::{batch_accuracy, format_accuracy, mean_accuracy};
pub use train_config::TrainConfig;
pub use trainer::Steganalyzer;
