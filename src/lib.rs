pub mod math;
pub mod activation;
pub mod layers;
pub mod network;
pub mod loss;
pub mod optim;
pub mod data;
pub mod train;
pub mod error;

// Convenience re-exports
pub use math::matrix::Matrix;
pub use math::tensor::Tensor4;
pub use activation::activation::ActivationFunction;
pub use network::network::Network;
pub use network::checkpoint::Checkpoint;
pub use network::spec::ImageShape;
pub use loss::cross_entropy::CrossEntropyLoss;
pub use optim::adam::Adam;
pub use train::train_config::TrainConfig;
pub use train::trainer::Steganalyzer;
pub use error::{Error, Result};
