pub mod conv2d;
pub mod dense;
pub mod high_pass;
pub mod max_pool;

pub use conv2d::{Conv2d, ConvGradients};
pub use dense::{Dense, DenseGradients};
pub use high_pass::HighPass;
pub use max_pool::{MaxPool2d, PoolOutput};
