pub mod checkpoint;
pub mod network;
pub mod spec;

pub use checkpoint::{latest_step, Checkpoint};
pub use network::{ForwardTrace, Gradients, Network};
pub use spec::{ImageShape, LayerSpec, N_CLASSES};
