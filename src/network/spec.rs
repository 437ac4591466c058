use serde::{Serialize, Deserialize};
use std::fmt;

use crate::activation::activation::ActivationFunction;

/// Number of output classes: clean (0) and stego (1).
pub const N_CLASSES: usize = 2;

/// Shape of one input image, height x width x channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageShape {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl ImageShape {
    /// Square RGB image of side `size`.
    pub fn square_rgb(size: usize) -> ImageShape {
        ImageShape { height: size, width: size, channels: 3 }
    }

    pub fn len(&self) -> usize {
        self.height * self.width * self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for ImageShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.height, self.width, self.channels)
    }
}

/// Describes one stage of the network.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LayerSpec {
    /// Stride-1 same-padded convolution.
    Conv { filters: usize, kernel: usize, activation: ActivationFunction },
    /// Stride-1 same-padded max-pooling.
    MaxPool { window: usize },
    /// `[B, H, W, C]` -> `[B, H*W*C]`.
    Flatten,
    Dense { size: usize, activation: ActivationFunction },
}

impl LayerSpec {
    /// The steganalyzer architecture, input to output.
    ///
    /// The high-pass preprocessing filter runs before the first entry and is
    /// not listed because it has no parameters.
    pub fn steganalyzer() -> Vec<LayerSpec> {
        use ActivationFunction::*;
        vec![
            LayerSpec::Conv { filters: 10, kernel: 7, activation: ReLU },
            LayerSpec::Conv { filters: 20, kernel: 5, activation: ReLU },
            LayerSpec::MaxPool { window: 4 },
            LayerSpec::Conv { filters: 30, kernel: 3, activation: ReLU },
            LayerSpec::Conv { filters: 40, kernel: 3, activation: ReLU },
            LayerSpec::MaxPool { window: 2 },
            LayerSpec::Flatten,
            LayerSpec::Dense { size: 100, activation: Tanh },
            LayerSpec::Dense { size: N_CLASSES, activation: Softmax },
        ]
    }
}

impl fmt::Display for LayerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerSpec::Conv { filters, kernel, activation } => {
                write!(f, "conv {kernel}x{kernel}x{filters} ({activation:?})")
            }
            LayerSpec::MaxPool { window } => write!(f, "max-pool {window}x{window}"),
            LayerSpec::Flatten => write!(f, "flatten"),
            LayerSpec::Dense { size, activation } => write!(f, "dense {size} ({activation:?})"),
        }
    }
}
