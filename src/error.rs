use std::path::PathBuf;

use thiserror::Error;

/// Every failure the library can surface.
///
/// Nothing is recovered locally: I/O, decode and shape errors all abort the
/// current training or evaluation run and propagate to the caller.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error on `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot decode image `{path}`: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("cannot list files with pattern `{pattern}`: {reason}")]
    Glob { pattern: String, reason: String },

    #[error("shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    #[error("checkpoint `{path}`: {reason}")]
    Checkpoint { path: PathBuf, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("loss or gradients became non-finite at step {step}")]
    NonFiniteLoss { step: usize },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io { path: path.into(), source }
    }

    pub(crate) fn shape(expected: impl ToString, actual: impl ToString) -> Self {
        Error::ShapeMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
