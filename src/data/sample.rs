use std::path::{Path, PathBuf};

/// Substring of a file name that marks an image as stego.
pub const STEGO_MARKER: &str = "stego_";

/// Label of clean cover images.
pub const CLEAN: usize = 0;
/// Label of images carrying an embedded payload.
pub const STEGO: usize = 1;

/// One image on disk. Its label is derived from the file name on demand and
/// never stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Sample {
    pub path: PathBuf,
}

impl Sample {
    pub fn new(path: impl Into<PathBuf>) -> Sample {
        Sample { path: path.into() }
    }

    pub fn label(&self) -> usize {
        label_for_path(&self.path)
    }
}

/// `STEGO` if the base name contains `stego_`, otherwise `CLEAN`.
/// Directory components are not inspected.
pub fn label_for_path(path: &Path) -> usize {
    match path.file_name() {
        Some(name) if name.to_string_lossy().contains(STEGO_MARKER) => STEGO,
        _ => CLEAN,
    }
}
