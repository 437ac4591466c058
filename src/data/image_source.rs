/// Image enumeration and decoding.
///
/// Files are listed non-recursively with a `*.<format>` glob and decoded into
/// RGB pixels scaled from [0, 255] to [-1, 1], laid out H, W, C.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use globwalk::DirEntry;
use image::imageops::FilterType;

use crate::error::{Error, Result};
use crate::network::spec::ImageShape;

/// Lists the files in `dir` whose extension is `img_format`, sorted by path.
///
/// With `absolute` the paths are canonicalized; otherwise they are `dir`
/// joined with the file name. A missing directory is an error.
pub fn list_images(dir: &Path, img_format: &str, absolute: bool) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(Error::io(
            dir,
            io::Error::new(io::ErrorKind::NotFound, "image directory does not exist"),
        ));
    }

    let pattern = format!("*.{img_format}");
    let walker = globwalk::GlobWalkerBuilder::from_patterns(dir, &[pattern.as_str()])
        .max_depth(1)
        .follow_links(true)
        .sort_by(|p1: &DirEntry, p2: &DirEntry| p1.path().cmp(p2.path()))
        .build()
        .map_err(|err| Error::Glob { pattern: pattern.clone(), reason: err.to_string() })?;

    let mut paths = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|err| Error::Glob {
            pattern: pattern.clone(),
            reason: err.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let path = if absolute {
            fs::canonicalize(path).map_err(|e| Error::io(path, e))?
        } else {
            path.to_path_buf()
        };
        paths.push(path);
    }

    Ok(paths)
}

/// Decodes image files into fixed-size RGB pixel buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSource {
    pub shape: ImageShape,
    /// Resize images of another size instead of rejecting them.
    pub resize: bool,
}

impl ImageSource {
    pub fn new(image_size: usize, resize: bool) -> ImageSource {
        ImageSource { shape: ImageShape::square_rgb(image_size), resize }
    }

    /// Decodes `path` into `height * width * 3` values in [-1, 1].
    ///
    /// An image whose dimensions differ from the configured shape is a
    /// `ShapeMismatch` unless `resize` is set.
    pub fn decode(&self, path: &Path) -> Result<Vec<f32>> {
        let img = image::open(path).map_err(|source| Error::Image {
            path: path.to_path_buf(),
            source,
        })?;

        let (w, h) = (self.shape.width as u32, self.shape.height as u32);
        let img = if (img.width(), img.height()) == (w, h) {
            img
        } else if self.resize {
            img.resize_exact(w, h, FilterType::Lanczos3)
        } else {
            return Err(Error::shape(
                format!("{}x{} image", w, h),
                format!("{}x{} in `{}`", img.width(), img.height(), path.display()),
            ));
        };

        let rgb = img.to_rgb8();
        Ok(rgb
            .pixels()
            .flat_map(|p| p.0.iter().map(|&c| c as f32 / 127.5 - 1.0))
            .collect())
    }
}
