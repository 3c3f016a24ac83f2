//! Calibration image pool and image decoding.
//!
//! The pool is read once from a flat directory and never changes afterwards.

use calib_core::{Error, Result};
use image::{DynamicImage, ImageReader};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Ordered, bounded list of calibration image paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePool {
    paths: Vec<PathBuf>,
}

impl ImagePool {
    /// Creates a pool from explicit paths, keeping at most `max_images`.
    pub fn from_paths(mut paths: Vec<PathBuf>, max_images: usize) -> Self {
        paths.truncate(max_images);
        Self { paths }
    }

    /// Scans `dir` (non-recursively) for files whose name ends with `suffix`.
    ///
    /// The suffix match is case-sensitive. Matches are sorted by path before
    /// the `max_images` cap is applied so a seeded run samples the same pool
    /// on every filesystem.
    pub fn scan(dir: &Path, suffix: &str, max_images: usize) -> Result<Self> {
        if !dir.exists() {
            return Err(Error::Dataset(format!(
                "Calibration directory not found: {}",
                dir.display()
            )));
        }

        if !dir.is_dir() {
            return Err(Error::InvalidArgument(format!(
                "Path is not a directory: {}",
                dir.display()
            )));
        }

        let mut images = Vec::new();

        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();

            if !path.is_file() {
                continue;
            }

            let matches = path
                .file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.ends_with(suffix))
                .unwrap_or(false);

            if matches {
                images.push(path);
            }
        }

        images.sort();

        let found = images.len();
        if found > max_images {
            warn!(
                "{} images match {:?} in {}, keeping the first {}",
                found,
                suffix,
                dir.display(),
                max_images
            );
        }

        let pool = Self::from_paths(images, max_images);
        debug!("Image pool holds {} images from {}", pool.len(), dir.display());

        Ok(pool)
    }

    /// Number of images in the pool
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Checks if the pool is empty
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Path at `index`
    pub fn get(&self, index: usize) -> Option<&Path> {
        self.paths.get(index).map(PathBuf::as_path)
    }

    /// All paths in pool order
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

/// Decodes a colour image, sniffing the format from the file contents.
pub fn load_image(path: &Path) -> Result<DynamicImage> {
    ImageReader::open(path)
        .map_err(|e| Error::image_load(path, e))?
        .with_guessed_format()
        .map_err(|e| Error::image_load(path, e))?
        .decode()
        .map_err(|e| Error::image_load(path, e))
}
