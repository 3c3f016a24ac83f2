//! Calibration cache persistence.
//!
//! The cache is an opaque blob produced by the engine once calibration is
//! done. A later run that finds it skips calibration entirely.

use calib_core::{Error, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Calibration cache file at a fixed path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibrationCache {
    path: PathBuf,
}

impl CalibrationCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a cache file is present
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Full cache contents, or `None` when absent or unreadable.
    pub fn read(&self) -> Option<Vec<u8>> {
        match fs::read(&self.path) {
            Ok(bytes) => {
                info!(
                    "Found calibration cache {} ({} bytes)",
                    self.path.display(),
                    bytes.len()
                );
                Some(bytes)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No calibration cache at {}", self.path.display());
                None
            }
            Err(e) => {
                warn!(
                    "{}; calibrating from scratch",
                    Error::cache_io(&self.path, e)
                );
                None
            }
        }
    }

    /// Overwrites the cache with `bytes`, creating parent directories.
    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::cache_io(parent, e))?;
        }

        fs::write(&self.path, bytes).map_err(|e| Error::cache_io(&self.path, e))?;
        info!(
            "Saved calibration cache {} ({} bytes)",
            self.path.display(),
            bytes.len()
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_missing_cache() {
        let dir = TempDir::new().unwrap();
        let cache = CalibrationCache::new(dir.path().join("int8.cache"));
        assert!(!cache.exists());
        assert!(cache.read().is_none());
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let cache = CalibrationCache::new(dir.path().join("int8.cache"));
        let blob: Vec<u8> = (0..=255u8).chain([0, 0, 7]).collect();

        cache.write(&blob).unwrap();
        assert_eq!(cache.read(), Some(blob));
    }

    #[test]
    fn test_write_overwrites() {
        let dir = TempDir::new().unwrap();
        let cache = CalibrationCache::new(dir.path().join("int8.cache"));

        cache.write(b"first calibration table, longer").unwrap();
        cache.write(b"second").unwrap();
        assert_eq!(cache.read().as_deref(), Some(&b"second"[..]));
    }

    #[test]
    fn test_write_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let cache = CalibrationCache::new(dir.path().join("models/resnet50/int8.cache"));
        cache.write(b"TRT-8601-EntropyCalibration2").unwrap();
        assert!(cache.exists());
    }

    #[test]
    fn test_unreadable_cache_is_treated_as_absent() {
        let dir = TempDir::new().unwrap();
        // A directory where the file should be fails to read with a non-NotFound error
        let cache = CalibrationCache::new(dir.path());
        assert!(cache.read().is_none());
    }

    #[test]
    fn test_write_failure_propagates() {
        let dir = TempDir::new().unwrap();
        let cache = CalibrationCache::new(dir.path());
        let err = cache.write(b"blob").unwrap_err();
        assert!(matches!(err, Error::CacheIo { .. }));
    }
}
