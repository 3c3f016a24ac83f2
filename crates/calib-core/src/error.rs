//! Error types for int8 calibration batch sources.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for calibration batch sources.
#[derive(Error, Debug)]
pub enum Error {
    /// No usable device, or the execution context could not be created
    #[error("Device initialization error: {0}")]
    DeviceInit(String),

    /// Device operation (allocation, copy, context switch) failed
    #[error("Device error: {0}")]
    Device(String),

    /// Image missing or undecodable; aborts the in-flight batch
    #[error("Failed to load image {}: {reason}", path.display())]
    ImageLoad { path: PathBuf, reason: String },

    /// Calibration cache could not be read or written
    #[error("Calibration cache I/O error at {}: {source}", path.display())]
    CacheIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image pool error
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid argument error
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// Builds an [`Error::ImageLoad`] for `path`.
    pub fn image_load(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Error::ImageLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Builds an [`Error::CacheIo`] for `path`.
    pub fn cache_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::CacheIo {
            path: path.into(),
            source,
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

/// Specialized Result type for calibration operations.
pub type Result<T> = std::result::Result<T, Error>;
