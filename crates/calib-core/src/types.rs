//! Core type definitions shared by the calibration crates.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Calibration algorithm the inference engine runs over the supplied batches.
///
/// The batch source behaves identically for both; the engine reads this to
/// decide which calibrator interface the source is registered under.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationAlgorithm {
    /// Entropy (KL-divergence) calibration, second revision
    #[default]
    Entropy2,
    /// Min/max range tracking
    MinMax,
}

impl std::fmt::Display for CalibrationAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CalibrationAlgorithm::Entropy2 => write!(f, "entropy2"),
            CalibrationAlgorithm::MinMax => write!(f, "minmax"),
        }
    }
}

impl std::str::FromStr for CalibrationAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "entropy" | "entropy2" => Ok(CalibrationAlgorithm::Entropy2),
            "minmax" | "min_max" => Ok(CalibrationAlgorithm::MinMax),
            other => Err(Error::InvalidArgument(format!(
                "unknown calibration algorithm: {other}"
            ))),
        }
    }
}

/// Fixed NCHW shape of every calibration batch
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchShape {
    /// Images per batch
    pub batch_size: usize,
    /// Channels per image (3 for RGB)
    pub channels: usize,
    /// Image height in pixels
    pub height: usize,
    /// Image width in pixels
    pub width: usize,
}

impl BatchShape {
    /// Creates a new batch shape
    pub fn new(batch_size: usize, channels: usize, height: usize, width: usize) -> Self {
        Self {
            batch_size,
            channels,
            height,
            width,
        }
    }

    /// Standard ImageNet input (Nx3x224x224)
    pub fn imagenet(batch_size: usize) -> Self {
        Self::new(batch_size, 3, 224, 224)
    }

    /// Number of f32 elements in one batch
    pub fn volume(&self) -> Result<usize> {
        self.image_volume()?
            .checked_mul(self.batch_size)
            .ok_or_else(|| self.overflow())
    }

    /// Number of f32 elements in one image
    pub fn image_volume(&self) -> Result<usize> {
        self.channels
            .checked_mul(self.height)
            .and_then(|v| v.checked_mul(self.width))
            .ok_or_else(|| self.overflow())
    }

    /// Size of one batch in bytes
    pub fn byte_size(&self) -> Result<usize> {
        self.volume()?
            .checked_mul(std::mem::size_of::<f32>())
            .ok_or_else(|| self.overflow())
    }

    fn overflow(&self) -> Error {
        Error::InvalidArgument(format!("batch shape {self} is too large to address"))
    }

    /// Shape as an `(n, c, h, w)` tuple
    pub fn dims(&self) -> (usize, usize, usize, usize) {
        (self.batch_size, self.channels, self.height, self.width)
    }

    /// Rejects degenerate or unaddressable shapes and non-RGB channel counts.
    pub fn validate(&self) -> Result<()> {
        if self.height > u32::MAX as usize || self.width > u32::MAX as usize {
            return Err(Error::InvalidArgument(format!(
                "image dimensions of {self} exceed {} pixels",
                u32::MAX
            )));
        }
        if self.byte_size()? == 0 {
            return Err(Error::InvalidArgument(format!(
                "batch shape has a zero dimension: {self}"
            )));
        }
        if self.channels != 3 {
            return Err(Error::InvalidArgument(format!(
                "calibration images are RGB, expected 3 channels, got {}",
                self.channels
            )));
        }
        Ok(())
    }
}

impl Default for BatchShape {
    fn default() -> Self {
        Self::imagenet(1)
    }
}

impl std::fmt::Display for BatchShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.batch_size, self.channels, self.height, self.width
        )
    }
}

/// Per-channel normalization statistics
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Normalization {
    /// Channel means [R, G, B]
    pub mean: [f32; 3],
    /// Channel standard deviations [R, G, B]
    pub std: [f32; 3],
}

impl Normalization {
    /// ImageNet statistics
    pub fn imagenet() -> Self {
        Self {
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
        }
    }

    /// Normalizes a value already scaled to [0, 1]
    #[inline]
    pub fn apply(&self, channel: usize, value: f32) -> f32 {
        (value - self.mean[channel]) / self.std[channel]
    }
}

impl Default for Normalization {
    fn default() -> Self {
        Self::imagenet()
    }
}

/// Address of device-resident memory handed across the callback boundary
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct DeviceAddress(pub u64);

impl DeviceAddress {
    /// Raw address value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Device backend type
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// CUDA device through the driver API
    #[default]
    Cuda,
    /// Host memory staging (dry runs, no GPU)
    Host,
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceKind::Cuda => write!(f, "cuda"),
            DeviceKind::Host => write!(f, "host"),
        }
    }
}
