//! Configuration structures for calibration batch sources.

use crate::error::{Error, Result};
use crate::types::{BatchShape, CalibrationAlgorithm, DeviceKind, Normalization};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Hard cap on the number of images read into the pool
pub const DEFAULT_MAX_IMAGES: usize = 500;

/// File name suffix of calibration images
pub const DEFAULT_IMAGE_SUFFIX: &str = ".JPEG";

/// Main configuration for a calibration batch source
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibratorConfig {
    /// Image pool configuration
    pub data: DataConfig,
    /// Calibration run parameters
    pub calibration: CalibrationParams,
    /// Image preprocessing parameters
    pub preprocess: PreprocessParams,
    /// Device configuration
    pub device: DeviceConfig,
}

impl CalibratorConfig {
    /// Checks the invariants construction relies on
    pub fn validate(&self) -> Result<()> {
        self.calibration.batch_shape.validate()?;

        if self.data.max_images == 0 {
            return Err(Error::Config("data.max_images must be at least 1".to_string()));
        }

        if self.calibration.batch_shape.batch_size > self.data.max_images {
            return Err(Error::Config(format!(
                "batch size {} exceeds the image pool cap {}",
                self.calibration.batch_shape.batch_size, self.data.max_images
            )));
        }

        if self
            .preprocess
            .normalization
            .std
            .iter()
            .any(|s| !s.is_finite() || *s == 0.0)
        {
            return Err(Error::Config(
                "normalization std must be finite and non-zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Image pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Directory holding calibration images
    pub image_dir: PathBuf,
    /// Case-sensitive file name suffix selecting images
    pub suffix: String,
    /// Maximum number of images kept in the pool
    pub max_images: usize,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            image_dir: PathBuf::from("data/calibration"),
            suffix: DEFAULT_IMAGE_SUFFIX.to_string(),
            max_images: DEFAULT_MAX_IMAGES,
        }
    }
}

/// Calibration run parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationParams {
    /// Algorithm the engine runs over the batches
    pub algorithm: CalibrationAlgorithm,
    /// Number of batches handed to the engine
    pub num_steps: usize,
    /// Shape of every batch
    pub batch_shape: BatchShape,
    /// Calibration cache file
    pub cache_file: PathBuf,
    /// Random seed for batch sampling; entropy-seeded when absent
    pub seed: Option<u64>,
}

impl Default for CalibrationParams {
    fn default() -> Self {
        Self {
            algorithm: CalibrationAlgorithm::default(),
            num_steps: 10,
            batch_shape: BatchShape::imagenet(1),
            cache_file: PathBuf::from("int8.cache"),
            seed: None,
        }
    }
}

/// Resampling filter used when resizing calibration images
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResizeFilter {
    /// Nearest neighbour
    Nearest,
    /// Bilinear
    #[default]
    Triangle,
    /// Bicubic (Catmull-Rom)
    CatmullRom,
    /// Lanczos with window 3
    Lanczos3,
}

/// Image preprocessing parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessParams {
    /// Per-channel normalization
    pub normalization: Normalization,
    /// Resize filter
    pub filter: ResizeFilter,
}

/// Device configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Device backend
    pub kind: DeviceKind,
    /// CUDA device ordinal
    pub ordinal: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CalibratorConfig::default();
        assert_eq!(config.data.max_images, 500);
        assert_eq!(config.data.suffix, ".JPEG");
        assert_eq!(config.calibration.batch_shape, BatchShape::imagenet(1));
        assert_eq!(config.device.ordinal, 0);
        assert_eq!(config.device.kind, DeviceKind::Cuda);
        assert!(config.calibration.seed.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: CalibratorConfig = toml::from_str(
            r#"
            [data]
            image_dir = "/datasets/imagenet/val"

            [calibration]
            algorithm = "min_max"
            num_steps = 20
            cache_file = "resnet50.int8.cache"
            seed = 7
            batch_shape = { batch_size = 8, channels = 3, height = 224, width = 224 }

            [device]
            kind = "host"
            "#,
        )
        .unwrap();

        assert_eq!(config.data.image_dir, PathBuf::from("/datasets/imagenet/val"));
        assert_eq!(config.data.max_images, 500);
        assert_eq!(config.calibration.algorithm, CalibrationAlgorithm::MinMax);
        assert_eq!(config.calibration.num_steps, 20);
        assert_eq!(config.calibration.seed, Some(7));
        assert_eq!(config.calibration.batch_shape.batch_size, 8);
        assert_eq!(config.device.kind, DeviceKind::Host);
        assert_eq!(config.preprocess.filter, ResizeFilter::Triangle);
    }

    #[test]
    fn test_validate_rejects_oversized_batch() {
        let mut config = CalibratorConfig::default();
        config.data.max_images = 4;
        config.calibration.batch_shape = BatchShape::imagenet(8);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_std() {
        let mut config = CalibratorConfig::default();
        config.preprocess.normalization.std = [0.229, 0.0, 0.225];
        assert!(config.validate().is_err());
    }
}
