//! Image preprocessing for calibration batches.
//!
//! Every image goes through the same fixed pipeline: RGB8 conversion, exact
//! resize to the batch height and width, scaling to [0, 1], per-channel
//! normalization and a CHW rearrangement.

use crate::batch::HostBatch;
use crate::loader::load_image;
use calib_core::{BatchShape, Error, Normalization, PreprocessParams, ResizeFilter, Result};
use image::imageops::FilterType;
use image::{DynamicImage, ImageBuffer, Rgb};
use ndarray::{ArrayView3, Axis};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for calibration image preprocessing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessConfig {
    /// Target height in pixels
    pub height: u32,
    /// Target width in pixels
    pub width: u32,
    /// Normalization statistics
    pub normalization: Normalization,
    /// Resize filter
    pub filter: ResizeFilter,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            height: 224,
            width: 224,
            normalization: Normalization::imagenet(),
            filter: ResizeFilter::Triangle,
        }
    }
}

impl PreprocessConfig {
    /// Builds a config for the image dimensions of `shape`
    pub fn for_shape(shape: &BatchShape, params: &PreprocessParams) -> Result<Self> {
        let pixels = |dim: usize| {
            u32::try_from(dim).map_err(|_| {
                Error::InvalidArgument(format!("image dimensions of {shape} do not fit in u32"))
            })
        };

        Ok(Self {
            height: pixels(shape.height)?,
            width: pixels(shape.width)?,
            normalization: params.normalization,
            filter: params.filter,
        })
    }
}

fn filter_type(filter: ResizeFilter) -> FilterType {
    match filter {
        ResizeFilter::Nearest => FilterType::Nearest,
        ResizeFilter::Triangle => FilterType::Triangle,
        ResizeFilter::CatmullRom => FilterType::CatmullRom,
        ResizeFilter::Lanczos3 => FilterType::Lanczos3,
    }
}

/// Image preprocessor for calibration batches
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    config: PreprocessConfig,
}

impl ImagePreprocessor {
    /// Creates a new image preprocessor with the given configuration
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    /// Preprocessing configuration
    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    /// Preprocesses a decoded image into a CHW vector of length `3 * h * w`
    pub fn preprocess(&self, image: &DynamicImage) -> Vec<f32> {
        let rgb = image.to_rgb8();
        let resized = self.resize_image(&rgb);
        self.normalize_image(&resized)
    }

    /// Decodes and preprocesses the image at `path`
    pub fn preprocess_from_path(&self, path: &Path) -> Result<Vec<f32>> {
        let image = load_image(path)?;
        Ok(self.preprocess(&image))
    }

    /// Loads and preprocesses `paths` into one host batch.
    ///
    /// The first image that fails to decode aborts the whole batch.
    pub fn load_batch(&self, paths: &[PathBuf], shape: &BatchShape) -> Result<HostBatch> {
        if paths.len() != shape.batch_size {
            return Err(Error::InvalidArgument(format!(
                "batch of shape {} needs {} images, got {}",
                shape,
                shape.batch_size,
                paths.len()
            )));
        }

        let expected = self.output_shape();
        if expected != [shape.channels, shape.height, shape.width] {
            return Err(Error::InvalidArgument(format!(
                "preprocessor produces {:?}, batch shape is {}",
                expected, shape
            )));
        }

        let mut batch = HostBatch::zeros(*shape);

        for (mut row, path) in batch.data_mut().axis_iter_mut(Axis(0)).zip(paths) {
            let image = self.preprocess_from_path(path)?;
            let view = ArrayView3::from_shape((shape.channels, shape.height, shape.width), &image[..])
                .map_err(|e| Error::InvalidArgument(e.to_string()))?;
            row.assign(&view);
        }

        Ok(batch)
    }

    /// Resizes an image to the target dimensions
    fn resize_image(&self, image: &ImageBuffer<Rgb<u8>, Vec<u8>>) -> ImageBuffer<Rgb<u8>, Vec<u8>> {
        let (width, height) = image.dimensions();

        if width == self.config.width && height == self.config.height {
            return image.clone();
        }

        image::imageops::resize(
            image,
            self.config.width,
            self.config.height,
            filter_type(self.config.filter),
        )
    }

    /// Scales to [0, 1], normalizes and lays the pixels out as CHW
    fn normalize_image(&self, image: &ImageBuffer<Rgb<u8>, Vec<u8>>) -> Vec<f32> {
        let (width, height) = image.dimensions();
        let plane = (width * height) as usize;
        let mut normalized = vec![0.0f32; plane * 3];

        for (x, y, pixel) in image.enumerate_pixels() {
            let offset = (y * width + x) as usize;
            for channel in 0..3 {
                let value = pixel[channel] as f32 / 255.0;
                normalized[channel * plane + offset] =
                    self.config.normalization.apply(channel, value);
            }
        }

        normalized
    }

    /// Gets the expected output shape after preprocessing
    pub fn output_shape(&self) -> [usize; 3] {
        [3, self.config.height as usize, self.config.width as usize]
    }
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self::new(PreprocessConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn solid(width: u32, height: u32, rgb: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(ImageBuffer::from_pixel(width, height, Rgb(rgb)))
    }

    fn small_config(height: u32, width: u32) -> PreprocessConfig {
        PreprocessConfig {
            height,
            width,
            ..PreprocessConfig::default()
        }
    }

    #[test]
    fn test_config_for_shape() {
        let params = PreprocessParams::default();
        let config = PreprocessConfig::for_shape(&BatchShape::new(2, 3, 6, 10), &params).unwrap();
        assert_eq!((config.height, config.width), (6, 10));

        let tall = BatchShape::new(1, 3, u32::MAX as usize + 1, 4);
        assert!(matches!(
            PreprocessConfig::for_shape(&tall, &params),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_preprocessor_default_shape() {
        let preprocessor = ImagePreprocessor::default();
        assert_eq!(preprocessor.output_shape(), [3, 224, 224]);
    }

    #[test]
    fn test_white_pixel_normalization() {
        let preprocessor = ImagePreprocessor::new(small_config(4, 4));
        let out = preprocessor.preprocess(&solid(4, 4, [255, 255, 255]));

        let expected = [
            (1.0 - 0.485) / 0.229,
            (1.0 - 0.456) / 0.224,
            (1.0 - 0.406) / 0.225,
        ];
        for (channel, plane) in out.chunks(16).enumerate() {
            for value in plane {
                assert!((value - expected[channel]).abs() < 1e-5);
            }
        }
        assert!((out[0] - 2.249).abs() < 1e-3);
    }

    #[test]
    fn test_channel_first_layout() {
        let preprocessor = ImagePreprocessor::new(small_config(2, 3));
        let out = preprocessor.preprocess(&solid(3, 2, [255, 0, 0]));

        assert_eq!(out.len(), 3 * 2 * 3);
        let red = (1.0 - 0.485) / 0.229;
        let green = (0.0 - 0.456) / 0.224;
        let blue = (0.0 - 0.406) / 0.225;
        assert!(out[..6].iter().all(|v| (v - red).abs() < 1e-5));
        assert!(out[6..12].iter().all(|v| (v - green).abs() < 1e-5));
        assert!(out[12..].iter().all(|v| (v - blue).abs() < 1e-5));
    }

    #[test]
    fn test_resize_to_non_square_target() {
        let preprocessor = ImagePreprocessor::new(small_config(6, 10));
        let resized = preprocessor.resize_image(&solid(37, 23, [10, 20, 30]).to_rgb8());
        assert_eq!(resized.dimensions(), (10, 6));
    }

    #[test]
    fn test_grayscale_input_is_expanded() {
        let gray = DynamicImage::ImageLuma8(ImageBuffer::from_pixel(4, 4, image::Luma([255u8])));
        let preprocessor = ImagePreprocessor::new(small_config(4, 4));
        let out = preprocessor.preprocess(&gray);
        assert_eq!(out.len(), 48);
        assert!((out[0] - 2.249).abs() < 1e-3);
    }

    #[test]
    fn test_load_batch_shape() {
        let temp_dir = TempDir::new().unwrap();
        let mut paths = Vec::new();
        for i in 0..3 {
            let path = temp_dir.path().join(format!("{i}.JPEG"));
            solid(12, 9, [i * 40, 100, 200])
                .save_with_format(&path, image::ImageFormat::Png)
                .unwrap();
            paths.push(path);
        }

        let shape = BatchShape::new(3, 3, 8, 5);
        let preprocessor = ImagePreprocessor::new(small_config(8, 5));
        let batch = preprocessor.load_batch(&paths, &shape).unwrap();

        assert_eq!(batch.shape(), shape);
        assert_eq!(batch.data().dim(), (3, 3, 8, 5));
        assert_eq!(batch.as_slice().map(<[f32]>::len), Some(shape.volume().unwrap()));
    }

    #[test]
    fn test_load_batch_missing_image() {
        let temp_dir = TempDir::new().unwrap();
        let good = temp_dir.path().join("good.JPEG");
        solid(4, 4, [1, 2, 3])
            .save_with_format(&good, image::ImageFormat::Png)
            .unwrap();
        let missing = temp_dir.path().join("missing.JPEG");

        let shape = BatchShape::new(2, 3, 4, 4);
        let preprocessor = ImagePreprocessor::new(small_config(4, 4));
        let result = preprocessor.load_batch(&[good, missing.clone()], &shape);

        match result {
            Err(Error::ImageLoad { path, .. }) => assert_eq!(path, missing),
            other => panic!("expected ImageLoad, got {other:?}"),
        }
    }

    #[test]
    fn test_load_batch_wrong_count() {
        let shape = BatchShape::new(2, 3, 4, 4);
        let preprocessor = ImagePreprocessor::new(small_config(4, 4));
        let result = preprocessor.load_batch(&[PathBuf::from("only_one.JPEG")], &shape);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }
}
