//! Host-side calibration batch tensor.

use calib_core::BatchShape;
use ndarray::{Array4, Axis};
use serde::{Deserialize, Serialize};

/// A preprocessed NCHW batch in host memory
#[derive(Debug, Clone, PartialEq)]
pub struct HostBatch {
    shape: BatchShape,
    data: Array4<f32>,
}

impl HostBatch {
    /// Zero-filled batch of `shape`
    pub fn zeros(shape: BatchShape) -> Self {
        Self {
            shape,
            data: Array4::zeros(shape.dims()),
        }
    }

    /// Batch shape
    pub fn shape(&self) -> BatchShape {
        self.shape
    }

    /// Underlying tensor
    pub fn data(&self) -> &Array4<f32> {
        &self.data
    }

    /// Underlying tensor, mutably
    pub fn data_mut(&mut self) -> &mut Array4<f32> {
        &mut self.data
    }

    /// Contiguous row-major view of the batch, or `None` if the tensor was
    /// reshaped into a non-standard layout through [`data_mut`](Self::data_mut)
    pub fn as_slice(&self) -> Option<&[f32]> {
        self.data.as_slice()
    }

    /// Per-channel summary of the batch
    pub fn stats(&self) -> BatchStats {
        let channels = self
            .data
            .axis_iter(Axis(1))
            .map(|plane| {
                let (min, max, sum) = plane.iter().fold(
                    (f32::INFINITY, f32::NEG_INFINITY, 0.0f64),
                    |(min, max, sum), &v| (min.min(v), max.max(v), sum + v as f64),
                );
                let count = plane.len().max(1) as f64;
                ChannelStats {
                    min,
                    max,
                    mean: (sum / count) as f32,
                }
            })
            .collect();

        BatchStats { channels }
    }
}

/// Min, max and mean of one channel across a batch
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ChannelStats {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
}

/// Per-channel statistics of a batch
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BatchStats {
    pub channels: Vec<ChannelStats>,
}

impl BatchStats {
    /// Smallest value over all channels
    pub fn min(&self) -> f32 {
        self.channels.iter().map(|c| c.min).fold(f32::INFINITY, f32::min)
    }

    /// Largest value over all channels
    pub fn max(&self) -> f32 {
        self.channels
            .iter()
            .map(|c| c.max)
            .fold(f32::NEG_INFINITY, f32::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::s;

    #[test]
    fn test_zeros_is_contiguous() {
        let shape = BatchShape::new(2, 3, 4, 5);
        let batch = HostBatch::zeros(shape);
        let values = batch.as_slice().unwrap();
        assert_eq!(values.len(), shape.volume().unwrap());
        assert!(values.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_swapped_axes_have_no_slice() {
        let mut batch = HostBatch::zeros(BatchShape::new(1, 3, 4, 5));
        batch.data_mut().swap_axes(2, 3);
        assert!(batch.as_slice().is_none());
    }

    #[test]
    fn test_stats_per_channel() {
        let mut batch = HostBatch::zeros(BatchShape::new(2, 3, 2, 2));
        batch.data_mut().slice_mut(s![.., 0, .., ..]).fill(1.0);
        batch.data_mut().slice_mut(s![1, 2, .., ..]).fill(-2.0);

        let stats = batch.stats();
        assert_eq!(stats.channels.len(), 3);
        assert_eq!(stats.channels[0].min, 1.0);
        assert_eq!(stats.channels[0].mean, 1.0);
        assert_eq!(stats.channels[1].max, 0.0);
        assert_eq!(stats.channels[2].min, -2.0);
        assert_eq!(stats.channels[2].mean, -1.0);
        assert_eq!(stats.min(), -2.0);
        assert_eq!(stats.max(), 1.0);
    }
}
