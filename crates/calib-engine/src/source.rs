//! Calibration batch source.
//!
//! Bridges the engine's pull loop to local calibration images: each pull
//! samples a batch from the image pool, preprocesses it on the host, copies
//! it into the device staging buffer and returns the buffer address.
//!
//! ```text
//! Ready --pull--> Producing{k} --pull (k == N)--> Exhausted
//!   |                  |
//!   +---- load error / close() ----------------> Exhausted
//! ```

use crate::cache::CalibrationCache;
use crate::calibrator::{Int8Calibrator, REPORTED_BATCH_SIZE};
use crate::device::{ContextGuard, DeviceBackend, HostBackend};
use calib_core::{
    BatchShape, CalibrationAlgorithm, CalibratorConfig, DeviceAddress, Error, Result,
};
use calib_data::{BatchPlan, BatchStats, HostBatch, ImagePool, ImagePreprocessor, PreprocessConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Lifecycle of a [`CalibrationBatchSource`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    /// Constructed, nothing pulled yet
    Ready,
    /// `produced` batches handed out so far
    Producing { produced: usize },
    /// No more batches; terminal
    Exhausted,
}

/// Supplies preprocessed calibration batches through a device staging buffer
pub struct CalibrationBatchSource<D: DeviceBackend> {
    algorithm: CalibrationAlgorithm,
    shape: BatchShape,
    plan: BatchPlan,
    preprocessor: ImagePreprocessor,
    cache: CalibrationCache,
    state: SourceState,
    last_stats: Option<BatchStats>,
    // Dropped before `device` in close()
    staging: Option<D::Buffer>,
    device: Option<D>,
}

impl<D: DeviceBackend> CalibrationBatchSource<D> {
    /// Scans the configured image directory and allocates the staging buffer
    /// on `device`.
    pub fn new(config: &CalibratorConfig, device: D) -> Result<Self> {
        let pool = ImagePool::scan(&config.data.image_dir, &config.data.suffix, config.data.max_images)?;
        Self::with_pool(config, pool, device)
    }

    /// Like [`new`](Self::new) with an already enumerated image pool.
    pub fn with_pool(config: &CalibratorConfig, pool: ImagePool, device: D) -> Result<Self> {
        config.validate()?;

        let params = &config.calibration;
        let shape = params.batch_shape;

        let plan = BatchPlan::new(
            Arc::new(pool),
            shape.batch_size,
            params.num_steps,
            params.seed,
        )?;
        let preprocessor = ImagePreprocessor::new(PreprocessConfig::for_shape(&shape, &config.preprocess)?);
        let bytes = shape.byte_size()?;

        let staging = {
            let _guard = ContextGuard::enter(&device)?;
            device.alloc_staging(shape.volume()?)?
        };

        debug!(
            "Staging buffer for {} at {} on {} ({} bytes)",
            shape,
            device.address(&staging),
            device.describe(),
            bytes
        );
        info!(
            "{} calibration source: {} steps over {} images",
            params.algorithm,
            params.num_steps,
            plan.pool().len()
        );

        Ok(Self {
            algorithm: params.algorithm,
            shape,
            plan,
            preprocessor,
            cache: CalibrationCache::new(&params.cache_file),
            state: SourceState::Ready,
            last_stats: None,
            staging: Some(staging),
            device: Some(device),
        })
    }

    /// Current lifecycle state
    pub fn state(&self) -> SourceState {
        self.state
    }

    /// Shape of every batch
    pub fn shape(&self) -> BatchShape {
        self.shape
    }

    /// Configured calibration algorithm
    pub fn algorithm(&self) -> CalibrationAlgorithm {
        self.algorithm
    }

    /// Batch size reported to the engine, independent of the tensor shape
    pub fn reported_batch_size(&self) -> i32 {
        REPORTED_BATCH_SIZE
    }

    /// Number of batches this source will produce in total
    pub fn num_steps(&self) -> usize {
        self.plan.num_steps()
    }

    /// Number of images in the pool
    pub fn pool_size(&self) -> usize {
        self.plan.pool().len()
    }

    /// Statistics of the most recently produced batch
    pub fn last_stats(&self) -> Option<&BatchStats> {
        self.last_stats.as_ref()
    }

    /// The device, unless the source has been closed
    pub fn device(&self) -> Option<&D> {
        self.device.as_ref()
    }

    /// The staging buffer, unless the source has been closed
    pub fn staging_buffer(&self) -> Option<&D::Buffer> {
        self.staging.as_ref()
    }

    /// Cache file location
    pub fn cache_path(&self) -> PathBuf {
        self.cache.path().to_path_buf()
    }

    /// Produces the next batch and returns the staging buffer address, or
    /// `None` once all steps have been produced.
    ///
    /// A load or copy failure aborts the run: the error is returned and every
    /// later call yields `None`.
    pub fn next_batch_handle(&mut self) -> Result<Option<DeviceAddress>> {
        if self.state == SourceState::Exhausted {
            return Ok(None);
        }

        let Some(request) = self.plan.next() else {
            info!("Calibration data exhausted after {} steps", self.plan.num_steps());
            self.state = SourceState::Exhausted;
            return Ok(None);
        };

        info!("> calibration {}/{}", request.step + 1, self.plan.num_steps());

        let address = match self.produce(&request.paths) {
            Ok(address) => address,
            Err(e) => {
                warn!("Calibration step {} failed: {}", request.step, e);
                self.plan.finish();
                self.state = SourceState::Exhausted;
                return Err(e);
            }
        };

        self.state = SourceState::Producing {
            produced: request.step + 1,
        };

        Ok(Some(address))
    }

    /// Loads and preprocesses `paths` into a host batch of this source's shape
    pub fn load_and_preprocess(&self, paths: &[PathBuf]) -> Result<HostBatch> {
        self.preprocessor.load_batch(paths, &self.shape)
    }

    /// Previously saved calibration cache, if present and readable
    pub fn read_cache(&self) -> Option<Vec<u8>> {
        self.cache.read()
    }

    /// Overwrites the calibration cache
    pub fn write_cache(&self, bytes: &[u8]) -> Result<()> {
        self.cache.write(bytes)
    }

    /// Releases the staging buffer and the device. Safe to call repeatedly.
    pub fn close(&mut self) {
        self.plan.finish();
        self.state = SourceState::Exhausted;

        let Some(device) = self.device.take() else {
            return;
        };

        if let Some(staging) = self.staging.take() {
            match ContextGuard::enter(&device) {
                Ok(_guard) => drop(staging),
                Err(e) => {
                    warn!("Freeing staging buffer without an active context: {}", e);
                    drop(staging);
                }
            }
        }

        debug!("Released {}", device.describe());
        drop(device);
    }

    fn produce(&mut self, paths: &[PathBuf]) -> Result<DeviceAddress> {
        let batch = self.load_and_preprocess(paths)?;
        let stats = batch.stats();

        let (Some(device), Some(staging)) = (self.device.as_ref(), self.staging.as_mut()) else {
            return Err(Error::Device("calibration source is closed".to_string()));
        };

        let host = batch
            .as_slice()
            .ok_or_else(|| Error::Device(format!("batch {} is not contiguous in host memory", self.shape)))?;

        let address = {
            let _guard = ContextGuard::enter(device)?;
            device.upload(host, staging)?;
            device.address(staging)
        };

        debug!(
            "Batch uploaded to {}: min {:.4}, max {:.4}",
            address,
            stats.min(),
            stats.max()
        );
        self.last_stats = Some(stats);

        Ok(address)
    }
}

impl CalibrationBatchSource<HostBackend> {
    /// Source staging batches in host memory
    pub fn open_host(config: &CalibratorConfig) -> Result<Self> {
        Self::new(config, HostBackend::new())
    }
}

#[cfg(feature = "cuda")]
impl CalibrationBatchSource<crate::cuda::CudaBackend> {
    /// Source staging batches on the configured CUDA device
    pub fn open_cuda(config: &CalibratorConfig) -> Result<Self> {
        let device = crate::cuda::CudaBackend::new(config.device.ordinal)?;
        Self::new(config, device)
    }
}

impl<D: DeviceBackend> Int8Calibrator for CalibrationBatchSource<D> {
    fn algorithm(&self) -> CalibrationAlgorithm {
        self.algorithm
    }

    fn get_batch(&mut self, names: &[&str]) -> Result<Option<Vec<DeviceAddress>>> {
        trace!("get_batch for inputs {:?}", names);
        let Some(address) = self.next_batch_handle()? else {
            return Ok(None);
        };
        Ok(Some(vec![address; names.len().max(1)]))
    }

    fn read_calibration_cache(&mut self) -> Option<Vec<u8>> {
        self.read_cache()
    }

    fn write_calibration_cache(&mut self, cache: &[u8]) -> Result<()> {
        self.write_cache(cache)
    }
}

impl<D: DeviceBackend> Drop for CalibrationBatchSource<D> {
    fn drop(&mut self) {
        self.close();
    }
}
