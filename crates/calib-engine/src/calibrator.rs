//! Callback contract the inference-engine builder drives during int8
//! calibration.

use calib_core::{CalibrationAlgorithm, DeviceAddress, Result};

/// Batch size reported to the engine. One staging tensor carries the whole
/// batch, so the engine must treat each handle as a single sample.
pub const REPORTED_BATCH_SIZE: i32 = 1;

/// Calibrator callbacks, one implementation for every algorithm.
///
/// The engine calls [`read_calibration_cache`](Self::read_calibration_cache)
/// first. When it returns `None` the engine pulls batches with
/// [`get_batch`](Self::get_batch) until it gets `Ok(None)`, computes the
/// ranges and hands the result to
/// [`write_calibration_cache`](Self::write_calibration_cache).
pub trait Int8Calibrator {
    /// Which calibration interface the engine should run
    fn algorithm(&self) -> CalibrationAlgorithm;

    /// Batch size reported to the engine
    fn batch_size(&self) -> i32 {
        REPORTED_BATCH_SIZE
    }

    /// Device addresses of the next batch, one per input name, or `None`
    /// once calibration data is exhausted.
    fn get_batch(&mut self, names: &[&str]) -> Result<Option<Vec<DeviceAddress>>>;

    /// Previously saved calibration cache, if any
    fn read_calibration_cache(&mut self) -> Option<Vec<u8>>;

    /// Persists the cache produced by the engine
    fn write_calibration_cache(&mut self, cache: &[u8]) -> Result<()>;
}
