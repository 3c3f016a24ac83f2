//! Int8 calibrator callbacks for inference-engine builders.
//!
//! The engine owns the calibration algorithm; this crate feeds it. A
//! [`CalibrationBatchSource`] hands out preprocessed image batches through a
//! device staging buffer and persists the engine's calibration cache.
//!
//! Enable the `cuda` feature for the [`CudaBackend`]; the [`HostBackend`]
//! stages batches in host memory for dry runs.

pub mod cache;
pub mod calibrator;
#[cfg(feature = "cuda")]
pub mod cuda;
pub mod device;
pub mod driver;
pub mod source;

pub use cache::CalibrationCache;
pub use calibrator::{Int8Calibrator, REPORTED_BATCH_SIZE};
#[cfg(feature = "cuda")]
pub use cuda::CudaBackend;
pub use device::{ContextGuard, DeviceBackend, HostBackend, HostCounters};
pub use driver::{drive, DriveReport};
pub use source::{CalibrationBatchSource, SourceState};
