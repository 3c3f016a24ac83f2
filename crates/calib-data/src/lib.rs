//! Calibration image pool, batch planning and preprocessing.
//!
//! This crate turns a directory of calibration images into a finite sequence
//! of preprocessed NCHW host batches.

pub mod batch;
pub mod loader;
pub mod preprocess;
pub mod sampler;

pub use batch::{BatchStats, ChannelStats, HostBatch};
pub use loader::{load_image, ImagePool};
pub use preprocess::{ImagePreprocessor, PreprocessConfig};
pub use sampler::{BatchPlan, BatchRequest};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::batch::*;
    pub use crate::loader::*;
    pub use crate::preprocess::*;
    pub use crate::sampler::*;
}
