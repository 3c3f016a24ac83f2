//! Core types and utilities for int8 calibration batch sources.
//!
//! This crate provides the error taxonomy, shared types and configuration
//! used across the calibration workspace.

pub mod cli;
pub mod config;
pub mod error;
pub mod types;

pub use cli::*;
pub use config::*;
pub use error::{Error, Result};
pub use types::*;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::*;
    pub use crate::error::{Error, Result};
    pub use crate::types::*;
}
