//! Device backends holding the calibration staging buffer.
//!
//! The engine reads batches from device memory, so every batch is copied into
//! a single staging buffer whose address crosses the callback boundary. The
//! execution context is only current for the duration of a [`ContextGuard`].

use calib_core::{DeviceAddress, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Device operations a calibration source needs
pub trait DeviceBackend {
    /// Device-resident f32 buffer
    type Buffer;

    /// Human-readable device description
    fn describe(&self) -> String;

    /// Makes the execution context current on the calling thread
    fn activate(&self) -> Result<()>;

    /// Relinquishes the execution context made current by [`activate`](Self::activate)
    fn deactivate(&self) -> Result<()>;

    /// Allocates a zeroed buffer of `len` f32 elements
    fn alloc_staging(&self, len: usize) -> Result<Self::Buffer>;

    /// Overwrites `buffer` with `host`; the lengths must match
    fn upload(&self, host: &[f32], buffer: &mut Self::Buffer) -> Result<()>;

    /// Address of `buffer` as seen by the engine
    fn address(&self, buffer: &Self::Buffer) -> DeviceAddress;
}

/// Keeps the device context current until dropped
pub struct ContextGuard<'a, D: DeviceBackend> {
    device: &'a D,
}

impl<'a, D: DeviceBackend> ContextGuard<'a, D> {
    /// Activates `device`; the context is released when the guard drops.
    pub fn enter(device: &'a D) -> Result<Self> {
        device.activate()?;
        Ok(Self { device })
    }
}

impl<D: DeviceBackend> Drop for ContextGuard<'_, D> {
    fn drop(&mut self) {
        if let Err(e) = self.device.deactivate() {
            warn!("Failed to release context on {}: {}", self.device.describe(), e);
        }
    }
}

/// Counters shared between a [`HostBackend`] and its observers
#[derive(Debug, Default)]
pub struct HostCounters {
    activations: AtomicUsize,
    deactivations: AtomicUsize,
    uploads: AtomicUsize,
    releases: AtomicUsize,
}

impl HostCounters {
    pub fn activations(&self) -> usize {
        self.activations.load(Ordering::SeqCst)
    }

    pub fn deactivations(&self) -> usize {
        self.deactivations.load(Ordering::SeqCst)
    }

    pub fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    /// Whether a context is currently active
    pub fn is_active(&self) -> bool {
        self.activations() > self.deactivations()
    }
}

/// Staging in host memory, for dry runs on machines without a GPU
#[derive(Debug, Default)]
pub struct HostBackend {
    counters: Arc<HostCounters>,
}

impl HostBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to the activity counters; outlives the backend
    pub fn counters(&self) -> Arc<HostCounters> {
        Arc::clone(&self.counters)
    }
}

impl DeviceBackend for HostBackend {
    type Buffer = Vec<f32>;

    fn describe(&self) -> String {
        "host".to_string()
    }

    fn activate(&self) -> Result<()> {
        self.counters.activations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn deactivate(&self) -> Result<()> {
        self.counters.deactivations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn alloc_staging(&self, len: usize) -> Result<Self::Buffer> {
        let mut buffer = Vec::new();
        buffer.try_reserve_exact(len).map_err(|e| {
            calib_core::Error::Device(format!("Failed to allocate staging buffer of {len} values: {e}"))
        })?;
        buffer.resize(len, 0.0);
        Ok(buffer)
    }

    fn upload(&self, host: &[f32], buffer: &mut Self::Buffer) -> Result<()> {
        if host.len() != buffer.len() {
            return Err(calib_core::Error::Device(format!(
                "upload of {} values into a staging buffer of {}",
                host.len(),
                buffer.len()
            )));
        }
        buffer.copy_from_slice(host);
        self.counters.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn address(&self, buffer: &Self::Buffer) -> DeviceAddress {
        DeviceAddress(buffer.as_ptr() as u64)
    }
}

impl Drop for HostBackend {
    fn drop(&mut self) {
        self.counters.releases.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_balances_context() {
        let device = HostBackend::new();
        let counters = device.counters();

        {
            let _guard = ContextGuard::enter(&device).unwrap();
            assert!(counters.is_active());
        }

        assert!(!counters.is_active());
        assert_eq!(counters.activations(), 1);
        assert_eq!(counters.deactivations(), 1);
    }

    #[test]
    fn test_host_upload_overwrites() {
        let device = HostBackend::new();
        let mut buffer = device.alloc_staging(4).unwrap();
        let address = device.address(&buffer);

        device.upload(&[1.0, 2.0, 3.0, 4.0], &mut buffer).unwrap();
        device.upload(&[5.0, 6.0, 7.0, 8.0], &mut buffer).unwrap();

        assert_eq!(buffer, vec![5.0, 6.0, 7.0, 8.0]);
        assert_eq!(device.address(&buffer), address);
        assert_eq!(device.counters().uploads(), 2);
    }

    #[test]
    fn test_host_upload_length_mismatch() {
        let device = HostBackend::new();
        let mut buffer = device.alloc_staging(4).unwrap();
        assert!(device.upload(&[1.0], &mut buffer).is_err());
        assert_eq!(buffer, vec![0.0; 4]);
    }

    #[test]
    fn test_host_alloc_failure_is_an_error() {
        let device = HostBackend::new();
        let result = device.alloc_staging(usize::MAX);
        assert!(matches!(result, Err(calib_core::Error::Device(_))));
    }

    #[test]
    fn test_release_counted_on_drop() {
        let device = HostBackend::new();
        let counters = device.counters();
        drop(device);
        assert_eq!(counters.releases(), 1);
    }
}
