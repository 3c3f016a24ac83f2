//! CUDA staging backend over the driver API.

use crate::device::DeviceBackend;
use calib_core::{DeviceAddress, Error, Result};
use cudarc::driver::{result, sys, CudaDevice, CudaSlice, DevicePtr};
use std::cell::RefCell;
use std::sync::Arc;
use tracing::{debug, info};

/// A CUDA device whose context is bound only while a guard is held
pub struct CudaBackend {
    device: Arc<CudaDevice>,
    ordinal: usize,
    // One saved context per live guard, innermost last
    previous: RefCell<Vec<sys::CUcontext>>,
}

impl CudaBackend {
    /// Opens device `ordinal` and creates its execution context
    pub fn new(ordinal: usize) -> Result<Self> {
        let count = CudaDevice::count()
            .map_err(|e| Error::DeviceInit(format!("CUDA driver unavailable: {e:?}")))?;

        if count <= 0 || ordinal >= count as usize {
            return Err(Error::DeviceInit(format!(
                "CUDA device {ordinal} requested, {count} available"
            )));
        }

        let device = CudaDevice::new(ordinal)
            .map_err(|e| Error::DeviceInit(format!("Failed to create CUDA device {ordinal}: {e:?}")))?;

        info!("Opened CUDA device {} ({})", ordinal, device.name().unwrap_or_default());

        Ok(Self {
            device,
            ordinal,
            previous: RefCell::new(Vec::new()),
        })
    }

    /// Device ordinal
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }
}

impl DeviceBackend for CudaBackend {
    type Buffer = CudaSlice<f32>;

    fn describe(&self) -> String {
        format!("cuda:{}", self.ordinal)
    }

    fn activate(&self) -> Result<()> {
        let previous = result::ctx::get_current()
            .map_err(|e| Error::Device(format!("Failed to query current context: {e:?}")))?
            .unwrap_or(std::ptr::null_mut());

        self.device
            .bind_to_thread()
            .map_err(|e| Error::Device(format!("Failed to bind context of {}: {e:?}", self.describe())))?;

        self.previous.borrow_mut().push(previous);
        Ok(())
    }

    fn deactivate(&self) -> Result<()> {
        let previous = self.previous.borrow_mut().pop().unwrap_or(std::ptr::null_mut());
        unsafe { result::ctx::set_current(previous) }
            .map_err(|e| Error::Device(format!("Failed to restore context: {e:?}")))
    }

    fn alloc_staging(&self, len: usize) -> Result<Self::Buffer> {
        let buffer = self
            .device
            .alloc_zeros::<f32>(len)
            .map_err(|e| Error::Device(format!("Failed to allocate staging buffer: {e:?}")))?;
        debug!("Allocated {} bytes on {}", len * std::mem::size_of::<f32>(), self.describe());
        Ok(buffer)
    }

    fn upload(&self, host: &[f32], buffer: &mut Self::Buffer) -> Result<()> {
        if host.len() != buffer.len() {
            return Err(Error::Device(format!(
                "upload of {} values into a staging buffer of {}",
                host.len(),
                buffer.len()
            )));
        }

        self.device
            .htod_sync_copy_into(host, buffer)
            .map_err(|e| Error::Device(format!("Failed to copy batch to GPU: {e:?}")))
    }

    fn address(&self, buffer: &Self::Buffer) -> DeviceAddress {
        DeviceAddress(*buffer.device_ptr())
    }
}
