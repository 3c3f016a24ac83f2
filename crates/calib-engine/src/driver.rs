//! Engine-side calibration loop, for dry runs and tests.
//!
//! Mirrors what the inference-engine builder does with an [`Int8Calibrator`]:
//! consult the cache, otherwise pull batches until the calibrator runs dry.

use crate::calibrator::Int8Calibrator;
use calib_core::{CalibrationAlgorithm, DeviceAddress, Error, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Outcome of one driven calibration run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DriveReport {
    /// Algorithm the calibrator was registered under
    pub algorithm: CalibrationAlgorithm,
    /// Whether an existing cache short-circuited the run
    pub cache_hit: bool,
    /// Size of the cache found, in bytes
    pub cache_bytes: usize,
    /// Batches pulled from the calibrator
    pub batches: usize,
}

/// Runs the engine's calibration loop against `calibrator`.
///
/// `observer` sees the calibrator after every produced batch, together with
/// the zero-based step and the returned addresses. Stops at the first `None`
/// or error.
pub fn drive<C, F>(calibrator: &mut C, input_names: &[&str], mut observer: F) -> Result<DriveReport>
where
    C: Int8Calibrator + ?Sized,
    F: FnMut(&C, usize, &[DeviceAddress]),
{
    let algorithm = calibrator.algorithm();

    if calibrator.batch_size() != 1 {
        return Err(Error::InvalidArgument(format!(
            "calibrator reports batch size {}, the staging tensor carries the whole batch",
            calibrator.batch_size()
        )));
    }

    if let Some(cache) = calibrator.read_calibration_cache() {
        info!("{} calibration skipped, cache holds {} bytes", algorithm, cache.len());
        return Ok(DriveReport {
            algorithm,
            cache_hit: true,
            cache_bytes: cache.len(),
            batches: 0,
        });
    }

    let mut batches = 0;
    while let Some(addresses) = calibrator.get_batch(input_names)? {
        observer(&*calibrator, batches, &addresses);
        batches += 1;
    }

    info!("{} calibration consumed {} batches", algorithm, batches);

    Ok(DriveReport {
        algorithm,
        cache_hit: false,
        cache_bytes: 0,
        batches,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Calibrator with a fixed number of batches and an in-memory cache
    struct Scripted {
        remaining: usize,
        cache: Option<Vec<u8>>,
        fail_at: Option<usize>,
    }

    impl Int8Calibrator for Scripted {
        fn algorithm(&self) -> CalibrationAlgorithm {
            CalibrationAlgorithm::Entropy2
        }

        fn get_batch(&mut self, _names: &[&str]) -> Result<Option<Vec<DeviceAddress>>> {
            if self.fail_at == Some(self.remaining) {
                return Err(Error::image_load("bad.JPEG", "corrupt"));
            }
            if self.remaining == 0 {
                return Ok(None);
            }
            self.remaining -= 1;
            Ok(Some(vec![DeviceAddress(0x1000)]))
        }

        fn read_calibration_cache(&mut self) -> Option<Vec<u8>> {
            self.cache.clone()
        }

        fn write_calibration_cache(&mut self, cache: &[u8]) -> Result<()> {
            self.cache = Some(cache.to_vec());
            Ok(())
        }
    }

    #[test]
    fn test_drive_pulls_until_exhausted() {
        let mut calibrator = Scripted {
            remaining: 3,
            cache: None,
            fail_at: None,
        };
        let mut steps = Vec::new();

        let report = drive(&mut calibrator, &["input"], |c, step, addresses| {
            assert_eq!(addresses, &[DeviceAddress(0x1000)]);
            steps.push((step, c.remaining));
        })
        .unwrap();

        assert!(!report.cache_hit);
        assert_eq!(report.batches, 3);
        assert_eq!(steps, vec![(0, 2), (1, 1), (2, 0)]);
    }

    #[test]
    fn test_drive_skips_on_cache_hit() {
        let mut calibrator = Scripted {
            remaining: 3,
            cache: Some(b"cached".to_vec()),
            fail_at: None,
        };

        let report = drive(&mut calibrator, &[], |_, _, _| panic!("no batch expected")).unwrap();
        assert!(report.cache_hit);
        assert_eq!(report.cache_bytes, 6);
        assert_eq!(calibrator.remaining, 3);
    }

    #[test]
    fn test_drive_propagates_errors() {
        let mut calibrator = Scripted {
            remaining: 3,
            cache: None,
            fail_at: Some(1),
        };

        let result = drive(&mut calibrator, &["input"], |_, _, _| {});
        assert!(matches!(result, Err(Error::ImageLoad { .. })));
    }
}
