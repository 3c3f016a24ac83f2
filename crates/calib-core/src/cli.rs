//! Shared CLI helpers for workspace tools.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::{CalibratorConfig, Error, Result};

/// Installs the global tracing subscriber. `RUST_LOG` wins over `verbose`.
pub fn setup_cli_logging(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to initialize logger: {e}")))?;

    Ok(())
}

pub fn load_toml_config<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read config {}: {e}", path.display())))?;

    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse config {}: {e}", path.display())))
}

/// Loads and validates a [`CalibratorConfig`].
pub fn load_calibrator_config(path: &Path) -> Result<CalibratorConfig> {
    let config: CalibratorConfig = load_toml_config(path)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_calibrator_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("calib.toml");
        fs::write(
            &path,
            "[calibration]\nnum_steps = 3\n\n[device]\nkind = \"host\"\n",
        )
        .unwrap();

        let config = load_calibrator_config(&path).unwrap();
        assert_eq!(config.calibration.num_steps, 3);
    }

    #[test]
    fn test_load_missing_config() {
        let dir = TempDir::new().unwrap();
        let err = load_calibrator_config(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_load_invalid_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(
            &path,
            "[calibration]\nbatch_shape = { batch_size = 1, channels = 1, height = 8, width = 8 }\n",
        )
        .unwrap();

        assert!(load_calibrator_config(&path).is_err());
    }

    #[test]
    fn test_load_config_with_unaddressable_shape() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("huge.toml");
        fs::write(
            &path,
            "[calibration]\nbatch_shape = { batch_size = 1, channels = 3, height = 4294967296, width = 4294967296 }\n",
        )
        .unwrap();

        let err = load_calibrator_config(&path).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
