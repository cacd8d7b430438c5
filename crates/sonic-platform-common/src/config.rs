//! TOML configuration loading for the platform daemons.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use tracing::info;

use crate::error::{PlatformError, PlatformResult};

/// Default directory holding one TOML file per daemon.
pub const CONFIG_DIR: &str = "/etc/sonic/platform";

/// Loads a TOML file, falling back to `T::default()` when it does not exist.
pub fn load_or_default<T: DeserializeOwned + Default>(path: impl AsRef<Path>) -> PlatformResult<T> {
    let path = path.as_ref();
    match fs::read_to_string(path) {
        Ok(content) => toml::from_str(&content).map_err(|e| {
            PlatformError::invalid_config(
                path.display().to_string(),
                format!("Failed to parse config file: {}", e),
            )
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "Config file not found, using defaults");
            Ok(T::default())
        }
        Err(e) => Err(PlatformError::io(path, e)),
    }
}

/// Loads a TOML file that must exist.
pub fn load<T: DeserializeOwned>(path: impl AsRef<Path>) -> PlatformResult<T> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| PlatformError::io(path, e))?;
    toml::from_str(&content).map_err(|e| {
        PlatformError::invalid_config(
            path.display().to_string(),
            format!("Failed to parse config file: {}", e),
        )
    })
}
