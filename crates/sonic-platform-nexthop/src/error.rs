//! Error types for DPM handling and reboot-cause summarising.

use sonic_platform_common::PlatformError;
use thiserror::Error;

/// Result type alias for DPM operations.
pub type DpmResult<T> = Result<T, DpmError>;

#[derive(Debug, Error)]
pub enum DpmError {
    /// File or command access failed underneath.
    #[error(transparent)]
    Platform(#[from] PlatformError),

    /// A blackbox record does not have the fixed record size.
    #[error("{dpm}: record is {len} bytes, expected {expected}")]
    RecordSize {
        dpm: String,
        len: usize,
        expected: usize,
    },

    /// The `DPM` section of pd-plugin.json is malformed.
    #[error("Invalid configuration for DPM {dpm}: {message}")]
    InvalidConfig { dpm: String, message: String },

    /// Encoding or decoding a history file failed.
    #[error("Reboot-cause history JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DpmError {
    pub fn invalid_config(dpm: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            dpm: dpm.into(),
            message: message.into(),
        }
    }
}

impl From<DpmError> for PlatformError {
    fn from(err: DpmError) -> Self {
        match err {
            DpmError::Platform(inner) => inner,
            DpmError::InvalidConfig { dpm, message } => {
                PlatformError::invalid_config(format!("DPM.{dpm}"), message)
            }
            other => PlatformError::internal(other.to_string()),
        }
    }
}
