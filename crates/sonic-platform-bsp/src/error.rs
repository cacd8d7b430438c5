//! Error types for the board-support daemons.

use sonic_platform_common::PlatformError;
use thiserror::Error;

/// Result type alias for daemon operations.
pub type BspResult<T> = Result<T, BspError>;

#[derive(Debug, Error)]
pub enum BspError {
    /// File, register or command access failed underneath.
    #[error(transparent)]
    Platform(#[from] PlatformError),

    /// The daemon's TOML configuration cannot be used.
    #[error("Invalid {daemon} configuration: {message}")]
    InvalidConfig {
        daemon: &'static str,
        message: String,
    },

    /// A spawned monitor task panicked or was aborted.
    #[error("Monitor task {name} failed: {source}")]
    Task {
        name: String,
        #[source]
        source: tokio::task::JoinError,
    },
}

impl BspError {
    pub fn invalid_config(daemon: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            daemon,
            message: message.into(),
        }
    }
}
