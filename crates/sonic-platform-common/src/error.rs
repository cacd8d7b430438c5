//! Error types for platform device operations.
//!
//! Every device getter and setter in the platform crates returns
//! [`PlatformResult`]. Capabilities a board does not implement surface as
//! [`PlatformError::NotSupported`] rather than as sentinel values.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for platform operations.
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Errors that can occur while talking to platform hardware.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Reading or writing a sysfs/device file failed.
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        /// The file that was accessed.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// A value read from hardware could not be parsed.
    #[error("Failed to parse '{value}' from {context}: {message}")]
    Parse {
        /// Where the value came from (path, command or attribute name).
        context: String,
        /// The raw text that failed to parse.
        value: String,
        /// Parser message.
        message: String,
    },

    /// The device or board does not provide this capability.
    #[error("Operation not supported: {operation}")]
    NotSupported {
        /// The operation that was requested.
        operation: String,
    },

    /// An argument or index is outside the accepted range.
    #[error("{field} value {value} out of range [{min}, {max}]")]
    OutOfRange {
        /// The argument name.
        field: String,
        /// The rejected value.
        value: i64,
        /// Lowest accepted value.
        min: i64,
        /// Highest accepted value.
        max: i64,
    },

    /// Failed to execute a shell command (spawn error).
    #[error("Failed to execute shell command '{command}': {source}")]
    ShellExec {
        /// The command that failed to execute.
        command: String,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Shell command returned non-zero exit code.
    #[error("Shell command failed: '{command}' (exit code {exit_code}): {output}")]
    ShellCommandFailed {
        /// The command that failed.
        command: String,
        /// The exit code.
        exit_code: i32,
        /// Combined stdout/stderr output.
        output: String,
    },

    /// Configuration validation error.
    #[error("Invalid configuration for {field}: {message}")]
    InvalidConfig {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },

    /// A value access descriptor could not be read, written or checked.
    #[error("Value access failed: {message}")]
    Access {
        /// Error message.
        message: String,
    },

    /// Internal error (unexpected state).
    #[error("Internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}

impl PlatformError {
    /// Creates an IO error bound to the path that was accessed.
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Creates a parse error.
    pub fn parse(
        context: impl Into<String>,
        value: impl Into<String>,
        message: impl ToString,
    ) -> Self {
        Self::Parse {
            context: context.into(),
            value: value.into(),
            message: message.to_string(),
        }
    }

    /// Creates a not-supported error.
    pub fn not_supported(operation: impl Into<String>) -> Self {
        Self::NotSupported {
            operation: operation.into(),
        }
    }

    /// Creates an out-of-range error.
    pub fn out_of_range(field: impl Into<String>, value: i64, min: i64, max: i64) -> Self {
        Self::OutOfRange {
            field: field.into(),
            value,
            min,
            max,
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates an access error.
    pub fn access(message: impl Into<String>) -> Self {
        Self::Access {
            message: message.into(),
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true for capability errors, which callers usually report as
    /// "N/A" instead of a failure.
    pub fn is_not_supported(&self) -> bool {
        matches!(self, PlatformError::NotSupported { .. })
    }

    /// Returns true if this error indicates a transient condition
    /// that may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PlatformError::Io { .. }
                | PlatformError::ShellCommandFailed { .. }
                | PlatformError::Access { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_display_carries_path() {
        let err = PlatformError::io(
            "/sys/bus/i2c/devices/3-0060/fan_present_1",
            io::Error::new(io::ErrorKind::NotFound, "No such file or directory"),
        );
        let text = err.to_string();
        assert!(text.contains("/sys/bus/i2c/devices/3-0060/fan_present_1"));
        assert!(text.contains("No such file"));
    }

    #[test]
    fn test_out_of_range_display() {
        let err = PlatformError::out_of_range("timeout", 200, 70, 180);
        assert_eq!(err.to_string(), "timeout value 200 out of range [70, 180]");
    }

    #[test]
    fn test_shell_command_failed() {
        let err = PlatformError::ShellCommandFailed {
            command: "i2cget -f -y 2 0x60 0x01".to_string(),
            exit_code: 2,
            output: "Error: Read failed".to_string(),
        };
        assert!(err.to_string().contains("i2cget -f -y 2"));
        assert!(err.to_string().contains("exit code 2"));
    }

    #[test]
    fn test_classification() {
        assert!(PlatformError::not_supported("get_model").is_not_supported());
        assert!(!PlatformError::internal("bug").is_not_supported());
        assert!(PlatformError::access("read failed").is_retryable());
        assert!(!PlatformError::invalid_config("loc", "missing").is_retryable());
    }
}
