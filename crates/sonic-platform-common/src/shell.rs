//! Shell command execution for platform drivers.
//!
//! Board-support scripts talk to i2c devices through the i2c-tools binaries
//! and to BMCs through `ipmitool`. Commands run through `/bin/sh -c` so that
//! redirects and pipes in configured command strings keep working.
//!
//! Async daemons use [`exec`]; the synchronous device objects use
//! [`exec_blocking`].
//!
//! # Example
//!
//! ```ignore
//! use sonic_platform_common::shell::{self, I2CGET_CMD};
//!
//! let cmd = format!("{} -f -y {} 0x{:02x} 0x{:02x}", I2CGET_CMD, 2, 0x60, 0x01);
//! let result = shell::exec(&cmd).await?;
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use std::process::Stdio;
use tokio::process::Command;

use crate::error::{PlatformError, PlatformResult};

/// i2c-tools register read.
pub const I2CGET_CMD: &str = "i2cget";

/// i2c-tools register write.
pub const I2CSET_CMD: &str = "i2cset";

/// BMC access.
pub const IPMITOOL_CMD: &str = "ipmitool";

/// Flushes filesystem buffers after record files are written.
pub const SYNC_CMD: &str = "sync";

/// Regex for characters that need escaping in shell double-quotes.
/// Matches: $, `, ", \, and newline
static SHELL_ESCAPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([$`"\\\n])"#).expect("Invalid regex pattern"));

/// Quotes a string for safe use in shell commands.
///
/// The string is wrapped in double quotes and `$`, `` ` ``, `"`, `\` and
/// newline are escaped.
///
/// ```
/// use sonic_platform_common::shell::shellquote;
///
/// assert_eq!(shellquote("simple"), "\"simple\"");
/// assert_eq!(shellquote("with$var"), "\"with\\$var\"");
/// ```
pub fn shellquote(s: &str) -> String {
    let escaped = SHELL_ESCAPE_RE.replace_all(s, r"\$1");
    format!("\"{}\"", escaped)
}

/// Result of a shell command execution.
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// The exit code of the command (0 = success).
    pub exit_code: i32,
    /// Trimmed stdout output.
    pub stdout: String,
    /// Trimmed stderr output.
    pub stderr: String,
}

impl ExecResult {
    /// Returns true if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Returns the combined output (stdout + stderr) for error messages.
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }

    /// Converts a non-zero exit into [`PlatformError::ShellCommandFailed`].
    pub fn into_stdout(self, cmd: &str) -> PlatformResult<String> {
        if self.success() {
            Ok(self.stdout)
        } else {
            Err(PlatformError::ShellCommandFailed {
                command: cmd.to_string(),
                exit_code: self.exit_code,
                output: self.combined_output(),
            })
        }
    }

    fn from_output(cmd: &str, output: std::process::Output) -> Self {
        let result = ExecResult {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        };

        if result.success() {
            tracing::trace!(command = %cmd, "Command succeeded");
        } else {
            tracing::warn!(
                command = %cmd,
                exit_code = result.exit_code,
                stderr = %result.stderr,
                "Command failed"
            );
        }
        result
    }
}

/// Executes a shell command asynchronously.
///
/// Returns `Err` only when the shell could not be spawned; a non-zero exit
/// is reported through [`ExecResult::exit_code`].
pub async fn exec(cmd: &str) -> PlatformResult<ExecResult> {
    tracing::debug!(command = %cmd, "Executing shell command");

    let output = Command::new("/bin/sh")
        .arg("-c")
        .arg(cmd)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| PlatformError::ShellExec {
            command: cmd.to_string(),
            source: e,
        })?;

    Ok(ExecResult::from_output(cmd, output))
}

/// Executes a shell command and fails on non-zero exit, returning stdout.
pub async fn exec_or_fail(cmd: &str) -> PlatformResult<String> {
    exec(cmd).await?.into_stdout(cmd)
}

/// Blocking variant of [`exec`] for synchronous device objects.
pub fn exec_blocking(cmd: &str) -> PlatformResult<ExecResult> {
    tracing::debug!(command = %cmd, "Executing shell command");

    let output = std::process::Command::new("/bin/sh")
        .arg("-c")
        .arg(cmd)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| PlatformError::ShellExec {
            command: cmd.to_string(),
            source: e,
        })?;

    Ok(ExecResult::from_output(cmd, output))
}

/// Blocking variant of [`exec_or_fail`].
pub fn exec_blocking_or_fail(cmd: &str) -> PlatformResult<String> {
    exec_blocking(cmd)?.into_stdout(cmd)
}
