//! Value access descriptors.
//!
//! Board-support configuration describes every register or file the daemons
//! touch as a small table tagged by `gettype`:
//!
//! ```toml
//! [[psus.present]]
//! gettype = "i2c"
//! bus = 2
//! loc = 0x1d
//! offset = 0x34
//! presentbit = 0
//! okval = 0
//! ```
//!
//! [`Access`] is that table. The access kinds are:
//!
//! | `gettype` | read | write |
//! |-----------|------|-------|
//! | `sysfs` | parse file with `int_decode` | `0x%02x`, read-modify-write under `mask` |
//! | `i2c` / `i2cword` / `i2cbyte` | `i2cget` | `i2cset` |
//! | `io` | byte at `io_addr` in `/dev/port` | same |
//! | `devfile` | `read_len` bytes at `offset` | bytes at `offset` |
//! | `cmd` / `cmd_str` | command stdout as int / text | run command |
//! | `file_exist` | existence of `judge_file` | - |
//! | `bit_rd` / `bit_wr` | one bit of `rd_config` | masked update of `val_config` |
//! | `creat_file` / `remove_file` | - | touch / `rm -rf`, then `sync` |
//! | `load_process` | - | start a script unless already running |
//! | `log_to_file` | - | append a reading of `log_config` to a log |
//!
//! Reads are retried by [`Access::get_value`] (6 attempts, 100 ms apart) and
//! writes by [`Access::set_value`].

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{PlatformError, PlatformResult};
use crate::shell::{self, I2CGET_CMD, I2CSET_CMD, SYNC_CMD};
use crate::sysfs::{parse_int, Sysfs};

/// Attempts made by [`Access::get_value`] and [`Access::set_value`].
pub const ACCESS_RETRIES: u32 = 6;

/// Pause between two attempts.
pub const ACCESS_RETRY_PAUSE: Duration = Duration::from_millis(100);

/// Default size limit of a `log_to_file` target before it is rotated.
pub const DEFAULT_LOG_FILE_MAX_SIZE: u64 = 5 * 1024 * 1024;

const LOG_FILE_BACKUPS: u32 = 3;

const IO_PORT_DEV: &str = "/dev/port";

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A value read from or written to hardware.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Bytes(Vec<u8>),
    Text(String),
}

impl Value {
    /// Integer view; booleans count as 0/1.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Applies a bit mask to integer values and leaves other values alone.
    pub fn masked(&self, mask: i64) -> Value {
        match self.as_int() {
            Some(v) => Value::Int(v & mask),
            None => self.clone(),
        }
    }

    /// Equality with 0/1 integers standing in for booleans.
    pub fn loosely_eq(&self, other: &Value) -> bool {
        match (self.as_int(), other.as_int()) {
            (Some(a), Some(b)) => a == b,
            _ => self == other,
        }
    }

    /// `0x..` for integers, plain text otherwise.
    pub fn to_hex(&self) -> String {
        match self.as_int() {
            Some(v) => format!("0x{:x}", v),
            None => self.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(v) => write!(f, "{}", v),
            Value::Bytes(bytes) => {
                let parts: Vec<String> = bytes.iter().map(|b| b.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

/// Expected value of a check: one value or any of a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OkVal {
    Any(Vec<Value>),
    One(Value),
}

impl OkVal {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            OkVal::One(expected) => value.loosely_eq(expected),
            OkVal::Any(list) => list.iter().any(|expected| value.loosely_eq(expected)),
        }
    }
}

impl fmt::Display for OkVal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OkVal::One(v) => write!(f, "{}", v),
            OkVal::Any(list) => {
                let parts: Vec<String> = list.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

/// Where a value lives and how to reach it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "gettype", rename_all = "snake_case")]
pub enum Source {
    Sysfs {
        loc: String,
    },
    I2c {
        bus: u32,
        loc: u16,
        #[serde(default)]
        offset: u16,
    },
    #[serde(rename = "i2cword")]
    I2cWord {
        bus: u32,
        loc: u16,
        #[serde(default)]
        offset: u16,
    },
    #[serde(rename = "i2cbyte")]
    I2cByte {
        bus: u32,
        loc: u16,
    },
    Io {
        io_addr: u64,
    },
    Devfile {
        path: String,
        #[serde(default)]
        offset: u64,
        #[serde(default = "default_read_len")]
        read_len: usize,
    },
    Cmd {
        cmd: String,
    },
    CmdStr {
        cmd: String,
    },
    FileExist {
        judge_file: String,
    },
    BitRd {
        rd_config: Box<Access>,
        rd_bit: u32,
    },
    BitWr {
        val_config: Box<Access>,
    },
    CreatFile {
        file: String,
    },
    RemoveFile {
        file: String,
    },
    LoadProcess {
        script_name: String,
        #[serde(default)]
        support_multi_process: bool,
    },
    LogToFile {
        log_file_path: String,
        log_config: Box<Access>,
        #[serde(default = "default_file_max_size")]
        file_max_size: u64,
    },
}

fn default_read_len() -> usize {
    1
}

fn default_file_max_size() -> u64 {
    DEFAULT_LOG_FILE_MAX_SIZE
}

/// One value access descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Access {
    #[serde(flatten)]
    pub source: Source,

    /// Radix used to parse textual reads (default 16).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub int_decode: Option<u32>,

    /// Seconds to wait before each attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub okval: Option<OkVal>,

    /// Value to write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,

    /// Read performed before a write; the write only happens when the
    /// masked reading equals the pre-check `okval`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_check: Option<Box<Access>>,

    /// Report success after the first write attempt whatever its outcome.
    #[serde(default)]
    pub ignore_result: bool,

    /// Attempts made by the check operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<u32>,

    /// Seconds slept between failed checks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sleep_time: Option<f64>,
}

/// Outcome of a successful [`Access::set_value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    Written,
    /// The pre-check did not match, nothing was written.
    Skipped,
    /// The write failed but `ignore_result` was set.
    Ignored,
}

/// Whether a reading matched its expected value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Ok,
    NotOk,
}

/// Result of [`Access::check_value_and_get_value`]: the status and the
/// masked reading, which is reported whatever the status.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    pub status: CheckStatus,
    pub value: Value,
}

impl Access {
    /// Descriptor with no options around `source`.
    pub fn new(source: Source) -> Self {
        Self {
            source,
            int_decode: None,
            delay: None,
            mask: None,
            okval: None,
            value: None,
            pre_check: None,
            ignore_result: false,
            retry: None,
            sleep_time: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_mask(mut self, mask: i64) -> Self {
        self.mask = Some(mask);
        self
    }

    pub fn with_okval(mut self, okval: OkVal) -> Self {
        self.okval = Some(okval);
        self
    }

    pub fn with_pre_check(mut self, pre_check: Access) -> Self {
        self.pre_check = Some(Box::new(pre_check));
        self
    }

    fn radix(&self) -> u32 {
        self.int_decode.unwrap_or(16)
    }

    async fn pause_before_attempt(&self) {
        if let Some(delay) = self.delay.filter(|d| *d > 0.0) {
            tokio::time::sleep(Duration::from_secs_f64(delay)).await;
        }
    }

    fn parse(&self, context: &str, text: &str) -> PlatformResult<Value> {
        parse_int(text, self.radix())
            .map(Value::Int)
            .ok_or_else(|| PlatformError::parse(context, text, "not an integer"))
    }

    fn write_value(&self) -> PlatformResult<i64> {
        self.value
            .as_ref()
            .and_then(Value::as_int)
            .ok_or_else(|| PlatformError::invalid_config("value", "integer value required for write"))
    }

    /// Single read attempt.
    pub async fn get_value_once(&self, sysfs: &Sysfs) -> PlatformResult<Value> {
        self.pause_before_attempt().await;

        match &self.source {
            Source::Sysfs { loc } => {
                let path = glob_or_plain(sysfs, loc);
                let text = sysfs.read_str(&path)?;
                self.parse(loc, &text)
            }
            Source::I2c { bus, loc, offset } => {
                let cmd = format!("{} -f -y {} 0x{:02x} 0x{:02x}", I2CGET_CMD, bus, loc, offset);
                let text = shell::exec_or_fail(&cmd).await?;
                self.parse(&cmd, &text)
            }
            Source::I2cWord { bus, loc, offset } => {
                let cmd = format!("{} -f -y {} 0x{:02x} 0x{:02x} w", I2CGET_CMD, bus, loc, offset);
                let text = shell::exec_or_fail(&cmd).await?;
                self.parse(&cmd, &text)
            }
            Source::I2cByte { bus, loc } => {
                let cmd = format!("{} -f -y {} 0x{:02x}", I2CGET_CMD, bus, loc);
                let text = shell::exec_or_fail(&cmd).await?;
                self.parse(&cmd, &text)
            }
            Source::Io { io_addr } => {
                let bytes = sysfs.read_bytes(IO_PORT_DEV, *io_addr, 1)?;
                bytes
                    .first()
                    .map(|b| Value::Int(i64::from(*b)))
                    .ok_or_else(|| PlatformError::access(format!("io_addr 0x{:x} read failed", io_addr)))
            }
            Source::Devfile {
                path,
                offset,
                read_len,
            } => {
                if !sysfs.exists(path) {
                    return Err(PlatformError::access(format!("{} not found", path)));
                }
                let bytes = sysfs.read_bytes(path, *offset, *read_len)?;
                if bytes.len() < *read_len {
                    return Err(PlatformError::access(format!(
                        "devfile read failed. path:{}, offset:0x{:x}, read_len:{}",
                        path, offset, read_len
                    )));
                }
                if *read_len == 1 {
                    Ok(Value::Int(i64::from(bytes[0])))
                } else {
                    Ok(Value::Bytes(bytes))
                }
            }
            Source::Cmd { cmd } => {
                let text = shell::exec_or_fail(cmd).await?;
                self.parse(cmd, &text)
            }
            Source::CmdStr { cmd } => Ok(Value::Text(shell::exec_or_fail(cmd).await?)),
            Source::FileExist { judge_file } => Ok(Value::Bool(sysfs.exists(judge_file))),
            Source::BitRd { rd_config, rd_bit } => {
                let raw = rd_config.get_value_once_boxed(sysfs).await?;
                let raw = raw.as_int().ok_or_else(|| {
                    PlatformError::access(format!("bit_rd read non-integer value {}", raw))
                })?;
                let bit = raw.checked_shr(*rd_bit).ok_or_else(|| {
                    PlatformError::invalid_config("rd_bit", format!("bit {} is out of range", rd_bit))
                })?;
                Ok(Value::Int(bit & 1))
            }
            _ => Err(PlatformError::not_supported(format!(
                "{} is not a readable access type",
                self.kind()
            ))),
        }
    }

    fn get_value_once_boxed<'a>(&'a self, sysfs: &'a Sysfs) -> BoxFuture<'a, PlatformResult<Value>> {
        Box::pin(self.get_value_once(sysfs))
    }

    /// Reads with up to [`ACCESS_RETRIES`] attempts.
    pub async fn get_value(&self, sysfs: &Sysfs) -> PlatformResult<Value> {
        let mut last_err = None;
        for _ in 0..ACCESS_RETRIES {
            match self.get_value_once(sysfs).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_not_supported() => return Err(e),
                Err(e) => last_err = Some(e),
            }
            tokio::time::sleep(ACCESS_RETRY_PAUSE).await;
        }
        Err(last_err.unwrap_or_else(|| PlatformError::access(format!("{} read failed", self.kind()))))
    }

    /// Combines the configured value with the current register contents
    /// when a partial mask is set.
    async fn merged_write_value(&self, sysfs: &Sysfs) -> PlatformResult<i64> {
        let value = self.write_value()?;
        let mask = self.mask.unwrap_or(0xff);
        if mask == 0xff || mask == 0 {
            return Ok(value);
        }
        let mut read_back = self.clone();
        read_back.int_decode = Some(16);
        read_back.delay = None;
        let current = read_back
            .get_value_once(sysfs)
            .await?
            .as_int()
            .ok_or_else(|| PlatformError::access("read-modify-write read non-integer value"))?;
        Ok((current & mask) | value)
    }

    /// Single write attempt.
    pub async fn set_value_once(&self, sysfs: &Sysfs) -> PlatformResult<()> {
        self.pause_before_attempt().await;

        match &self.source {
            Source::Sysfs { loc } => {
                let value = self.merged_write_value(sysfs).await?;
                let path = glob_or_plain(sysfs, loc);
                if !sysfs.exists(&path) {
                    return Err(PlatformError::access(format!("{} not found", loc)));
                }
                sysfs.write_str(&path, format!("0x{:02x}", value))
            }
            Source::I2c { bus, loc, offset } => {
                let value = self.merged_write_value(sysfs).await?;
                let cmd = format!(
                    "{} -f -y {} 0x{:02x} 0x{:02x} 0x{:02x}",
                    I2CSET_CMD, bus, loc, offset, value
                );
                shell::exec_or_fail(&cmd).await.map(|_| ())
            }
            Source::I2cWord { bus, loc, offset } => {
                let value = self.merged_write_value(sysfs).await?;
                let cmd = format!(
                    "{} -f -y {} 0x{:02x} 0x{:02x} 0x{:x} w",
                    I2CSET_CMD, bus, loc, offset, value
                );
                shell::exec_or_fail(&cmd).await.map(|_| ())
            }
            Source::I2cByte { bus, loc } => {
                let value = self.merged_write_value(sysfs).await?;
                let cmd = format!("{} -f -y {} 0x{:02x} 0x{:02x}", I2CSET_CMD, bus, loc, value);
                shell::exec_or_fail(&cmd).await.map(|_| ())
            }
            Source::Io { io_addr } => {
                let value = self.merged_write_value(sysfs).await?;
                sysfs.write_bytes(IO_PORT_DEV, *io_addr, &[(value & 0xff) as u8])
            }
            Source::Devfile { path, offset, .. } => {
                let bytes = match &self.value {
                    Some(Value::Bytes(bytes)) if !bytes.is_empty() => bytes.clone(),
                    Some(Value::Int(v)) => vec![(*v & 0xff) as u8],
                    other => {
                        return Err(PlatformError::invalid_config(
                            "value",
                            format!("devfile write needs a byte or byte list, got {:?}", other),
                        ))
                    }
                };
                if !sysfs.exists(path) {
                    return Err(PlatformError::access(format!("{} not found", path)));
                }
                sysfs.write_bytes(path, *offset, &bytes)
            }
            Source::Cmd { cmd } => shell::exec_or_fail(cmd).await.map(|_| ()),
            Source::BitWr { val_config } => {
                let mask = self
                    .mask
                    .ok_or_else(|| PlatformError::invalid_config("mask", "bit_wr requires mask"))?;
                let bit_value = self.write_value()?;
                let current = val_config
                    .get_value_once_boxed(sysfs)
                    .await?
                    .as_int()
                    .ok_or_else(|| PlatformError::access("bit_wr read non-integer value"))?;
                let mut write = (**val_config).clone();
                write.value = Some(Value::Int((current & mask) | bit_value));
                write.set_value_once_boxed(sysfs).await
            }
            Source::CreatFile { file } => {
                sysfs.touch(file)?;
                sync_filesystems().await;
                Ok(())
            }
            Source::RemoveFile { file } => {
                sysfs.remove(file)?;
                sync_filesystems().await;
                Ok(())
            }
            Source::LoadProcess {
                script_name,
                support_multi_process,
            } => {
                if !support_multi_process && !find_pids(sysfs, script_name).is_empty() {
                    debug!(script = %script_name, "Process already running");
                    return Ok(());
                }
                shell::exec_or_fail(&load_process_cmd(script_name)).await.map(|_| ())
            }
            Source::LogToFile {
                log_file_path,
                log_config,
                file_max_size,
            } => {
                let reading = log_config.get_value_once_boxed(sysfs).await?;
                append_rotating(sysfs, Path::new(log_file_path), &reading.to_string(), *file_max_size)
            }
            _ => Err(PlatformError::not_supported(format!(
                "{} is not a writable access type",
                self.kind()
            ))),
        }
    }

    fn set_value_once_boxed<'a>(&'a self, sysfs: &'a Sysfs) -> BoxFuture<'a, PlatformResult<()>> {
        Box::pin(self.set_value_once(sysfs))
    }

    /// Writes with an optional pre-check and up to [`ACCESS_RETRIES`]
    /// attempts.
    pub async fn set_value(&self, sysfs: &Sysfs) -> PlatformResult<SetOutcome> {
        if let Some(pre_check) = &self.pre_check {
            let reading = pre_check.get_value(sysfs).await.map_err(|e| {
                PlatformError::access(format!("do pre check get_value failed, msg: {}", e))
            })?;
            let value = match pre_check.mask {
                Some(mask) => reading.masked(mask),
                None => reading.clone(),
            };
            let ok = pre_check
                .okval
                .as_ref()
                .is_some_and(|okval| okval.matches(&value));
            if !ok {
                debug!(
                    rd_value = %reading,
                    "pre_check not ok, don't need to set_value"
                );
                return Ok(SetOutcome::Skipped);
            }
        }

        let mut last_err = None;
        for _ in 0..ACCESS_RETRIES {
            match self.set_value_once(sysfs).await {
                Ok(()) => return Ok(SetOutcome::Written),
                Err(e) if self.ignore_result => {
                    debug!(error = %e, "Write failed, result ignored");
                    return Ok(SetOutcome::Ignored);
                }
                Err(e) if e.is_not_supported() => return Err(e),
                Err(e) => last_err = Some(e),
            }
            tokio::time::sleep(ACCESS_RETRY_PAUSE).await;
        }
        Err(last_err.unwrap_or_else(|| PlatformError::access(format!("{} write failed", self.kind()))))
    }

    /// Reads (with retries) and compares the masked value with `okval`,
    /// up to `retry` times (default 1), sleeping `sleep_time` after a
    /// mismatch. Returns `Ok(false)` when every attempt mismatched.
    pub async fn check_value(&self, sysfs: &Sysfs) -> PlatformResult<bool> {
        let okval = self
            .okval
            .as_ref()
            .ok_or_else(|| PlatformError::invalid_config("okval", "check requires okval"))?;
        let attempts = self.retry.unwrap_or(1).max(1);
        for attempt in 0..attempts {
            let reading = self.get_value(sysfs).await?;
            let value = match self.mask {
                Some(mask) => reading.masked(mask),
                None => reading.clone(),
            };
            if okval.matches(&value) {
                debug!(rd_value = %reading, okval = %okval, retry = attempt, "check ok");
                return Ok(true);
            }
            if let Some(pause) = self.sleep_time.filter(|s| *s > 0.0) {
                tokio::time::sleep(Duration::from_secs_f64(pause)).await;
            }
        }
        Ok(false)
    }

    /// Reads, masks (default 0xff) and compares with `okval`, returning the
    /// status together with the masked value. `retry` (default 6) bounds the
    /// number of full [`Access::get_value`] rounds.
    pub async fn check_value_and_get_value(&self, sysfs: &Sysfs) -> PlatformResult<CheckResult> {
        let okval = self.okval.as_ref().ok_or_else(|| {
            PlatformError::invalid_config("okval", format!("okval is None. config: {:?}", self))
        })?;
        let mask = self.mask.unwrap_or(0xff);
        let attempts = self.retry.unwrap_or(ACCESS_RETRIES).max(1);

        let mut last_err = None;
        for _ in 0..attempts {
            match self.get_value(sysfs).await {
                Ok(reading) => {
                    let value = reading.masked(mask);
                    let status = if okval.matches(&value) {
                        CheckStatus::Ok
                    } else {
                        CheckStatus::NotOk
                    };
                    return Ok(CheckResult { status, value });
                }
                Err(e) => last_err = Some(e),
            }
            tokio::time::sleep(ACCESS_RETRY_PAUSE).await;
        }
        Err(last_err.unwrap_or_else(|| PlatformError::access("check_value_and_get_value failed")))
    }

    /// The `gettype` tag, for log messages.
    pub fn kind(&self) -> &'static str {
        match &self.source {
            Source::Sysfs { .. } => "sysfs",
            Source::I2c { .. } => "i2c",
            Source::I2cWord { .. } => "i2cword",
            Source::I2cByte { .. } => "i2cbyte",
            Source::Io { .. } => "io",
            Source::Devfile { .. } => "devfile",
            Source::Cmd { .. } => "cmd",
            Source::CmdStr { .. } => "cmd_str",
            Source::FileExist { .. } => "file_exist",
            Source::BitRd { .. } => "bit_rd",
            Source::BitWr { .. } => "bit_wr",
            Source::CreatFile { .. } => "creat_file",
            Source::RemoveFile { .. } => "remove_file",
            Source::LoadProcess { .. } => "load_process",
            Source::LogToFile { .. } => "log_to_file",
        }
    }
}

fn glob_or_plain(sysfs: &Sysfs, loc: &str) -> PathBuf {
    if loc.contains('*') {
        sysfs
            .resolve_glob(loc)
            .unwrap_or_else(|| PathBuf::from(loc))
    } else {
        PathBuf::from(loc)
    }
}

async fn sync_filesystems() {
    if let Err(e) = shell::exec(SYNC_CMD).await {
        warn!(error = %e, "sync failed");
    }
}

/// Starts `script` detached from the caller.
fn load_process_cmd(script: &str) -> String {
    format!("nohup {} start > /dev/null 2>&1 &", shell::shellquote(script))
}

/// Process ids whose command line contains `name`.
pub fn find_pids(sysfs: &Sysfs, name: &str) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(sysfs.resolve("/proc")) else {
        return Vec::new();
    };
    entries
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|pid| pid.chars().all(|c| c.is_ascii_digit()))
        .filter(|pid| {
            sysfs
                .read_all_bytes(format!("/proc/{}/cmdline", pid))
                .map(|raw| String::from_utf8_lossy(&raw).contains(name))
                .unwrap_or(false)
        })
        .collect()
}

/// Appends one timestamped line, rotating `path` to `path.1`..`path.3`
/// once it would grow past `max_size`.
fn append_rotating(sysfs: &Sysfs, path: &Path, content: &str, max_size: u64) -> PlatformResult<()> {
    if let Some(parent) = path.parent() {
        sysfs.create_dir_all(parent)?;
    }
    let line = format!(
        "{} INFO {}\n",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
        content
    );
    let size = sysfs.file_size(path).unwrap_or(0);
    if max_size > 0 && size + line.len() as u64 > max_size {
        let backup = |n: u32| PathBuf::from(format!("{}.{}", path.display(), n));
        for n in (1..LOG_FILE_BACKUPS).rev() {
            if sysfs.exists(backup(n)) {
                sysfs.rename(backup(n), backup(n + 1))?;
            }
        }
        sysfs.rename(path, backup(1))?;
    }
    sysfs.append_str(path, &line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Sysfs) {
        let dir = TempDir::new().unwrap();
        let sysfs = Sysfs::with_root(dir.path());
        sysfs.create_dir_all("/sys/cpld").unwrap();
        (dir, sysfs)
    }

    fn sysfs_access(loc: &str) -> Access {
        Access::new(Source::Sysfs {
            loc: loc.to_string(),
        })
    }

    #[test]
    fn test_deserialize_descriptors() {
        let access: Access = toml::from_str(
            r#"
gettype = "i2c"
bus = 2
loc = 0x1d
offset = 0x34
mask = 0x01
okval = 0
"#,
        )
        .unwrap();
        assert_eq!(
            access.source,
            Source::I2c {
                bus: 2,
                loc: 0x1d,
                offset: 0x34
            }
        );
        assert_eq!(access.mask, Some(1));
        assert_eq!(access.okval, Some(OkVal::One(Value::Int(0))));

        let access: Access = serde_json::from_str(
            r#"{"gettype": "bit_rd", "rd_bit": 3, "okval": [1, 2],
                "rd_config": {"gettype": "sysfs", "loc": "/sys/cpld/reg", "int_decode": 10}}"#,
        )
        .unwrap();
        assert_eq!(access.kind(), "bit_rd");
        assert_eq!(
            access.okval,
            Some(OkVal::Any(vec![Value::Int(1), Value::Int(2)]))
        );
        match access.source {
            Source::BitRd { rd_config, rd_bit } => {
                assert_eq!(rd_bit, 3);
                assert_eq!(rd_config.int_decode, Some(10));
            }
            other => panic!("unexpected source {:?}", other),
        }
    }

    #[test]
    fn test_okval_matching() {
        assert!(OkVal::One(Value::Bool(true)).matches(&Value::Int(1)));
        assert!(OkVal::Any(vec![Value::Int(1), Value::Int(3)]).matches(&Value::Int(3)));
        assert!(!OkVal::Any(vec![Value::Int(1)]).matches(&Value::Int(2)));
        assert!(OkVal::One(Value::Text("ok".into())).matches(&Value::Text("ok".into())));
    }

    #[tokio::test]
    async fn test_sysfs_read_with_int_decode() {
        let (_dir, sysfs) = setup();
        sysfs.write_str("/sys/cpld/reg", "0x1a\n").unwrap();
        sysfs.write_str("/sys/cpld/status", "1\n").unwrap();

        let value = sysfs_access("/sys/cpld/reg").get_value(&sysfs).await.unwrap();
        assert_eq!(value, Value::Int(0x1a));

        let mut decimal = sysfs_access("/sys/cpld/status");
        decimal.int_decode = Some(10);
        assert_eq!(decimal.get_value_once(&sysfs).await.unwrap(), Value::Int(1));
    }

    #[tokio::test]
    async fn test_sysfs_write_read_modify_write() {
        let (_dir, sysfs) = setup();
        sysfs.write_str("/sys/cpld/ctrl", "0xf0").unwrap();

        let full = sysfs_access("/sys/cpld/ctrl").with_value(0x05);
        assert_eq!(full.set_value(&sysfs).await.unwrap(), SetOutcome::Written);
        assert_eq!(sysfs.read_str("/sys/cpld/ctrl").unwrap(), "0x05");

        sysfs.write_str("/sys/cpld/ctrl", "0xf0").unwrap();
        let partial = sysfs_access("/sys/cpld/ctrl").with_value(0x01).with_mask(0xfe);
        partial.set_value_once(&sysfs).await.unwrap();
        assert_eq!(sysfs.read_str("/sys/cpld/ctrl").unwrap(), "0xf1");
    }

    #[tokio::test]
    async fn test_pre_check_mismatch_skips_write() {
        let (_dir, sysfs) = setup();
        sysfs.write_str("/sys/cpld/ctrl", "0x00").unwrap();

        let gate = Access::new(Source::FileExist {
            judge_file: "/sys/cpld/bound".to_string(),
        })
        .with_okval(OkVal::One(Value::Bool(true)));
        let write = sysfs_access("/sys/cpld/ctrl")
            .with_value(0x07)
            .with_pre_check(gate);

        assert_eq!(write.set_value(&sysfs).await.unwrap(), SetOutcome::Skipped);
        assert_eq!(sysfs.read_str("/sys/cpld/ctrl").unwrap(), "0x00");

        sysfs.touch("/sys/cpld/bound").unwrap();
        assert_eq!(write.set_value(&sysfs).await.unwrap(), SetOutcome::Written);
        assert_eq!(sysfs.read_str("/sys/cpld/ctrl").unwrap(), "0x07");
    }

    #[tokio::test]
    async fn test_ignore_result_returns_after_first_failure() {
        let (_dir, sysfs) = setup();
        let mut write = sysfs_access("/sys/cpld/missing").with_value(1);
        write.ignore_result = true;
        assert_eq!(write.set_value(&sysfs).await.unwrap(), SetOutcome::Ignored);
    }

    #[tokio::test]
    async fn test_devfile_and_io() {
        let (_dir, sysfs) = setup();
        sysfs.create_dir_all("/dev").unwrap();
        sysfs.write_str("/dev/eeprom", "\u{1}\u{2}\u{3}\u{4}").unwrap();
        sysfs.write_str("/dev/port", "\0\0\0\u{7f}").unwrap();

        let one = Access::new(Source::Devfile {
            path: "/dev/eeprom".into(),
            offset: 1,
            read_len: 1,
        });
        assert_eq!(one.get_value_once(&sysfs).await.unwrap(), Value::Int(2));

        let many = Access::new(Source::Devfile {
            path: "/dev/eeprom".into(),
            offset: 1,
            read_len: 3,
        });
        assert_eq!(
            many.get_value_once(&sysfs).await.unwrap(),
            Value::Bytes(vec![2, 3, 4])
        );

        let write = Access::new(Source::Devfile {
            path: "/dev/eeprom".into(),
            offset: 0,
            read_len: 1,
        })
        .with_value(Value::Bytes(vec![9, 9]));
        write.set_value_once(&sysfs).await.unwrap();
        assert_eq!(sysfs.read_bytes("/dev/eeprom", 0, 4).unwrap(), vec![9, 9, 3, 4]);

        let io = Access::new(Source::Io { io_addr: 3 });
        assert_eq!(io.get_value_once(&sysfs).await.unwrap(), Value::Int(0x7f));
    }

    #[tokio::test]
    async fn test_bit_rd_and_bit_wr() {
        let (_dir, sysfs) = setup();
        sysfs.write_str("/sys/cpld/reg", "0x0c").unwrap();

        let bit = Access::new(Source::BitRd {
            rd_config: Box::new(sysfs_access("/sys/cpld/reg")),
            rd_bit: 2,
        });
        assert_eq!(bit.get_value_once(&sysfs).await.unwrap(), Value::Int(1));

        let top = Access::new(Source::BitRd {
            rd_config: Box::new(sysfs_access("/sys/cpld/reg")),
            rd_bit: 63,
        });
        assert_eq!(top.get_value_once(&sysfs).await.unwrap(), Value::Int(0));

        let beyond = Access::new(Source::BitRd {
            rd_config: Box::new(sysfs_access("/sys/cpld/reg")),
            rd_bit: 64,
        });
        assert!(matches!(
            beyond.get_value_once(&sysfs).await,
            Err(PlatformError::InvalidConfig { .. })
        ));

        let set = Access::new(Source::BitWr {
            val_config: Box::new(sysfs_access("/sys/cpld/reg")),
        })
        .with_mask(0xfb)
        .with_value(0);
        set.set_value_once(&sysfs).await.unwrap();
        assert_eq!(sysfs.read_str("/sys/cpld/reg").unwrap(), "0x08");
    }

    #[tokio::test]
    async fn test_cmd_kinds() {
        let (_dir, sysfs) = setup();
        let cmd = Access::new(Source::Cmd {
            cmd: "echo 0x12".into(),
        });
        assert_eq!(cmd.get_value_once(&sysfs).await.unwrap(), Value::Int(0x12));

        let text = Access::new(Source::CmdStr {
            cmd: "echo ready".into(),
        });
        assert_eq!(
            text.get_value_once(&sysfs).await.unwrap(),
            Value::Text("ready".into())
        );

        let failing = Access::new(Source::Cmd {
            cmd: "exit 1".into(),
        });
        assert!(failing.get_value_once(&sysfs).await.is_err());
    }

    #[tokio::test]
    async fn test_create_and_remove_file() {
        let (_dir, sysfs) = setup();
        let create = Access::new(Source::CreatFile {
            file: "/etc/.flag".into(),
        });
        create.set_value(&sysfs).await.unwrap();
        assert!(sysfs.exists("/etc/.flag"));

        let remove = Access::new(Source::RemoveFile {
            file: "/etc/.flag".into(),
        });
        remove.set_value(&sysfs).await.unwrap();
        assert!(!sysfs.exists("/etc/.flag"));
    }

    #[tokio::test]
    async fn test_check_value() {
        let (_dir, sysfs) = setup();
        sysfs.write_str("/sys/cpld/event", "0x81").unwrap();

        let mut check = sysfs_access("/sys/cpld/event")
            .with_mask(0x0f)
            .with_okval(OkVal::One(Value::Int(1)));
        assert!(check.check_value(&sysfs).await.unwrap());

        check.okval = Some(OkVal::One(Value::Int(0)));
        assert!(!check.check_value(&sysfs).await.unwrap());

        check.okval = None;
        assert!(check.check_value(&sysfs).await.is_err());
    }

    #[tokio::test]
    async fn test_check_value_and_get_value() {
        let (_dir, sysfs) = setup();
        sysfs.write_str("/sys/cpld/status", "0x1f3").unwrap();

        let check = sysfs_access("/sys/cpld/status").with_okval(OkVal::Any(vec![
            Value::Int(0xf3),
            Value::Int(0xf0),
        ]));
        let result = check.check_value_and_get_value(&sysfs).await.unwrap();
        assert_eq!(result.status, CheckStatus::Ok);
        assert_eq!(result.value, Value::Int(0xf3));

        let check = sysfs_access("/sys/cpld/status")
            .with_mask(0x0f)
            .with_okval(OkVal::One(Value::Int(0)));
        let result = check.check_value_and_get_value(&sysfs).await.unwrap();
        assert_eq!(result.status, CheckStatus::NotOk);
        assert_eq!(result.value.to_hex(), "0x3");

        let no_okval = sysfs_access("/sys/cpld/status");
        assert!(matches!(
            no_okval.check_value_and_get_value(&sysfs).await,
            Err(PlatformError::InvalidConfig { .. })
        ));
    }

    #[tokio::test]
    async fn test_log_to_file_appends_reading() {
        let (_dir, sysfs) = setup();
        sysfs.write_str("/sys/cpld/reg", "0x2a").unwrap();
        let log = Access::new(Source::LogToFile {
            log_file_path: "/var/log/bsp/reg.log".into(),
            log_config: Box::new(sysfs_access("/sys/cpld/reg")),
            file_max_size: DEFAULT_LOG_FILE_MAX_SIZE,
        });
        log.set_value_once(&sysfs).await.unwrap();
        log.set_value_once(&sysfs).await.unwrap();

        let content = sysfs.read_str("/var/log/bsp/reg.log").unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.lines().all(|l| l.ends_with("INFO 42")));
    }

    #[test]
    fn test_log_rotation() {
        let (_dir, sysfs) = setup();
        let path = Path::new("/var/log/small.log");
        for i in 0..4 {
            append_rotating(&sysfs, path, &format!("entry {}", i), 40).unwrap();
        }
        assert!(sysfs.exists("/var/log/small.log.1"));
        assert!(sysfs.read_str(path).unwrap().ends_with("entry 3"));
    }

    #[test]
    fn test_find_pids() {
        let (_dir, sysfs) = setup();
        sysfs.create_dir_all("/proc/1234").unwrap();
        sysfs.create_dir_all("/proc/self").unwrap();
        sysfs
            .write_str("/proc/1234/cmdline", "python3\0/usr/local/bin/fancontrol.py\0start")
            .unwrap();
        assert_eq!(find_pids(&sysfs, "fancontrol.py"), vec!["1234".to_string()]);
        assert!(find_pids(&sysfs, "dev_monitor.py").is_empty());
    }

    #[test]
    fn test_load_process_quotes_script_path() {
        assert_eq!(
            load_process_cmd("/usr/local/bin/fan control.sh"),
            "nohup \"/usr/local/bin/fan control.sh\" start > /dev/null 2>&1 &"
        );
        assert_eq!(
            load_process_cmd("/opt/$(reboot)"),
            "nohup \"/opt/\\$(reboot)\" start > /dev/null 2>&1 &"
        );
    }
}
