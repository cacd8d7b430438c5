//! Reboot-cause recorder, run once per boot.
//!
//! Each configured cause names a monitor point (a CPLD register latching
//! watchdog resets, power loss, ...) and the records to write when it
//! matched. When none matched, the `other_reboot_cause_record` list is
//! written instead.
//!
//! ```toml
//! [[reboot_cause_list]]
//! name = "wdt_reboot"
//! monitor_point = { gettype = "sysfs", loc = "/dev/cpld1/reboot_cause", mask = 0x01, okval = 1 }
//! record = [
//!     { record_type = "file", mode = "cover", log = "Watchdog reboot, ", path = "/etc/.reboot/.previous-reboot-cause.txt" },
//!     { record_type = "file", mode = "add", log = "Watchdog reboot, ", path = "/etc/.reboot/.history-reboot-cause.txt", file_max_size = 1048576 },
//! ]
//! finish_operation = [
//!     { gettype = "sysfs", loc = "/dev/cpld1/reboot_cause", value = 0 },
//! ]
//! ```

use std::path::Path;

use chrono::Local;
use serde::Deserialize;
use sonic_platform_common::access::{Access, OkVal, Value};
use sonic_platform_common::shell::{self, SYNC_CMD};
use sonic_platform_common::{PlatformError, PlatformResult, Sysfs};
use tracing::{debug, instrument, warn};

pub const DEBUG_FLAG: &str = "/etc/.reboot_cause_debug";

/// Present once the recorder ran during this boot.
pub const STARTED_FLAG: &str = "/tmp/.reboot_cause_started_flag";

/// `date`-style stamp appended to every record.
const RECORD_DATE_FORMAT: &str = "%a %b %e %H:%M:%S %Z %Y";

/// `reboot_cause.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RebootCauseConfig {
    #[serde(default)]
    pub reboot_cause_list: Vec<RebootCauseItem>,

    /// Records written when no cause matched.
    #[serde(default)]
    pub other_reboot_cause_record: Option<Vec<Record>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RebootCauseItem {
    pub name: String,
    pub monitor_point: MonitorPoint,
    pub record: Vec<Record>,

    /// Writes performed after the records, usually clearing the latch.
    #[serde(default)]
    pub finish_operation: Vec<Access>,
}

/// How a monitor point reading is compared with its `okval`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareMode {
    /// Equal to `okval`, or to one of a list.
    #[default]
    Equal,
    /// Greater than `okval`.
    Great,
    /// Any successful reading matches.
    Ignore,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorPoint {
    #[serde(flatten)]
    pub access: Access,

    #[serde(default)]
    pub compare_mode: CompareMode,
}

impl MonitorPoint {
    /// Whether the cause latched. Read failures count as not matched.
    pub async fn matches(&self, sysfs: &Sysfs) -> bool {
        let reading = match self.access.get_value(sysfs).await {
            Ok(value) => value,
            Err(e) => {
                warn!(kind = self.access.kind(), error = %e, "base point check failed");
                return false;
            }
        };
        warn!(kind = self.access.kind(), value = %reading, "get reboot cause");

        let value = match self.access.mask {
            Some(mask) => reading.masked(mask),
            None => reading,
        };
        let okval = self.access.okval.as_ref();
        match self.compare_mode {
            CompareMode::Equal => okval.is_some_and(|ok| ok.matches(&value)),
            CompareMode::Great => match (value.as_int(), okval) {
                (Some(v), Some(OkVal::One(Value::Int(ok)))) => v > *ok,
                _ => false,
            },
            CompareMode::Ignore => true,
        }
    }
}

/// Only file records exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    File,
}

/// Overwrite or append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordMode {
    Cover,
    Add,
}

/// Record text: literal, or read from hardware at record time.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RecordLog {
    Text(String),
    Read(Access),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Record {
    pub record_type: RecordType,
    pub mode: RecordMode,
    pub log: RecordLog,
    pub path: String,

    /// Size at which the file is moved to `<path>_bak`; 0 disables.
    #[serde(default)]
    pub file_max_size: u64,
}

impl Record {
    async fn write(&self, sysfs: &Sysfs, date: &str) -> PlatformResult<()> {
        let path = Path::new(&self.path);

        if self.file_max_size > 0 && sysfs.exists(path) && sysfs.file_size(path)? >= self.file_max_size {
            sysfs.rename(path, format!("{}_bak", self.path))?;
        }
        if let Some(parent) = path.parent() {
            sysfs.create_dir_all(parent)?;
        }

        let log = match &self.log {
            RecordLog::Text(text) => text.clone(),
            RecordLog::Read(access) => access
                .get_value(sysfs)
                .await
                .map_err(|e| PlatformError::access(format!("get reboot reason fail. reason: {}", e)))?
                .to_string(),
        };
        let line = format!("{} {}\n", log, date);
        match self.mode {
            RecordMode::Cover => sysfs.write_str(path, line)?,
            RecordMode::Add => sysfs.append_str(path, &line)?,
        }
        sync_filesystems().await;
        Ok(())
    }
}

async fn sync_filesystems() {
    if let Err(e) = shell::exec(SYNC_CMD).await {
        warn!(error = %e, "sync failed");
    }
}

/// What a recorder run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordReport {
    /// The recorder already ran during this boot.
    pub already_started: bool,
    /// Names of the causes that matched.
    pub matched: Vec<String>,
    /// The "other" records were written.
    pub other: bool,
    /// Records that could not be written.
    pub failed_records: usize,
}

pub struct RebootCauseRecorder {
    sysfs: Sysfs,
    config: RebootCauseConfig,
}

impl RebootCauseRecorder {
    pub fn new(sysfs: Sysfs, config: RebootCauseConfig) -> Self {
        Self { sysfs, config }
    }

    async fn write_records(&self, records: &[Record], date: &str) -> usize {
        let mut failed = 0;
        for record in records {
            if let Err(e) = record.write(&self.sysfs, date).await {
                warn!(path = %record.path, error = %e, "reboot cause record failed");
                failed += 1;
            }
        }
        failed
    }

    /// Evaluates every cause and writes the matching records.
    #[instrument(skip(self))]
    pub async fn check(&self) -> RecordReport {
        let date = Local::now().format(RECORD_DATE_FORMAT).to_string();
        let mut report = RecordReport::default();

        for item in &self.config.reboot_cause_list {
            if !item.monitor_point.matches(&self.sysfs).await {
                continue;
            }
            debug!("{} reboot cause is happen", item.name);
            report.failed_records += self.write_records(&item.record, &date).await;
            report.matched.push(item.name.clone());
            for op in &item.finish_operation {
                if let Err(e) = op.set_value(&self.sysfs).await {
                    warn!(cause = %item.name, error = %e, "finish operation failed");
                }
            }
        }

        if report.matched.is_empty() {
            if let Some(records) = &self.config.other_reboot_cause_record {
                debug!("other reboot cause is happen");
                report.failed_records += self.write_records(records, &date).await;
                report.other = true;
            }
        }
        report
    }

    /// Runs [`Self::check`] unless it already ran this boot, then leaves
    /// the started flag behind.
    pub async fn run(&self) -> PlatformResult<RecordReport> {
        if self.sysfs.exists(STARTED_FLAG) {
            debug!("Reboot cause has been started and will not be started again");
            return Ok(RecordReport {
                already_started: true,
                ..Default::default()
            });
        }
        let report = self.check().await;
        self.sysfs.touch(STARTED_FLAG)?;
        sync_filesystems().await;
        Ok(report)
    }
}
