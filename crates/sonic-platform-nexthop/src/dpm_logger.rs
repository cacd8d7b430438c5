//! Reboot-cause history files.
//!
//! Every summarised boot is written to
//! `/host/reboot-cause/nexthop/reboot-cause-<UTC time>.json` along with the
//! DPM records it was derived from, since the DPMs are cleared afterwards.
//! `previous-reboot-cause.json` links to the newest file, and only the newest
//! [`RETENTION`] files are kept.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sonic_platform_common::Sysfs;
use tracing::{debug, info, warn};

use crate::dpm::{CauseKind, DpmPowerUps, RebootCause, RecordDict};
use crate::error::DpmResult;

pub const HISTORY_DIR: &str = "/host/reboot-cause/nexthop";
pub const PREVIOUS_FILE: &str = "previous-reboot-cause.json";
pub const RETENTION: usize = 50;
pub const SCHEMA_VERSION: i32 = 1;

const FILE_PREFIX: &str = "reboot-cause-";
const FILE_SUFFIX: &str = ".json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CauseV1 {
    pub source: String,
    pub timestamp: String,
    pub cause: String,
    pub description: String,
}

impl From<&RebootCause> for CauseV1 {
    fn from(cause: &RebootCause) -> Self {
        Self {
            source: cause.source.clone(),
            timestamp: cause.timestamp.to_string(),
            cause: cause.cause.clone(),
            description: match cause.kind {
                CauseKind::Hardware => cause.description.clone(),
                CauseKind::Software => "n/a".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DpmV1 {
    pub name: String,
    #[serde(rename = "type")]
    pub dpm_type: String,
    pub records: Vec<RecordDict>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataV1 {
    pub gen_time: String,
    pub schema_version: i32,
    pub causes: Vec<CauseV1>,
    pub dpms: Vec<DpmV1>,
}

/// Contents of one history file.
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryData {
    V1(DataV1),
    /// Missing, unreadable or of an unknown schema.
    Unknown,
}

impl HistoryData {
    pub fn gen_time(&self) -> &str {
        match self {
            HistoryData::V1(data) => &data.gen_time,
            HistoryData::Unknown => "",
        }
    }

    pub fn schema_version(&self) -> i32 {
        match self {
            HistoryData::V1(data) => data.schema_version,
            HistoryData::Unknown => -1,
        }
    }

    pub fn as_v1(&self) -> Option<&DataV1> {
        match self {
            HistoryData::V1(data) => Some(data),
            HistoryData::Unknown => None,
        }
    }
}

pub struct DpmLogger {
    sysfs: Sysfs,
    history_dir: PathBuf,
    retention: usize,
}

impl DpmLogger {
    pub fn new(sysfs: Sysfs) -> Self {
        Self {
            sysfs,
            history_dir: PathBuf::from(HISTORY_DIR),
            retention: RETENTION,
        }
    }

    pub fn with_history_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.history_dir = dir.into();
        self
    }

    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention;
        self
    }

    pub fn history_dir(&self) -> &Path {
        &self.history_dir
    }

    fn previous_link(&self) -> PathBuf {
        self.history_dir.join(PREVIOUS_FILE)
    }

    /// History files, oldest first. The timestamped names sort
    /// chronologically.
    fn sorted_history_files(&self) -> DpmResult<Vec<PathBuf>> {
        Ok(self
            .sysfs
            .list_dir(&self.history_dir)?
            .into_iter()
            .filter(|name| name.starts_with(FILE_PREFIX) && name.ends_with(FILE_SUFFIX))
            .map(|name| self.history_dir.join(name))
            .collect())
    }

    fn enforce_retention(&self) -> DpmResult<()> {
        let files = self.sorted_history_files()?;
        let excess = files.len().saturating_sub(self.retention);
        for old in &files[..excess] {
            debug!(file = %old.display(), "Removing old reboot-cause history");
            self.sysfs.remove(old)?;
        }
        Ok(())
    }

    pub fn save(&self, causes: &[RebootCause], dpms: &[DpmPowerUps]) -> DpmResult<PathBuf> {
        self.save_at(Utc::now(), causes, dpms)
    }

    /// Writes a history file stamped `gen_time` and points the
    /// previous-cause link at it.
    pub fn save_at(
        &self,
        gen_time: DateTime<Utc>,
        causes: &[RebootCause],
        dpms: &[DpmPowerUps],
    ) -> DpmResult<PathBuf> {
        let file = self.history_dir.join(format!(
            "{FILE_PREFIX}{}{FILE_SUFFIX}",
            gen_time.format("%Y_%m_%d_%H_%M_%S")
        ));
        let data = DataV1 {
            gen_time: gen_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            schema_version: SCHEMA_VERSION,
            causes: causes.iter().map(CauseV1::from).collect(),
            dpms: dpms
                .iter()
                .map(|dpm| DpmV1 {
                    name: dpm.name.clone(),
                    dpm_type: dpm.dpm_type.as_str().to_string(),
                    records: dpm
                        .powerups
                        .iter()
                        .flat_map(|p| p.records.iter().map(|r| r.as_dict()))
                        .collect(),
                })
                .collect(),
        };

        self.sysfs.create_dir_all(&self.history_dir)?;
        self.sysfs.write_str(&file, serde_json::to_string(&data)?)?;
        self.enforce_retention()?;
        self.sysfs.symlink(&file, self.previous_link())?;
        info!(file = %file.display(), causes = causes.len(), "Saved reboot-cause history");
        Ok(file)
    }

    fn load_file(&self, path: &Path) -> HistoryData {
        let text = match self.sysfs.read_str(path) {
            Ok(text) => text,
            Err(e) => {
                debug!(file = %path.display(), error = %e, "No reboot-cause history");
                return HistoryData::Unknown;
            }
        };
        let value: serde_json::Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Corrupt reboot-cause history");
                return HistoryData::Unknown;
            }
        };
        if value.get("schema_version").and_then(|v| v.as_i64()) != Some(i64::from(SCHEMA_VERSION)) {
            return HistoryData::Unknown;
        }
        match serde_json::from_value(value) {
            Ok(data) => HistoryData::V1(data),
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Malformed reboot-cause history");
                HistoryData::Unknown
            }
        }
    }

    /// The newest history file.
    pub fn load(&self) -> HistoryData {
        self.load_file(&self.previous_link())
    }

    /// Every history file, oldest first.
    pub fn load_all(&self) -> DpmResult<Vec<HistoryData>> {
        Ok(self
            .sorted_history_files()?
            .iter()
            .map(|path| self.load_file(path))
            .collect())
    }
}
