//! Device-independent DPM (digital power manager) types.
//!
//! A DPM keeps a blackbox of records, each tagged with the powerup counter
//! that was current when it was written. Grouping records by that counter
//! gives one [`DpmPowerUpEntry`] per powerup, and the first record of a
//! powerup that matches a configured fault signature becomes the
//! [`RebootCause`] of the power cycle that ended it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DpmResult;

/// String map rendering of one record, in display order.
pub type RecordDict = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CauseKind {
    Hardware,
    Software,
}

impl CauseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CauseKind::Hardware => "HW",
            CauseKind::Software => "SW",
        }
    }
}

/// When a cause happened, as far as its source can tell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timestamp {
    Unknown,
    /// Time elapsed since the DPM powered on.
    SincePowerOn(Duration),
    /// Wall clock time, for DPMs whose RTC was synced.
    Utc(DateTime<Utc>),
}

impl Timestamp {
    pub fn as_utc(&self) -> Option<DateTime<Utc>> {
        match self {
            Timestamp::Utc(t) => Some(*t),
            _ => None,
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timestamp::Unknown => f.write_str("unknown"),
            Timestamp::SincePowerOn(d) => write!(f, "{:.6}s after power-on", d.as_secs_f64()),
            Timestamp::Utc(t) => write!(f, "{}", t.format("%Y-%m-%d %H:%M:%S UTC")),
        }
    }
}

/// A hardware power fault or a software-triggered reboot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebootCause {
    pub kind: CauseKind,
    /// DPM name for hardware causes, `SW` for software ones.
    pub source: String,
    pub timestamp: Timestamp,
    /// Concise cause.
    pub cause: String,
    pub description: String,
    /// One of the `REBOOT_CAUSE_*` keys, e.g. `REBOOT_CAUSE_POWER_LOSS`.
    pub chassis_reboot_cause_category: String,
}

impl RebootCause {
    /// Placeholder for a reboot no DPM has a fault record for.
    pub fn unknown_hardware() -> Self {
        Self {
            kind: CauseKind::Hardware,
            source: "unknown".to_string(),
            timestamp: Timestamp::Unknown,
            cause: "unknown".to_string(),
            description: "unknown".to_string(),
            chassis_reboot_cause_category: "REBOOT_CAUSE_HARDWARE_OTHER".to_string(),
        }
    }

    pub fn is_hardware(&self) -> bool {
        self.kind == CauseKind::Hardware
    }
}

/// One decoded blackbox record.
pub trait DpmRecord: fmt::Debug + Send + Sync {
    fn dpm_name(&self) -> &str;

    fn powerup_counter(&self) -> u32;

    fn timestamp(&self) -> Timestamp;

    /// False for slots the DPM marks as empty.
    fn is_valid(&self) -> bool;

    /// The fault this record documents, once matched against the board's
    /// fault signatures.
    fn power_fault_cause(&self) -> Option<&RebootCause>;

    fn as_dict(&self) -> RecordDict;
}

/// Everything one DPM knows about one powerup.
#[derive(Debug, Clone)]
pub struct DpmPowerUpEntry {
    /// Wraps at the DPM's [`Dpm::max_powerup_counter`].
    pub powerup_counter: u32,
    /// `None` when this powerup did not end in a fault this DPM saw.
    pub power_fault_cause: Option<RebootCause>,
    pub records: Vec<Arc<dyn DpmRecord>>,
}

impl DpmPowerUpEntry {
    pub fn new(powerup_counter: u32, power_fault_cause: Option<RebootCause>) -> Self {
        Self {
            powerup_counter,
            power_fault_cause,
            records: Vec::new(),
        }
    }
}

impl PartialEq for DpmPowerUpEntry {
    fn eq(&self, other: &Self) -> bool {
        self.powerup_counter == other.powerup_counter
            && self.power_fault_cause == other.power_fault_cause
            && self.records.len() == other.records.len()
            && self
                .records
                .iter()
                .zip(&other.records)
                .all(|(a, b)| a.as_dict() == b.as_dict())
    }
}

/// What one DPM reported during a summary.
#[derive(Debug, Clone)]
pub struct DpmPowerUps {
    pub name: String,
    pub dpm_type: DpmType,
    /// Counter of the powerup the system is running in now.
    pub current_powerup: u32,
    pub max_powerup_counter: u32,
    /// Oldest first.
    pub powerups: Vec<DpmPowerUpEntry>,
}

impl DpmPowerUps {
    pub fn read(dpm: &dyn Dpm) -> DpmResult<Self> {
        Ok(Self {
            name: dpm.name().to_string(),
            dpm_type: dpm.dpm_type(),
            current_powerup: dpm.powerup_counter()?,
            max_powerup_counter: dpm.max_powerup_counter(),
            powerups: dpm.powerup_entries()?,
        })
    }
}

/// Groups consecutive records with the same powerup counter. The cause of
/// each group is its first record with a fault.
pub fn group_powerups(records: Vec<Arc<dyn DpmRecord>>) -> Vec<DpmPowerUpEntry> {
    let mut entries: Vec<DpmPowerUpEntry> = Vec::new();
    for record in records {
        let counter = record.powerup_counter();
        let start_new = entries
            .last()
            .map_or(true, |last| last.powerup_counter != counter);
        if start_new {
            entries.push(DpmPowerUpEntry::new(counter, None));
        }
        if let Some(entry) = entries.last_mut() {
            if entry.power_fault_cause.is_none() {
                entry.power_fault_cause = record.power_fault_cause().cloned();
            }
            entry.records.push(record);
        }
    }
    entries
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DpmType {
    Adm1266,
}

impl DpmType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DpmType::Adm1266 => "adm1266",
        }
    }
}

impl fmt::Display for DpmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A DPM device as seen by the reboot-cause manager.
pub trait Dpm: Send + Sync {
    fn name(&self) -> &str;

    fn dpm_type(&self) -> DpmType;

    /// Raw record chunks, oldest first.
    fn read_raw_records(&self) -> DpmResult<Vec<Vec<u8>>>;

    /// Counter of the current powerup.
    fn powerup_counter(&self) -> DpmResult<u32>;

    /// Value after which the powerup counter wraps to 0.
    fn max_powerup_counter(&self) -> u32;

    /// Valid records grouped per powerup, oldest first. The last entry may
    /// belong to the current powerup.
    fn powerup_entries(&self) -> DpmResult<Vec<DpmPowerUpEntry>>;

    fn clear_records(&self) -> DpmResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[derive(Debug)]
    struct Rec {
        counter: u32,
        cause: Option<RebootCause>,
    }

    impl DpmRecord for Rec {
        fn dpm_name(&self) -> &str {
            "dpm"
        }
        fn powerup_counter(&self) -> u32 {
            self.counter
        }
        fn timestamp(&self) -> Timestamp {
            Timestamp::Unknown
        }
        fn is_valid(&self) -> bool {
            true
        }
        fn power_fault_cause(&self) -> Option<&RebootCause> {
            self.cause.as_ref()
        }
        fn as_dict(&self) -> RecordDict {
            let mut dict = RecordDict::new();
            dict.insert("powerup_counter".into(), self.counter.to_string().into());
            dict
        }
    }

    fn fault(cause: &str) -> RebootCause {
        RebootCause {
            kind: CauseKind::Hardware,
            source: "dpm".to_string(),
            timestamp: Timestamp::SincePowerOn(Duration::from_secs(5)),
            cause: cause.to_string(),
            description: String::new(),
            chassis_reboot_cause_category: "REBOOT_CAUSE_POWER_LOSS".to_string(),
        }
    }

    #[test]
    fn test_timestamp_display() {
        assert_eq!(Timestamp::Unknown.to_string(), "unknown");
        assert_eq!(
            Timestamp::SincePowerOn(Duration::from_secs(1234)).to_string(),
            "1234.000000s after power-on"
        );
        let t = Utc.with_ymd_and_hms(2025, 10, 20, 11, 25, 30).unwrap();
        assert_eq!(Timestamp::Utc(t).to_string(), "2025-10-20 11:25:30 UTC");
    }

    #[test]
    fn test_group_powerups_takes_first_fault() {
        let records: Vec<Arc<dyn DpmRecord>> = vec![
            Arc::new(Rec { counter: 7, cause: None }),
            Arc::new(Rec { counter: 7, cause: Some(fault("first")) }),
            Arc::new(Rec { counter: 7, cause: Some(fault("second")) }),
            Arc::new(Rec { counter: 8, cause: None }),
        ];

        let entries = group_powerups(records);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].powerup_counter, 7);
        assert_eq!(entries[0].records.len(), 3);
        assert_eq!(entries[0].power_fault_cause.as_ref().unwrap().cause, "first");
        assert_eq!(entries[1].powerup_counter, 8);
        assert!(entries[1].power_fault_cause.is_none());
    }

    #[test]
    fn test_unknown_cause() {
        let unknown = RebootCause::unknown_hardware();
        assert!(unknown.is_hardware());
        assert_eq!(unknown.timestamp, Timestamp::Unknown);
        assert_eq!(unknown.chassis_reboot_cause_category, "REBOOT_CAUSE_HARDWARE_OTHER");
    }
}
