//! Reboot-cause summarising across DPMs and the software reboot-cause file.
//!
//! Each DPM only knows about the faults it recorded itself, so the powerup
//! lists of all DPMs are first aligned on the powerup counter (filling gaps
//! left by powerups without records), then squashed column by column into
//! one cause per reboot. The software cause, when present, is slotted in by
//! timestamp. DPMs listed first in pd-plugin.json win ties, which is how a
//! CPU-card fault is reported ahead of the switch-card record it triggers.

use std::sync::Arc;

use chrono::{NaiveDateTime, TimeDelta, Weekday};
use once_cell::sync::Lazy;
use regex::Regex;
use sonic_platform_common::{RebootCauseCategory, RebootCauseInfo, Sysfs};
use sonic_platform_pddf::PddfPlugin;
use tracing::{debug, info, warn};

use crate::adm1266::dpms_from_section;
use crate::dpm::{CauseKind, Dpm, DpmPowerUpEntry, DpmPowerUps, RebootCause, Timestamp};
use crate::dpm_logger::DpmLogger;
use crate::error::DpmResult;

/// A user `reboot` and the power cycle it causes are one event when they are
/// this close.
pub const SW_HW_SAME_REBOOT_WINDOW: TimeDelta = TimeDelta::seconds(3 * 60 + 10);

static USER_ISSUED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"User issued '(.*)' command \[.*Time: (.*)\]").expect("Invalid regex pattern")
});
static KERNEL_PANIC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(Kernel Panic.*) \[.*Time: (.*)\]").expect("Invalid regex pattern"));

const SW_TIME_FORMATS: [&str; 3] = [
    "%b %d %I:%M:%S %p %Y",
    "%b %d %H:%M:%S %Y",
    "%Y-%m-%d %H:%M:%S",
];

/// `1st`, `2nd`, `3rd`, `4th`, ..., `11th`, ..., `21st`.
pub fn ordinal(n: usize) -> String {
    let suffix = if (11..=13).contains(&(n % 100)) {
        "th"
    } else {
        match n % 10 {
            1 => "st",
            2 => "nd",
            3 => "rd",
            _ => "th",
        }
    };
    format!("{n}{suffix}")
}

fn wrap(value: i64, max: u32) -> u32 {
    value.rem_euclid(i64::from(max.max(1))) as u32
}

/// Lines every DPM's powerups up on the same reboots.
///
/// The entry of the current powerup is dropped, counter gaps become `None`,
/// and shorter lists are padded at the front so all lists have the returned
/// number of power cycles.
pub fn fill_in_missing_and_align_powerups(
    dpms: &[DpmPowerUps],
) -> (Vec<Vec<Option<&DpmPowerUpEntry>>>, usize) {
    let mut aligned: Vec<Vec<Option<&DpmPowerUpEntry>>> = Vec::with_capacity(dpms.len());
    for dpm in dpms {
        let current = dpm.current_powerup;
        let max = dpm.max_powerup_counter;
        let mut full: Vec<Option<&DpmPowerUpEntry>> = Vec::new();
        let mut p = current;
        for powerup in dpm.powerups.iter().rev() {
            if p == current {
                p = wrap(i64::from(p) - 1, max);
                if powerup.powerup_counter == current {
                    continue;
                }
            }
            let missing = wrap(i64::from(p) - i64::from(powerup.powerup_counter), max) as usize;
            let mut prefix = Vec::with_capacity(missing + 1);
            prefix.push(Some(powerup));
            prefix.extend(std::iter::repeat(None).take(missing));
            full.splice(0..0, prefix);
            p = wrap(i64::from(powerup.powerup_counter) - 1, max);
        }
        aligned.push(full);
    }

    let num_power_cycles = aligned.iter().map(Vec::len).max().unwrap_or(0);
    for full in &mut aligned {
        let missing = num_power_cycles - full.len();
        full.splice(0..0, std::iter::repeat(None).take(missing));
    }
    (aligned, num_power_cycles)
}

/// One cause per reboot, oldest first: the first DPM, in configuration
/// order, that saw a fault in that power cycle.
pub fn squash_dpms_powerups(dpms: &[DpmPowerUps]) -> Vec<RebootCause> {
    let (aligned, num_power_cycles) = fill_in_missing_and_align_powerups(dpms);
    (0..num_power_cycles)
        .map(|cycle| {
            let picked = aligned
                .iter()
                .filter_map(|powerups| powerups[cycle])
                .find_map(|powerup| powerup.power_fault_cause.clone());
            picked.unwrap_or_else(|| {
                warn!(
                    "Cannot determine power fault cause for the {} previous reboot.",
                    ordinal(num_power_cycles - cycle)
                );
                RebootCause::unknown_hardware()
            })
        })
        .collect()
}

/// Parses the `Time:` field of the software reboot-cause file, e.g.
/// `Thu Oct  2 11:22:56 PM UTC 2025`. The weekday is ignored since the
/// writers do not always get it right.
pub fn parse_sw_timestamp(text: &str) -> Timestamp {
    let mut tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.first().is_some_and(|t| t.parse::<Weekday>().is_ok()) {
        tokens.remove(0);
    }
    let zone_at = tokens.iter().position(|t| {
        t.len() >= 3 && !matches!(*t, "AM" | "PM") && t.chars().all(|c| c.is_ascii_uppercase())
    });
    if let Some(idx) = zone_at {
        if !matches!(tokens[idx], "UTC" | "GMT") {
            warn!(timestamp = text, zone = tokens[idx], "Reboot time is not in UTC");
            return Timestamp::Unknown;
        }
        tokens.remove(idx);
    }
    let normalized = tokens.join(" ");
    SW_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&normalized, fmt).ok())
        .map(|t| Timestamp::Utc(t.and_utc()))
        .unwrap_or_else(|| {
            warn!(timestamp = text, "Failed to parse reboot time");
            Timestamp::Unknown
        })
}

/// Parses the content of the software reboot-cause file.
pub fn parse_sw_reboot_cause(content: &str) -> Option<RebootCause> {
    let content = content.trim();
    if content.is_empty() || content.eq_ignore_ascii_case("unknown") {
        return None;
    }
    let (cause, timestamp) = match USER_ISSUED_RE
        .captures(content)
        .or_else(|| KERNEL_PANIC_RE.captures(content))
    {
        Some(caps) => (caps[1].to_string(), parse_sw_timestamp(&caps[2])),
        None => (content.to_string(), Timestamp::Unknown),
    };
    Some(RebootCause {
        kind: CauseKind::Software,
        source: "SW".to_string(),
        timestamp,
        cause,
        description: content.to_string(),
        chassis_reboot_cause_category: RebootCauseCategory::NonHardware.key().to_string(),
    })
}

/// Places the software cause after the last hardware cause with an earlier
/// UTC timestamp, or first when there is none. Best effort: records written
/// before the DPM RTC is synced only count time since power-on.
pub fn merge_sw_and_hw_causes(
    sw_cause: Option<RebootCause>,
    mut hw_causes: Vec<RebootCause>,
) -> Vec<RebootCause> {
    let Some(sw_cause) = sw_cause else {
        return hw_causes;
    };
    let insert_idx = match sw_cause.timestamp.as_utc() {
        Some(sw_time) => hw_causes
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.timestamp.as_utc().map(|t| (i, t)))
            .filter(|(_, t)| *t < sw_time)
            .map(|(i, _)| i + 1)
            .last()
            .unwrap_or(0),
        None => 0,
    };
    hw_causes.insert(insert_idx, sw_cause);
    hw_causes
}

/// Drops a hardware cause that directly follows a software `reboot`, since
/// the reboot is what made the DPM log it.
pub fn squash_sw_and_hw_causes(sorted: Vec<RebootCause>) -> Vec<RebootCause> {
    let mut out = Vec::with_capacity(sorted.len());
    let mut iter = sorted.into_iter().peekable();
    while let Some(cause) = iter.next() {
        let same_reboot = cause.kind == CauseKind::Software
            && cause.cause == "reboot"
            && iter.peek().is_some_and(|next| {
                next.kind == CauseKind::Hardware
                    && match (cause.timestamp.as_utc(), next.timestamp.as_utc()) {
                        (Some(sw), Some(hw)) => {
                            let delta = hw - sw;
                            delta != TimeDelta::zero() && delta <= SW_HW_SAME_REBOOT_WINDOW
                        }
                        _ => false,
                    }
            });
        out.push(cause);
        if same_reboot {
            iter.next();
        }
    }
    out
}

/// `(major, minor)` form of one cause.
pub fn major_and_minor(cause: &RebootCause) -> RebootCauseInfo {
    match cause.kind {
        CauseKind::Software => RebootCauseInfo::new(
            cause.cause.clone(),
            format!("time: {}, src: {}", cause.timestamp, cause.source),
        ),
        CauseKind::Hardware => {
            let category = &cause.chassis_reboot_cause_category;
            let major = RebootCauseCategory::from_key(category)
                .map(|c| c.as_str().to_string())
                .unwrap_or_else(|| category.clone());
            RebootCauseInfo::new(
                major,
                format!(
                    "{}, time: {}, src: {}",
                    cause.description, cause.timestamp, cause.source
                ),
            )
        }
    }
}

/// The reboot cause a chassis reports for a summary, plus the comment
/// describing any further reboots.
pub fn chassis_reboot_cause(causes: &[RebootCause]) -> (RebootCauseInfo, Option<String>) {
    match causes {
        [] => (RebootCauseInfo::unknown(), None),
        [only] if only.kind == CauseKind::Software => (
            RebootCauseInfo::new(RebootCauseCategory::NonHardware.as_str(), ""),
            None,
        ),
        [first, rest @ ..] => {
            let comment = (!rest.is_empty()).then(|| {
                let times = if rest.len() == 1 { "time" } else { "times" };
                let listed: Vec<String> = rest
                    .iter()
                    .map(major_and_minor)
                    .map(|m| format!("{} ({})", m.cause, m.description))
                    .collect();
                format!(
                    "System rebooted {} more {times}: {}",
                    rest.len(),
                    listed.join("; ")
                )
            });
            (major_and_minor(first), comment)
        }
    }
}

pub struct RebootCauseManager {
    sysfs: Sysfs,
    sw_reboot_cause_file: Option<String>,
    dpms: Vec<Arc<dyn Dpm>>,
    logger: DpmLogger,
}

impl RebootCauseManager {
    pub fn new(sysfs: Sysfs, sw_reboot_cause_file: Option<String>, dpms: Vec<Arc<dyn Dpm>>) -> Self {
        Self {
            logger: DpmLogger::new(sysfs.clone()),
            sysfs,
            sw_reboot_cause_file,
            dpms,
        }
    }

    /// DPMs from the `DPM` section and the software cause file from
    /// `REBOOT_CAUSE.reboot_cause_file`.
    pub fn from_plugin(sysfs: Sysfs, plugin: &PddfPlugin) -> DpmResult<Self> {
        let dpms = dpms_from_section(&sysfs, &plugin.dpm)?;
        let sw_file = plugin.reboot_cause.reboot_cause_file.clone();
        Ok(Self::new(sysfs, sw_file, dpms))
    }

    pub fn with_logger(mut self, logger: DpmLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn dpms(&self) -> &[Arc<dyn Dpm>] {
        &self.dpms
    }

    pub fn logger(&self) -> &DpmLogger {
        &self.logger
    }

    fn read_sw_reboot_cause(&self) -> DpmResult<Option<RebootCause>> {
        let Some(path) = self.sw_reboot_cause_file.as_deref() else {
            return Ok(None);
        };
        if !self.sysfs.exists(path) {
            return Ok(None);
        }
        let bytes = self.sysfs.read_all_bytes(path)?;
        Ok(parse_sw_reboot_cause(&String::from_utf8_lossy(&bytes)))
    }

    /// One cause per reboot since the last summary, oldest first.
    ///
    /// Saves the full picture to the history and clears every DPM, so a
    /// second call in the same boot only sees the software cause.
    pub fn summarize(&self) -> DpmResult<Vec<RebootCause>> {
        let dpm_powerups = self
            .dpms
            .iter()
            .map(|dpm| DpmPowerUps::read(dpm.as_ref()))
            .collect::<DpmResult<Vec<_>>>()?;
        let hw_causes = squash_dpms_powerups(&dpm_powerups);
        let sw_cause = self.read_sw_reboot_cause()?;
        debug!(
            hw = hw_causes.len(),
            sw = sw_cause.is_some(),
            "Collected reboot causes"
        );

        let merged = merge_sw_and_hw_causes(sw_cause, hw_causes);
        self.logger.save(&merged, &dpm_powerups)?;
        for dpm in &self.dpms {
            dpm.clear_records()?;
        }
        let causes = squash_sw_and_hw_causes(merged);
        info!(count = causes.len(), "Summarized reboot causes");
        Ok(causes)
    }
}
