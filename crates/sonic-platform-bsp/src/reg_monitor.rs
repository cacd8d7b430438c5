//! DFX register monitor.
//!
//! Watches status registers (power-good, reset, alarm bits) of CPLDs, FPGAs
//! and slot cards. Each monitor type runs as its own task with its own
//! interval; each monitored point logs a record whenever its status changes
//! between NORMAL, ABNORMAL and EXCEPTION.
//!
//! ```toml
//! [monitors.cpld]
//! init_delay = 30
//! interval = 60
//!
//! [[monitors.cpld.device]]
//! name = "SLOT1 power good"
//! slotid = 1
//! slot_sup_list = [0x4061]
//! monitor_point = { gettype = "sysfs", loc = "/dev/cpld1/pg", mask = 0x01, okval = 1 }
//! ```
//!
//! State changes go to the [`RECORD_TARGET`] tracing target.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use sonic_platform_common::access::{Access, CheckStatus};
use sonic_platform_common::logging::RECORD_TARGET;
use sonic_platform_common::monitor::{run_monitor, Monitor, PollOutcome};
use sonic_platform_common::Sysfs;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::error::{BspError, BspResult};

pub const DEBUG_FLAG: &str = "/etc/.dfx_reg_monitor_debug_flag";

const SLOT_DIR: &str = "/sys/s3ip/slot";
const MAIN_MGMT_BOARD_FLAG: &str = "/sys/s3ip/system/is_main_mgmt_board";

fn default_interval() -> u64 {
    60
}

/// `dfx_reg_monitor.toml`: one table per monitor type.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegMonitorConfig {
    #[serde(default)]
    pub monitors: BTreeMap<String, RegMonitorTypeConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegMonitorTypeConfig {
    /// Seconds to wait after boot before the first reading.
    #[serde(default)]
    pub init_delay: u64,

    #[serde(default = "default_interval")]
    pub interval: u64,

    #[serde(default)]
    pub device: Vec<MonitoredPoint>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoredPoint {
    pub name: String,

    /// Slot carrying the register; 0 for the main board.
    #[serde(default)]
    pub slotid: u32,

    /// Card types the point exists on; empty means any.
    #[serde(default)]
    pub slot_sup_list: Vec<i64>,

    /// Only monitor on the active management board.
    #[serde(default)]
    pub is_only_master_cm_monitor: bool,

    pub monitor_point: Access,
}

impl MonitoredPoint {
    fn slot_prefix(&self) -> String {
        if self.slotid == 0 {
            String::new()
        } else {
            format!("SLOT:{} ", self.slotid)
        }
    }
}

/// Last known status of a monitored point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointStatus {
    Ok,
    NotOk,
}

impl fmt::Display for PointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PointStatus::Ok => "OK",
            PointStatus::NotOk => "NOT OK",
        })
    }
}

/// Monitor for one type of registers.
pub struct RegMonitor {
    sysfs: Sysfs,
    kind: String,
    init_delay: Duration,
    interval: Duration,
    points: Vec<MonitoredPoint>,
    statuses: Vec<PointStatus>,
}

impl RegMonitor {
    pub fn new(sysfs: Sysfs, kind: impl Into<String>, config: RegMonitorTypeConfig) -> Self {
        let statuses = vec![PointStatus::Ok; config.device.len()];
        Self {
            sysfs,
            kind: kind.into(),
            init_delay: Duration::from_secs(config.init_delay),
            interval: Duration::from_secs(config.interval),
            points: config.device,
            statuses,
        }
    }

    /// Status of every point, in configuration order.
    pub fn statuses(&self) -> Vec<(&str, PointStatus)> {
        self.points
            .iter()
            .zip(&self.statuses)
            .map(|(p, s)| (p.name.as_str(), *s))
            .collect()
    }

    /// Whether the point's slot card is in place and the point applies to
    /// this board.
    pub fn pre_check(&self, point: &MonitoredPoint) -> bool {
        if point.slotid != 0 {
            let status_path = format!("{}/slot{}/status", SLOT_DIR, point.slotid);
            match self.sysfs.read_int(&status_path, 10) {
                Ok(1) => {}
                Ok(val) => {
                    debug!(monitor = %self.kind, "slotid status path:{} not ready. val:{}", status_path, val);
                    return false;
                }
                Err(e) => {
                    error!(monitor = %self.kind, "slotid status path:{} read error. log:{}", status_path, e);
                    return false;
                }
            }

            if !point.slot_sup_list.is_empty() {
                let type_path = format!("{}/slot{}/slot_card_type", SLOT_DIR, point.slotid);
                let card_type = match self.sysfs.read_int(&type_path, 16) {
                    Ok(card_type) => card_type,
                    Err(e) => {
                        error!(monitor = %self.kind, "slotid card type path:{} read error. log:{}", type_path, e);
                        return false;
                    }
                };
                if !point.slot_sup_list.contains(&card_type) {
                    debug!(
                        monitor = %self.kind,
                        "slotid:{} card_type:0x{:x} not in support list:{:?}",
                        point.slotid, card_type, point.slot_sup_list
                    );
                    return false;
                }
            }
        }

        if point.is_only_master_cm_monitor {
            match self.sysfs.read_int(MAIN_MGMT_BOARD_FLAG, 10) {
                Ok(1) => {}
                Ok(_) => {
                    debug!(monitor = %self.kind, "this card is slave cm board, do nothing");
                    return false;
                }
                Err(e) => {
                    error!(monitor = %self.kind, "path:{} read error. log:{}", MAIN_MGMT_BOARD_FLAG, e);
                    return false;
                }
            }
        }
        true
    }

    /// Reads every point once and records its starting state.
    #[instrument(skip(self), fields(monitor = %self.kind))]
    pub async fn init_status_record(&mut self) {
        for i in 0..self.points.len() {
            let point = &self.points[i];
            let slot = point.slot_prefix();
            if !self.pre_check(point) {
                info!("{}initial state of {} is NOT READY.", slot, point.name);
                self.statuses[i] = PointStatus::NotOk;
                continue;
            }

            let access = &point.monitor_point;
            match access.check_value_and_get_value(&self.sysfs).await {
                Ok(result) => {
                    let (status, state) = match result.status {
                        CheckStatus::Ok => (PointStatus::Ok, "READY"),
                        CheckStatus::NotOk => (PointStatus::NotOk, "NOT READY"),
                    };
                    self.statuses[i] = status;
                    info!(target: RECORD_TARGET, monitor = %self.kind, "{}initial state of {} is {}.", slot, point.name, state);
                    info!(target: RECORD_TARGET, monitor = %self.kind, "config:{:?}.", access);
                    info!(target: RECORD_TARGET, monitor = %self.kind, "config reg read val:{}", result.value.to_hex());
                }
                Err(e) => {
                    self.statuses[i] = PointStatus::NotOk;
                    info!(target: RECORD_TARGET, monitor = %self.kind, "{}initial state of {} is EXCEPTION.", slot, point.name);
                    info!(target: RECORD_TARGET, monitor = %self.kind, "config:{:?}.", access);
                    info!(target: RECORD_TARGET, monitor = %self.kind, "exception reason:{}", e);
                }
            }
        }
    }

    /// One polling round; records status changes only.
    #[instrument(skip(self), fields(monitor = %self.kind))]
    pub async fn check_once(&mut self) {
        for i in 0..self.points.len() {
            let point = &self.points[i];
            let slot = point.slot_prefix();
            if !self.pre_check(point) {
                debug!("{} pre_check not ready, do nothing.", point.name);
                continue;
            }

            let last = self.statuses[i];
            let access = &point.monitor_point;
            match access.check_value_and_get_value(&self.sysfs).await {
                Ok(result) => {
                    let (status, state) = match result.status {
                        CheckStatus::Ok => (PointStatus::Ok, "NORMAL"),
                        CheckStatus::NotOk => (PointStatus::NotOk, "ABNORMAL"),
                    };
                    self.statuses[i] = status;
                    if status != last {
                        info!("{}{} status from {} change to {}.", slot, point.name, last, status);
                        info!(target: RECORD_TARGET, monitor = %self.kind, "{}state of {} signal is changed to {}.", slot, point.name, state);
                        info!(target: RECORD_TARGET, monitor = %self.kind, "config:{:?}.", access);
                        info!(target: RECORD_TARGET, monitor = %self.kind, "config reg read val:{}", result.value.to_hex());
                    }
                    debug!("{}state of {} signal, read val:{}", slot, point.name, result.value.to_hex());
                }
                Err(e) => {
                    self.statuses[i] = PointStatus::NotOk;
                    // only the first failure is recorded
                    if last == PointStatus::Ok {
                        error!("{} status get failed.", point.name);
                        info!(target: RECORD_TARGET, monitor = %self.kind, "{}state of {} signal is changed to EXCEPTION.", slot, point.name);
                        info!(target: RECORD_TARGET, monitor = %self.kind, "config:{:?}.", access);
                        info!(target: RECORD_TARGET, monitor = %self.kind, "exception reason:{}", e);
                    }
                }
            }
        }
    }
}

#[async_trait]
impl Monitor for RegMonitor {
    fn name(&self) -> &str {
        &self.kind
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn start(&mut self) {
        if !self.init_delay.is_zero() {
            debug!(monitor = %self.kind, "run init_delay is {:?}, doing delay", self.init_delay);
            tokio::time::sleep(self.init_delay).await;
        }
        self.init_status_record().await;
    }

    async fn poll(&mut self) -> PollOutcome {
        self.check_once().await;
        PollOutcome::Continue
    }
}

/// Spawns one task per monitor type and waits for all of them.
pub async fn run_all(sysfs: Sysfs, config: RegMonitorConfig, shutdown: CancellationToken) -> BspResult<()> {
    if config.monitors.is_empty() {
        return Err(BspError::invalid_config(
            "dfx_reg_monitor",
            "lack of monitor type config",
        ));
    }

    let mut tasks = JoinSet::new();
    for (kind, type_config) in config.monitors {
        let mut monitor = RegMonitor::new(sysfs.clone(), kind.clone(), type_config);
        let token = shutdown.clone();
        tasks.spawn(async move {
            run_monitor(&mut monitor, token).await;
            kind
        });
    }
    info!(tasks = tasks.len(), "Register monitors started");

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(kind) => debug!(monitor = %kind, "Register monitor stopped"),
            Err(e) => {
                return Err(BspError::Task {
                    name: "dfx_reg_monitor".to_string(),
                    source: e,
                })
            }
        }
    }
    Ok(())
}
