//! DFX clock monitor for RC32312 clock generators.
//!
//! Each clock is an I2C client whose driver exposes the APLL and crystal
//! event registers. Every round the lock status registers are compared with
//! their expected values; when the aggregate status changes all status
//! registers are dumped to the log, and on recovery the event registers are
//! cleared again.
//!
//! ```toml
//! interval = 3
//!
//! [[clock_list]]
//! name = "RC32312"
//! bus_addr = "5-0009"
//! lock_status_check = [
//!     { name = "dpll_lock", gettype = "sysfs", loc = "/sys/bus/i2c/devices/5-0009/dpll_lock", okval = 1 },
//! ]
//! ```
//!
//! The built-in register lists below are always used; `clock_reg_init`,
//! `lock_status_check` and `clock_status_save` add to them with absolute
//! locations.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use sonic_platform_common::access::{Access, OkVal, Source, Value};
use sonic_platform_common::monitor::{Monitor, PollOutcome};
use sonic_platform_common::Sysfs;
use tracing::{debug, error, info};

use crate::error::{BspError, BspResult};

pub const DEBUG_FLAG: &str = "/etc/.clock_monitor_debug_flag";

/// Forces every clock to report a locked status.
pub const STATUS_OK_DEBUG_FLAG: &str = "/etc/.clock_monitor_status_ok_debug_flag";

/// Forces every clock to report an alarm; wins over the ok flag.
pub const STATUS_NOTOK_DEBUG_FLAG: &str = "/etc/.clock_monitor_status_notok_debug_flag";

/// Event registers cleared at start and after a recovery.
const RC32312_CLOCK_REG_INIT: &[(&str, i64)] = &[
    ("xtal_los_evt", 0x3),
    ("xtal_los_cnt", 0),
    ("apll_event", 0x7f),
    ("apll_log_event", 0),
];

/// Registers that must read back as the given value while locked.
const RC32312_LOCK_STATUS_CHECK: &[(&str, i64)] = &[("apll_event", 0)];

/// Registers dumped on every status change.
const RC32312_CLOCK_STATUS_SAVE: &[&str] = &[
    "apll_event",
    "apll_log_event",
    "apll_sts",
    "xtal_los_evt",
    "xtal_los_cnt",
    "xtal_los_sts",
];

fn default_interval() -> u64 {
    3
}

/// `dfx_clock_monitor.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct ClockMonitorConfig {
    #[serde(default = "default_interval")]
    pub interval: u64,

    #[serde(default)]
    pub clock_list: Vec<ClockConfig>,
}

impl Default for ClockMonitorConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            clock_list: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClockConfig {
    #[serde(default)]
    pub name: String,

    /// I2C client of the clock chip, e.g. `5-0009`.
    #[serde(default)]
    pub bus_addr: Option<String>,

    #[serde(default)]
    pub clock_reg_init: Vec<NamedAccess>,

    #[serde(default)]
    pub lock_status_check: Vec<NamedAccess>,

    #[serde(default)]
    pub clock_status_save: Vec<NamedAccess>,
}

/// A register access with a display name.
#[derive(Debug, Clone, Deserialize)]
pub struct NamedAccess {
    #[serde(default)]
    pub name: String,

    #[serde(flatten)]
    pub access: Access,
}

impl NamedAccess {
    fn rc32312(bus_addr: &str, reg: &str) -> Self {
        Self {
            name: reg.to_string(),
            access: Access::new(Source::Sysfs {
                loc: format!("/sys/bus/i2c/devices/{}/{}", bus_addr, reg),
            }),
        }
    }
}

/// Aggregate lock status of one clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    Normal,
    Alarm,
}

impl fmt::Display for LockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LockStatus::Normal => "CLOCK_NORMAL",
            LockStatus::Alarm => "CLOCK_ALARM",
        })
    }
}

struct CheckReg {
    reg: NamedAccess,
    last_ok: bool,
}

/// Runtime state of one clock.
struct Clock {
    name: String,
    bus_addr: String,
    init: Vec<NamedAccess>,
    checks: Vec<CheckReg>,
    save: Vec<NamedAccess>,
    status: LockStatus,
}

impl Clock {
    fn from_config(config: ClockConfig) -> BspResult<Self> {
        let bus_addr = config.bus_addr.ok_or_else(|| {
            BspError::invalid_config(
                "clock_monitor",
                format!("{} bus_addr is None, cannot monitor.", config.name),
            )
        })?;

        let mut init: Vec<NamedAccess> = RC32312_CLOCK_REG_INIT
            .iter()
            .map(|(reg, value)| {
                let mut named = NamedAccess::rc32312(&bus_addr, reg);
                named.access = named.access.with_value(*value);
                named
            })
            .collect();
        init.extend(config.clock_reg_init);

        let checks: Vec<CheckReg> = RC32312_LOCK_STATUS_CHECK
            .iter()
            .map(|(reg, okval)| {
                let mut named = NamedAccess::rc32312(&bus_addr, reg);
                named.access = named.access.with_okval(OkVal::One(Value::Int(*okval)));
                named
            })
            .chain(config.lock_status_check)
            .map(|reg| CheckReg { reg, last_ok: true })
            .collect();

        let mut save: Vec<NamedAccess> = RC32312_CLOCK_STATUS_SAVE
            .iter()
            .map(|reg| NamedAccess::rc32312(&bus_addr, reg))
            .collect();
        save.extend(config.clock_status_save);

        for reg in init.iter().chain(save.iter()) {
            debug!(bus_addr = %bus_addr, reg = %reg.name, kind = reg.access.kind(), "register");
        }

        Ok(Self {
            name: config.name,
            bus_addr,
            init,
            checks,
            save,
            status: LockStatus::Normal,
        })
    }

    /// Clears the event registers.
    async fn init(&self, sysfs: &Sysfs) {
        for reg in &self.init {
            match reg.access.set_value(sysfs).await {
                Ok(_) => debug!("{}: action {} init success", self.bus_addr, reg.name),
                Err(e) => error!("{}: action {} init failed. log: {}", self.bus_addr, reg.name, e),
            }
        }
    }

    async fn check_lock_status(&mut self, sysfs: &Sysfs) -> LockStatus {
        let mut status = LockStatus::Normal;
        for check in &mut self.checks {
            let ok = match check.reg.access.check_value(sysfs).await {
                Ok(ok) => ok,
                Err(e) => {
                    error!("{} {} check_value failed. log:{}", self.bus_addr, check.reg.name, e);
                    continue;
                }
            };
            if ok != check.last_ok {
                check.last_ok = ok;
                if ok {
                    info!(
                        "DEASSERT: [{} {}] {} check status change to ok",
                        self.bus_addr, self.name, check.reg.name
                    );
                } else {
                    info!(
                        "ASSERT: [{} {}] {} check status change to not ok",
                        self.bus_addr, self.name, check.reg.name
                    );
                }
            }
            if !ok {
                status = LockStatus::Alarm;
            }
            debug!("{} {} check status ok: {}", self.bus_addr, check.reg.name, ok);
        }
        status
    }

    async fn save_status(&self, sysfs: &Sysfs) {
        for reg in &self.save {
            match reg.access.get_value(sysfs).await {
                Ok(value) => info!("{} {}: {}.", self.bus_addr, reg.name, value.to_hex()),
                Err(e) => info!("{} {}: get failed, log: {}.", self.bus_addr, reg.name, e),
            }
        }
    }
}

/// Status override read from the debug flag files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugOverride {
    None,
    ForceNormal,
    ForceAlarm,
}

impl DebugOverride {
    pub fn read(sysfs: &Sysfs) -> Self {
        if sysfs.exists(STATUS_NOTOK_DEBUG_FLAG) {
            DebugOverride::ForceAlarm
        } else if sysfs.exists(STATUS_OK_DEBUG_FLAG) {
            DebugOverride::ForceNormal
        } else {
            DebugOverride::None
        }
    }
}

pub struct ClockMonitor {
    sysfs: Sysfs,
    interval: Duration,
    clocks: Vec<Clock>,
}

impl ClockMonitor {
    /// Builds the register lists of every clock. A clock without
    /// `bus_addr` is a configuration error.
    pub fn new(sysfs: Sysfs, config: ClockMonitorConfig) -> BspResult<Self> {
        let clocks = config
            .clock_list
            .into_iter()
            .map(Clock::from_config)
            .collect::<BspResult<Vec<_>>>()?;
        Ok(Self {
            sysfs,
            interval: Duration::from_secs(config.interval),
            clocks,
        })
    }

    /// Current aggregate status of each clock, keyed by bus address.
    pub fn statuses(&self) -> Vec<(&str, LockStatus)> {
        self.clocks
            .iter()
            .map(|c| (c.bus_addr.as_str(), c.status))
            .collect()
    }

    /// One monitoring round over every clock.
    pub async fn check_once(&mut self) {
        let debug_override = DebugOverride::read(&self.sysfs);
        for clock in &mut self.clocks {
            let mut status = clock.check_lock_status(&self.sysfs).await;
            match debug_override {
                DebugOverride::ForceNormal => {
                    status = LockStatus::Normal;
                    info!(
                        "DEBUG MODE: [{} {}] lock_status set to CLOCK_NORMAL.",
                        clock.bus_addr, clock.name
                    );
                }
                DebugOverride::ForceAlarm => {
                    status = LockStatus::Alarm;
                    info!(
                        "DEBUG MODE: [{} {}] lock_status set to CLOCK_ALARM.",
                        clock.bus_addr, clock.name
                    );
                }
                DebugOverride::None => {}
            }

            if status == clock.status {
                debug!(
                    "[{} {}] RC32312 clock status [{}], not change.",
                    clock.bus_addr, clock.name, status
                );
                continue;
            }
            clock.status = status;
            match status {
                LockStatus::Normal => {
                    info!("DEASSERT: [{} {}] RC32312 clock recovery.", clock.bus_addr, clock.name)
                }
                LockStatus::Alarm => {
                    info!("ASSERT: [{} {}] RC32312 clock error .", clock.bus_addr, clock.name)
                }
            }
            clock.save_status(&self.sysfs).await;
            if status == LockStatus::Normal {
                clock.init(&self.sysfs).await;
            }
        }
    }
}

#[async_trait]
impl Monitor for ClockMonitor {
    fn name(&self) -> &str {
        "dfx_clock_monitor"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn start(&mut self) {
        debug!("init_clock start");
        for clock in &self.clocks {
            clock.init(&self.sysfs).await;
        }
    }

    async fn poll(&mut self) -> PollOutcome {
        self.check_once().await;
        PollOutcome::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sonic_platform_test::{i2c_fixtures, FakeSysfs};

    const DEV: &str = "/sys/bus/i2c/devices/5-0009";

    fn setup() -> FakeSysfs {
        let fake = FakeSysfs::new();
        i2c_fixtures::client(
            &fake,
            5,
            0x09,
            &[
                ("xtal_los_evt", "0x00"),
                ("xtal_los_cnt", "0x00"),
                ("xtal_los_sts", "0x00"),
                ("apll_event", "0x00"),
                ("apll_log_event", "0x00"),
                ("apll_sts", "0x01"),
            ],
        );
        fake
    }

    fn monitor(fake: &FakeSysfs) -> ClockMonitor {
        let config: ClockMonitorConfig = toml::from_str(
            r#"
            [[clock_list]]
            name = "RC32312"
            bus_addr = "5-0009"
            "#,
        )
        .unwrap();
        ClockMonitor::new(fake.sysfs(), config).unwrap()
    }

    #[test]
    fn test_missing_bus_addr_is_rejected() {
        let config: ClockMonitorConfig = toml::from_str("[[clock_list]]\nname = \"RC32312\"\n").unwrap();
        assert_eq!(config.interval, 3);
        let err = ClockMonitor::new(FakeSysfs::new().sysfs(), config).err().unwrap();
        assert!(matches!(err, BspError::InvalidConfig { daemon: "clock_monitor", .. }));
    }

    #[test]
    fn test_builtin_registers_are_resolved() {
        let fake = setup();
        let m = monitor(&fake);
        let clock = &m.clocks[0];
        assert_eq!(clock.init.len(), 4);
        assert_eq!(clock.checks.len(), 1);
        assert_eq!(clock.save.len(), 6);
        assert_eq!(
            clock.checks[0].reg.access.source,
            Source::Sysfs {
                loc: format!("{DEV}/apll_event")
            }
        );
    }

    #[tokio::test]
    async fn test_start_clears_events() {
        let fake = setup();
        let mut m = monitor(&fake);
        m.start().await;
        assert_eq!(fake.read(format!("{DEV}/xtal_los_evt")), "0x03");
        assert_eq!(fake.read(format!("{DEV}/apll_event")), "0x7f");
        assert_eq!(fake.read(format!("{DEV}/apll_log_event")), "0x00");
    }

    #[tokio::test]
    async fn test_alarm_then_recovery() {
        let fake = setup();
        let mut m = monitor(&fake);

        m.check_once().await;
        assert_eq!(m.statuses(), vec![("5-0009", LockStatus::Normal)]);

        fake.file(format!("{DEV}/apll_event"), "0x04");
        m.check_once().await;
        assert_eq!(m.statuses(), vec![("5-0009", LockStatus::Alarm)]);
        assert!(!m.clocks[0].checks[0].last_ok);
        // nothing is cleared while the alarm is up
        assert_eq!(fake.read(format!("{DEV}/xtal_los_evt")), "0x00");

        fake.file(format!("{DEV}/apll_event"), "0x00");
        m.check_once().await;
        assert_eq!(m.statuses(), vec![("5-0009", LockStatus::Normal)]);
        assert!(m.clocks[0].checks[0].last_ok);
        assert_eq!(fake.read(format!("{DEV}/xtal_los_evt")), "0x03");
    }

    #[tokio::test]
    async fn test_debug_flags_override_status() {
        let fake = setup();
        let mut m = monitor(&fake);

        fake.file(STATUS_OK_DEBUG_FLAG, "").file(STATUS_NOTOK_DEBUG_FLAG, "");
        assert_eq!(DebugOverride::read(&fake.sysfs()), DebugOverride::ForceAlarm);
        m.check_once().await;
        assert_eq!(m.statuses()[0].1, LockStatus::Alarm);

        fake.remove(STATUS_NOTOK_DEBUG_FLAG);
        fake.file(format!("{DEV}/apll_event"), "0x7f");
        m.check_once().await;
        assert_eq!(m.statuses()[0].1, LockStatus::Normal);
    }
}
