//! Platform device interfaces.
//!
//! These traits are the fixed surface every vendor driver implements. They
//! are never extended per vendor: board differences live in the
//! implementations, not in the traits.
//!
//! | trait | SONiC object |
//! |-------|--------------|
//! | [`DeviceBase`] | common name/presence/model/serial/status getters |
//! | [`Fan`], [`FanDrawer`] | tray fans, PSU fans and fan trays |
//! | [`Psu`] | power supplies |
//! | [`Thermal`] | temperature sensors |
//! | [`Sfp`] | pluggable transceivers |
//! | [`Component`] | firmware-carrying parts (BIOS, CPLD, ONIE) |
//! | [`Watchdog`] | hardware watchdog |
//! | [`Chassis`] | owner of everything above |
//!
//! Optional capabilities default to [`PlatformError::NotSupported`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{PlatformError, PlatformResult};
use crate::sff;

/// Airflow direction of a fan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FanDirection {
    Intake,
    Exhaust,
    NotApplicable,
}

impl FanDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            FanDirection::Intake => "intake",
            FanDirection::Exhaust => "exhaust",
            FanDirection::NotApplicable => "N/A",
        }
    }
}

impl fmt::Display for FanDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FanDirection {
    type Err = PlatformError;

    /// Accepts both SONiC spellings (`intake`) and PDDF value-map spellings
    /// (`INTAKE`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "intake" => Ok(FanDirection::Intake),
            "exhaust" => Ok(FanDirection::Exhaust),
            "n/a" | "not_applicable" => Ok(FanDirection::NotApplicable),
            _ => Err(PlatformError::parse("fan direction", s, "unknown direction")),
        }
    }
}

/// Status LED colours understood by the platform API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedColor {
    Green,
    Amber,
    Red,
    Blue,
    Off,
    GreenBlink,
    AmberBlink,
    RedBlink,
}

impl LedColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedColor::Green => "green",
            LedColor::Amber => "amber",
            LedColor::Red => "red",
            LedColor::Blue => "blue",
            LedColor::Off => "off",
            LedColor::GreenBlink => "green_blink",
            LedColor::AmberBlink => "amber_blink",
            LedColor::RedBlink => "red_blink",
        }
    }

    pub const ALL: [LedColor; 8] = [
        LedColor::Green,
        LedColor::Amber,
        LedColor::Red,
        LedColor::Blue,
        LedColor::Off,
        LedColor::GreenBlink,
        LedColor::AmberBlink,
        LedColor::RedBlink,
    ];
}

impl fmt::Display for LedColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LedColor {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        LedColor::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| PlatformError::parse("led color", s, "unknown color"))
    }
}

/// Reboot cause categories reported by `Chassis::reboot_cause`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RebootCauseCategory {
    PowerLoss,
    ThermalOverloadCpu,
    ThermalOverloadAsic,
    ThermalOverloadOther,
    InsufficientFanSpeed,
    Watchdog,
    HardwareOther,
    HardwareBios,
    HardwareCpu,
    HardwareButton,
    HardwareResetFromAsic,
    NonHardware,
}

impl RebootCauseCategory {
    const TABLE: [(RebootCauseCategory, &'static str, &'static str); 12] = [
        (Self::PowerLoss, "REBOOT_CAUSE_POWER_LOSS", "Power Loss"),
        (Self::ThermalOverloadCpu, "REBOOT_CAUSE_THERMAL_OVERLOAD_CPU", "Thermal Overload: CPU"),
        (Self::ThermalOverloadAsic, "REBOOT_CAUSE_THERMAL_OVERLOAD_ASIC", "Thermal Overload: ASIC"),
        (Self::ThermalOverloadOther, "REBOOT_CAUSE_THERMAL_OVERLOAD_OTHER", "Thermal Overload: Other"),
        (Self::InsufficientFanSpeed, "REBOOT_CAUSE_INSUFFICIENT_FAN_SPEED", "Insufficient Fan Speed"),
        (Self::Watchdog, "REBOOT_CAUSE_WATCHDOG", "Watchdog"),
        (Self::HardwareOther, "REBOOT_CAUSE_HARDWARE_OTHER", "Hardware - Other"),
        (Self::HardwareBios, "REBOOT_CAUSE_HARDWARE_BIOS", "BIOS"),
        (Self::HardwareCpu, "REBOOT_CAUSE_HARDWARE_CPU", "CPU"),
        (Self::HardwareButton, "REBOOT_CAUSE_HARDWARE_BUTTON", "Push button"),
        (Self::HardwareResetFromAsic, "REBOOT_CAUSE_HARDWARE_RESET_FROM_ASIC", "Reset from ASIC"),
        (Self::NonHardware, "REBOOT_CAUSE_NON_HARDWARE", "Non-Hardware"),
    ];

    /// The string reported to SONiC, e.g. `"Power Loss"`.
    pub fn as_str(&self) -> &'static str {
        Self::TABLE
            .iter()
            .find(|(c, _, _)| c == self)
            .map(|(_, _, text)| *text)
            .unwrap_or("Unknown")
    }

    /// The constant name, e.g. `"REBOOT_CAUSE_POWER_LOSS"`.
    pub fn key(&self) -> &'static str {
        Self::TABLE
            .iter()
            .find(|(c, _, _)| c == self)
            .map(|(_, key, _)| *key)
            .unwrap_or("REBOOT_CAUSE_UNKNOWN")
    }

    /// Looks a category up by its constant name.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::TABLE
            .iter()
            .find(|(_, k, _)| *k == key)
            .map(|(c, _, _)| *c)
    }
}

impl fmt::Display for RebootCauseCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(major, minor)` reboot cause pair returned by a chassis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebootCauseInfo {
    pub cause: String,
    pub description: String,
}

impl RebootCauseInfo {
    pub fn new(cause: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            cause: cause.into(),
            description: description.into(),
        }
    }

    pub fn unknown() -> Self {
        Self::new("Unknown", "")
    }
}

/// Transceiver presence transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceChange {
    Inserted,
    Removed,
}

impl PresenceChange {
    /// `"1"` for inserted, `"0"` for removed, as xcvrd expects.
    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceChange::Inserted => "1",
            PresenceChange::Removed => "0",
        }
    }
}

/// Devices whose presence changed since the previous `change_event` call,
/// keyed by 1-based port index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeEvent {
    pub sfp: BTreeMap<usize, PresenceChange>,
}

impl ChangeEvent {
    pub fn is_empty(&self) -> bool {
        self.sfp.is_empty()
    }
}

/// Getters shared by every device object.
pub trait DeviceBase: Send + Sync {
    fn name(&self) -> String;

    fn presence(&self) -> PlatformResult<bool>;

    fn model(&self) -> PlatformResult<String> {
        Err(PlatformError::not_supported("get_model"))
    }

    fn serial(&self) -> PlatformResult<String> {
        Err(PlatformError::not_supported("get_serial"))
    }

    fn revision(&self) -> PlatformResult<String> {
        Err(PlatformError::not_supported("get_revision"))
    }

    fn status(&self) -> PlatformResult<bool>;

    fn position_in_parent(&self) -> PlatformResult<usize> {
        Err(PlatformError::not_supported("get_position_in_parent"))
    }

    fn is_replaceable(&self) -> PlatformResult<bool> {
        Err(PlatformError::not_supported("is_replaceable"))
    }
}

/// A fan, either in a fan tray or inside a PSU.
pub trait Fan: DeviceBase {
    fn direction(&self) -> PlatformResult<FanDirection>;

    /// Current speed as a percentage of the maximum.
    fn speed(&self) -> PlatformResult<u8>;

    /// Requested speed as a percentage.
    fn target_speed(&self) -> PlatformResult<u8> {
        Err(PlatformError::not_supported("get_target_speed"))
    }

    /// Allowed deviation from the target, in percent.
    fn speed_tolerance(&self) -> PlatformResult<u8> {
        Err(PlatformError::not_supported("get_speed_tolerance"))
    }

    fn set_speed(&self, _percent: u8) -> PlatformResult<()> {
        Err(PlatformError::not_supported("set_speed"))
    }

    fn speed_rpm(&self) -> PlatformResult<u32> {
        Err(PlatformError::not_supported("get_speed_rpm"))
    }

    fn status_led(&self) -> PlatformResult<LedColor> {
        Err(PlatformError::not_supported("get_status_led"))
    }

    fn set_status_led(&self, _color: LedColor) -> PlatformResult<()> {
        Err(PlatformError::not_supported("set_status_led"))
    }

    fn is_under_speed(&self) -> PlatformResult<bool> {
        let (speed, target, tolerance) = speed_triple(self)?;
        Ok(speed < target * (1.0 - tolerance / 100.0))
    }

    fn is_over_speed(&self) -> PlatformResult<bool> {
        let (speed, target, tolerance) = speed_triple(self)?;
        Ok(speed > target * (1.0 + tolerance / 100.0))
    }
}

fn speed_triple<F: Fan + ?Sized>(fan: &F) -> PlatformResult<(f64, f64, f64)> {
    Ok((
        f64::from(fan.speed()?),
        f64::from(fan.target_speed()?),
        f64::from(fan.speed_tolerance()?),
    ))
}

/// A replaceable fan tray holding one or more fans.
pub trait FanDrawer: DeviceBase {
    fn fans(&self) -> &[Arc<dyn Fan>];

    fn num_fans(&self) -> usize {
        self.fans().len()
    }

    /// Maximum power the drawer may draw, in watts.
    fn maximum_consumed_power(&self) -> PlatformResult<f64> {
        Err(PlatformError::not_supported("get_maximum_consumed_power"))
    }

    fn status_led(&self) -> PlatformResult<LedColor> {
        Err(PlatformError::not_supported("get_status_led"))
    }

    fn set_status_led(&self, _color: LedColor) -> PlatformResult<()> {
        Err(PlatformError::not_supported("set_status_led"))
    }
}

/// A power supply unit. Electrical readings are in volts, amps and watts.
pub trait Psu: DeviceBase {
    fn fans(&self) -> &[Arc<dyn Fan>] {
        &[]
    }

    fn voltage(&self) -> PlatformResult<f64>;

    fn current(&self) -> PlatformResult<f64>;

    fn power(&self) -> PlatformResult<f64>;

    fn powergood_status(&self) -> PlatformResult<bool>;

    fn temperature(&self) -> PlatformResult<f64> {
        Err(PlatformError::not_supported("get_temperature"))
    }

    fn temperature_high_threshold(&self) -> PlatformResult<f64> {
        Err(PlatformError::not_supported("get_temperature_high_threshold"))
    }

    fn voltage_high_threshold(&self) -> PlatformResult<f64> {
        Err(PlatformError::not_supported("get_voltage_high_threshold"))
    }

    fn voltage_low_threshold(&self) -> PlatformResult<f64> {
        Err(PlatformError::not_supported("get_voltage_low_threshold"))
    }

    fn maximum_supplied_power(&self) -> PlatformResult<f64> {
        Err(PlatformError::not_supported("get_maximum_supplied_power"))
    }

    fn status_led(&self) -> PlatformResult<LedColor> {
        Err(PlatformError::not_supported("get_status_led"))
    }

    fn set_status_led(&self, _color: LedColor) -> PlatformResult<()> {
        Err(PlatformError::not_supported("set_status_led"))
    }
}

/// A temperature sensor. Readings are in degrees Celsius.
pub trait Thermal: DeviceBase {
    fn temperature(&self) -> PlatformResult<f64>;

    fn high_threshold(&self) -> PlatformResult<f64> {
        Err(PlatformError::not_supported("get_high_threshold"))
    }

    fn low_threshold(&self) -> PlatformResult<f64> {
        Err(PlatformError::not_supported("get_low_threshold"))
    }

    fn high_critical_threshold(&self) -> PlatformResult<f64> {
        Err(PlatformError::not_supported("get_high_critical_threshold"))
    }

    fn low_critical_threshold(&self) -> PlatformResult<f64> {
        Err(PlatformError::not_supported("get_low_critical_threshold"))
    }

    fn set_high_threshold(&self, _celsius: f64) -> PlatformResult<()> {
        Err(PlatformError::not_supported("set_high_threshold"))
    }

    fn set_low_threshold(&self, _celsius: f64) -> PlatformResult<()> {
        Err(PlatformError::not_supported("set_low_threshold"))
    }

    fn minimum_recorded(&self) -> PlatformResult<f64> {
        Err(PlatformError::not_supported("get_minimum_recorded"))
    }

    fn maximum_recorded(&self) -> PlatformResult<f64> {
        Err(PlatformError::not_supported("get_maximum_recorded"))
    }
}

/// A pluggable transceiver cage.
pub trait Sfp: DeviceBase {
    /// 1-based front panel port index.
    fn port_index(&self) -> usize;

    fn reset(&self) -> PlatformResult<()> {
        Err(PlatformError::not_supported("reset"))
    }

    fn reset_status(&self) -> PlatformResult<bool> {
        Err(PlatformError::not_supported("get_reset_status"))
    }

    fn lpmode(&self) -> PlatformResult<bool> {
        Err(PlatformError::not_supported("get_lpmode"))
    }

    fn set_lpmode(&self, _enable: bool) -> PlatformResult<()> {
        Err(PlatformError::not_supported("set_lpmode"))
    }

    fn read_eeprom(&self, offset: u64, len: usize) -> PlatformResult<Vec<u8>>;

    fn write_eeprom(&self, _offset: u64, _data: &[u8]) -> PlatformResult<()> {
        Err(PlatformError::not_supported("write_eeprom"))
    }

    /// SFF-8024 identifier byte decoded to a module type name.
    fn transceiver_type(&self) -> PlatformResult<&'static str> {
        Ok(sff::identifier_name(identifier(self)?))
    }

    /// Module temperature in degrees Celsius from its monitor page.
    fn temperature(&self) -> PlatformResult<f64> {
        let map = temperature_map(self)?;
        let raw = self.read_eeprom(map.reading, 2)?;
        match raw.as_slice() {
            [hi, lo, ..] => Ok(sff::decode_temperature([*hi, *lo])),
            _ => Err(PlatformError::access(format!("{}: short temperature read", self.name()))),
        }
    }

    /// Temperature alarm and warning thresholds advertised by the module.
    fn transceiver_threshold_info(&self) -> PlatformResult<sff::TransceiverThresholds> {
        let map = temperature_map(self)?;
        let raw = self.read_eeprom(map.thresholds, 8)?;
        sff::TransceiverThresholds::decode(&raw)
            .ok_or_else(|| PlatformError::access(format!("{}: short threshold read", self.name())))
    }
}

fn identifier<S: Sfp + ?Sized>(sfp: &S) -> PlatformResult<u8> {
    sfp.read_eeprom(0, 1)?
        .first()
        .copied()
        .ok_or_else(|| PlatformError::access(format!("{}: empty eeprom read", sfp.name())))
}

fn temperature_map<S: Sfp + ?Sized>(sfp: &S) -> PlatformResult<sff::TemperatureMap> {
    let id = identifier(sfp)?;
    sff::temperature_map(id).ok_or_else(|| {
        PlatformError::not_supported(format!(
            "temperature of {} ({})",
            sfp.name(),
            sff::identifier_name(id)
        ))
    })
}

/// A firmware-carrying part of the board.
pub trait Component: Send + Sync {
    fn name(&self) -> String;

    fn description(&self) -> String;

    fn firmware_version(&self) -> PlatformResult<String>;

    fn install_firmware(&self, _image_path: &str) -> PlatformResult<()> {
        Err(PlatformError::not_supported("install_firmware"))
    }

    fn update_firmware(&self, _image_path: &str) -> PlatformResult<()> {
        Err(PlatformError::not_supported("update_firmware"))
    }
}

/// A hardware watchdog.
pub trait Watchdog: Send + Sync {
    /// Arms the watchdog and returns the timeout actually applied.
    fn arm(&self, seconds: u32) -> PlatformResult<u32>;

    fn disarm(&self) -> PlatformResult<()>;

    fn is_armed(&self) -> PlatformResult<bool>;

    /// Seconds left before expiry, `None` when not armed.
    fn remaining_time(&self) -> PlatformResult<Option<u32>>;
}

/// Last seen transceiver presence, used by [`Chassis::change_event`].
///
/// A port with no recorded state is always reported, so the first call
/// carries the presence of every readable port.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    last: Mutex<BTreeMap<usize, bool>>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compares current presence with the last seen state and records it.
    /// Ports whose presence cannot be read are left out and keep their
    /// previous state.
    pub fn poll(&self, sfps: &[Arc<dyn Sfp>]) -> ChangeEvent {
        let mut last = self.last.lock();
        let mut event = ChangeEvent::default();
        for sfp in sfps {
            let index = sfp.port_index();
            let present = match sfp.presence() {
                Ok(present) => present,
                Err(e) => {
                    debug!(port = index, error = %e, "Skipping unreadable presence");
                    continue;
                }
            };
            if last.insert(index, present) != Some(present) {
                let change = if present {
                    PresenceChange::Inserted
                } else {
                    PresenceChange::Removed
                };
                event.sfp.insert(index, change);
            }
        }
        event
    }
}

/// Upper bound on the sleep between two presence polls.
pub const CHANGE_EVENT_POLL: Duration = Duration::from_secs(1);

/// The chassis: owner of every other device on the board.
pub trait Chassis: DeviceBase {
    fn fan_drawers(&self) -> &[Arc<dyn FanDrawer>] {
        &[]
    }

    fn fans(&self) -> &[Arc<dyn Fan>];

    fn psus(&self) -> &[Arc<dyn Psu>];

    fn thermals(&self) -> &[Arc<dyn Thermal>];

    fn sfps(&self) -> &[Arc<dyn Sfp>];

    fn components(&self) -> &[Arc<dyn Component>] {
        &[]
    }

    fn watchdog(&self) -> PlatformResult<Arc<dyn Watchdog>> {
        Err(PlatformError::not_supported("get_watchdog"))
    }

    /// 1-based transceiver lookup.
    fn get_sfp(&self, index: usize) -> PlatformResult<Arc<dyn Sfp>> {
        let sfps = self.sfps();
        if index == 0 || index > sfps.len() {
            return Err(PlatformError::out_of_range(
                "sfp index",
                index as i64,
                1,
                sfps.len() as i64,
            ));
        }
        Ok(Arc::clone(&sfps[index - 1]))
    }

    fn reboot_cause(&self) -> PlatformResult<RebootCauseInfo>;

    fn status_led(&self) -> PlatformResult<LedColor> {
        Err(PlatformError::not_supported("get_status_led"))
    }

    fn set_status_led(&self, _color: LedColor) -> PlatformResult<()> {
        Err(PlatformError::not_supported("set_status_led"))
    }

    /// Presence state used by the default [`Chassis::change_event`].
    fn presence_tracker(&self) -> Option<&PresenceTracker> {
        None
    }

    /// Blocks until a transceiver is inserted or removed, or until
    /// `timeout_ms` expires (`0` waits forever). Returns the changes seen,
    /// empty on timeout.
    fn change_event(&self, timeout_ms: u64) -> PlatformResult<ChangeEvent> {
        let tracker = self
            .presence_tracker()
            .ok_or_else(|| PlatformError::not_supported("get_change_event"))?;
        let deadline = (timeout_ms > 0).then(|| Instant::now() + Duration::from_millis(timeout_ms));

        loop {
            let event = tracker.poll(self.sfps());
            if !event.is_empty() {
                return Ok(event);
            }
            let sleep = match deadline {
                None => CHANGE_EVENT_POLL,
                Some(deadline) => {
                    let left = deadline.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        return Ok(event);
                    }
                    left.min(CHANGE_EVENT_POLL)
                }
            };
            std::thread::sleep(sleep);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FixedFan {
        speed: u8,
        target: u8,
        tolerance: u8,
    }

    impl DeviceBase for FixedFan {
        fn name(&self) -> String {
            "FAN-1".to_string()
        }
        fn presence(&self) -> PlatformResult<bool> {
            Ok(true)
        }
        fn status(&self) -> PlatformResult<bool> {
            Ok(true)
        }
    }

    impl Fan for FixedFan {
        fn direction(&self) -> PlatformResult<FanDirection> {
            Ok(FanDirection::Exhaust)
        }
        fn speed(&self) -> PlatformResult<u8> {
            Ok(self.speed)
        }
        fn target_speed(&self) -> PlatformResult<u8> {
            Ok(self.target)
        }
        fn speed_tolerance(&self) -> PlatformResult<u8> {
            Ok(self.tolerance)
        }
    }

    struct Cage {
        index: usize,
        present: AtomicBool,
    }

    impl DeviceBase for Cage {
        fn name(&self) -> String {
            format!("Ethernet{}", self.index)
        }
        fn presence(&self) -> PlatformResult<bool> {
            Ok(self.present.load(Ordering::SeqCst))
        }
        fn status(&self) -> PlatformResult<bool> {
            self.presence()
        }
    }

    impl Sfp for Cage {
        fn port_index(&self) -> usize {
            self.index
        }
        fn read_eeprom(&self, _offset: u64, _len: usize) -> PlatformResult<Vec<u8>> {
            Ok(vec![0x11])
        }
    }

    struct TestChassis {
        sfps: Vec<Arc<dyn Sfp>>,
        tracker: PresenceTracker,
    }

    impl DeviceBase for TestChassis {
        fn name(&self) -> String {
            "chassis".to_string()
        }
        fn presence(&self) -> PlatformResult<bool> {
            Ok(true)
        }
        fn status(&self) -> PlatformResult<bool> {
            Ok(true)
        }
    }

    impl Chassis for TestChassis {
        fn fans(&self) -> &[Arc<dyn Fan>] {
            &[]
        }
        fn psus(&self) -> &[Arc<dyn Psu>] {
            &[]
        }
        fn thermals(&self) -> &[Arc<dyn Thermal>] {
            &[]
        }
        fn sfps(&self) -> &[Arc<dyn Sfp>] {
            &self.sfps
        }
        fn reboot_cause(&self) -> PlatformResult<RebootCauseInfo> {
            Ok(RebootCauseInfo::unknown())
        }
        fn presence_tracker(&self) -> Option<&PresenceTracker> {
            Some(&self.tracker)
        }
    }

    fn chassis(present: &[bool]) -> TestChassis {
        TestChassis {
            sfps: present
                .iter()
                .enumerate()
                .map(|(i, p)| {
                    Arc::new(Cage {
                        index: i + 1,
                        present: AtomicBool::new(*p),
                    }) as Arc<dyn Sfp>
                })
                .collect(),
            tracker: PresenceTracker::new(),
        }
    }

    #[test]
    fn test_speed_window() {
        let fan = FixedFan {
            speed: 50,
            target: 60,
            tolerance: 20,
        };
        assert!(!fan.is_under_speed().unwrap());
        assert!(!fan.is_over_speed().unwrap());

        let slow = FixedFan {
            speed: 40,
            target: 60,
            tolerance: 20,
        };
        assert!(slow.is_under_speed().unwrap());
    }

    #[test]
    fn test_reboot_cause_strings() {
        assert_eq!(RebootCauseCategory::PowerLoss.as_str(), "Power Loss");
        assert_eq!(
            RebootCauseCategory::from_key("REBOOT_CAUSE_HARDWARE_OTHER"),
            Some(RebootCauseCategory::HardwareOther)
        );
        assert_eq!(RebootCauseCategory::NonHardware.to_string(), "Non-Hardware");
        assert_eq!(RebootCauseCategory::Watchdog.key(), "REBOOT_CAUSE_WATCHDOG");
        assert!(RebootCauseCategory::from_key("REBOOT_CAUSE_BOGUS").is_none());
    }

    #[test]
    fn test_parse_enums() {
        assert_eq!("EXHAUST".parse::<FanDirection>().unwrap(), FanDirection::Exhaust);
        assert_eq!("amber".parse::<LedColor>().unwrap(), LedColor::Amber);
        assert!("purple".parse::<LedColor>().is_err());
    }

    #[test]
    fn test_get_sfp_is_one_based() {
        let chassis = chassis(&[true, false]);
        assert_eq!(chassis.get_sfp(1).unwrap().port_index(), 1);
        assert_eq!(chassis.get_sfp(2).unwrap().port_index(), 2);
        assert!(matches!(
            chassis.get_sfp(0),
            Err(PlatformError::OutOfRange { .. })
        ));
        assert!(chassis.get_sfp(3).is_err());
        assert_eq!(chassis.get_sfp(1).unwrap().transceiver_type().unwrap(), "QSFP28 or later");
    }

    #[test]
    fn test_change_event_reports_transitions() {
        let chassis = chassis(&[true, false]);
        let first = chassis.change_event(10).unwrap();
        assert_eq!(first.sfp.get(&1), Some(&PresenceChange::Inserted));
        assert_eq!(first.sfp.get(&2).map(|c| c.as_str()), Some("0"));
        assert_eq!(first.sfp.len(), 2);

        // nothing changed: returns empty after the timeout
        assert!(chassis.change_event(10).unwrap().is_empty());

        let event = {
            let sfps: Vec<Arc<dyn Sfp>> = vec![Arc::new(Cage {
                index: 1,
                present: AtomicBool::new(false),
            })];
            chassis.tracker.poll(&sfps)
        };
        assert_eq!(event.sfp.get(&1).map(|c| c.as_str()), Some("0"));
    }

    struct BrokenCage {
        index: usize,
    }

    impl DeviceBase for BrokenCage {
        fn name(&self) -> String {
            format!("Ethernet{}", self.index)
        }
        fn presence(&self) -> PlatformResult<bool> {
            Err(PlatformError::access("cpld read failed"))
        }
        fn status(&self) -> PlatformResult<bool> {
            Ok(false)
        }
    }

    impl Sfp for BrokenCage {
        fn port_index(&self) -> usize {
            self.index
        }
        fn read_eeprom(&self, _offset: u64, _len: usize) -> PlatformResult<Vec<u8>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_unreadable_presence_is_not_a_removal() {
        let tracker = PresenceTracker::new();
        let present: Vec<Arc<dyn Sfp>> = vec![Arc::new(Cage {
            index: 3,
            present: AtomicBool::new(true),
        })];
        assert_eq!(tracker.poll(&present).sfp.get(&3), Some(&PresenceChange::Inserted));

        let broken: Vec<Arc<dyn Sfp>> = vec![Arc::new(BrokenCage { index: 3 })];
        assert!(tracker.poll(&broken).is_empty());

        // the failed read did not overwrite the last known state
        assert!(tracker.poll(&present).is_empty());

        let fresh = PresenceTracker::new();
        assert!(fresh.poll(&broken).is_empty());
    }
}
