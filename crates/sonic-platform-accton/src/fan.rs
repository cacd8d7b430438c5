//! Tray fans on the fan CPLD and the fans inside each PSU.
//!
//! The fan CPLD at `3-0060` exposes:
//!
//! | attribute | meaning |
//! |-----------|---------|
//! | `fan_present_<tray>` | `1` when the tray is inserted |
//! | `fan_direction_<tray>` | `0` intake, otherwise exhaust |
//! | `fan<n>_input` | measured rpm |
//! | `fan_fault_<n>` | `0` when healthy |
//! | `fan_duty_cycle_percentage` | shared duty cycle, one of the table steps |
//!
//! The tachometers do not report a percentage, so the speed is derived from
//! the rpm expected at the current duty.

use sonic_platform_common::sysfs::clamp_percent;
use sonic_platform_common::{
    DeviceBase, Fan, FanDirection, LedColor, PlatformError, PlatformResult, Sysfs,
};
use tracing::debug;

use crate::platform::{i2c_device, Namespace};
use crate::psu::{psu_cpld_dir, psu_hwmon_dir};

/// Fan CPLD.
pub const FAN_CPLD_BUS: u32 = 3;
pub const FAN_CPLD_ADDR: u16 = 0x60;

/// Last duty requested through [`Fan::set_speed`], kept across processes.
pub const TARGET_SPEED_PATH: &str = "/tmp/fan_target_speed";

/// Base tolerance in percent.
pub const SPEED_TOLERANCE: u8 = 20;

/// Full-scale PSU fan speed.
pub const PSU_FAN_MAX_RPM: f64 = 26688.0;

/// Duty cycle step to the rpm a healthy fan reaches at it.
const TARGET_RPM: [(u8, u32); 17] = [
    (0, 0),
    (6, 0),
    (12, 681),
    (18, 1477),
    (25, 2386),
    (31, 3636),
    (37, 4431),
    (43, 5340),
    (50, 6250),
    (56, 7159),
    (62, 8068),
    (68, 9090),
    (75, 10227),
    (81, 11363),
    (87, 12500),
    (93, 13409),
    (100, 13863),
];

/// Expected rpm at a duty cycle step, `None` for a duty the CPLD never
/// reports.
pub fn target_rpm(duty: u8) -> Option<u32> {
    TARGET_RPM
        .iter()
        .find(|(step, _)| *step == duty)
        .map(|(_, rpm)| *rpm)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Tray { tray: usize },
    Psu { psu: usize },
}

/// A fan tray fan or a PSU fan.
#[derive(Debug, Clone)]
pub struct AccFan {
    sysfs: Sysfs,
    namespace: Namespace,
    slot: Slot,
}

impl AccFan {
    /// The fan of tray `tray` (1-based).
    pub fn tray(sysfs: Sysfs, namespace: Namespace, tray: usize) -> Self {
        Self {
            sysfs,
            namespace,
            slot: Slot::Tray { tray },
        }
    }

    /// The fan of PSU `psu` (1-based).
    pub fn psu(sysfs: Sysfs, namespace: Namespace, psu: usize) -> Self {
        Self {
            sysfs,
            namespace,
            slot: Slot::Psu { psu },
        }
    }

    fn cpld_attr(attr: &str) -> String {
        format!("{}/{attr}", i2c_device(FAN_CPLD_BUS, FAN_CPLD_ADDR))
    }

    fn read_flag(&self, path: &str) -> PlatformResult<bool> {
        Ok(self.sysfs.read_int(path, 10)? == 1)
    }

    fn duty(&self) -> PlatformResult<u8> {
        let duty = self
            .sysfs
            .read_int(Self::cpld_attr("fan_duty_cycle_percentage"), 10)?;
        Ok(clamp_percent(duty))
    }

    fn requested_duty(&self) -> PlatformResult<Option<u8>> {
        if !self.sysfs.exists(TARGET_SPEED_PATH) {
            return Ok(None);
        }
        Ok(Some(clamp_percent(self.sysfs.read_int(TARGET_SPEED_PATH, 10)?)))
    }

    fn psu_power_good(&self, psu: usize) -> PlatformResult<bool> {
        self.read_flag(&format!("{}/psu_power_good", psu_cpld_dir(psu)))
    }

    fn psu_speed_percent(&self, psu: usize) -> PlatformResult<u8> {
        let rpm = self
            .sysfs
            .read_int(format!("{}/psu_fan1_speed_rpm", psu_hwmon_dir(psu)), 10)?;
        Ok(clamp_percent((rpm as f64 * 100.0 / PSU_FAN_MAX_RPM) as i64))
    }
}

impl DeviceBase for AccFan {
    fn name(&self) -> String {
        match self.slot {
            Slot::Tray { tray } => format!("FAN-{tray}"),
            Slot::Psu { psu } => format!("PSU-{psu} FAN-1"),
        }
    }

    fn presence(&self) -> PlatformResult<bool> {
        match self.slot {
            Slot::Tray { tray } => self.read_flag(&Self::cpld_attr(&format!("fan_present_{tray}"))),
            Slot::Psu { psu } => self.read_flag(&format!("{}/psu_present", psu_cpld_dir(psu))),
        }
    }

    fn status(&self) -> PlatformResult<bool> {
        match self.slot {
            Slot::Tray { tray } => {
                let fault = self
                    .sysfs
                    .read_int(Self::cpld_attr(&format!("fan_fault_{tray}")), 10)?;
                Ok(fault == 0)
            }
            Slot::Psu { psu } => {
                if !self.psu_power_good(psu)? {
                    return Ok(false);
                }
                let fault = self
                    .sysfs
                    .read_int(format!("{}/psu_fan1_fault", psu_hwmon_dir(psu)), 10)?;
                Ok(fault == 0)
            }
        }
    }

    fn position_in_parent(&self) -> PlatformResult<usize> {
        match self.slot {
            Slot::Tray { tray } => Ok(tray),
            Slot::Psu { psu } => Ok(psu),
        }
    }

    fn is_replaceable(&self) -> PlatformResult<bool> {
        Ok(matches!(self.slot, Slot::Tray { .. }))
    }
}

impl Fan for AccFan {
    fn direction(&self) -> PlatformResult<FanDirection> {
        match self.slot {
            Slot::Tray { tray } => {
                let dir = self
                    .sysfs
                    .read_int(Self::cpld_attr(&format!("fan_direction_{tray}")), 10)?;
                Ok(if dir == 0 {
                    FanDirection::Intake
                } else {
                    FanDirection::Exhaust
                })
            }
            Slot::Psu { psu } => {
                if !self.psu_power_good(psu)? {
                    return Ok(FanDirection::NotApplicable);
                }
                let dir = self
                    .sysfs
                    .read_str(format!("{}/psu_fan_dir", psu_cpld_dir(psu)))?;
                Ok(if dir == "F2B" {
                    FanDirection::Exhaust
                } else {
                    FanDirection::Intake
                })
            }
        }
    }

    fn speed(&self) -> PlatformResult<u8> {
        match self.slot {
            Slot::Psu { psu } => self.psu_speed_percent(psu),
            Slot::Tray { tray } => {
                if !self.presence()? {
                    return Ok(0);
                }
                let duty = self.duty()?;
                let input = self
                    .sysfs
                    .read_int(Self::cpld_attr(&format!("fan{tray}_input")), 10)?;
                let expected = target_rpm(duty).ok_or_else(|| {
                    PlatformError::parse(
                        "fan_duty_cycle_percentage",
                        duty.to_string(),
                        "duty cycle is not a known step",
                    )
                })?;
                if expected == 0 || input == 0 {
                    return Ok(0);
                }
                let speed = f64::from(duty) * (input as f64 / f64::from(expected));
                Ok(clamp_percent(speed as i64))
            }
        }
    }

    fn target_speed(&self) -> PlatformResult<u8> {
        match self.slot {
            Slot::Psu { psu } => self.psu_speed_percent(psu),
            Slot::Tray { .. } => {
                if !self.presence()? {
                    return Ok(0);
                }
                // The host never sees the file written from inside pmon.
                if !self.namespace.is_host() {
                    if let Some(requested) = self.requested_duty()? {
                        return Ok(requested);
                    }
                }
                self.duty()
            }
        }
    }

    fn speed_tolerance(&self) -> PlatformResult<u8> {
        let drift = match self.requested_duty()? {
            Some(requested) => self.duty()?.abs_diff(requested),
            None => 0,
        };
        Ok(SPEED_TOLERANCE.saturating_add(drift))
    }

    fn set_speed(&self, percent: u8) -> PlatformResult<()> {
        let Slot::Tray { tray } = self.slot else {
            return Err(PlatformError::not_supported("set_speed on a PSU fan"));
        };
        if percent > 100 {
            return Err(PlatformError::out_of_range("speed", i64::from(percent), 0, 100));
        }
        if !self.presence()? {
            return Err(PlatformError::access(format!("FAN-{tray} is not present")));
        }
        debug!(tray, percent, "Setting fan duty cycle");
        self.sysfs
            .write_str(Self::cpld_attr("fan_duty_cycle_percentage"), percent)?;
        self.sysfs.write_str(TARGET_SPEED_PATH, percent)
    }

    fn speed_rpm(&self) -> PlatformResult<u32> {
        let path = match self.slot {
            Slot::Tray { tray } => Self::cpld_attr(&format!("fan{tray}_input")),
            Slot::Psu { psu } => format!("{}/psu_fan1_speed_rpm", psu_hwmon_dir(psu)),
        };
        Ok(self.sysfs.read_int(path, 10)?.max(0) as u32)
    }

    fn status_led(&self) -> PlatformResult<LedColor> {
        Ok(if self.status()? {
            LedColor::Green
        } else {
            LedColor::Red
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sonic_platform_test::fixtures::i2c_fixtures;
    use sonic_platform_test::FakeSysfs;

    fn tray_fixture(fake: &FakeSysfs, duty: &str, rpm: &str) {
        i2c_fixtures::client(
            fake,
            FAN_CPLD_BUS,
            FAN_CPLD_ADDR,
            &[
                ("fan_present_2", "1"),
                ("fan_direction_2", "1"),
                ("fan2_input", rpm),
                ("fan_fault_2", "0"),
                ("fan_duty_cycle_percentage", duty),
            ],
        );
    }

    #[test]
    fn test_target_rpm_table() {
        assert_eq!(target_rpm(50), Some(6250));
        assert_eq!(target_rpm(6), Some(0));
        assert_eq!(target_rpm(51), None);
    }

    #[test]
    fn test_tray_speed_from_duty_and_rpm() {
        let fake = FakeSysfs::new();
        tray_fixture(&fake, "50", "6000");
        let fan = AccFan::tray(fake.sysfs(), Namespace::Host, 2);

        assert_eq!(fan.name(), "FAN-2");
        assert!(fan.presence().unwrap());
        assert_eq!(fan.direction().unwrap(), FanDirection::Exhaust);
        // 50 * 6000 / 6250
        assert_eq!(fan.speed().unwrap(), 48);
        assert_eq!(fan.target_speed().unwrap(), 50);
        assert_eq!(fan.speed_tolerance().unwrap(), SPEED_TOLERANCE);
        assert_eq!(fan.speed_rpm().unwrap(), 6000);
        assert!(!fan.is_under_speed().unwrap());
        assert_eq!(fan.status_led().unwrap(), LedColor::Green);
        assert!(fan.is_replaceable().unwrap());
    }

    #[test]
    fn test_tray_speed_zero_at_idle_step_and_capped() {
        let fake = FakeSysfs::new();
        tray_fixture(&fake, "6", "900");
        let fan = AccFan::tray(fake.sysfs(), Namespace::Host, 2);
        assert_eq!(fan.speed().unwrap(), 0);

        tray_fixture(&fake, "100", "20000");
        assert_eq!(fan.speed().unwrap(), 100);

        tray_fixture(&fake, "44", "5000");
        assert!(fan.speed().is_err());
    }

    #[test]
    fn test_absent_tray_reports_zero() {
        let fake = FakeSysfs::new();
        tray_fixture(&fake, "50", "6000");
        fake.file(AccFan::cpld_attr("fan_present_2"), "0");
        let fan = AccFan::tray(fake.sysfs(), Namespace::Host, 2);

        assert_eq!(fan.speed().unwrap(), 0);
        assert_eq!(fan.target_speed().unwrap(), 0);
        assert!(fan.set_speed(40).is_err());
    }

    #[test]
    fn test_set_speed_records_request_and_widens_tolerance() {
        let fake = FakeSysfs::new();
        tray_fixture(&fake, "50", "6000");
        fake.dir("/tmp");
        let fan = AccFan::tray(fake.sysfs(), Namespace::Pmon, 2);

        fan.set_speed(62).unwrap();
        assert_eq!(fake.read(AccFan::cpld_attr("fan_duty_cycle_percentage")), "62");
        assert_eq!(fake.read(TARGET_SPEED_PATH), "62");

        // Thermal policy on the CPLD moved the duty after the request.
        fake.file(AccFan::cpld_attr("fan_duty_cycle_percentage"), "75");
        assert_eq!(fan.target_speed().unwrap(), 62);
        assert_eq!(fan.speed_tolerance().unwrap(), SPEED_TOLERANCE + 13);

        let host_view = AccFan::tray(fake.sysfs(), Namespace::Host, 2);
        assert_eq!(host_view.target_speed().unwrap(), 75);

        assert!(fan.set_speed(101).is_err());
    }

    #[test]
    fn test_psu_fan() {
        let fake = FakeSysfs::new();
        fake.file(format!("{}/psu_present", psu_cpld_dir(1)), "1")
            .file(format!("{}/psu_power_good", psu_cpld_dir(1)), "1")
            .file(format!("{}/psu_fan_dir", psu_cpld_dir(1)), "F2B")
            .file(format!("{}/psu_fan1_speed_rpm", psu_hwmon_dir(1)), "13344")
            .file(format!("{}/psu_fan1_fault", psu_hwmon_dir(1)), "0");
        let fan = AccFan::psu(fake.sysfs(), Namespace::Host, 1);

        assert_eq!(fan.name(), "PSU-1 FAN-1");
        assert_eq!(fan.direction().unwrap(), FanDirection::Exhaust);
        assert_eq!(fan.speed().unwrap(), 50);
        assert!(fan.status().unwrap());
        assert!(!fan.is_replaceable().unwrap());
        assert!(fan.set_speed(50).unwrap_err().is_not_supported());

        fake.file(format!("{}/psu_fan1_speed_rpm", psu_hwmon_dir(1)), "30000");
        assert_eq!(fan.speed().unwrap(), 100);

        fake.file(format!("{}/psu_power_good", psu_cpld_dir(1)), "0");
        assert_eq!(fan.direction().unwrap(), FanDirection::NotApplicable);
        assert!(!fan.status().unwrap());
        assert_eq!(fan.status_led().unwrap(), LedColor::Red);
    }
}
