//! Power supplies.
//!
//! Each PSU has two i2c clients: a PMBus hwmon device for the readings and
//! a CPLD window for presence, power-good and the FRU strings.

use std::sync::Arc;

use sonic_platform_common::sysfs::milli;
use sonic_platform_common::{DeviceBase, Fan, LedColor, PlatformResult, Psu, Sysfs};

use crate::fan::AccFan;
use crate::platform::{i2c_device, Namespace};

/// Number of PSU slots.
pub const NUM_PSUS: usize = 2;

/// PMBus client of each PSU, indexed by slot.
pub const PSU_HWMON: [(u32, u16); NUM_PSUS] = [(10, 0x58), (11, 0x59)];

/// CPLD client of each PSU, indexed by slot.
pub const PSU_CPLD: [(u32, u16); NUM_PSUS] = [(10, 0x50), (11, 0x51)];

pub const VOLTAGE_HIGH_THRESHOLD: f64 = 14.72;
pub const VOLTAGE_LOW_THRESHOLD: f64 = 7.68;
pub const TEMPERATURE_HIGH_THRESHOLD: f64 = 80.0;

const NOT_AVAILABLE: &str = "N/A";

/// Hwmon directory of PSU `psu` (1-based).
pub fn psu_hwmon_dir(psu: usize) -> String {
    let (bus, addr) = PSU_HWMON[psu - 1];
    i2c_device(bus, addr)
}

/// CPLD directory of PSU `psu` (1-based).
pub fn psu_cpld_dir(psu: usize) -> String {
    let (bus, addr) = PSU_CPLD[psu - 1];
    i2c_device(bus, addr)
}

pub struct AccPsu {
    sysfs: Sysfs,
    index: usize,
    fans: Vec<Arc<dyn Fan>>,
}

impl AccPsu {
    /// PSU `index` (1-based, at most [`NUM_PSUS`]).
    pub fn new(sysfs: Sysfs, namespace: Namespace, index: usize) -> Self {
        let fan = AccFan::psu(sysfs.clone(), namespace, index);
        Self {
            sysfs,
            index,
            fans: vec![Arc::new(fan)],
        }
    }

    fn hwmon(&self, attr: &str) -> String {
        format!("{}/{attr}", psu_hwmon_dir(self.index))
    }

    fn cpld(&self, attr: &str) -> String {
        format!("{}/{attr}", psu_cpld_dir(self.index))
    }

    /// Output readings are zero while the PSU is unpowered.
    fn output(&self, attr: &str) -> PlatformResult<f64> {
        if !self.status()? {
            return Ok(0.0);
        }
        Ok(milli(self.sysfs.read_float(self.hwmon(attr))?))
    }

    fn fru_string(&self, path: String) -> PlatformResult<String> {
        if !self.status()? {
            return Ok(NOT_AVAILABLE.to_string());
        }
        self.sysfs.read_str(path)
    }
}

impl DeviceBase for AccPsu {
    fn name(&self) -> String {
        format!("PSU-{}", self.index)
    }

    fn presence(&self) -> PlatformResult<bool> {
        Ok(self.sysfs.read_int(self.cpld("psu_present"), 10)? == 1)
    }

    fn status(&self) -> PlatformResult<bool> {
        Ok(self.sysfs.read_int(self.cpld("psu_power_good"), 10)? == 1)
    }

    fn model(&self) -> PlatformResult<String> {
        self.fru_string(self.cpld("psu_model_name"))
    }

    fn serial(&self) -> PlatformResult<String> {
        self.fru_string(self.cpld("psu_serial_number"))
    }

    fn revision(&self) -> PlatformResult<String> {
        self.fru_string(self.hwmon("psu_revision"))
    }

    fn position_in_parent(&self) -> PlatformResult<usize> {
        Ok(self.index)
    }

    fn is_replaceable(&self) -> PlatformResult<bool> {
        Ok(true)
    }
}

impl Psu for AccPsu {
    fn fans(&self) -> &[Arc<dyn Fan>] {
        &self.fans
    }

    fn voltage(&self) -> PlatformResult<f64> {
        self.output("psu_v_out")
    }

    fn current(&self) -> PlatformResult<f64> {
        self.output("psu_i_out")
    }

    fn power(&self) -> PlatformResult<f64> {
        self.output("psu_p_out")
    }

    fn powergood_status(&self) -> PlatformResult<bool> {
        self.status()
    }

    fn temperature(&self) -> PlatformResult<f64> {
        Ok(milli(self.sysfs.read_float(self.hwmon("psu_temp1_input"))?))
    }

    fn temperature_high_threshold(&self) -> PlatformResult<f64> {
        Ok(TEMPERATURE_HIGH_THRESHOLD)
    }

    fn voltage_high_threshold(&self) -> PlatformResult<f64> {
        Ok(VOLTAGE_HIGH_THRESHOLD)
    }

    fn voltage_low_threshold(&self) -> PlatformResult<f64> {
        Ok(VOLTAGE_LOW_THRESHOLD)
    }

    fn maximum_supplied_power(&self) -> PlatformResult<f64> {
        Ok(milli(self.sysfs.read_float(self.hwmon("psu_mfr_p_out_max"))?))
    }

    /// The LED is driven by the PSU itself; this reflects power-good.
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
    use pretty_assertions::assert_eq;
    use sonic_platform_test::FakeSysfs;

    fn powered_psu(fake: &FakeSysfs) {
        let cpld = psu_cpld_dir(2);
        let hwmon = psu_hwmon_dir(2);
        fake.file(format!("{cpld}/psu_present"), "1")
            .file(format!("{cpld}/psu_power_good"), "1")
            .file(format!("{cpld}/psu_model_name"), "YM-1151D-A02R")
            .file(format!("{cpld}/psu_serial_number"), "SA070V122043000123")
            .file(format!("{hwmon}/psu_revision"), "A2")
            .file(format!("{hwmon}/psu_v_out"), "12093")
            .file(format!("{hwmon}/psu_i_out"), "4250")
            .file(format!("{hwmon}/psu_p_out"), "51500")
            .file(format!("{hwmon}/psu_temp1_input"), "31250")
            .file(format!("{hwmon}/psu_mfr_p_out_max"), "150000");
    }

    #[test]
    fn test_readings_scaled_from_milli_units() {
        let fake = FakeSysfs::new();
        powered_psu(&fake);
        let psu = AccPsu::new(fake.sysfs(), Namespace::Host, 2);

        assert_eq!(psu.name(), "PSU-2");
        assert!(psu.presence().unwrap());
        assert!(psu.powergood_status().unwrap());
        assert_eq!(psu.voltage().unwrap(), 12.093);
        assert_eq!(psu.current().unwrap(), 4.25);
        assert_eq!(psu.power().unwrap(), 51.5);
        assert_eq!(psu.temperature().unwrap(), 31.25);
        assert_eq!(psu.maximum_supplied_power().unwrap(), 150.0);
        assert_eq!(psu.model().unwrap(), "YM-1151D-A02R");
        assert_eq!(psu.serial().unwrap(), "SA070V122043000123");
        assert_eq!(psu.revision().unwrap(), "A2");
        assert_eq!(psu.fans().len(), 1);
        assert_eq!(psu.fans()[0].name(), "PSU-2 FAN-1");
    }

    #[test]
    fn test_unpowered_psu_reports_zero_and_na() {
        let fake = FakeSysfs::new();
        powered_psu(&fake);
        fake.file(format!("{}/psu_power_good", psu_cpld_dir(2)), "0");
        let psu = AccPsu::new(fake.sysfs(), Namespace::Host, 2);

        assert!(!psu.status().unwrap());
        assert_eq!(psu.voltage().unwrap(), 0.0);
        assert_eq!(psu.power().unwrap(), 0.0);
        assert_eq!(psu.model().unwrap(), "N/A");
        assert_eq!(psu.serial().unwrap(), "N/A");
        assert_eq!(psu.revision().unwrap(), "N/A");
        assert_eq!(psu.status_led().unwrap(), LedColor::Red);
    }
}
