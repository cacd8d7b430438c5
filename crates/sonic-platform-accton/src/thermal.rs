//! Board LM75 sensors and CPU coretemp readings.
//!
//! Thresholds come from a fixed table and can be overridden at runtime.
//! Overrides live in memory only and are lost on restart.

use parking_lot::Mutex;
use sonic_platform_common::sysfs::milli;
use sonic_platform_common::{DeviceBase, PlatformError, PlatformResult, Sysfs, Thermal};

use crate::platform::i2c_device;

const CORETEMP_HWMON: &str = "/sys/devices/platform/coretemp.0/hwmon/hwmon*";

/// Where a sensor's reading comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorSource {
    /// `temp1_input` of an LM75 hwmon device.
    Lm75 { bus: u32, addr: u16 },
    /// `temp<index>_input` of coretemp; index 1 is the package.
    Coretemp { index: u32 },
}

impl SensorSource {
    fn input_pattern(&self) -> String {
        match self {
            SensorSource::Lm75 { bus, addr } => {
                format!("{}/hwmon/hwmon*/temp1_input", i2c_device(*bus, *addr))
            }
            SensorSource::Coretemp { index } => format!("{CORETEMP_HWMON}/temp{index}_input"),
        }
    }
}

/// Threshold set in degrees Celsius; `None` is not available.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub high_critical: Option<f64>,
    pub low_critical: Option<f64>,
}

impl Thresholds {
    const fn high(high: f64) -> Self {
        Self {
            high: Some(high),
            low: None,
            high_critical: None,
            low_critical: None,
        }
    }

    const fn high_and_critical(high: f64, critical: f64) -> Self {
        Self {
            high: Some(high),
            low: None,
            high_critical: Some(critical),
            low_critical: None,
        }
    }
}

/// A sensor on the board.
#[derive(Debug, Clone, Copy)]
pub struct SensorDef {
    pub name: &'static str,
    pub source: SensorSource,
    pub defaults: Thresholds,
}

/// Every sensor in chassis order.
pub const SENSORS: [SensorDef; 8] = [
    SensorDef {
        name: "MB_temp(0x48)",
        source: SensorSource::Lm75 { bus: 14, addr: 0x48 },
        defaults: Thresholds::high(80.0),
    },
    SensorDef {
        name: "CB_temp(0x4B)",
        source: SensorSource::Lm75 { bus: 24, addr: 0x4b },
        defaults: Thresholds::high(80.0),
    },
    SensorDef {
        name: "FB_temp(0x4A)",
        source: SensorSource::Lm75 { bus: 25, addr: 0x4a },
        defaults: Thresholds::high(80.0),
    },
    SensorDef {
        name: "CPU_Package_temp",
        source: SensorSource::Coretemp { index: 1 },
        defaults: Thresholds::high_and_critical(82.0, 104.0),
    },
    SensorDef {
        name: "CPU_Core_0_temp",
        source: SensorSource::Coretemp { index: 2 },
        defaults: Thresholds::high_and_critical(82.0, 104.0),
    },
    SensorDef {
        name: "CPU_Core_1_temp",
        source: SensorSource::Coretemp { index: 3 },
        defaults: Thresholds::high_and_critical(82.0, 104.0),
    },
    SensorDef {
        name: "CPU_Core_2_temp",
        source: SensorSource::Coretemp { index: 4 },
        defaults: Thresholds::high_and_critical(82.0, 104.0),
    },
    SensorDef {
        name: "CPU_Core_3_temp",
        source: SensorSource::Coretemp { index: 5 },
        defaults: Thresholds::high_and_critical(82.0, 104.0),
    },
];

#[derive(Debug, Default)]
struct State {
    thresholds: Thresholds,
    min: Option<f64>,
    max: Option<f64>,
}

pub struct AccThermal {
    sysfs: Sysfs,
    index: usize,
    def: SensorDef,
    state: Mutex<State>,
}

impl AccThermal {
    /// Sensor `index` (1-based) of [`SENSORS`].
    pub fn new(sysfs: Sysfs, index: usize) -> PlatformResult<Self> {
        let def = *SENSORS
            .get(index.wrapping_sub(1))
            .ok_or_else(|| PlatformError::out_of_range("thermal", index as i64, 1, SENSORS.len() as i64))?;
        Ok(Self {
            sysfs,
            index,
            def,
            state: Mutex::new(State {
                thresholds: def.defaults,
                ..State::default()
            }),
        })
    }

    pub fn source(&self) -> SensorSource {
        self.def.source
    }

    fn threshold(value: Option<f64>, operation: &str) -> PlatformResult<f64> {
        value.ok_or_else(|| PlatformError::not_supported(operation))
    }
}

impl DeviceBase for AccThermal {
    fn name(&self) -> String {
        self.def.name.to_string()
    }

    fn presence(&self) -> PlatformResult<bool> {
        Ok(true)
    }

    fn status(&self) -> PlatformResult<bool> {
        Ok(self.temperature().is_ok())
    }

    fn position_in_parent(&self) -> PlatformResult<usize> {
        Ok(self.index)
    }

    fn is_replaceable(&self) -> PlatformResult<bool> {
        Ok(false)
    }
}

impl Thermal for AccThermal {
    fn temperature(&self) -> PlatformResult<f64> {
        let pattern = self.def.source.input_pattern();
        let path = self
            .sysfs
            .resolve_glob(&pattern)
            .ok_or_else(|| PlatformError::access(format!("{pattern}: no hwmon entry")))?;
        let temp = milli(self.sysfs.read_float(path)?);

        let mut state = self.state.lock();
        state.min = Some(state.min.map_or(temp, |m| m.min(temp)));
        state.max = Some(state.max.map_or(temp, |m| m.max(temp)));
        Ok(temp)
    }

    fn high_threshold(&self) -> PlatformResult<f64> {
        Self::threshold(self.state.lock().thresholds.high, "get_high_threshold")
    }

    fn low_threshold(&self) -> PlatformResult<f64> {
        Self::threshold(self.state.lock().thresholds.low, "get_low_threshold")
    }

    fn high_critical_threshold(&self) -> PlatformResult<f64> {
        Self::threshold(
            self.state.lock().thresholds.high_critical,
            "get_high_critical_threshold",
        )
    }

    fn low_critical_threshold(&self) -> PlatformResult<f64> {
        Self::threshold(
            self.state.lock().thresholds.low_critical,
            "get_low_critical_threshold",
        )
    }

    fn set_high_threshold(&self, celsius: f64) -> PlatformResult<()> {
        self.state.lock().thresholds.high = Some(celsius);
        Ok(())
    }

    fn set_low_threshold(&self, celsius: f64) -> PlatformResult<()> {
        self.state.lock().thresholds.low = Some(celsius);
        Ok(())
    }

    fn minimum_recorded(&self) -> PlatformResult<f64> {
        let current = self.temperature()?;
        Ok(self.state.lock().min.unwrap_or(current))
    }

    fn maximum_recorded(&self) -> PlatformResult<f64> {
        let current = self.temperature()?;
        Ok(self.state.lock().max.unwrap_or(current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sonic_platform_test::fixtures::hwmon_fixtures;
    use sonic_platform_test::FakeSysfs;

    #[test]
    fn test_lm75_reading_and_default_thresholds() {
        let fake = FakeSysfs::new();
        hwmon_fixtures::i2c_hwmon(&fake, 24, 0x4b, 3, &[("temp1_input", "35500")]);
        let thermal = AccThermal::new(fake.sysfs(), 2).unwrap();

        assert_eq!(thermal.name(), "CB_temp(0x4B)");
        assert_eq!(thermal.temperature().unwrap(), 35.5);
        assert!(thermal.status().unwrap());
        assert_eq!(thermal.high_threshold().unwrap(), 80.0);
        assert!(thermal.low_threshold().unwrap_err().is_not_supported());
        assert!(thermal.high_critical_threshold().unwrap_err().is_not_supported());
    }

    #[test]
    fn test_coretemp_and_overrides() {
        let fake = FakeSysfs::new();
        hwmon_fixtures::coretemp(&fake, 1, &[("temp1_input", "47000"), ("temp3_input", "45000")]);
        let package = AccThermal::new(fake.sysfs(), 4).unwrap();
        let core1 = AccThermal::new(fake.sysfs(), 6).unwrap();

        assert_eq!(package.temperature().unwrap(), 47.0);
        assert_eq!(core1.temperature().unwrap(), 45.0);
        assert_eq!(package.high_critical_threshold().unwrap(), 104.0);

        package.set_high_threshold(75.0).unwrap();
        package.set_low_threshold(5.0).unwrap();
        assert_eq!(package.high_threshold().unwrap(), 75.0);
        assert_eq!(package.low_threshold().unwrap(), 5.0);
        assert_eq!(core1.high_threshold().unwrap(), 82.0);
    }

    #[test]
    fn test_recorded_extremes() {
        let fake = FakeSysfs::new();
        hwmon_fixtures::i2c_hwmon(&fake, 14, 0x48, 1, &[("temp1_input", "30000")]);
        let thermal = AccThermal::new(fake.sysfs(), 1).unwrap();
        let input = "/sys/bus/i2c/devices/14-0048/hwmon/hwmon1/temp1_input";

        thermal.temperature().unwrap();
        fake.file(input, "42000");
        thermal.temperature().unwrap();
        fake.file(input, "36000");

        assert_eq!(thermal.minimum_recorded().unwrap(), 30.0);
        assert_eq!(thermal.maximum_recorded().unwrap(), 42.0);
    }

    #[test]
    fn test_missing_hwmon_and_bad_index() {
        let fake = FakeSysfs::new();
        let thermal = AccThermal::new(fake.sysfs(), 1).unwrap();
        assert!(thermal.temperature().is_err());
        assert!(!thermal.status().unwrap());

        assert!(AccThermal::new(fake.sysfs(), 0).is_err());
        assert!(AccThermal::new(fake.sysfs(), SENSORS.len() + 1).is_err());
    }
}
