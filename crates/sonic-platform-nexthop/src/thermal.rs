//! Thermals the PDDF description does not cover: the switch ASIC sensors
//! exposed by the FPGA, and one sensor per transceiver.
//!
//! FPGA ASIC sensors are counted by `PLATFORM.num_nexthop_fpga_asic_temp_sensors`
//! and described by `NEXTHOP_FPGA_ASIC_TEMP_SENSOR<n>` entries:
//!
//! ```json
//! "NEXTHOP_FPGA_ASIC_TEMP_SENSOR1": {
//!     "dev_info": { "device_parent": "MULTIFPGAPCIE0", "display_name": "ASIC_MAX_TEMP" },
//!     "dev_attr": {
//!         "temp_reg_offset": "0x78",
//!         "ready_reg_offset": "0x70",
//!         "temp1_high_threshold": 105.0,
//!         "temp1_high_crit_threshold": 110.0
//!     }
//! }
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use sonic_platform_common::{
    DeviceBase, PlatformError, PlatformResult, Sfp, Sysfs, Thermal, TransceiverThresholds,
};
use sonic_platform_pddf::{DeviceEntry, PddfData};
use tracing::warn;

use crate::watchdog::{hex_dev_attr, parent_fpga, PciResource};

/// `PLATFORM` key counting the FPGA ASIC sensors.
pub const FPGA_ASIC_SENSOR_COUNT: &str = "num_nexthop_fpga_asic_temp_sensors";

/// How long transceiver thresholds are reused before reading them again.
pub const THRESHOLDS_CACHE_INTERVAL: Duration = Duration::from_secs(5);

/// pddf-device.json key of FPGA ASIC sensor `index` (0-based).
pub fn fpga_asic_sensor_key(index: usize) -> String {
    format!("NEXTHOP_FPGA_ASIC_TEMP_SENSOR{}", index + 1)
}

/// Degrees Celsius from the ASIC monitor's oscillator period count;
/// `None` for a zero count.
pub fn asic_temperature(raw: u32) -> Option<f64> {
    if raw == 0 {
        return None;
    }
    let period = 1_000_000_000 / i64::from(raw) / 40 / 2 - 1;
    let millis = (period * -23_734 + 35_607_000) / 100;
    Some(millis as f64 / 1000.0)
}

#[derive(Debug, Default, Clone, Copy)]
struct Recorded {
    min: Option<f64>,
    max: Option<f64>,
}

impl Recorded {
    fn record(&mut self, temp: f64) {
        self.min = Some(self.min.map_or(temp, |m| m.min(temp)));
        self.max = Some(self.max.map_or(temp, |m| m.max(temp)));
    }
}

fn recorded_or<T>(value: Option<f64>, what: &str, name: &T) -> PlatformResult<f64>
where
    T: std::fmt::Display + ?Sized,
{
    value.ok_or_else(|| PlatformError::access(format!("{name}: no {what} recorded")))
}

/// A switch ASIC temperature read from an FPGA register.
pub struct FpgaAsicThermal {
    io: PciResource,
    name: String,
    position: usize,
    temp_offset: usize,
    ready_offset: Option<usize>,
    high: Option<f64>,
    high_critical: Option<f64>,
    recorded: Mutex<Recorded>,
}

impl FpgaAsicThermal {
    /// Sensor `index` (0-based), positioned after `position_offset` other
    /// chassis thermals.
    pub fn from_pddf(
        sysfs: Sysfs,
        data: &PddfData,
        index: usize,
        position_offset: usize,
    ) -> PlatformResult<Self> {
        let key = fpga_asic_sensor_key(index);
        let entry = data
            .device(&key)
            .ok_or_else(|| PlatformError::invalid_config(&key, "missing from pddf-device.json"))?;
        let io = parent_fpga(sysfs, data, &key, entry)?;
        let ready_offset = match entry.dev_attr.contains_key("ready_reg_offset") {
            true => Some(hex_dev_attr(&key, entry, "ready_reg_offset")?),
            false => None,
        };
        Ok(Self {
            io,
            name: entry
                .dev_info
                .display_name
                .clone()
                .unwrap_or_else(|| format!("ASIC_TEMP{}", index + 1)),
            position: position_offset + index + 1,
            temp_offset: hex_dev_attr(&key, entry, "temp_reg_offset")?,
            ready_offset,
            high: dev_attr_f64(entry, "temp1_high_threshold"),
            high_critical: dev_attr_f64(entry, "temp1_high_crit_threshold"),
            recorded: Mutex::new(Recorded::default()),
        })
    }

    /// Every sensor `PLATFORM` counts. Badly described sensors are logged
    /// and left out.
    pub fn all_from_pddf(sysfs: &Sysfs, data: &PddfData, position_offset: usize) -> Vec<Self> {
        (0..data.platform.vendor_count(FPGA_ASIC_SENSOR_COUNT))
            .filter_map(|index| {
                match Self::from_pddf(sysfs.clone(), data, index, position_offset) {
                    Ok(thermal) => Some(thermal),
                    Err(e) => {
                        warn!(index, error = %e, "Skipping FPGA ASIC sensor");
                        None
                    }
                }
            })
            .collect()
    }
}

fn dev_attr_f64(entry: &DeviceEntry, name: &str) -> Option<f64> {
    let value = entry.dev_attr.get(name)?;
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

impl DeviceBase for FpgaAsicThermal {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn presence(&self) -> PlatformResult<bool> {
        Ok(true)
    }

    fn status(&self) -> PlatformResult<bool> {
        Ok(self.temperature().is_ok())
    }

    fn position_in_parent(&self) -> PlatformResult<usize> {
        Ok(self.position)
    }

    fn is_replaceable(&self) -> PlatformResult<bool> {
        Ok(false)
    }
}

impl Thermal for FpgaAsicThermal {
    fn temperature(&self) -> PlatformResult<f64> {
        if let Some(ready) = self.ready_offset {
            if self.io.read_u32(ready)? & 0x1 == 0 {
                return Err(PlatformError::access(format!("{}: ASIC monitor not ready", self.name)));
            }
        }
        let raw = self.io.read_u32(self.temp_offset)?;
        let temp = asic_temperature(raw)
            .ok_or_else(|| PlatformError::access(format!("{}: no reading yet", self.name)))?;
        self.recorded.lock().record(temp);
        Ok(temp)
    }

    fn high_threshold(&self) -> PlatformResult<f64> {
        self.high
            .ok_or_else(|| PlatformError::not_supported("get_high_threshold"))
    }

    fn high_critical_threshold(&self) -> PlatformResult<f64> {
        self.high_critical
            .ok_or_else(|| PlatformError::not_supported("get_high_critical_threshold"))
    }

    fn minimum_recorded(&self) -> PlatformResult<f64> {
        self.temperature()?;
        recorded_or(self.recorded.lock().min, "minimum", &self.name)
    }

    fn maximum_recorded(&self) -> PlatformResult<f64> {
        self.temperature()?;
        recorded_or(self.recorded.lock().max, "maximum", &self.name)
    }
}

#[derive(Debug, Default)]
struct SfpThermalState {
    recorded: Recorded,
    thresholds: Option<(Instant, TransceiverThresholds)>,
}

/// The temperature of one transceiver, with its advertised thresholds.
pub struct SfpThermal {
    sfp: Arc<dyn Sfp>,
    cache_interval: Duration,
    state: Mutex<SfpThermalState>,
}

impl SfpThermal {
    pub fn new(sfp: Arc<dyn Sfp>) -> Self {
        Self {
            sfp,
            cache_interval: THRESHOLDS_CACHE_INTERVAL,
            state: Mutex::new(SfpThermalState::default()),
        }
    }

    pub fn with_cache_interval(mut self, interval: Duration) -> Self {
        self.cache_interval = interval;
        self
    }

    fn thresholds(&self) -> PlatformResult<TransceiverThresholds> {
        let mut state = self.state.lock();
        if let Some((read_at, info)) = state.thresholds {
            if read_at.elapsed() <= self.cache_interval {
                return Ok(info);
            }
        }
        let info = self.sfp.transceiver_threshold_info()?;
        state.thresholds = Some((Instant::now(), info));
        Ok(info)
    }
}

/// First letter upper case, the rest lower case.
fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

impl DeviceBase for SfpThermal {
    fn name(&self) -> String {
        format!("Transceiver {}", capitalize(&self.sfp.name()))
    }

    /// An absent module drops the cached thresholds.
    fn presence(&self) -> PlatformResult<bool> {
        let present = self.sfp.presence()?;
        if !present {
            self.state.lock().thresholds = None;
        }
        Ok(present)
    }

    fn model(&self) -> PlatformResult<String> {
        Ok("N/A".to_string())
    }

    fn serial(&self) -> PlatformResult<String> {
        Ok("N/A".to_string())
    }

    fn revision(&self) -> PlatformResult<String> {
        Ok("N/A".to_string())
    }

    fn status(&self) -> PlatformResult<bool> {
        self.presence()
    }

    fn position_in_parent(&self) -> PlatformResult<usize> {
        self.sfp.position_in_parent()
    }

    fn is_replaceable(&self) -> PlatformResult<bool> {
        Ok(true)
    }
}

impl Thermal for SfpThermal {
    fn temperature(&self) -> PlatformResult<f64> {
        let temp = self.sfp.temperature()?;
        self.state.lock().recorded.record(temp);
        Ok(temp)
    }

    fn high_threshold(&self) -> PlatformResult<f64> {
        Ok(self.thresholds()?.high_warning)
    }

    fn low_threshold(&self) -> PlatformResult<f64> {
        Ok(self.thresholds()?.low_warning)
    }

    fn high_critical_threshold(&self) -> PlatformResult<f64> {
        Ok(self.thresholds()?.high_alarm)
    }

    fn low_critical_threshold(&self) -> PlatformResult<f64> {
        Ok(self.thresholds()?.low_alarm)
    }

    fn minimum_recorded(&self) -> PlatformResult<f64> {
        self.temperature()?;
        recorded_or(self.state.lock().recorded.min, "minimum", &self.name())
    }

    fn maximum_recorded(&self) -> PlatformResult<f64> {
        self.temperature()?;
        recorded_or(self.state.lock().recorded.max, "maximum", &self.name())
    }
}
