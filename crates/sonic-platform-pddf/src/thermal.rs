//! Temperature sensors (`TEMP{i}` devices, readings in m°C).

use parking_lot::Mutex;
use sonic_platform_common::{DeviceBase, PlatformResult, Thermal};

use crate::context::PddfContext;

const MILLI: f64 = 0.001;

#[derive(Debug, Default, Clone, Copy)]
struct Recorded {
    min: Option<f64>,
    max: Option<f64>,
}

pub struct PddfThermal {
    ctx: PddfContext,
    index: usize,
    device: String,
    recorded: Mutex<Recorded>,
}

impl PddfThermal {
    pub fn new(ctx: PddfContext, index: usize) -> Self {
        Self {
            device: format!("TEMP{index}"),
            ctx,
            index,
            recorded: Mutex::new(Recorded::default()),
        }
    }

    fn write_threshold(&self, attr: &str, celsius: f64) -> PlatformResult<()> {
        let millis = (celsius * 1000.0).round() as i64;
        self.ctx.write(&self.device, attr, millis)
    }
}

impl DeviceBase for PddfThermal {
    fn name(&self) -> String {
        self.ctx.display_name(&self.device)
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

impl Thermal for PddfThermal {
    fn temperature(&self) -> PlatformResult<f64> {
        let temp = self.ctx.read_scaled(&self.device, "temp1_input", MILLI)?;
        let mut rec = self.recorded.lock();
        rec.min = Some(rec.min.map_or(temp, |m| m.min(temp)));
        rec.max = Some(rec.max.map_or(temp, |m| m.max(temp)));
        Ok(temp)
    }

    fn high_threshold(&self) -> PlatformResult<f64> {
        self.ctx.read_scaled(&self.device, "temp1_high_threshold", MILLI)
    }

    fn low_threshold(&self) -> PlatformResult<f64> {
        self.ctx.read_scaled(&self.device, "temp1_low_threshold", MILLI)
    }

    fn high_critical_threshold(&self) -> PlatformResult<f64> {
        self.ctx.read_scaled(&self.device, "temp1_high_crit_threshold", MILLI)
    }

    fn low_critical_threshold(&self) -> PlatformResult<f64> {
        self.ctx.read_scaled(&self.device, "temp1_low_crit_threshold", MILLI)
    }

    fn set_high_threshold(&self, celsius: f64) -> PlatformResult<()> {
        self.write_threshold("temp1_high_threshold", celsius)
    }

    fn set_low_threshold(&self, celsius: f64) -> PlatformResult<()> {
        self.write_threshold("temp1_low_threshold", celsius)
    }

    fn minimum_recorded(&self) -> PlatformResult<f64> {
        let current = self.temperature()?;
        Ok(self.recorded.lock().min.unwrap_or(current))
    }

    fn maximum_recorded(&self) -> PlatformResult<f64> {
        let current = self.temperature()?;
        Ok(self.recorded.lock().max.unwrap_or(current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PddfData;
    use crate::plugin::PddfPlugin;
    use sonic_platform_test::FakeSysfs;

    const LM75: &str = "/sys/bus/i2c/devices/15-0048/hwmon/hwmon2";

    fn thermal(fake: &FakeSysfs) -> PddfThermal {
        let data = PddfData::from_json(&format!(
            r#"{{
            "TEMP1": {{
                "dev_info": {{ "display_name": "MB_RearLeft_temp(0x48)" }},
                "attr_list": [
                    {{ "attr_name": "temp1_input", "path": "/sys/bus/i2c/devices/15-0048/hwmon/hwmon*/temp1_input" }},
                    {{ "attr_name": "temp1_high_threshold", "path": "{LM75}/temp1_max" }}
                ]
            }}
        }}"#
        ))
        .unwrap();
        PddfThermal::new(PddfContext::new(fake.sysfs(), data, PddfPlugin::default()), 1)
    }

    #[test]
    fn test_temperature_and_recorded_extremes() {
        let fake = FakeSysfs::new();
        fake.file(format!("{LM75}/temp1_input"), "41500")
            .file(format!("{LM75}/temp1_max"), "80000");
        let thermal = thermal(&fake);

        assert_eq!(thermal.name(), "MB_RearLeft_temp(0x48)");
        assert_eq!(thermal.temperature().unwrap(), 41.5);
        fake.file(format!("{LM75}/temp1_input"), "38000");
        assert_eq!(thermal.temperature().unwrap(), 38.0);
        fake.file(format!("{LM75}/temp1_input"), "39000");

        assert_eq!(thermal.minimum_recorded().unwrap(), 38.0);
        assert_eq!(thermal.maximum_recorded().unwrap(), 41.5);
        assert_eq!(thermal.high_threshold().unwrap(), 80.0);
        assert!(thermal.low_threshold().unwrap_err().is_not_supported());
    }

    #[test]
    fn test_set_high_threshold_writes_millidegrees() {
        let fake = FakeSysfs::new();
        fake.file(format!("{LM75}/temp1_input"), "41500")
            .file(format!("{LM75}/temp1_max"), "80000");
        let thermal = thermal(&fake);

        thermal.set_high_threshold(72.5).unwrap();
        assert_eq!(fake.read(format!("{LM75}/temp1_max")), "72500");
        assert_eq!(thermal.high_threshold().unwrap(), 72.5);
    }
}
