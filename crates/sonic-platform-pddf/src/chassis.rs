//! The PDDF chassis: every device the `PLATFORM` counts call for.

use std::str::FromStr;
use std::sync::Arc;

use sonic_platform_common::{
    Chassis, DeviceBase, Fan, FanDrawer, LedColor, PlatformError, PlatformResult,
    PresenceTracker, Psu, RebootCauseCategory, RebootCauseInfo, Sfp, Sysfs, Thermal,
};
use tracing::{debug, warn};

use crate::context::PddfContext;
use crate::data::{PddfData, PDDF_DEVICE_JSON};
use crate::fan::PddfFanDrawer;
use crate::plugin::{PddfPlugin, PD_PLUGIN_JSON};
use crate::psu::PddfPsu;
use crate::sfp::PddfSfp;
use crate::thermal::PddfThermal;

/// Device key of the system status LED.
pub const SYS_LED: &str = "SYS_LED";

pub struct PddfChassis {
    ctx: PddfContext,
    fan_drawers: Vec<Arc<dyn FanDrawer>>,
    fans: Vec<Arc<dyn Fan>>,
    psus: Vec<Arc<dyn Psu>>,
    thermals: Vec<Arc<dyn Thermal>>,
    sfps: Vec<Arc<dyn Sfp>>,
    tracker: PresenceTracker,
}

impl PddfChassis {
    pub fn new(ctx: PddfContext) -> Self {
        let counts = ctx.data.platform.clone();

        let drawers: Vec<PddfFanDrawer> = (1..=counts.num_fantrays)
            .map(|tray| PddfFanDrawer::new(ctx.clone(), tray))
            .collect();
        let fans = drawers
            .iter()
            .flat_map(|d| d.fans().iter().cloned())
            .collect();
        let fan_drawers = drawers
            .into_iter()
            .map(|d| Arc::new(d) as Arc<dyn FanDrawer>)
            .collect();
        let psus = (1..=counts.num_psus)
            .map(|i| Arc::new(PddfPsu::new(ctx.clone(), i)) as Arc<dyn Psu>)
            .collect();
        let thermals = (1..=counts.num_temps)
            .map(|i| Arc::new(PddfThermal::new(ctx.clone(), i)) as Arc<dyn Thermal>)
            .collect();
        let sfps = (1..=counts.num_ports)
            .map(|i| Arc::new(PddfSfp::new(ctx.clone(), i)) as Arc<dyn Sfp>)
            .collect();

        debug!(
            psus = counts.num_psus,
            fantrays = counts.num_fantrays,
            ports = counts.num_ports,
            temps = counts.num_temps,
            "PDDF chassis assembled"
        );

        Self {
            ctx,
            fan_drawers,
            fans,
            psus,
            thermals,
            sfps,
            tracker: PresenceTracker::new(),
        }
    }

    /// Loads both JSON files from their default locations.
    pub fn load(sysfs: Sysfs) -> PlatformResult<Self> {
        let data = PddfData::load(&sysfs, PDDF_DEVICE_JSON)?;
        let plugin = PddfPlugin::load(&sysfs, PD_PLUGIN_JSON)?;
        Ok(Self::new(PddfContext::new(sysfs, data, plugin)))
    }

    pub fn context(&self) -> &PddfContext {
        &self.ctx
    }

    /// Board attribute name for a SONiC colour, after plugin aliasing.
    fn led_attr_for(&self, color: LedColor) -> String {
        let name = color.as_str();
        self.ctx
            .plugin
            .led
            .colors
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }
}

impl DeviceBase for PddfChassis {
    fn name(&self) -> String {
        self.ctx
            .data
            .platform
            .name
            .clone()
            .unwrap_or_else(|| "PDDF Chassis".to_string())
    }

    fn presence(&self) -> PlatformResult<bool> {
        Ok(true)
    }

    fn status(&self) -> PlatformResult<bool> {
        Ok(true)
    }

    fn is_replaceable(&self) -> PlatformResult<bool> {
        Ok(false)
    }
}

impl Chassis for PddfChassis {
    fn fan_drawers(&self) -> &[Arc<dyn FanDrawer>] {
        &self.fan_drawers
    }

    fn fans(&self) -> &[Arc<dyn Fan>] {
        &self.fans
    }

    fn psus(&self) -> &[Arc<dyn Psu>] {
        &self.psus
    }

    fn thermals(&self) -> &[Arc<dyn Thermal>] {
        &self.thermals
    }

    fn sfps(&self) -> &[Arc<dyn Sfp>] {
        &self.sfps
    }

    /// A reboot-cause file holding a category string (`Power Loss`,
    /// `Watchdog`, ...) reports that category; anything else is a software
    /// reboot.
    fn reboot_cause(&self) -> PlatformResult<RebootCauseInfo> {
        let Some(path) = self.ctx.plugin.reboot_cause.reboot_cause_file.as_deref() else {
            return Ok(RebootCauseInfo::unknown());
        };
        if !self.ctx.sysfs.exists(path) {
            return Ok(RebootCauseInfo::unknown());
        }
        let content = self.ctx.sysfs.read_str(path)?;
        if content.is_empty() || content.eq_ignore_ascii_case("unknown") {
            return Ok(RebootCauseInfo::unknown());
        }
        let hardware = [
            RebootCauseCategory::PowerLoss,
            RebootCauseCategory::ThermalOverloadCpu,
            RebootCauseCategory::ThermalOverloadAsic,
            RebootCauseCategory::ThermalOverloadOther,
            RebootCauseCategory::InsufficientFanSpeed,
            RebootCauseCategory::Watchdog,
            RebootCauseCategory::HardwareOther,
        ];
        if let Some(category) = hardware.iter().find(|c| content.starts_with(c.as_str())) {
            let detail = content[category.as_str().len()..]
                .trim_start_matches([':', ' '])
                .to_string();
            return Ok(RebootCauseInfo::new(category.as_str(), detail));
        }
        Ok(RebootCauseInfo::new(
            RebootCauseCategory::NonHardware.as_str(),
            content,
        ))
    }

    fn status_led(&self) -> PlatformResult<LedColor> {
        let device = self
            .ctx
            .data
            .device(SYS_LED)
            .ok_or_else(|| PlatformError::not_supported("get_status_led"))?;
        for entry in &device.attr_list {
            let Some(want) = entry.cmp_value()? else {
                continue;
            };
            let raw = self.ctx.read_int(SYS_LED, &entry.attr_name)?;
            let masked = match entry.mask_value()? {
                Some(mask) => raw & mask,
                None => raw,
            };
            if masked == want {
                return LedColor::from_str(&entry.attr_name);
            }
        }
        warn!("System LED shows no known colour");
        Err(PlatformError::access("system LED value matches no colour"))
    }

    fn set_status_led(&self, color: LedColor) -> PlatformResult<()> {
        let attr = self.led_attr_for(color);
        let entry = self.ctx.attr(SYS_LED, &attr)?;
        let value = entry
            .cmp_value()?
            .ok_or_else(|| PlatformError::invalid_config(format!("{SYS_LED}.{attr}"), "no cmpval"))?;
        self.ctx.write(SYS_LED, &attr, format!("0x{value:x}"))
    }

    fn presence_tracker(&self) -> Option<&PresenceTracker> {
        Some(&self.tracker)
    }
}
