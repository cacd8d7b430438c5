//! Tray fans, PSU fans and fan drawers.
//!
//! Tray fan attributes live on the `FAN-CTRL` device and are numbered
//! across trays: fan 2 of tray 3 with two fans per tray is `fan6_*`.
//! PSU fans read `psu_fan{N}_speed_rpm` and `psu_fan_dir` on `PSU{i}`.

use std::sync::Arc;

use sonic_platform_common::sysfs::clamp_percent;
use sonic_platform_common::{
    DeviceBase, Fan, FanDirection, FanDrawer, PlatformError, PlatformResult,
};

use crate::context::PddfContext;

/// Device key holding the tray fan attributes.
pub const FAN_CTRL: &str = "FAN-CTRL";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Tray { tray: usize, fan: usize, index: usize },
    Psu { psu: usize, fan: usize },
}

/// A fan described by the PDDF files.
#[derive(Debug, Clone)]
pub struct PddfFan {
    ctx: PddfContext,
    slot: Slot,
}

impl PddfFan {
    /// Fan `fan` (1-based) of tray `tray` (1-based).
    pub fn tray_fan(ctx: PddfContext, tray: usize, fan: usize) -> Self {
        let per_tray = ctx.data.platform.num_fans_pertray.max(1);
        let index = (tray - 1) * per_tray + fan;
        Self {
            ctx,
            slot: Slot::Tray { tray, fan, index },
        }
    }

    /// Fan `fan` (1-based) inside PSU `psu` (1-based).
    pub fn psu_fan(ctx: PddfContext, psu: usize, fan: usize) -> Self {
        Self {
            ctx,
            slot: Slot::Psu { psu, fan },
        }
    }

    fn psu_device(psu: usize) -> String {
        format!("PSU{psu}")
    }

    fn max_speed(&self) -> PlatformResult<f64> {
        let (max, field) = match self.slot {
            Slot::Tray { .. } => (self.ctx.plugin.fan.max_speed, "FAN.FAN_MAX_SPEED"),
            Slot::Psu { .. } => (self.ctx.plugin.psu.fan_max_speed, "PSU.PSU_FAN_MAX_SPEED"),
        };
        match max {
            Some(max) if max > 0.0 => Ok(max),
            _ => Err(PlatformError::invalid_config(field, "missing or zero")),
        }
    }

    fn percent_of(value: f64, full_scale: f64) -> u8 {
        clamp_percent((value * 100.0 / full_scale).round() as i64)
    }
}

impl DeviceBase for PddfFan {
    fn name(&self) -> String {
        match self.slot {
            Slot::Tray { tray, fan, .. } => format!("Fantray{tray}_{fan}"),
            Slot::Psu { psu, fan } => format!("PSU{psu}_FAN{fan}"),
        }
    }

    fn presence(&self) -> PlatformResult<bool> {
        match self.slot {
            Slot::Tray { index, .. } => self.ctx.read_flag(
                FAN_CTRL,
                &format!("fan{index}_present"),
                self.ctx.plugin.fan.present.as_ref(),
            ),
            Slot::Psu { psu, .. } => self.ctx.read_flag(
                &Self::psu_device(psu),
                "psu_present",
                self.ctx.plugin.psu.psu_present.as_ref(),
            ),
        }
    }

    fn status(&self) -> PlatformResult<bool> {
        match self.slot {
            Slot::Tray { index, .. } => {
                if !self.presence()? {
                    return Ok(false);
                }
                let fault_attr = format!("fan{index}_fault");
                if self.ctx.has_attr(FAN_CTRL, &fault_attr)
                    && self.ctx.read_int(FAN_CTRL, &fault_attr)? != 0
                {
                    return Ok(false);
                }
                Ok(self.speed_rpm()? > 0)
            }
            Slot::Psu { psu, .. } => self.ctx.read_flag(
                &Self::psu_device(psu),
                "psu_power_good",
                self.ctx.plugin.psu.psu_power_good.as_ref(),
            ),
        }
    }

    fn position_in_parent(&self) -> PlatformResult<usize> {
        match self.slot {
            Slot::Tray { fan, .. } | Slot::Psu { fan, .. } => Ok(fan),
        }
    }

    fn is_replaceable(&self) -> PlatformResult<bool> {
        Ok(false)
    }
}

impl Fan for PddfFan {
    fn direction(&self) -> PlatformResult<FanDirection> {
        let (device, attr, valmap) = match self.slot {
            Slot::Tray { index, .. } => (
                FAN_CTRL.to_string(),
                format!("fan{index}_direction"),
                self.ctx.plugin.fan.direction.as_ref(),
            ),
            Slot::Psu { psu, .. } => (
                Self::psu_device(psu),
                "psu_fan_dir".to_string(),
                self.ctx.plugin.psu.psu_fan_dir.as_ref(),
            ),
        };
        let raw = self.ctx.read_str(&device, &attr)?;
        match valmap.and_then(|m| m.lookup_str(&raw)) {
            Some(mapped) => mapped.parse(),
            None => raw.parse(),
        }
    }

    fn speed_rpm(&self) -> PlatformResult<u32> {
        let rpm = match self.slot {
            Slot::Tray { index, .. } => self.ctx.read_int(FAN_CTRL, &format!("fan{index}_input"))?,
            Slot::Psu { psu, fan } => self
                .ctx
                .read_int(&Self::psu_device(psu), &format!("psu_fan{fan}_speed_rpm"))?,
        };
        Ok(rpm.max(0) as u32)
    }

    fn speed(&self) -> PlatformResult<u8> {
        let rpm = f64::from(self.speed_rpm()?);
        Ok(Self::percent_of(rpm, self.max_speed()?))
    }

    fn target_speed(&self) -> PlatformResult<u8> {
        match self.slot {
            Slot::Tray { index, .. } => {
                let pwm = self.ctx.read_int(FAN_CTRL, &format!("fan{index}_pwm"))?;
                let pwm_max = f64::from(self.ctx.plugin.fan.pwm_max.max(1));
                Ok(Self::percent_of(pwm as f64, pwm_max))
            }
            // PSU fans run on their own controller; the target is what they do.
            Slot::Psu { .. } => self.speed(),
        }
    }

    fn speed_tolerance(&self) -> PlatformResult<u8> {
        Ok(self.ctx.plugin.fan.speed_tolerance)
    }

    fn set_speed(&self, percent: u8) -> PlatformResult<()> {
        let Slot::Tray { index, .. } = self.slot else {
            return Err(PlatformError::not_supported("set_speed on a PSU fan"));
        };
        if percent > 100 {
            return Err(PlatformError::out_of_range("fan speed", i64::from(percent), 0, 100));
        }
        let pwm_max = f64::from(self.ctx.plugin.fan.pwm_max);
        let pwm = (f64::from(percent) * pwm_max / 100.0).round() as u32;
        self.ctx.write(FAN_CTRL, &format!("fan{index}_pwm"), pwm)
    }
}

/// A fan tray.
pub struct PddfFanDrawer {
    ctx: PddfContext,
    tray: usize,
    fans: Vec<Arc<dyn Fan>>,
}

impl PddfFanDrawer {
    pub fn new(ctx: PddfContext, tray: usize) -> Self {
        let per_tray = ctx.data.platform.num_fans_pertray;
        let fans = (1..=per_tray)
            .map(|fan| Arc::new(PddfFan::tray_fan(ctx.clone(), tray, fan)) as Arc<dyn Fan>)
            .collect();
        Self { ctx, tray, fans }
    }
}

impl DeviceBase for PddfFanDrawer {
    fn name(&self) -> String {
        format!("Fantray{}", self.tray)
    }

    fn presence(&self) -> PlatformResult<bool> {
        match self.fans.first() {
            Some(fan) => fan.presence(),
            None => Ok(false),
        }
    }

    fn status(&self) -> PlatformResult<bool> {
        for fan in &self.fans {
            if !fan.status()? {
                return Ok(false);
            }
        }
        Ok(!self.fans.is_empty())
    }

    fn position_in_parent(&self) -> PlatformResult<usize> {
        Ok(self.tray)
    }

    fn is_replaceable(&self) -> PlatformResult<bool> {
        Ok(true)
    }
}

impl FanDrawer for PddfFanDrawer {
    fn fans(&self) -> &[Arc<dyn Fan>] {
        &self.fans
    }

    fn maximum_consumed_power(&self) -> PlatformResult<f64> {
        self.ctx
            .plugin
            .fan
            .drawer_max_power
            .ok_or_else(|| PlatformError::not_supported("get_maximum_consumed_power"))
    }
}
