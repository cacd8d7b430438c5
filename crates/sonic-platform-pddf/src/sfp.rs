//! Transceiver cages (`PORT{i}` devices).
//!
//! `xcvr_lpmode` is optional: without it low-power mode goes through the
//! SFF-8636 power control byte of QSFP modules.

use std::thread;
use std::time::Duration;

use sonic_platform_common::sff;
use sonic_platform_common::{DeviceBase, PlatformError, PlatformResult, Sfp};
use tracing::info;

use crate::context::PddfContext;

/// How long the reset line is held asserted.
pub const RESET_HOLD: Duration = Duration::from_secs(1);

pub struct PddfSfp {
    ctx: PddfContext,
    index: usize,
    device: String,
    reset_hold: Duration,
}

impl PddfSfp {
    pub fn new(ctx: PddfContext, index: usize) -> Self {
        Self {
            device: format!("PORT{index}"),
            ctx,
            index,
            reset_hold: RESET_HOLD,
        }
    }

    pub fn with_reset_hold(mut self, hold: Duration) -> Self {
        self.reset_hold = hold;
        self
    }

    fn identifier(&self) -> PlatformResult<u8> {
        self.read_eeprom(0, 1)?
            .first()
            .copied()
            .ok_or_else(|| PlatformError::access(format!("{}: empty eeprom read", self.device)))
    }
}

impl DeviceBase for PddfSfp {
    fn name(&self) -> String {
        self.ctx.display_name(&self.device)
    }

    fn presence(&self) -> PlatformResult<bool> {
        self.ctx.read_flag(&self.device, "xcvr_present", None)
    }

    fn status(&self) -> PlatformResult<bool> {
        self.presence()
    }

    fn position_in_parent(&self) -> PlatformResult<usize> {
        Ok(self.index)
    }

    fn is_replaceable(&self) -> PlatformResult<bool> {
        Ok(true)
    }
}

impl Sfp for PddfSfp {
    fn port_index(&self) -> usize {
        self.index
    }

    fn reset(&self) -> PlatformResult<()> {
        info!(port = self.index, "Resetting transceiver");
        self.ctx.write(&self.device, "xcvr_reset", 1)?;
        thread::sleep(self.reset_hold);
        self.ctx.write(&self.device, "xcvr_reset", 0)
    }

    fn reset_status(&self) -> PlatformResult<bool> {
        self.ctx.read_flag(&self.device, "xcvr_reset", None)
    }

    fn lpmode(&self) -> PlatformResult<bool> {
        if self.ctx.has_attr(&self.device, "xcvr_lpmode") {
            return self.ctx.read_flag(&self.device, "xcvr_lpmode", None);
        }
        if !sff::is_sff8636(self.identifier()?) {
            return Err(PlatformError::not_supported("get_lpmode"));
        }
        let byte = self.read_eeprom(sff::SFF8636_POWER_CONTROL_OFFSET, 1)?;
        let control = byte.first().copied().unwrap_or(0);
        Ok(control & sff::power_control_byte(true) == sff::power_control_byte(true))
    }

    fn set_lpmode(&self, enable: bool) -> PlatformResult<()> {
        if self.ctx.has_attr(&self.device, "xcvr_lpmode") {
            return self.ctx.write(&self.device, "xcvr_lpmode", u8::from(enable));
        }
        if !sff::is_sff8636(self.identifier()?) {
            return Err(PlatformError::not_supported("set_lpmode"));
        }
        self.write_eeprom(
            sff::SFF8636_POWER_CONTROL_OFFSET,
            &[sff::power_control_byte(enable)],
        )
    }

    fn read_eeprom(&self, offset: u64, len: usize) -> PlatformResult<Vec<u8>> {
        let path = self.ctx.path(&self.device, "eeprom")?;
        let bytes = self.ctx.sysfs.read_bytes(&path, offset, len)?;
        if bytes.len() < len {
            return Err(PlatformError::access(format!(
                "{path}: short read of {} bytes at {offset}, wanted {len}",
                bytes.len()
            )));
        }
        Ok(bytes)
    }

    fn write_eeprom(&self, offset: u64, data: &[u8]) -> PlatformResult<()> {
        let path = self.ctx.path(&self.device, "eeprom")?;
        self.ctx.sysfs.write_bytes(path, offset, data)
    }
}
