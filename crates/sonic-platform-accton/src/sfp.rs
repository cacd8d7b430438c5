//! Transceiver cages.
//!
//! Module control lines sit on the port CPLD as `module_present_<port>`,
//! `module_reset_<port>` and `module_lpmode_<port>`; each cage's EEPROM is
//! an optoe client at `0x50` on its own mux channel.

use std::thread;
use std::time::Duration;

use sonic_platform_common::{DeviceBase, PlatformError, PlatformResult, Sfp, Sysfs};
use tracing::info;

use crate::platform::i2c_device;

/// Port CPLD.
pub const PORT_CPLD_BUS: u32 = 13;
pub const PORT_CPLD_ADDR: u16 = 0x61;

/// Number of cages.
pub const NUM_PORTS: usize = 16;

/// Mux channel of port 1; the rest follow consecutively.
pub const FIRST_EEPROM_BUS: u32 = 18;

const EEPROM_ADDR: u16 = 0x50;

/// How long reset is held asserted, and the settle time after release.
pub const RESET_HOLD: Duration = Duration::from_millis(200);

pub struct AccSfp {
    sysfs: Sysfs,
    port: usize,
    reset_hold: Duration,
}

impl AccSfp {
    /// Cage `port` (1-based, at most [`NUM_PORTS`]).
    pub fn new(sysfs: Sysfs, port: usize) -> Self {
        Self {
            sysfs,
            port,
            reset_hold: RESET_HOLD,
        }
    }

    pub fn with_reset_hold(mut self, hold: Duration) -> Self {
        self.reset_hold = hold;
        self
    }

    pub fn eeprom_path(&self) -> String {
        let bus = FIRST_EEPROM_BUS + (self.port as u32 - 1);
        format!("{}/eeprom", i2c_device(bus, EEPROM_ADDR))
    }

    fn cpld_attr(&self, attr: &str) -> String {
        format!(
            "{}/{attr}_{}",
            i2c_device(PORT_CPLD_BUS, PORT_CPLD_ADDR),
            self.port
        )
    }

    fn read_flag(&self, attr: &str) -> PlatformResult<bool> {
        Ok(self.sysfs.read_int(self.cpld_attr(attr), 10)? == 1)
    }

    fn require_presence(&self, operation: &str) -> PlatformResult<()> {
        if self.presence()? {
            Ok(())
        } else {
            Err(PlatformError::access(format!(
                "{operation}: port {} has no module",
                self.port
            )))
        }
    }
}

impl DeviceBase for AccSfp {
    fn name(&self) -> String {
        format!("PORT{}", self.port)
    }

    fn presence(&self) -> PlatformResult<bool> {
        self.read_flag("module_present")
    }

    fn status(&self) -> PlatformResult<bool> {
        Ok(self.presence()? && !self.reset_status()?)
    }

    fn position_in_parent(&self) -> PlatformResult<usize> {
        Ok(self.port)
    }

    fn is_replaceable(&self) -> PlatformResult<bool> {
        Ok(true)
    }
}

impl Sfp for AccSfp {
    fn port_index(&self) -> usize {
        self.port
    }

    fn reset(&self) -> PlatformResult<()> {
        self.require_presence("reset")?;
        info!(port = self.port, "Resetting transceiver");
        self.sysfs.write_str(self.cpld_attr("module_reset"), 1)?;
        thread::sleep(self.reset_hold);
        self.sysfs.write_str(self.cpld_attr("module_reset"), 0)?;
        thread::sleep(self.reset_hold);
        Ok(())
    }

    fn reset_status(&self) -> PlatformResult<bool> {
        self.read_flag("module_reset")
    }

    fn lpmode(&self) -> PlatformResult<bool> {
        self.read_flag("module_lpmode")
    }

    fn set_lpmode(&self, enable: bool) -> PlatformResult<()> {
        self.require_presence("set_lpmode")?;
        self.sysfs
            .write_str(self.cpld_attr("module_lpmode"), u8::from(enable))
    }

    fn read_eeprom(&self, offset: u64, len: usize) -> PlatformResult<Vec<u8>> {
        let path = self.eeprom_path();
        let bytes = self.sysfs.read_bytes(&path, offset, len)?;
        if bytes.len() < len {
            return Err(PlatformError::access(format!(
                "{path}: short read of {} bytes at {offset}, wanted {len}",
                bytes.len()
            )));
        }
        Ok(bytes)
    }

    fn write_eeprom(&self, offset: u64, data: &[u8]) -> PlatformResult<()> {
        self.sysfs.write_bytes(self.eeprom_path(), offset, data)
    }
}
