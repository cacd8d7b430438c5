//! FPGA watchdog, driven through the FPGA's memory-mapped BAR0.
//!
//! Two 32-bit registers are involved:
//!
//! | register | bits | meaning |
//! |----------|------|---------|
//! | watchdog counter | 23:0 | countdown in milliseconds |
//! | watchdog counter | 31 | counter enable |
//! | event-driven power-cycle control | 4 | power cycle the system on expiry |

use std::fs::OpenOptions;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::ptr::NonNull;

use nix::sys::mman::{mmap, munmap, MapFlags, ProtFlags};
use parking_lot::Mutex;
use sonic_platform_common::sysfs::parse_int;
use sonic_platform_common::{PlatformError, PlatformResult, Sysfs, Watchdog};
use sonic_platform_pddf::{DeviceEntry, PddfData};
use tracing::{debug, info};

/// Device key of the watchdog in pddf-device.json.
pub const WATCHDOG_DEVICE: &str = "WATCHDOG";

const COUNTER_VALUE_MASK: u32 = 0x00ff_ffff;
const COUNTER_ENABLE_BIT: u32 = 1 << 31;
const REBOOT_ENABLE_BIT: u32 = 1 << 4;

/// Longest timeout the 24-bit millisecond counter holds.
pub const MAX_TIMEOUT_SECS: u32 = COUNTER_VALUE_MASK / 1000;

/// BAR0 of a PCI device, mapped for each access.
#[derive(Debug, Clone)]
pub struct PciResource {
    sysfs: Sysfs,
    bdf: String,
}

impl PciResource {
    pub fn new(sysfs: Sysfs, bdf: impl Into<String>) -> Self {
        Self {
            sysfs,
            bdf: bdf.into(),
        }
    }

    pub fn path(&self) -> String {
        format!("/sys/bus/pci/devices/{}/resource0", self.bdf)
    }

    fn map<R>(&self, offset: usize, f: impl FnOnce(NonNull<u32>) -> R) -> PlatformResult<R> {
        if offset % 4 != 0 {
            return Err(PlatformError::invalid_config(
                format!("{}+0x{offset:x}", self.bdf),
                "register offset is not 32-bit aligned",
            ));
        }
        let path: PathBuf = self.sysfs.resolve(self.path());
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| PlatformError::io(&path, e))?;
        let len = NonZeroUsize::new(offset + 4)
            .ok_or_else(|| PlatformError::internal("empty register mapping"))?;

        // SAFETY: the mapping is private to this call and unmapped before
        // returning; `offset + 4 <= len` keeps the access in bounds.
        unsafe {
            let base = mmap(
                None,
                len,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                &file,
                0,
            )
            .map_err(|e| PlatformError::io(&path, e.into()))?;
            let register = base.cast::<u8>().add(offset).cast::<u32>();
            let out = f(register);
            munmap(base, len.get()).map_err(|e| PlatformError::io(&path, e.into()))?;
            Ok(out)
        }
    }

    pub fn read_u32(&self, offset: usize) -> PlatformResult<u32> {
        // SAFETY: `map` hands out an aligned pointer into a live mapping.
        self.map(offset, |reg| u32::from_le(unsafe { reg.as_ptr().read_volatile() }))
    }

    pub fn write_u32(&self, offset: usize, value: u32) -> PlatformResult<()> {
        // SAFETY: as in `read_u32`.
        self.map(offset, |reg| unsafe { reg.as_ptr().write_volatile(value.to_le()) })
    }
}

/// BAR0 of the FPGA that `entry`'s `device_parent` names.
pub(crate) fn parent_fpga(
    sysfs: Sysfs,
    data: &PddfData,
    key: &str,
    entry: &DeviceEntry,
) -> PlatformResult<PciResource> {
    let parent = entry.dev_info.device_parent.as_deref().ok_or_else(|| {
        PlatformError::invalid_config(format!("{key}.dev_info.device_parent"), "missing")
    })?;
    let bdf = data
        .device(parent)
        .and_then(|fpga| fpga.dev_info.device_bdf.as_deref())
        .ok_or_else(|| {
            PlatformError::invalid_config(format!("{parent}.dev_info.device_bdf"), "missing")
        })?;
    Ok(PciResource::new(sysfs, bdf))
}

/// Hex register offset from `entry`'s `dev_attr`.
pub(crate) fn hex_dev_attr(key: &str, entry: &DeviceEntry, name: &str) -> PlatformResult<usize> {
    let field = format!("{key}.dev_attr.{name}");
    let text = entry
        .dev_attr_str(name)
        .ok_or_else(|| PlatformError::invalid_config(&field, "missing"))?;
    parse_int(text, 16)
        .and_then(|v| usize::try_from(v).ok())
        .ok_or_else(|| PlatformError::invalid_config(&field, format!("'{text}' is not hex")))
}

pub struct FpgaWatchdog {
    io: PciResource,
    power_cycle_ctrl_offset: usize,
    counter_offset: usize,
    lock: Mutex<()>,
}

impl FpgaWatchdog {
    pub fn new(io: PciResource, power_cycle_ctrl_offset: usize, counter_offset: usize) -> Self {
        Self {
            io,
            power_cycle_ctrl_offset,
            counter_offset,
            lock: Mutex::new(()),
        }
    }

    /// Builds the watchdog from the `WATCHDOG` entry of pddf-device.json,
    /// whose `device_parent` names the FPGA carrying the registers.
    pub fn from_pddf(sysfs: Sysfs, data: &PddfData) -> PlatformResult<Self> {
        let entry = data
            .device(WATCHDOG_DEVICE)
            .ok_or_else(|| PlatformError::not_supported("watchdog"))?;
        let io = parent_fpga(sysfs, data, WATCHDOG_DEVICE, entry)?;
        let offset = |name: &str| hex_dev_attr(WATCHDOG_DEVICE, entry, name);
        let ctrl = offset("event_driven_power_cycle_control_reg_offset")?;
        let counter = offset("watchdog_counter_reg_offset")?;
        debug!(bdf = %io.bdf, ctrl, counter, "FPGA watchdog located");
        Ok(Self::new(io, ctrl, counter))
    }

    fn update(&self, offset: usize, f: impl FnOnce(u32) -> u32) -> PlatformResult<()> {
        let current = self.io.read_u32(offset)?;
        self.io.write_u32(offset, f(current))
    }

    fn set_bit(&self, offset: usize, bit: u32, on: bool) -> PlatformResult<()> {
        self.update(offset, |v| if on { v | bit } else { v & !bit })
    }
}

impl Watchdog for FpgaWatchdog {
    fn arm(&self, seconds: u32) -> PlatformResult<u32> {
        if !(1..=MAX_TIMEOUT_SECS).contains(&seconds) {
            return Err(PlatformError::out_of_range(
                "watchdog timeout",
                i64::from(seconds),
                1,
                i64::from(MAX_TIMEOUT_SECS),
            ));
        }
        let _guard = self.lock.lock();
        let millis = seconds * 1000;
        self.update(self.counter_offset, |v| (v & !COUNTER_VALUE_MASK) | millis)?;
        self.set_bit(self.power_cycle_ctrl_offset, REBOOT_ENABLE_BIT, true)?;
        self.set_bit(self.counter_offset, COUNTER_ENABLE_BIT, true)?;
        info!(seconds, "Watchdog armed");
        Ok(seconds)
    }

    fn disarm(&self) -> PlatformResult<()> {
        let _guard = self.lock.lock();
        self.set_bit(self.power_cycle_ctrl_offset, REBOOT_ENABLE_BIT, false)?;
        self.set_bit(self.counter_offset, COUNTER_ENABLE_BIT, false)?;
        info!("Watchdog disarmed");
        Ok(())
    }

    fn is_armed(&self) -> PlatformResult<bool> {
        let _guard = self.lock.lock();
        Ok(self.io.read_u32(self.counter_offset)? & COUNTER_ENABLE_BIT != 0)
    }

    fn remaining_time(&self) -> PlatformResult<Option<u32>> {
        let _guard = self.lock.lock();
        let counter = self.io.read_u32(self.counter_offset)?;
        if counter & COUNTER_ENABLE_BIT == 0 {
            return Ok(None);
        }
        Ok(Some((counter & COUNTER_VALUE_MASK) / 1000))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sonic_platform_test::FakeSysfs;

    const BDF: &str = "0000:01:00.0";
    const CTRL: usize = 0x28;
    const COUNTER: usize = 0x1e0;

    fn setup() -> (FakeSysfs, FpgaWatchdog) {
        let fake = FakeSysfs::new();
        fake.bytes(format!("/sys/bus/pci/devices/{BDF}/resource0"), &[0u8; 0x200]);
        let wd = FpgaWatchdog::new(PciResource::new(fake.sysfs(), BDF), CTRL, COUNTER);
        (fake, wd)
    }

    #[test]
    fn test_arm_sets_counter_and_enables() {
        let (_fake, wd) = setup();
        wd.io.write_u32(CTRL, 0x0000_0003).unwrap();

        assert_eq!(wd.arm(10).unwrap(), 10);
        assert_eq!(wd.io.read_u32(COUNTER).unwrap(), COUNTER_ENABLE_BIT | 10_000);
        assert_eq!(wd.io.read_u32(CTRL).unwrap(), 0x13);
        assert!(wd.is_armed().unwrap());
        assert_eq!(wd.remaining_time().unwrap(), Some(10));
    }

    #[test]
    fn test_register_bytes_are_little_endian() {
        let (fake, wd) = setup();
        wd.io.write_u32(COUNTER, 0x8000_0898).unwrap();

        let raw = std::fs::read(fake.path(format!("/sys/bus/pci/devices/{BDF}/resource0"))).unwrap();
        assert_eq!(&raw[COUNTER..COUNTER + 4], &[0x98, 0x08, 0x00, 0x80]);
        assert_eq!(wd.remaining_time().unwrap(), Some(2));
    }

    #[test]
    fn test_disarm_clears_bits() {
        let (_fake, wd) = setup();
        wd.arm(30).unwrap();
        wd.disarm().unwrap();

        assert!(!wd.is_armed().unwrap());
        assert_eq!(wd.remaining_time().unwrap(), None);
        assert_eq!(wd.io.read_u32(CTRL).unwrap() & REBOOT_ENABLE_BIT, 0);
    }

    #[test]
    fn test_arm_rejects_out_of_range() {
        let (_fake, wd) = setup();
        assert!(wd.arm(0).is_err());
        assert!(wd.arm(MAX_TIMEOUT_SECS + 1).is_err());
        assert_eq!(wd.arm(MAX_TIMEOUT_SECS).unwrap(), 16777);
    }

    #[test]
    fn test_from_pddf() {
        let fake = FakeSysfs::new();
        let data = PddfData::from_json(
            r#"{
            "MULTIFPGAPCIE0": { "dev_info": { "device_bdf": "0000:01:00.0" } },
            "WATCHDOG": {
                "dev_info": { "device_parent": "MULTIFPGAPCIE0" },
                "dev_attr": {
                    "event_driven_power_cycle_control_reg_offset": "0x28",
                    "watchdog_counter_reg_offset": "0x1E0"
                }
            }
        }"#,
        )
        .unwrap();
        let wd = FpgaWatchdog::from_pddf(fake.sysfs(), &data).unwrap();
        assert_eq!(wd.power_cycle_ctrl_offset, CTRL);
        assert_eq!(wd.counter_offset, COUNTER);
        assert_eq!(wd.io.path(), "/sys/bus/pci/devices/0000:01:00.0/resource0");

        let err = FpgaWatchdog::from_pddf(fake.sysfs(), &PddfData::default()).err().unwrap();
        assert!(err.is_not_supported());
    }
}
