//! Firmware-carrying components: BIOS, ONIE and the board CPLDs.
//!
//! Versions are read-only here; firmware is upgraded offline.

use sonic_platform_common::{Component, PlatformError, PlatformResult, Sysfs};

use crate::platform::{i2c_device, machine_conf_value};

pub const BIOS_VERSION_PATH: &str = "/sys/class/dmi/id/bios_version";

/// CPLD name and its i2c client.
pub const CPLDS: [(&str, u32, u16); 3] = [("CPLD1", 1, 0x68), ("CPLD2", 13, 0x61), ("CPLD3", 10, 0x66)];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Bios,
    Onie,
    Cpld { index: usize, bus: u32, addr: u16 },
}

#[derive(Debug, Clone)]
pub struct AccComponent {
    sysfs: Sysfs,
    kind: Kind,
}

impl AccComponent {
    pub fn bios(sysfs: Sysfs) -> Self {
        Self { sysfs, kind: Kind::Bios }
    }

    pub fn onie(sysfs: Sysfs) -> Self {
        Self { sysfs, kind: Kind::Onie }
    }

    /// CPLD `index` (1-based) of [`CPLDS`].
    pub fn cpld(sysfs: Sysfs, index: usize) -> PlatformResult<Self> {
        let (_, bus, addr) = *CPLDS
            .get(index.wrapping_sub(1))
            .ok_or_else(|| PlatformError::out_of_range("cpld", index as i64, 1, CPLDS.len() as i64))?;
        Ok(Self {
            sysfs,
            kind: Kind::Cpld { index, bus, addr },
        })
    }

    /// BIOS, ONIE, then every CPLD.
    pub fn all(sysfs: &Sysfs) -> Vec<Self> {
        let mut list = vec![Self::bios(sysfs.clone()), Self::onie(sysfs.clone())];
        list.extend((1..=CPLDS.len()).filter_map(|i| Self::cpld(sysfs.clone(), i).ok()));
        list
    }
}

impl Component for AccComponent {
    fn name(&self) -> String {
        match self.kind {
            Kind::Bios => "BIOS".to_string(),
            Kind::Onie => "ONIE".to_string(),
            Kind::Cpld { index, .. } => format!("CPLD{index}"),
        }
    }

    fn description(&self) -> String {
        match self.kind {
            Kind::Bios => "Basic Input/Output System".to_string(),
            Kind::Onie => "Open Network Install Environment".to_string(),
            Kind::Cpld { index, .. } => format!("CPLD {index}"),
        }
    }

    fn firmware_version(&self) -> PlatformResult<String> {
        match self.kind {
            Kind::Bios => self.sysfs.read_str(BIOS_VERSION_PATH),
            Kind::Onie => machine_conf_value(&self.sysfs, "onie_version")?
                .ok_or_else(|| PlatformError::access("machine.conf has no onie_version")),
            Kind::Cpld { bus, addr, .. } => {
                self.sysfs.read_str(format!("{}/version", i2c_device(bus, addr)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::MACHINE_CONF;
    use pretty_assertions::assert_eq;
    use sonic_platform_test::FakeSysfs;

    #[test]
    fn test_versions() {
        let fake = FakeSysfs::new();
        fake.file(BIOS_VERSION_PATH, "V1.12 02/17/2022\n")
            .file(MACHINE_CONF, "onie_version=2021.05.00.04\n")
            .file("/sys/bus/i2c/devices/1-0068/version", "0x0b")
            .file("/sys/bus/i2c/devices/13-0061/version", "0x06")
            .file("/sys/bus/i2c/devices/10-0066/version", "0x03");

        let components = AccComponent::all(&fake.sysfs());
        let listed: Vec<(String, String, String)> = components
            .iter()
            .map(|c| (c.name(), c.description(), c.firmware_version().unwrap()))
            .collect();
        let owned = |a: &str, b: &str, c: &str| (a.to_string(), b.to_string(), c.to_string());
        assert_eq!(
            listed,
            vec![
                owned("BIOS", "Basic Input/Output System", "V1.12 02/17/2022"),
                owned("ONIE", "Open Network Install Environment", "2021.05.00.04"),
                owned("CPLD1", "CPLD 1", "0x0b"),
                owned("CPLD2", "CPLD 2", "0x06"),
                owned("CPLD3", "CPLD 3", "0x03"),
            ]
        );
    }

    #[test]
    fn test_firmware_updates_not_supported() {
        let fake = FakeSysfs::new();
        fake.file(MACHINE_CONF, "onie_platform=x86_64-accton_as4630_54npe-r0\n");
        let onie = AccComponent::onie(fake.sysfs());

        assert!(onie.firmware_version().is_err());
        assert!(onie.install_firmware("/tmp/onie.bin").unwrap_err().is_not_supported());
        assert!(AccComponent::bios(fake.sysfs())
            .update_firmware("/tmp/bios.bin")
            .unwrap_err()
            .is_not_supported());
        assert!(AccComponent::cpld(fake.sysfs(), 4).is_err());
    }
}
