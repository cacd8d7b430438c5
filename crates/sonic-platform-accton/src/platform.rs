//! Board-wide paths and the runtime namespace.

use std::fmt;

use sonic_platform_common::{PlatformResult, Sysfs};

/// ONIE machine description, visible from both host and pmon.
pub const MACHINE_CONF: &str = "/host/machine.conf";

/// Marker file present inside containers.
pub const CONTAINER_MARKER: &str = "/.dockerenv";

/// `/sys/bus/i2c/devices/<bus>-<addr>`.
pub fn i2c_device(bus: u32, addr: u16) -> String {
    format!("/sys/bus/i2c/devices/{bus}-{addr:04x}")
}

/// Where the platform code is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    /// Directly on the host.
    Host,
    /// Inside the pmon container.
    Pmon,
}

impl Namespace {
    pub fn detect(sysfs: &Sysfs) -> Self {
        if sysfs.exists(CONTAINER_MARKER) {
            Namespace::Pmon
        } else {
            Namespace::Host
        }
    }

    pub fn is_host(&self) -> bool {
        matches!(self, Namespace::Host)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Namespace::Host => "host",
            Namespace::Pmon => "pmon",
        })
    }
}

/// Looks up `key=value` in the machine.conf file, `None` when absent.
pub fn machine_conf_value(sysfs: &Sysfs, key: &str) -> PlatformResult<Option<String>> {
    let text = sysfs.read_str(MACHINE_CONF)?;
    Ok(text.lines().find_map(|line| {
        let (k, v) = line.trim().split_once('=')?;
        (k == key).then(|| v.trim().to_string())
    }))
}
