//! Fixtures for common sysfs layouts
//!
//! Kernel drivers expose devices in a handful of recurring shapes; these
//! helpers build them so tests only state the values that matter.

use crate::FakeSysfs;

/// Directory of an i2c client: `/sys/bus/i2c/devices/<bus>-<addr:04x>`.
pub fn i2c_device_dir(bus: u32, addr: u16) -> String {
    format!("/sys/bus/i2c/devices/{}-{:04x}", bus, addr)
}

/// Adapter directory: `/sys/bus/i2c/devices/i2c-<bus>`.
pub fn i2c_adapter_dir(bus: u32) -> String {
    format!("/sys/bus/i2c/devices/i2c-{}", bus)
}

/// Common i2c device fixtures
pub mod i2c_fixtures {
    use super::*;

    /// An i2c client directory with the given attribute files.
    pub fn client(fake: &FakeSysfs, bus: u32, addr: u16, attrs: &[(&str, &str)]) {
        let dir = i2c_device_dir(bus, addr);
        fake.dir(&dir);
        for (name, value) in attrs {
            fake.file(format!("{}/{}", dir, name), value);
        }
    }

    /// An adapter exposing `new_device` / `delete_device`.
    pub fn adapter(fake: &FakeSysfs, bus: u32) {
        let dir = i2c_adapter_dir(bus);
        fake.file(format!("{}/new_device", dir), "")
            .file(format!("{}/delete_device", dir), "");
    }

    /// A driver directory with `bind` / `unbind`, optionally with `dev`
    /// already bound.
    pub fn driver(fake: &FakeSysfs, bus_type: &str, driver: &str, bound: Option<&str>) {
        let dir = format!("/sys/bus/{}/drivers/{}", bus_type, driver);
        fake.file(format!("{}/bind", dir), "")
            .file(format!("{}/unbind", dir), "");
        if let Some(dev) = bound {
            fake.dir(format!("{}/{}", dir, dev));
        }
    }
}

/// Common hwmon fixtures
pub mod hwmon_fixtures {
    use super::*;

    /// `<device>/hwmon/hwmon<index>/<attr>` files under an i2c client.
    pub fn i2c_hwmon(
        fake: &FakeSysfs,
        bus: u32,
        addr: u16,
        index: u32,
        attrs: &[(&str, &str)],
    ) {
        let dir = format!("{}/hwmon/hwmon{}", i2c_device_dir(bus, addr), index);
        fake.dir(&dir);
        for (name, value) in attrs {
            fake.file(format!("{}/{}", dir, name), value);
        }
    }

    /// CPU package/core sensors under the coretemp platform device.
    pub fn coretemp(fake: &FakeSysfs, index: u32, attrs: &[(&str, &str)]) {
        let dir = format!("/sys/devices/platform/coretemp.0/hwmon/hwmon{}", index);
        fake.dir(&dir);
        for (name, value) in attrs {
            fake.file(format!("{}/{}", dir, name), value);
        }
    }
}
