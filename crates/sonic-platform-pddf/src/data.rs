//! `pddf-device.json`: the board description.
//!
//! The file has one `PLATFORM` object with device counts and one object per
//! device, keyed by the device name (`PSU1`, `FAN-CTRL`, `TEMP3`, `PORT12`,
//! `SYS_LED`, ...). Every device lists its attributes explicitly:
//!
//! ```json
//! {
//!   "PLATFORM": { "num_psus": 2, "num_fantrays": 3, "num_fans_pertray": 2,
//!                 "num_ports": 32, "num_temps": 4 },
//!   "PSU1": {
//!     "dev_info": { "display_name": "PSU 1" },
//!     "attr_list": [
//!       { "attr_name": "psu_present", "path": "/sys/bus/i2c/devices/3-0060/psu_present",
//!         "mask": "0x1", "cmpval": "0x0" },
//!       { "attr_name": "psu_v_out", "path": "/sys/bus/i2c/devices/11-0058/hwmon/hwmon*/in3_input" }
//!     ]
//!   }
//! }
//! ```
//!
//! An attribute is read either from `path` (a `*` component is resolved to
//! the first match) or from the stdout of `cmd`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use sonic_platform_common::sysfs::parse_int;
use sonic_platform_common::{PlatformError, PlatformResult, Sysfs};

/// Default location of the board description.
pub const PDDF_DEVICE_JSON: &str = "/usr/share/sonic/platform/pddf/pddf-device.json";

/// Device counts from the `PLATFORM` object.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PlatformCounts {
    pub name: Option<String>,
    pub num_psus: usize,
    pub num_fantrays: usize,
    pub num_fans_pertray: usize,
    #[serde(default = "default_num_psu_fans")]
    pub num_psu_fans: usize,
    pub num_ports: usize,
    pub num_temps: usize,
    /// Vendor counts, such as extra sensor kinds a vendor crate adds.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl PlatformCounts {
    /// A vendor count from `PLATFORM`, 0 when absent or not a number.
    pub fn vendor_count(&self, key: &str) -> usize {
        self.extra
            .get(key)
            .and_then(|v| v.as_u64())
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(0)
    }
}

fn default_num_psu_fans() -> usize {
    1
}

/// Identity of one device.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DevInfo {
    pub display_name: Option<String>,
    /// Name of the device this one hangs off, e.g. the FPGA of a watchdog.
    pub device_parent: Option<String>,
    /// PCI address (`0000:01:00.0`) of PCI devices.
    pub device_bdf: Option<String>,
}

/// One attribute of a device.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct AttrEntry {
    pub attr_name: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub cmd: Option<String>,
    /// Hex mask applied to the raw integer before comparing with `cmpval`.
    #[serde(default)]
    pub mask: Option<String>,
    /// Hex value meaning "true" after masking.
    #[serde(default)]
    pub cmpval: Option<String>,
    /// Scale applied to numeric readings, overriding the attribute default.
    #[serde(default)]
    pub mult: Option<f64>,
}

impl AttrEntry {
    pub fn mask_value(&self) -> PlatformResult<Option<i64>> {
        parse_hex_field(&self.attr_name, "mask", self.mask.as_deref())
    }

    pub fn cmp_value(&self) -> PlatformResult<Option<i64>> {
        parse_hex_field(&self.attr_name, "cmpval", self.cmpval.as_deref())
    }
}

fn parse_hex_field(attr: &str, field: &str, text: Option<&str>) -> PlatformResult<Option<i64>> {
    text.map(|t| {
        parse_int(t, 16)
            .ok_or_else(|| PlatformError::invalid_config(format!("{attr}.{field}"), format!("'{t}' is not hex")))
    })
    .transpose()
}

/// One device object.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeviceEntry {
    pub dev_info: DevInfo,
    pub attr_list: Vec<AttrEntry>,
    /// Free-form device parameters (register offsets and the like).
    pub dev_attr: BTreeMap<String, serde_json::Value>,
}

impl DeviceEntry {
    pub fn attr(&self, name: &str) -> Option<&AttrEntry> {
        self.attr_list.iter().find(|a| a.attr_name == name)
    }

    /// String parameter from `dev_attr`.
    pub fn dev_attr_str(&self, name: &str) -> Option<&str> {
        self.dev_attr.get(name).and_then(|v| v.as_str())
    }
}

/// The parsed `pddf-device.json`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PddfData {
    #[serde(rename = "PLATFORM", default)]
    pub platform: PlatformCounts,
    #[serde(flatten)]
    pub devices: BTreeMap<String, DeviceEntry>,
}

impl PddfData {
    pub fn from_json(text: &str) -> PlatformResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| PlatformError::invalid_config("pddf-device.json", e.to_string()))
    }

    pub fn load(sysfs: &Sysfs, path: impl AsRef<Path>) -> PlatformResult<Self> {
        Self::from_json(&sysfs.read_str(path)?)
    }

    pub fn device(&self, name: &str) -> Option<&DeviceEntry> {
        self.devices.get(name)
    }

    pub fn attr(&self, device: &str, attr: &str) -> Option<&AttrEntry> {
        self.device(device).and_then(|d| d.attr(attr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"{
        "PLATFORM": { "num_psus": 2, "num_fantrays": 3, "num_fans_pertray": 2,
                      "num_ports": 4, "num_temps": 1 },
        "PSU1": {
            "dev_info": { "display_name": "PSU 1" },
            "attr_list": [
                { "attr_name": "psu_present", "path": "/sys/bus/i2c/devices/3-0060/psu_present",
                  "mask": "0x2", "cmpval": "0x0" },
                { "attr_name": "psu_v_out", "path": "/sys/class/hwmon/hwmon3/in3_input", "mult": 0.01 }
            ]
        },
        "WATCHDOG": {
            "dev_info": { "device_parent": "FPGA" },
            "dev_attr": { "watchdog_counter_reg_offset": "0x1E0" }
        }
    }"#;

    #[test]
    fn test_parse_sample() {
        let data = PddfData::from_json(SAMPLE).unwrap();
        assert_eq!(data.platform.num_psus, 2);
        assert_eq!(data.platform.num_psu_fans, 1);
        assert_eq!(data.platform.name, None);

        let present = data.attr("PSU1", "psu_present").unwrap();
        assert_eq!(present.mask_value().unwrap(), Some(2));
        assert_eq!(present.cmp_value().unwrap(), Some(0));
        assert_eq!(data.attr("PSU1", "psu_v_out").unwrap().mult, Some(0.01));
        assert!(data.attr("PSU2", "psu_present").is_none());

        let wdt = data.device("WATCHDOG").unwrap();
        assert_eq!(wdt.dev_info.device_parent.as_deref(), Some("FPGA"));
        assert_eq!(wdt.dev_attr_str("watchdog_counter_reg_offset"), Some("0x1E0"));
    }

    #[test]
    fn test_bad_mask_is_config_error() {
        let entry = AttrEntry {
            attr_name: "psu_present".to_string(),
            mask: Some("zz".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            entry.mask_value(),
            Err(PlatformError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        assert!(PddfData::from_json("{ not json").is_err());
    }
}
