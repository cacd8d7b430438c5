//! `pd-plugin.json`: value maps and scales the board description leaves out.
//!
//! Only the sections the devices consume are typed. `DPM` is kept as raw
//! JSON, in file order, for vendor crates that understand it.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;
use sonic_platform_common::sysfs::parse_int;
use sonic_platform_common::{PlatformError, PlatformResult, Sysfs};

/// Default location of the plugin file.
pub const PD_PLUGIN_JSON: &str = "/usr/share/sonic/platform/pddf/pd-plugin.json";

/// Raw attribute text to meaning, e.g. `{"1": true, "0": false}` or
/// `{"F2B": "EXHAUST"}`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ValmapBody {
    #[serde(default)]
    pub valmap: BTreeMap<String, JsonValue>,
}

/// Per-attribute value map, nested under the access kind as the plugin
/// files do (`{"i2c": {"valmap": {...}}}`).
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct AttrValmap {
    #[serde(default)]
    pub i2c: Option<ValmapBody>,
}

impl AttrValmap {
    /// Looks the raw text up, retrying with its decimal form so `0x1`
    /// matches a `"1"` key.
    pub fn lookup(&self, raw: &str) -> Option<&JsonValue> {
        let map = &self.i2c.as_ref()?.valmap;
        let raw = raw.trim();
        map.get(raw).or_else(|| {
            let radix = if raw.starts_with("0x") { 16 } else { 10 };
            parse_int(raw, radix).and_then(|n| map.get(&n.to_string()))
        })
    }

    pub fn lookup_bool(&self, raw: &str) -> Option<bool> {
        self.lookup(raw).and_then(JsonValue::as_bool)
    }

    pub fn lookup_str(&self, raw: &str) -> Option<&str> {
        self.lookup(raw).and_then(JsonValue::as_str)
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct PsuPlugin {
    pub psu_present: Option<AttrValmap>,
    pub psu_power_good: Option<AttrValmap>,
    pub psu_fan_dir: Option<AttrValmap>,
    #[serde(rename = "PSU_FAN_MAX_SPEED", deserialize_with = "number_or_string")]
    pub fan_max_speed: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct FanPlugin {
    pub present: Option<AttrValmap>,
    pub direction: Option<AttrValmap>,
    #[serde(rename = "FAN_MAX_SPEED", deserialize_with = "number_or_string")]
    pub max_speed: Option<f64>,
    /// Full-scale PWM value; duty cycle maps linearly onto `0..=pwm_max`.
    pub pwm_max: u32,
    pub speed_tolerance: u8,
    #[serde(rename = "FAN_DRAWER_MAX_POWER", deserialize_with = "number_or_string")]
    pub drawer_max_power: Option<f64>,
}

impl Default for FanPlugin {
    fn default() -> Self {
        Self {
            present: None,
            direction: None,
            max_speed: None,
            pwm_max: default_pwm_max(),
            speed_tolerance: default_speed_tolerance(),
            drawer_max_power: None,
        }
    }
}

fn default_pwm_max() -> u32 {
    255
}

fn default_speed_tolerance() -> u8 {
    10
}

/// LED colour aliases: SONiC colour name to the name used in the board's
/// `SYS_LED` attribute list, for boards missing a colour.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct LedPlugin {
    pub colors: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct RebootCauseSection {
    pub reboot_cause_file: Option<String>,
}

/// The parsed `pd-plugin.json`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct PddfPlugin {
    #[serde(rename = "PSU")]
    pub psu: PsuPlugin,
    #[serde(rename = "FAN")]
    pub fan: FanPlugin,
    #[serde(rename = "LED")]
    pub led: LedPlugin,
    #[serde(rename = "REBOOT_CAUSE")]
    pub reboot_cause: RebootCauseSection,
    #[serde(rename = "DPM")]
    pub dpm: serde_json::Map<String, JsonValue>,
}

impl PddfPlugin {
    pub fn from_json(text: &str) -> PlatformResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| PlatformError::invalid_config("pd-plugin.json", e.to_string()))
    }

    pub fn load(sysfs: &Sysfs, path: impl AsRef<Path>) -> PlatformResult<Self> {
        Self::from_json(&sysfs.read_str(path)?)
    }
}

/// Plugin files write speeds both as `18000` and `"18000"`.
fn number_or_string<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(f64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Num(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "PSU": {
            "psu_present": { "i2c": { "valmap": { "1": true, "0": false } } },
            "psu_fan_dir": { "i2c": { "valmap": { "F2B": "EXHAUST", "B2F": "INTAKE" } } },
            "PSU_FAN_MAX_SPEED": "18000"
        },
        "FAN": {
            "direction": { "i2c": { "valmap": { "1": "INTAKE", "0": "EXHAUST" } } },
            "FAN_MAX_SPEED": 23000,
            "pwm_max": 100
        },
        "REBOOT_CAUSE": { "reboot_cause_file": "/host/reboot-cause/reboot-cause.txt" },
        "DPM": { "cpu-dpm": { "type": "adm1266" }, "switch-dpm": { "type": "adm1266" } }
    }"#;

    #[test]
    fn test_parse_sample() {
        let plugin = PddfPlugin::from_json(SAMPLE).unwrap();
        assert_eq!(plugin.psu.fan_max_speed, Some(18000.0));
        assert_eq!(plugin.fan.max_speed, Some(23000.0));
        assert_eq!(plugin.fan.pwm_max, 100);
        assert_eq!(plugin.fan.speed_tolerance, 10);
        assert_eq!(
            plugin.reboot_cause.reboot_cause_file.as_deref(),
            Some("/host/reboot-cause/reboot-cause.txt")
        );
        let dpm_names: Vec<&String> = plugin.dpm.keys().collect();
        assert_eq!(dpm_names, vec!["cpu-dpm", "switch-dpm"]);
    }

    #[test]
    fn test_valmap_lookup() {
        let plugin = PddfPlugin::from_json(SAMPLE).unwrap();
        let present = plugin.psu.psu_present.as_ref().unwrap();
        assert_eq!(present.lookup_bool("1"), Some(true));
        assert_eq!(present.lookup_bool("0x0"), Some(false));
        assert_eq!(present.lookup_bool("7"), None);

        let dir = plugin.psu.psu_fan_dir.as_ref().unwrap();
        assert_eq!(dir.lookup_str("F2B\n"), Some("EXHAUST"));
    }

    #[test]
    fn test_empty_plugin_uses_defaults() {
        let plugin = PddfPlugin::from_json("{}").unwrap();
        assert_eq!(plugin.fan.pwm_max, 255);
        assert!(plugin.dpm.is_empty());
        assert!(plugin.reboot_cause.reboot_cause_file.is_none());
    }
}
