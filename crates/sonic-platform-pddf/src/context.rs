//! Attribute access shared by every PDDF device object.

use std::sync::Arc;

use sonic_platform_common::shell;
use sonic_platform_common::sysfs::parse_int;
use sonic_platform_common::{PlatformError, PlatformResult, Sysfs};
use tracing::debug;

use crate::data::{AttrEntry, PddfData};
use crate::plugin::{AttrValmap, PddfPlugin};

/// Sysfs handle plus both JSON descriptions, cheap to clone into every
/// device.
#[derive(Debug, Clone)]
pub struct PddfContext {
    pub sysfs: Sysfs,
    pub data: Arc<PddfData>,
    pub plugin: Arc<PddfPlugin>,
}

impl PddfContext {
    pub fn new(sysfs: Sysfs, data: PddfData, plugin: PddfPlugin) -> Self {
        Self {
            sysfs,
            data: Arc::new(data),
            plugin: Arc::new(plugin),
        }
    }

    /// The attribute entry, or `NotSupported` when the board does not
    /// describe it.
    pub fn attr(&self, device: &str, attr: &str) -> PlatformResult<&AttrEntry> {
        self.data
            .attr(device, attr)
            .ok_or_else(|| PlatformError::not_supported(format!("{device}.{attr}")))
    }

    pub fn has_attr(&self, device: &str, attr: &str) -> bool {
        self.data.attr(device, attr).is_some()
    }

    fn attr_path(&self, entry: &AttrEntry, device: &str) -> PlatformResult<String> {
        let path = entry.path.as_deref().ok_or_else(|| {
            PlatformError::invalid_config(format!("{device}.{}", entry.attr_name), "no path")
        })?;
        if path.contains('*') {
            let resolved = self.sysfs.resolve_glob(path).ok_or_else(|| {
                PlatformError::access(format!("{device}.{}: nothing matches {path}", entry.attr_name))
            })?;
            Ok(resolved.to_string_lossy().into_owned())
        } else {
            Ok(path.to_string())
        }
    }

    /// Raw attribute text, trimmed.
    pub fn read_str(&self, device: &str, attr: &str) -> PlatformResult<String> {
        let entry = self.attr(device, attr)?;
        if let Some(cmd) = &entry.cmd {
            let out = shell::exec_blocking_or_fail(cmd)?;
            return Ok(out.trim().to_string());
        }
        let path = self.attr_path(entry, device)?;
        self.sysfs.read_str(path)
    }

    /// Integer attribute; `0x` text is read as hex, anything else as decimal.
    pub fn read_int(&self, device: &str, attr: &str) -> PlatformResult<i64> {
        let text = self.read_str(device, attr)?;
        let radix = if text.starts_with("0x") || text.starts_with("0X") {
            16
        } else {
            10
        };
        parse_int(&text, radix)
            .ok_or_else(|| PlatformError::parse(format!("{device}.{attr}"), text, "not an integer"))
    }

    /// Numeric attribute scaled by its `mult`, or by `default_mult`.
    pub fn read_scaled(&self, device: &str, attr: &str, default_mult: f64) -> PlatformResult<f64> {
        let mult = self.attr(device, attr)?.mult.unwrap_or(default_mult);
        let text = self.read_str(device, attr)?;
        let raw = text
            .parse::<f64>()
            .map_err(|e| PlatformError::parse(format!("{device}.{attr}"), text.clone(), e))?;
        Ok(raw * mult)
    }

    /// Boolean attribute: `mask`/`cmpval` when given, else the plugin
    /// value map, else any non-zero integer.
    pub fn read_flag(
        &self,
        device: &str,
        attr: &str,
        valmap: Option<&AttrValmap>,
    ) -> PlatformResult<bool> {
        let entry = self.attr(device, attr)?;
        if let Some(mask) = entry.mask_value()? {
            let cmpval = entry.cmp_value()?.unwrap_or(mask);
            let raw = self.read_int(device, attr)?;
            return Ok(raw & mask == cmpval);
        }
        let text = self.read_str(device, attr)?;
        if let Some(flag) = valmap.and_then(|m| m.lookup_bool(&text)) {
            return Ok(flag);
        }
        let radix = if text.starts_with("0x") { 16 } else { 10 };
        parse_int(&text, radix)
            .map(|n| n != 0)
            .ok_or_else(|| PlatformError::parse(format!("{device}.{attr}"), text, "not a flag"))
    }

    pub fn write(&self, device: &str, attr: &str, value: impl std::fmt::Display) -> PlatformResult<()> {
        let entry = self.attr(device, attr)?;
        let path = self.attr_path(entry, device)?;
        debug!(device, attr, value = %value, "Writing PDDF attribute");
        self.sysfs.write_str(path, value)
    }

    /// Path of a byte-addressed attribute such as an EEPROM.
    pub fn path(&self, device: &str, attr: &str) -> PlatformResult<String> {
        let entry = self.attr(device, attr)?;
        self.attr_path(entry, device)
    }

    /// `dev_info.display_name`, falling back to the device key.
    pub fn display_name(&self, device: &str) -> String {
        self.data
            .device(device)
            .and_then(|d| d.dev_info.display_name.clone())
            .unwrap_or_else(|| device.to_string())
    }
}
