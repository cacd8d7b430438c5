//! Device monitor: makes sure every configured I2C device got its driver.
//!
//! Drivers sometimes fail to probe at boot (a PSU still powering up, a slot
//! card inserted late). For each configured device the monitor looks for a
//! driver attribute under `/sys/bus/i2c/devices/<bus>-<addr>/`. A missing
//! attribute means the device is re-registered, either through the
//! driver's `unbind`/`bind` files or by deleting and re-creating the I2C
//! client:
//!
//! ```toml
//! polling_time = 10
//!
//! [[psus]]
//! name = "psu1"
//! present = { gettype = "i2c", bus = 2, loc = 0x1d, offset = 0x34, presentbit = 0, okval = 0 }
//! device = [
//!     { id = "psu1pmbus", name = "wb_fsp1200", bus = 24, loc = 0x58, attr = "hwmon" },
//!     { id = "psu1frue2", name = "24c02", bus = 24, loc = 0x50, attr = "eeprom" },
//! ]
//! ```
//!
//! Devices and items that came up are remembered and not checked again.
//! An optional `[sdk]` table holds writes made once the switch SDK is up:
//!
//! ```toml
//! [sdk]
//! check = { checktype = "file", sdk_fpath = "/etc/sonic/.sdk_ready" }
//! act = [{ gettype = "sysfs", loc = "/sys/switch/sdk_ready", value = 1 }]
//! ```
//!
//! Once nothing is left to fix the monitor finishes.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use sonic_platform_common::access::{Access, Value};
use sonic_platform_common::monitor::{Monitor, PollOutcome};
use sonic_platform_common::{PlatformResult, Sysfs};
use tracing::{debug, error, info};

/// Raises the daemon log level to debug when present.
pub const DEBUG_FLAG: &str = "/etc/.devmonitor_debug_flag";

const I2C_DEVICES_DIR: &str = "/sys/bus/i2c/devices";

/// Pause between deleting an I2C client and creating it again.
const REGISTER_PAUSE: Duration = Duration::from_millis(100);

/// Wait before reporting that every device is up.
const DEFAULT_FINISH_DELAY: Duration = Duration::from_secs(5);

fn default_polling_time() -> u64 {
    10
}

/// `dev_monitor.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct DevMonitorConfig {
    /// Seconds between two rounds.
    #[serde(default = "default_polling_time")]
    pub polling_time: u64,

    #[serde(default)]
    pub psus: Vec<MonitoredItem>,

    #[serde(default)]
    pub fans: Vec<MonitoredItem>,

    #[serde(default)]
    pub slots: Vec<MonitoredItem>,

    #[serde(default)]
    pub others: Vec<MonitoredItem>,

    #[serde(default)]
    pub binddevs: Vec<MonitoredItem>,

    #[serde(default)]
    pub sdk: Option<SdkConfig>,
}

impl Default for DevMonitorConfig {
    fn default() -> Self {
        Self {
            polling_time: default_polling_time(),
            psus: Vec::new(),
            fans: Vec::new(),
            slots: Vec::new(),
            others: Vec::new(),
            binddevs: Vec::new(),
            sdk: None,
        }
    }
}

impl DevMonitorConfig {
    pub fn group(&self, group: DeviceGroup) -> &[MonitoredItem] {
        match group {
            DeviceGroup::Psus => &self.psus,
            DeviceGroup::Fans => &self.fans,
            DeviceGroup::Slots => &self.slots,
            DeviceGroup::Others => &self.others,
            DeviceGroup::BindDevs => &self.binddevs,
        }
    }
}

/// Writes made once the switch SDK is running.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SdkConfig {
    /// Without a check the SDK counts as ready.
    #[serde(default)]
    pub check: Option<SdkCheck>,

    #[serde(default)]
    pub act: Vec<Access>,
}

/// How to tell the SDK is up.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "checktype", rename_all = "snake_case")]
pub enum SdkCheck {
    /// Ready once `sdk_fpath` exists.
    File { sdk_fpath: String },
}

impl SdkCheck {
    pub fn is_ready(&self, sysfs: &Sysfs) -> bool {
        match self {
            SdkCheck::File { sdk_fpath } => sysfs.exists(sdk_fpath),
        }
    }
}

/// The device groups, in the order they are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DeviceGroup {
    Psus,
    Fans,
    Slots,
    Others,
    BindDevs,
}

impl DeviceGroup {
    pub const ALL: [DeviceGroup; 5] = [
        DeviceGroup::Psus,
        DeviceGroup::Fans,
        DeviceGroup::Slots,
        DeviceGroup::Others,
        DeviceGroup::BindDevs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceGroup::Psus => "psus",
            DeviceGroup::Fans => "fans",
            DeviceGroup::Slots => "slots",
            DeviceGroup::Others => "others",
            DeviceGroup::BindDevs => "binddevs",
        }
    }
}

impl fmt::Display for DeviceGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One field-replaceable item and the devices it carries.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitoredItem {
    /// Item name; also the driver name when `driver_type` is set.
    pub name: String,

    /// Bus type (`i2c`, `platform`, ...) of a driver to re-bind through.
    #[serde(default)]
    pub driver_type: Option<String>,

    /// Devices are only re-registered while the item is present.
    #[serde(default)]
    pub present: Option<PresentCheck>,

    #[serde(default, rename = "device")]
    pub devices: Vec<MonitoredDevice>,
}

/// Presence register of an item: bit `presentbit` of the reading compared
/// with `okval`.
#[derive(Debug, Clone, Deserialize)]
pub struct PresentCheck {
    #[serde(flatten)]
    pub access: Access,

    #[serde(default)]
    pub presentbit: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoredDevice {
    /// Unique key for the remembered status.
    pub id: String,
    /// Driver name passed to `new_device`, or device name to bind.
    pub name: String,
    pub bus: u32,
    pub loc: u16,
    /// Attribute created by the driver once it probed.
    pub attr: String,
}

impl MonitoredDevice {
    fn device_dir(&self) -> String {
        i2c_device_dir(self.bus, self.loc)
    }
}

fn i2c_device_dir(bus: u32, loc: u16) -> String {
    format!("{}/{}-{:04x}", I2C_DEVICES_DIR, bus, loc)
}

/// Presence of an item as read from its present register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Present,
    Absent,
    /// The register could not be read.
    NotOk,
}

impl fmt::Display for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Presence::Present => "PRESENT",
            Presence::Absent => "ABSENT",
            Presence::NotOk => "NOT OK",
        })
    }
}

/// Checks presence bits and re-registers missing devices.
pub struct DevMonitor {
    sysfs: Sysfs,
    config: Arc<DevMonitorConfig>,
    finish_delay: Duration,
    ok_groups: BTreeSet<DeviceGroup>,
    ok_items: BTreeSet<String>,
    ok_devices: BTreeSet<String>,
    sdk_ok: bool,
}

impl DevMonitor {
    pub fn new(sysfs: Sysfs, config: DevMonitorConfig) -> Self {
        Self {
            sysfs,
            config: Arc::new(config),
            finish_delay: DEFAULT_FINISH_DELAY,
            ok_groups: BTreeSet::new(),
            ok_items: BTreeSet::new(),
            ok_devices: BTreeSet::new(),
            sdk_ok: false,
        }
    }

    pub fn with_finish_delay(mut self, delay: Duration) -> Self {
        self.finish_delay = delay;
        self
    }

    pub fn is_group_ok(&self, group: DeviceGroup) -> bool {
        self.ok_groups.contains(&group)
    }

    pub fn is_item_ok(&self, name: &str) -> bool {
        self.ok_items.contains(name)
    }

    pub fn is_device_ok(&self, id: &str) -> bool {
        self.ok_devices.contains(id)
    }

    pub fn is_sdk_ok(&self) -> bool {
        self.sdk_ok
    }

    /// Reads an item's presence.
    pub async fn present_status(&self, present: &PresentCheck) -> Presence {
        let value = match present.access.get_value(&self.sysfs).await {
            Ok(value) => value,
            Err(e) => {
                debug!(error = %e, "get present status failed");
                return Presence::NotOk;
            }
        };
        let Some(raw) = value.as_int() else {
            debug!(value = %value, "present status is not an integer");
            return Presence::NotOk;
        };
        let bit = Value::Int((raw >> present.presentbit) & 1);
        match &present.access.okval {
            Some(okval) if okval.matches(&bit) => Presence::Present,
            _ => Presence::Absent,
        }
    }

    /// One round over every group and the SDK actions. Returns the negative
    /// number of items still failing (a not yet running SDK counts as one),
    /// so 0 means everything is up.
    pub async fn check_once(&mut self) -> i32 {
        let mut total = 0;
        for group in DeviceGroup::ALL {
            total += self.check_group(group).await;
        }
        total + self.check_sdk().await
    }

    async fn check_group(&mut self, group: DeviceGroup) -> i32 {
        if self.ok_groups.contains(&group) {
            return 0;
        }
        let config = Arc::clone(&self.config);
        let items = config.group(group);
        if items.is_empty() {
            return 0;
        }

        let mut failed = 0;
        for item in items {
            if !self.check_item(item).await {
                failed -= 1;
            }
        }
        if failed == 0 {
            self.ok_groups.insert(group);
        }
        debug!(group = %group, failed, "Group checked");
        failed
    }

    /// Runs the SDK actions once the SDK is up. A failed action leaves them
    /// to be run again next round without holding the monitor back.
    async fn check_sdk(&mut self) -> i32 {
        if self.sdk_ok {
            return 0;
        }
        let config = Arc::clone(&self.config);
        let Some(sdk) = &config.sdk else {
            return 0;
        };
        if !sdk.check.as_ref().map_or(true, |c| c.is_ready(&self.sysfs)) {
            debug!("sdk not ready");
            return -1;
        }

        let mut all_ok = true;
        for act in &sdk.act {
            if let Err(e) = act.set_value(&self.sysfs).await {
                debug!(error = %e, "deal sdk monitor items error");
                all_ok = false;
            }
        }
        self.sdk_ok = all_ok;
        debug!(ok = all_ok, "sdk checked");
        0
    }

    async fn check_item(&mut self, item: &MonitoredItem) -> bool {
        if self.ok_items.contains(&item.name) {
            return true;
        }

        let mut all_ok = true;
        for dev in &item.devices {
            if self.ok_devices.contains(&dev.id) {
                continue;
            }
            let attr_path = format!("{}/{}", dev.device_dir(), dev.attr);
            if self.sysfs.exists(&attr_path) {
                self.ok_devices.insert(dev.id.clone());
                debug!(device = %dev.id, "status OK");
                continue;
            }

            all_ok = false;
            debug!(device = %dev.id, path = %attr_path, "status NOT OK");
            match &item.present {
                Some(present) => {
                    let status = self.present_status(present).await;
                    debug!(item = %item.name, status = %status, "present status");
                    if status == Presence::Present {
                        self.register_device_again(item, dev).await;
                    }
                }
                None => self.register_device_again(item, dev).await,
            }
        }

        if all_ok {
            self.ok_items.insert(item.name.clone());
        }
        debug!(item = %item.name, ok = all_ok, "Item checked");
        all_ok
    }

    async fn register_device_again(&self, item: &MonitoredItem, dev: &MonitoredDevice) {
        let result = match &item.driver_type {
            Some(driver_type) => self.rebind(&dev.name, &item.name, driver_type),
            None => self.recreate_i2c_client(&dev.name, dev.bus, dev.loc).await,
        };
        match result {
            Ok(()) => info!(device = %dev.id, name = %dev.name, "Device registered again"),
            Err(e) => error!(device = %dev.id, error = %e, "Register device again failed"),
        }
    }

    /// Unbinds the device when the driver holds it, then binds it again.
    fn rebind(&self, device: &str, driver: &str, driver_type: &str) -> PlatformResult<()> {
        let driver_dir = format!("/sys/bus/{}/drivers/{}", driver_type, driver);
        let bound = Path::new(&driver_dir).join(device);
        if self.sysfs.link_exists(&bound) || self.sysfs.exists(&bound) {
            self.sysfs.write_str(format!("{}/unbind", driver_dir), device)?;
            debug!(device, driver, "unbound");
        }
        self.sysfs.write_str(format!("{}/bind", driver_dir), device)?;
        debug!(device, driver, "bound");
        Ok(())
    }

    async fn recreate_i2c_client(&self, name: &str, bus: u32, loc: u16) -> PlatformResult<()> {
        let dev_dir = i2c_device_dir(bus, loc);
        let adapter = format!("{}/i2c-{}", I2C_DEVICES_DIR, bus);
        if self.sysfs.exists(&dev_dir) {
            self.sysfs
                .write_str(format!("{}/delete_device", adapter), format!("0x{:02x}", loc))?;
        }
        tokio::time::sleep(REGISTER_PAUSE).await;

        // lm75 needs extra settle time before it answers a probe
        if name == "lm75" {
            tokio::time::sleep(REGISTER_PAUSE).await;
        }
        if !self.sysfs.exists(&dev_dir) {
            self.sysfs.write_str(
                format!("{}/new_device", adapter),
                format!("{} 0x{:02x}", name, loc),
            )?;
        }
        Ok(())
    }
}

#[async_trait]
impl Monitor for DevMonitor {
    fn name(&self) -> &str {
        "dev_monitor"
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(self.config.polling_time)
    }

    async fn poll(&mut self) -> PollOutcome {
        let failed = self.check_once().await;
        if failed == 0 {
            tokio::time::sleep(self.finish_delay).await;
            info!("dev_monitor finished!");
            return PollOutcome::Finished;
        }
        debug!(failed, "Devices still missing");
        PollOutcome::Continue
    }
}
