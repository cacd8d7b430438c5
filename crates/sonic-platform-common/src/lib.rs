//! Common infrastructure for SONiC platform drivers.
//!
//! This crate holds what every vendor crate shares:
//!
//! - [`device`]: the fixed platform API traits (`Fan`, `Psu`, `Sfp`, ...)
//! - [`error`]: [`PlatformError`] and the [`PlatformResult`] alias
//! - [`sysfs`]: rooted file access so drivers can be tested on fake trees
//! - [`shell`]: shell command execution with proper quoting
//! - [`access`]: `gettype`-tagged value access descriptors used by the
//!   board-support daemons
//! - [`monitor`], [`logging`], [`config`]: daemon plumbing
//!
//! # Example
//!
//! ```ignore
//! use sonic_platform_common::{Sysfs, PlatformResult};
//!
//! fn cpld_version(sysfs: &Sysfs) -> PlatformResult<String> {
//!     sysfs.read_str("/sys/bus/i2c/devices/1-0068/version")
//! }
//! ```

pub mod access;
pub mod config;
pub mod device;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod sff;
pub mod shell;
pub mod sysfs;

pub use access::{Access, CheckResult, CheckStatus, OkVal, SetOutcome, Source, Value};
pub use device::{
    ChangeEvent, Chassis, Component, DeviceBase, Fan, FanDirection, FanDrawer, LedColor,
    PresenceChange, PresenceTracker, Psu, RebootCauseCategory, RebootCauseInfo, Sfp, Thermal,
    Watchdog,
};
pub use error::{PlatformError, PlatformResult};
pub use monitor::{run_monitor, Monitor, PollOutcome};
pub use sff::TransceiverThresholds;
pub use sysfs::Sysfs;
