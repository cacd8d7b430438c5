//! Platform devices driven by the PDDF JSON descriptions.
//!
//! A board ships two files:
//!
//! | file | parsed into | holds |
//! |------|-------------|-------|
//! | `pddf-device.json` | [`PddfData`] | device counts and per-device attribute paths |
//! | `pd-plugin.json` | [`PddfPlugin`] | value maps, speed scales, LED aliases, vendor sections |
//!
//! [`PddfChassis`] assembles fans, PSUs, thermals and transceivers from the
//! counts. Vendor crates wrap it to add what the generic description cannot
//! express (DPM reboot causes, FPGA watchdogs).
//!
//! ```ignore
//! use sonic_platform_common::{Chassis, Sysfs};
//! use sonic_platform_pddf::PddfChassis;
//!
//! let chassis = PddfChassis::load(Sysfs::new())?;
//! for psu in chassis.psus() {
//!     println!("{}: {:.2} V", psu.name(), psu.voltage()?);
//! }
//! ```

pub mod chassis;
pub mod context;
pub mod data;
pub mod fan;
pub mod plugin;
pub mod psu;
pub mod sfp;
pub mod thermal;

pub use chassis::PddfChassis;
pub use context::PddfContext;
pub use data::{AttrEntry, DeviceEntry, PddfData, PlatformCounts};
pub use fan::{PddfFan, PddfFanDrawer};
pub use plugin::PddfPlugin;
pub use psu::PddfPsu;
pub use sfp::PddfSfp;
pub use thermal::PddfThermal;
