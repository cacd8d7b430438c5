//! Accton/Edgecore platform devices over fixed sysfs maps.
//!
//! Unlike the PDDF boards, every path here is compiled in:
//!
//! | module | device | backing |
//! |--------|--------|---------|
//! | [`fan`] | tray and PSU fans | fan CPLD `3-0060`, PSU PMBus clients |
//! | [`fan_drawer`] | fan trays | one fan per tray |
//! | [`psu`] | power supplies | PMBus hwmon plus PSU CPLD window |
//! | [`thermal`] | LM75 and coretemp sensors | hwmon `temp*_input` |
//! | [`sfp`] | transceiver cages | port CPLD `13-0061`, optoe EEPROMs |
//! | [`component`] | BIOS, ONIE, CPLDs | DMI, `machine.conf`, CPLD `version` |
//! | [`watchdog`] | hardware watchdog | watchdogd unix socket |
//!
//! ```ignore
//! use sonic_platform_accton::AccChassis;
//! use sonic_platform_common::{Chassis, Sysfs};
//!
//! let chassis = AccChassis::new(Sysfs::new())?;
//! for fan in chassis.fans() {
//!     println!("{}: {}%", fan.name(), fan.speed()?);
//! }
//! ```

pub mod chassis;
pub mod component;
pub mod fan;
pub mod fan_drawer;
pub mod platform;
pub mod psu;
pub mod sfp;
pub mod thermal;
pub mod watchdog;

pub use chassis::AccChassis;
pub use component::AccComponent;
pub use fan::AccFan;
pub use fan_drawer::AccFanDrawer;
pub use platform::Namespace;
pub use psu::AccPsu;
pub use sfp::AccSfp;
pub use thermal::AccThermal;
pub use watchdog::AccWatchdog;
