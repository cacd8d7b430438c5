//! Nexthop platform support on top of PDDF.
//!
//! | module | provides |
//! |--------|----------|
//! | [`dpm`] | device-independent DPM records, powerups and reboot causes |
//! | [`adm1266`] | ADM1266 blackbox decoding and fault signature matching |
//! | [`dpm_logger`] | JSON reboot-cause history under `/host/reboot-cause/nexthop` |
//! | [`reboot_cause`] | merging DPM and software causes into one per reboot |
//! | [`watchdog`] | FPGA watchdog over PCI BAR0 |
//! | [`thermal`] | FPGA ASIC sensors and per-transceiver thermals |
//! | [`chassis`] | [`NexthopChassis`], the PDDF chassis with the above wired in |
//! | [`rtc_sync`] | ADM1266 RTC epoch setup, run once per boot |
//!
//! ```ignore
//! use sonic_platform_common::{Chassis, Sysfs};
//! use sonic_platform_nexthop::NexthopChassis;
//!
//! let chassis = NexthopChassis::load(Sysfs::new())?;
//! let cause = chassis.reboot_cause()?;
//! println!("{} ({})", cause.cause, cause.description);
//! ```

pub mod adm1266;
pub mod chassis;
pub mod dpm;
pub mod dpm_logger;
pub mod error;
pub mod reboot_cause;
pub mod rtc_sync;
pub mod thermal;
pub mod watchdog;

pub use adm1266::{Adm1266, Adm1266Record, DpmConfig, FaultSignature};
pub use chassis::NexthopChassis;
pub use dpm::{
    CauseKind, Dpm, DpmPowerUpEntry, DpmPowerUps, DpmRecord, DpmType, RebootCause, Timestamp,
};
pub use dpm_logger::{DpmLogger, HistoryData};
pub use error::{DpmError, DpmResult};
pub use reboot_cause::RebootCauseManager;
pub use rtc_sync::{sync_rtc, RtcSyncReport};
pub use thermal::{FpgaAsicThermal, SfpThermal};
pub use watchdog::{FpgaWatchdog, PciResource};
