//! Test infrastructure for SONiC platform drivers
//!
//! Provides:
//! - Fake sysfs trees rooted in a temporary directory
//! - Fixtures for common i2c/hwmon attribute layouts
//! - File content verification helpers

mod fake_sysfs;
pub mod fixtures;
mod verification;

pub use fake_sysfs::FakeSysfs;
pub use fixtures::*;
pub use verification::*;
