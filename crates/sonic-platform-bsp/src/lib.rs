//! Board-support daemons shared by the platform packages.
//!
//! | module | daemon | runs |
//! |--------|--------|------|
//! | [`dev_monitor`] | `dev-monitor` | until every configured device has a driver |
//! | [`clock_monitor`] | `dfx-clock-monitor` | forever, every `interval` seconds |
//! | [`reg_monitor`] | `dfx-reg-monitor` | forever, one task per monitor type |
//! | [`reboot_cause`] | `reboot-cause` | once per boot |
//!
//! Every daemon reads a TOML file under `/etc/sonic/platform/` and raises
//! its log level to debug while its debug flag file exists.
//!
//! ```ignore
//! use sonic_platform_bsp::dev_monitor::{DevMonitor, DevMonitorConfig};
//! use sonic_platform_common::monitor::run_monitor;
//!
//! let config: DevMonitorConfig = load_or_default("/etc/sonic/platform/dev_monitor.toml")?;
//! let mut monitor = DevMonitor::new(Sysfs::new(), config);
//! run_monitor(&mut monitor, shutdown).await;
//! ```

pub mod clock_monitor;
pub mod dev_monitor;
pub mod error;
pub mod reboot_cause;
pub mod reg_monitor;

pub use clock_monitor::{ClockMonitor, ClockMonitorConfig, LockStatus};
pub use dev_monitor::{DevMonitor, DevMonitorConfig, DeviceGroup, Presence};
pub use error::{BspError, BspResult};
pub use reboot_cause::{RebootCauseConfig, RebootCauseRecorder, RecordReport};
pub use reg_monitor::{PointStatus, RegMonitor, RegMonitorConfig};

use tokio_util::sync::CancellationToken;
use tracing::info;

/// A token cancelled on Ctrl-C.
pub fn shutdown_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, shutting down");
            child.cancel();
        }
    });
    token
}
