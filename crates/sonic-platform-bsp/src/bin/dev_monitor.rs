//! dev-monitor - re-registers I2C devices whose driver did not probe
//!
//! Exits once every configured device is up.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use sonic_platform_bsp::dev_monitor::{DevMonitor, DevMonitorConfig, DEBUG_FLAG};
use sonic_platform_bsp::shutdown_on_ctrl_c;
use sonic_platform_common::config::load_or_default;
use sonic_platform_common::logging::init_logging;
use sonic_platform_common::monitor::run_monitor;
use sonic_platform_common::Sysfs;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "dev-monitor")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Daemon configuration
    #[arg(long, default_value = "/etc/sonic/platform/dev_monitor.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging(Some(Path::new(DEBUG_FLAG)));
    let args = Args::parse();

    info!("--- Starting dev-monitor (Rust) ---");

    let config: DevMonitorConfig = match load_or_default(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("dev-monitor failed: {e}");
            return ExitCode::FAILURE;
        }
    };
    let mut monitor = DevMonitor::new(Sysfs::new(), config);
    run_monitor(&mut monitor, shutdown_on_ctrl_c()).await;
    ExitCode::SUCCESS
}
