//! dfx-clock-monitor - watches RC32312 lock status and logs clock errors

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use sonic_platform_bsp::clock_monitor::{ClockMonitor, ClockMonitorConfig, DEBUG_FLAG};
use sonic_platform_bsp::shutdown_on_ctrl_c;
use sonic_platform_common::config::load_or_default;
use sonic_platform_common::logging::init_logging;
use sonic_platform_common::monitor::run_monitor;
use sonic_platform_common::Sysfs;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "dfx-clock-monitor")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Daemon configuration
    #[arg(long, default_value = "/etc/sonic/platform/dfx_clock_monitor.toml")]
    config: PathBuf,
}

async fn run(args: &Args) -> anyhow::Result<()> {
    let config: ClockMonitorConfig = load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let mut monitor = ClockMonitor::new(Sysfs::new(), config)?;
    run_monitor(&mut monitor, shutdown_on_ctrl_c()).await;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging(Some(Path::new(DEBUG_FLAG)));
    let args = Args::parse();

    info!("--- Starting dfx-clock-monitor (Rust) ---");

    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("dfx-clock-monitor failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}
