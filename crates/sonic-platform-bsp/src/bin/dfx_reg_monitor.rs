//! dfx-reg-monitor - records status changes of CPLD/FPGA/slot registers

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use sonic_platform_bsp::reg_monitor::{run_all, RegMonitorConfig, DEBUG_FLAG};
use sonic_platform_bsp::shutdown_on_ctrl_c;
use sonic_platform_common::config::load;
use sonic_platform_common::logging::init_logging;
use sonic_platform_common::Sysfs;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "dfx-reg-monitor")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Daemon configuration
    #[arg(long, default_value = "/etc/sonic/platform/dfx_reg_monitor.toml")]
    config: PathBuf,
}

async fn run(args: &Args) -> anyhow::Result<()> {
    let config: RegMonitorConfig =
        load(&args.config).with_context(|| format!("loading {}", args.config.display()))?;
    run_all(Sysfs::new(), config, shutdown_on_ctrl_c()).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging(Some(Path::new(DEBUG_FLAG)));
    let args = Args::parse();

    info!("--- Starting dfx-reg-monitor (Rust) ---");

    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("dfx-reg-monitor failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}
