//! adm1266-rtc-sync - sets the RTC epoch of every ADM1266 DPM
//!
//! Run once at boot, before any blackbox record of this powerup is written.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use sonic_platform_common::logging::init_logging;
use sonic_platform_common::Sysfs;
use sonic_platform_nexthop::sync_rtc;
use sonic_platform_pddf::plugin::PD_PLUGIN_JSON;
use sonic_platform_pddf::PddfPlugin;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "adm1266-rtc-sync")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// pd-plugin.json holding the DPM section
    #[arg(long, default_value = PD_PLUGIN_JSON)]
    plugin: PathBuf,
}

fn run(args: &Args) -> anyhow::Result<bool> {
    let sysfs = Sysfs::new();
    let plugin = PddfPlugin::load(&sysfs, &args.plugin)
        .with_context(|| format!("loading {}", args.plugin.display()))?;
    let report = sync_rtc(&sysfs, &plugin)?;
    Ok(report.is_ok())
}

fn main() -> ExitCode {
    init_logging(None);
    let args = Args::parse();

    info!("--- Starting adm1266-rtc-sync (Rust) ---");

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("adm1266-rtc-sync failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}
