//! reboot-cause - records the hardware reboot cause once per boot

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use sonic_platform_bsp::reboot_cause::{RebootCauseConfig, RebootCauseRecorder, DEBUG_FLAG};
use sonic_platform_common::config::load_or_default;
use sonic_platform_common::logging::init_logging;
use sonic_platform_common::Sysfs;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "reboot-cause")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Daemon configuration
    #[arg(long, default_value = "/etc/sonic/platform/reboot_cause.toml")]
    config: PathBuf,
}

async fn run(args: &Args) -> anyhow::Result<bool> {
    let config: RebootCauseConfig = load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let report = RebootCauseRecorder::new(Sysfs::new(), config).run().await?;
    if !report.already_started {
        info!(matched = ?report.matched, other = report.other, "Reboot cause recorded");
    }
    Ok(report.failed_records == 0)
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging(Some(Path::new(DEBUG_FLAG)));
    let args = Args::parse();

    info!("--- Starting reboot-cause (Rust) ---");

    match run(&args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("reboot-cause failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}
