//! Tracing subscriber setup shared by the platform daemons.
//!
//! Daemons log at `info` unless their debug flag file exists (for example
//! `/etc/.devmonitor_debug_flag`), in which case they log at `debug`.
//! `RUST_LOG` overrides both.

use std::path::Path;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::sysfs::Sysfs;

/// Target for state-change records, so they can be routed to their own sink.
pub const RECORD_TARGET: &str = "record";

/// Log level selected by the presence of a debug flag file.
pub fn level_for_flag(sysfs: &Sysfs, debug_flag: Option<&Path>) -> &'static str {
    match debug_flag {
        Some(flag) if sysfs.exists(flag) => "debug",
        _ => "info",
    }
}

/// Installs the global fmt subscriber. Calling it twice is harmless.
pub fn init_logging(debug_flag: Option<&Path>) {
    let level = level_for_flag(&Sysfs::new(), debug_flag);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false),
        )
        .try_init();
}
