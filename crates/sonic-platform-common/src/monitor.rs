//! Periodic monitor loop.
//!
//! Board-support daemons are loops of "poll the hardware, log what changed,
//! sleep". A [`Monitor`] supplies one poll; [`run_monitor`] drives it until
//! the monitor reports [`PollOutcome::Finished`] or the cancellation token
//! fires.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// What the loop should do after a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Continue,
    Finished,
}

/// One periodic hardware monitor.
#[async_trait]
pub trait Monitor: Send {
    /// Returns the name of this monitor (for logging).
    fn name(&self) -> &str;

    /// Delay between two polls.
    fn interval(&self) -> Duration;

    /// One-time setup before the first poll.
    async fn start(&mut self) {}

    /// Polls the hardware once.
    async fn poll(&mut self) -> PollOutcome;
}

/// Drives `monitor` until it finishes or `shutdown` is cancelled.
pub async fn run_monitor<M: Monitor + ?Sized>(monitor: &mut M, shutdown: CancellationToken) {
    info!(monitor = monitor.name(), "Monitor started");
    monitor.start().await;

    loop {
        if monitor.poll().await == PollOutcome::Finished {
            info!(monitor = monitor.name(), "Monitor finished");
            return;
        }
        debug!(monitor = monitor.name(), interval = ?monitor.interval(), "Sleeping");
        tokio::select! {
            _ = tokio::time::sleep(monitor.interval()) => {}
            _ = shutdown.cancelled() => {
                info!(monitor = monitor.name(), "Monitor cancelled");
                return;
            }
        }
    }
}
