//! # LogWriter: events to `tracing`
//!
//! Maps every supervisor event to one structured `tracing` record at a level that
//! matches its severity:
//!
//! ```text
//! error  restart budget exhausted, readiness timeout, fork failure
//! warn   crash exit, shutdown timeout, forced kill, unacknowledged shutdown
//! info   fork, ready, clean exit, shutdown progress
//! debug  health reports, disconnects
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event subscriber that logs through `tracing`.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let worker = e.worker;
        match e.kind {
            EventKind::WorkerCountAdjusted => {
                warn!(effective = e.count, detail = e.reason.as_deref(), "adjusted worker count");
            }
            EventKind::WorkerForked => {
                info!(worker, restarts = e.restarts, "forked worker");
            }
            EventKind::SpawnFailed => {
                error!(error = e.reason.as_deref(), "failed to fork worker");
            }
            EventKind::WorkerReady => info!(worker, "worker is ready"),
            EventKind::WorkerHealth => {
                let h = e.health.as_ref();
                debug!(
                    worker,
                    uptime_ms = h.map(|h| h.uptime_ms),
                    rss = h.and_then(|h| h.memory).map(|m| m.rss),
                    active_units = h.and_then(|h| h.pool.as_ref()).map(|p| p.active_units),
                    queued_tasks = h.and_then(|h| h.pool.as_ref()).map(|p| p.queued_tasks),
                    "worker health"
                );
            }
            EventKind::WorkerDisconnected => debug!(worker, "worker disconnected"),
            EventKind::WorkerExited => {
                if e.code == Some(0) {
                    info!(worker, code = e.code, signal = e.signal, "worker exited");
                } else {
                    warn!(worker, code = e.code, signal = e.signal, "worker died");
                }
            }
            EventKind::CleanExit => info!(worker, "worker exited cleanly, not restarting"),
            EventKind::ReadyTimeout => {
                error!(worker, timeout_ms = e.timeout_ms, "worker failed to become ready in time");
            }
            EventKind::RestartScheduled => {
                info!(worker, restarts = e.restarts, delay_ms = e.delay_ms, "restarting worker");
            }
            EventKind::RestartExhausted => {
                error!(
                    worker,
                    restarts = e.restarts,
                    detail = e.reason.as_deref(),
                    "worker exceeded restart limit, slot abandoned"
                );
            }
            EventKind::ShutdownRequested => {
                info!(cause = ?e.cause, workers = e.count, "initiating graceful shutdown");
            }
            EventKind::ShutdownNotifyFailed => {
                warn!(worker, error = e.reason.as_deref(), "could not notify worker of shutdown");
            }
            EventKind::ShutdownAcknowledged => info!(worker, "worker shutdown complete"),
            EventKind::ShutdownAckTimeout => {
                warn!(
                    worker,
                    timeout_ms = e.timeout_ms,
                    "worker did not respond to shutdown, disconnecting"
                );
            }
            EventKind::AllStoppedWithin => info!("all workers shut down gracefully"),
            EventKind::ShutdownTimeout => {
                warn!(timeout_ms = e.timeout_ms, remaining = e.count, "worker shutdown timeout");
            }
            EventKind::WorkerForceKilled => warn!(worker, "force killing worker"),
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
