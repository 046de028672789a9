//! # Supervisor lifecycle events.
//!
//! The [`EventKind`] enum classifies what happened to a worker slot or to the supervisor:
//! - **Fork events**: count adjustment, fork, fork failure
//! - **Worker events**: ready, health, disconnect, exit
//! - **Policy events**: readiness timeout, restart scheduled, restart budget exhausted
//! - **Shutdown events**: requested, per-worker outcome, batch outcome
//!
//! ## Ordering guarantees
//! Each event has a process-wide sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use clustervisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::WorkerExited)
//!     .with_worker(4242)
//!     .with_exit(Some(1), None);
//!
//! assert_eq!(ev.kind, EventKind::WorkerExited);
//! assert_eq!(ev.worker, Some(4242));
//! assert_eq!(ev.code, Some(1));
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::core::WorkerId;
use crate::ipc::HealthMetrics;

static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of supervisor events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Fork events ===
    /// Requested worker count was clamped.
    ///
    /// Sets: `count` (effective), `reason` (requested → effective)
    WorkerCountAdjusted,
    /// A worker process was started.
    ///
    /// Sets: `worker`, `restarts`
    WorkerForked,
    /// Starting a worker process failed (fatal to the supervisor).
    ///
    /// Sets: `reason`
    SpawnFailed,

    // === Worker events ===
    /// Worker reported `ready`.
    WorkerReady,
    /// Worker sent a health report.
    ///
    /// Sets: `worker`, `health`
    WorkerHealth,
    /// Worker's outbound channel closed.
    WorkerDisconnected,
    /// Worker process exited.
    ///
    /// Sets: `worker`, `code` and/or `signal`
    WorkerExited,
    /// Worker exited with status 0 outside shutdown; slot is not refilled.
    CleanExit,

    // === Policy events ===
    /// Worker did not report `ready` in time and was sent SIGTERM.
    ///
    /// Sets: `worker`, `timeout_ms`
    ReadyTimeout,
    /// A replacement fork was scheduled.
    ///
    /// Sets: `worker` (the dead one), `restarts`, `delay_ms`
    RestartScheduled,
    /// The slot exceeded its restart budget; no replacement.
    ///
    /// Sets: `worker`, `restarts`, `reason`
    RestartExhausted,

    // === Shutdown events ===
    /// Coordinated shutdown started.
    ///
    /// Sets: `cause`, `count` (live workers)
    ShutdownRequested,
    /// Sending `shutdown` to a worker failed; it is treated as gone.
    ShutdownNotifyFailed,
    /// Worker acknowledged with `shutdown-complete`.
    ShutdownAcknowledged,
    /// Worker did not acknowledge within the per-worker deadline and was disconnected.
    ///
    /// Sets: `worker`, `timeout_ms`
    ShutdownAckTimeout,
    /// Every worker settled before the batch deadline.
    AllStoppedWithin,
    /// The batch deadline elapsed first.
    ///
    /// Sets: `timeout_ms`, `count` (workers still tracked)
    ShutdownTimeout,
    /// A still-connected worker was sent SIGKILL.
    WorkerForceKilled,
}

/// Why the supervisor started its shutdown sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownCause {
    /// A termination signal or an explicit [`ShutdownHandle::trigger`](crate::ShutdownHandle::trigger).
    Requested,
    /// An internal supervisor fault (e.g. a fork failure).
    Fault,
}

/// Supervisor event with optional metadata.
#[derive(Clone, Debug)]
pub struct Event {
    /// Monotonic sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Worker the event is about.
    pub worker: Option<WorkerId>,
    /// Exit code.
    pub code: Option<i32>,
    /// Terminating signal number.
    pub signal: Option<i32>,
    /// Restart count of the slot.
    pub restarts: Option<u32>,
    /// Worker count (effective / live / remaining, depending on the kind).
    pub count: Option<usize>,
    /// Delay in milliseconds.
    pub delay_ms: Option<u64>,
    /// Timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Free-form detail.
    pub reason: Option<Arc<str>>,
    /// Health payload.
    pub health: Option<HealthMetrics>,
    /// Shutdown cause.
    pub cause: Option<ShutdownCause>,
}

impl Event {
    /// Creates an event of the given kind stamped with the next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            worker: None,
            code: None,
            signal: None,
            restarts: None,
            count: None,
            delay_ms: None,
            timeout_ms: None,
            reason: None,
            health: None,
            cause: None,
        }
    }

    #[inline]
    pub fn with_worker(mut self, id: WorkerId) -> Self {
        self.worker = Some(id);
        self
    }

    #[inline]
    pub fn with_exit(mut self, code: Option<i32>, signal: Option<i32>) -> Self {
        self.code = code;
        self.signal = signal;
        self
    }

    #[inline]
    pub fn with_restarts(mut self, n: u32) -> Self {
        self.restarts = Some(n);
        self
    }

    #[inline]
    pub fn with_count(mut self, n: usize) -> Self {
        self.count = Some(n);
        self
    }

    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(duration_ms(d));
        self
    }

    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        self.timeout_ms = Some(duration_ms(d));
        self
    }

    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    #[inline]
    pub fn with_health(mut self, health: HealthMetrics) -> Self {
        self.health = Some(health);
        self
    }

    #[inline]
    pub fn with_cause(mut self, cause: ShutdownCause) -> Self {
        self.cause = Some(cause);
        self
    }
}

fn duration_ms(d: Duration) -> u64 {
    d.as_millis().min(u128::from(u64::MAX)) as u64
}
