//! # clustervisor
//!
//! **Clustervisor** runs one serving instance per core behind a single listening port and
//! keeps them alive. It is a two-tier supervisor:
//!
//! - a **process supervisor** that forks worker processes, refills crashed slots under a
//!   sliding-window crash-loop breaker and drives a coordinated graceful shutdown;
//! - a per-worker **task pool** that moves CPU-bound work off the request path onto a fixed
//!   set of long-lived unit threads.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!                         ┌──────────────────────────────────────────────┐
//!   SIGINT/SIGTERM ──────►│  Supervisor (primary process)                │
//!                         │  - WorkerRecord table (restart history)      │
//!                         │  - RestartPolicy / BackoffPolicy             │
//!                         │  - Bus ──► SubscriberSet ──► LogWriter       │
//!                         └──────┬───────────────┬───────────────┬───────┘
//!                    stdin/stdout│ JSON lines    │               │
//!                                ▼               ▼               ▼
//!                         ┌────────────┐  ┌────────────┐  ┌────────────┐
//!                         │  Worker    │  │  Worker    │  │  Worker    │
//!                         │ Entrypoint │  │ Entrypoint │  │ Entrypoint │
//!                         │  TaskPool  │  │  TaskPool  │  │  TaskPool  │
//!                         └─────┬──────┘  └─────┬──────┘  └─────┬──────┘
//!                               └───────────────┼───────────────┘
//!                                               ▼
//!                                 one shared port (SO_REUSEPORT)
//! ```
//!
//! ### Worker lifecycle
//! ```text
//! fork ─► ready? ──(timeout)──► SIGTERM
//!   │
//!   ├─ exit 0                 ─► CleanExit (slot not refilled)
//!   ├─ exit ≠ 0 / signal      ─► RestartPolicy::evaluate
//!   │                              ├─ Restart ─► fork (history carried, optional backoff)
//!   │                              └─ Exhausted ─► slot abandoned
//!   └─ shutdown ─► `shutdown` ─► drain ─► `shutdown-complete` ─► disconnect
//!                  (per-worker 10s, batch SHUTDOWN_TIMEOUT, then SIGKILL)
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                          |
//! |-------------------|--------------------------------------------------------------|---------------------------------------------|
//! | **Supervision**   | Fork, restart and shut down worker processes.                | [`Supervisor`], [`SupervisorBuilder`]       |
//! | **Policies**      | Crash-loop breaker and respawn delay.                        | [`RestartPolicy`], [`BackoffPolicy`]        |
//! | **Workers**       | Serving instance contract and runtime.                       | [`Entrypoint`], [`EntrypointFn`], [`WorkerContext`] |
//! | **Task pool**     | CPU-bound work on dedicated unit threads.                    | [`TaskPool`], [`TaskHandler`]               |
//! | **Protocol**      | Lifecycle messages between supervisor and workers.           | [`LifecycleMessage`], [`LifecycleCodec`]    |
//! | **Subscriber API**| Hook into supervisor events.                                 | [`Subscribe`], [`LogWriter`]                |
//! | **Errors**        | Typed errors per tier.                                       | [`SupervisorError`], [`WorkerError`], [`PoolError`] |
//! | **Configuration** | Centralized settings and the CLI surface.                    | [`ClusterConfig`], [`Cli`]                  |
//!
//! ## Example
//! ```rust,no_run
//! use clustervisor::{launch, ClusterConfig, EntrypointFn, EntrypointRef, WorkerContext, WorkerError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let entrypoint: EntrypointRef = EntrypointFn::arc(|ctx: WorkerContext| async move {
//!         // bind the shared port here...
//!         ctx.ready();
//!         ctx.shutdown_requested().await;
//!         // ...drain in-flight requests here
//!         Ok::<_, WorkerError>(())
//!     });
//!
//!     launch(ClusterConfig::default(), true, entrypoint).await?;
//!     Ok(())
//! }
//! ```
mod cli;
mod cluster;
mod compute;
mod config;
mod core;
mod error;
mod events;
mod ipc;
mod policies;
mod pool;
mod shutdown;
mod subscribers;
mod worker;

// ---- Public re-exports ----

pub use cli::Cli;
pub use cluster::{launch, Role};
pub use compute::{NumberCruncher, NumberReport, NumberTask};
pub use config::{available_cores, clamp_worker_count, ClusterConfig, WORKER_SHUTDOWN_TIMEOUT};
pub use crate::core::{
    ExitOutcome, ProcessSpawner, Spawn, StopSignal, Supervisor, SupervisorBuilder, WorkerEvent,
    WorkerHandle, WorkerId, WORKER_ROLE_ENV,
};
pub use error::{ClusterError, CodecError, PoolError, SupervisorError, WorkerError};
pub use events::{Bus, Event, EventKind, ShutdownCause};
pub use ipc::{HealthMetrics, LifecycleCodec, LifecycleMessage, MemoryUsage};
pub use policies::{BackoffPolicy, JitterPolicy, RestartDecision, RestartHistory, RestartPolicy};
pub use pool::{HandlerFn, Pending, PoolGauge, PoolSnapshot, TaskHandler, TaskPool};
pub use shutdown::{ShutdownHandle, ShutdownSignals};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
pub use worker::{
    run_standalone, run_worker, run_worker_with, BoxEntrypointFuture, Entrypoint, EntrypointFn,
    EntrypointRef, WorkerContext,
};

/// Renders a panic payload as text.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
