//! # Process supervisor.
//!
//! - [`Supervisor`] forks workers, tracks their [`WorkerRecord`](record::WorkerRecord)s,
//!   refills crashed slots under the restart policy and drives the coordinated shutdown.
//! - [`SupervisorBuilder`] wires configuration, spawner and subscribers.
//! - [`Spawn`] / [`WorkerHandle`] are the seam between the state machine and real processes;
//!   [`ProcessSpawner`] re-executes the current binary as a worker.

mod builder;
mod record;
mod spawner;
mod supervisor;

/// Worker identifier (the worker's OS pid).
pub type WorkerId = u32;

pub use builder::SupervisorBuilder;
pub use spawner::{
    ExitOutcome, ProcessSpawner, Spawn, StopSignal, WorkerEvent, WorkerHandle, WORKER_ROLE_ENV,
};
pub use supervisor::Supervisor;
