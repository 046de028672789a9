//! Error types used by the supervisor, the worker runtime and the task pool.
//!
//! This module defines one error enum per tier:
//!
//! - [`SupervisorError`]: errors raised by the process supervisor itself.
//! - [`WorkerError`]: errors raised inside a worker process (bind failures, IPC).
//! - [`PoolError`]: errors seen by callers of [`TaskPool::submit`](crate::TaskPool::submit).
//! - [`CodecError`]: framing errors on the lifecycle channel.
//! - [`ClusterError`]: the union returned by [`launch`](crate::launch).
//!
//! Every type provides `as_label()` with a stable snake_case label for logs/metrics.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// # Errors produced by the process supervisor.
///
/// All of these are fatal to the supervisor: there is no higher authority to recover them,
/// so the binary maps them to exit status `1` after the shutdown sequence has run.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// Spawning a worker process failed.
    #[error("failed to spawn worker process: {source}")]
    Spawn {
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },

    /// The spawned child exited before its pid could be read.
    #[error("spawned worker has no pid (exited before it could be tracked)")]
    MissingPid,

    /// Resolving the current executable (used to re-exec workers) failed.
    #[error("cannot resolve current executable: {source}")]
    CurrentExe {
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },

    /// Registering OS signal listeners failed.
    #[error("failed to install signal handlers: {source}")]
    Signal {
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },

    /// The control channel to a worker is closed.
    #[error("worker {worker} is disconnected")]
    Disconnected {
        /// Worker pid.
        worker: u32,
    },

    /// Delivering a signal to a worker failed.
    #[error("failed to signal worker {worker}: {source}")]
    Kill {
        /// Worker pid.
        worker: u32,
        /// The underlying errno.
        #[source]
        source: nix::errno::Errno,
    },

    /// The supervisor itself panicked. Worker channels were closed by the unwind.
    #[error("supervisor panicked: {info}")]
    Panicked {
        /// Panic payload rendered as text.
        info: String,
    },
}

impl SupervisorError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use clustervisor::SupervisorError;
    ///
    /// assert_eq!(SupervisorError::MissingPid.as_label(), "supervisor_missing_pid");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            SupervisorError::Spawn { .. } => "supervisor_spawn_failed",
            SupervisorError::MissingPid => "supervisor_missing_pid",
            SupervisorError::CurrentExe { .. } => "supervisor_current_exe",
            SupervisorError::Signal { .. } => "supervisor_signal_setup",
            SupervisorError::Disconnected { .. } => "supervisor_worker_disconnected",
            SupervisorError::Kill { .. } => "supervisor_kill_failed",
            SupervisorError::Panicked { .. } => "supervisor_panicked",
        }
    }
}

/// # Errors produced inside a worker process.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum WorkerError {
    /// The serving instance could not bind its listening address.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address the worker tried to bind.
        addr: SocketAddr,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },

    /// The entrypoint failed with an application error.
    #[error("entrypoint failed: {error}")]
    Entrypoint {
        /// The underlying error message.
        error: String,
    },

    /// The entrypoint panicked.
    #[error("entrypoint panicked: {info}")]
    Panicked {
        /// Panic payload rendered as text.
        info: String,
    },

    /// The task pool could not be created.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// Registering OS signal listeners failed.
    #[error("failed to install signal handlers: {source}")]
    Signal {
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },
}

impl WorkerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            WorkerError::Bind { .. } => "worker_bind_failed",
            WorkerError::Entrypoint { .. } => "worker_entrypoint_failed",
            WorkerError::Panicked { .. } => "worker_panicked",
            WorkerError::Pool(_) => "worker_pool_failed",
            WorkerError::Signal { .. } => "worker_signal_setup",
        }
    }
}

/// # Errors seen by callers of the task pool.
///
/// Exactly one `Ok` or one of these is delivered per submitted task.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The unit computed a failure result for this task (the caller's problem).
    #[error("task failed: {reason}")]
    TaskFailed {
        /// Failure reason reported by the unit.
        reason: String,
    },

    /// The unit running this task faulted and was replaced; the task is lost and is not retried.
    #[error("task lost: unit {unit} faulted and was replaced")]
    TaskLost {
        /// Identifier of the faulted unit.
        unit: u64,
    },

    /// The pool was terminated before the task could complete.
    #[error("task pool terminated")]
    Terminated,

    /// A unit thread could not be started.
    #[error("failed to start task unit: {error}")]
    UnitSpawn {
        /// The underlying error message.
        error: String,
    },
}

impl PoolError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use clustervisor::PoolError;
    ///
    /// let err = PoolError::TaskFailed { reason: "overflow".into() };
    /// assert_eq!(err.as_label(), "pool_task_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            PoolError::TaskFailed { .. } => "pool_task_failed",
            PoolError::TaskLost { .. } => "pool_task_lost",
            PoolError::Terminated => "pool_terminated",
            PoolError::UnitSpawn { .. } => "pool_unit_spawn_failed",
        }
    }

    /// Indicates whether resubmitting the same payload may succeed.
    ///
    /// Only [`PoolError::TaskLost`] is worth a resubmit: the payload itself was fine.
    pub fn is_resubmittable(&self) -> bool {
        matches!(self, PoolError::TaskLost { .. })
    }
}

/// # Framing errors on the lifecycle channel.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CodecError {
    /// Reading or writing the pipe failed.
    #[error("lifecycle channel i/o: {0}")]
    Io(#[from] io::Error),

    /// A line exceeded the maximum frame length.
    #[error("lifecycle frame exceeds {max} bytes")]
    FrameTooLong {
        /// The configured maximum.
        max: usize,
    },

    /// An outbound message could not be serialized.
    #[error("lifecycle message encoding: {0}")]
    Encode(#[from] serde_json::Error),
}

/// # Errors returned by [`launch`](crate::launch).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ClusterError {
    /// The supervisor (primary process) failed.
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    /// The worker (or standalone instance) failed.
    #[error(transparent)]
    Worker(#[from] WorkerError),
}

impl ClusterError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ClusterError::Supervisor(e) => e.as_label(),
            ClusterError::Worker(e) => e.as_label(),
        }
    }
}
