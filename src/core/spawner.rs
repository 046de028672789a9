//! # Spawn seam: how the supervisor starts and talks to workers.
//!
//! The supervisor never touches processes directly. It asks a [`Spawn`] implementation
//! for a new worker and gets back a [`WorkerHandle`]; everything the worker does after
//! that arrives as a [`WorkerEvent`] on the channel passed to [`Spawn::spawn`].
//!
//! ## ProcessSpawner wiring
//! ```text
//! current_exe + args, env CLUSTERVISOR_WORKER=1
//!   stdin  ◄── writer task ◄── handle.send(msg)       (dropped on disconnect → EOF)
//!   stdout ──► reader task ──► WorkerEvent::Message   (EOF → WorkerEvent::Disconnected)
//!   wait() ──► waiter task ──► WorkerEvent::Exited
//!   stderr     inherited (worker logs)
//! ```

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, warn};

use crate::core::WorkerId;
use crate::error::SupervisorError;
use crate::ipc::{LifecycleCodec, LifecycleMessage};

/// Environment marker that makes a re-executed binary run as a worker.
pub const WORKER_ROLE_ENV: &str = "CLUSTERVISOR_WORKER";

/// Something that happened to a worker, reported to the supervisor.
#[derive(Debug)]
pub enum WorkerEvent {
    /// A lifecycle message arrived.
    Message {
        id: WorkerId,
        message: LifecycleMessage,
    },
    /// The worker's outbound channel closed.
    Disconnected { id: WorkerId },
    /// The worker process exited.
    Exited { id: WorkerId, outcome: ExitOutcome },
}

/// How a worker process ended.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExitOutcome {
    /// Exit status, if the process exited normally.
    pub code: Option<i32>,
    /// Terminating signal, if it was killed.
    pub signal: Option<i32>,
}

impl ExitOutcome {
    /// Exit status 0.
    pub fn is_clean(&self) -> bool {
        self.code == Some(0)
    }

    /// Crash exit with the given code.
    pub fn code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    /// Killed by the given signal.
    pub fn signaled(signal: i32) -> Self {
        Self {
            code: None,
            signal: Some(signal),
        }
    }

    fn from_status(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;
        Self {
            code: status.code(),
            signal,
        }
    }
}

/// Signal the supervisor can deliver to a worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopSignal {
    /// SIGTERM (readiness timeout).
    Terminate,
    /// SIGKILL (forced shutdown).
    Kill,
}

/// Supervisor-side handle to one running worker.
pub trait WorkerHandle: Send {
    /// Worker identifier.
    fn id(&self) -> WorkerId;

    /// Queues a lifecycle message for the worker.
    fn send(&mut self, message: LifecycleMessage) -> Result<(), SupervisorError>;

    /// Closes the supervisor → worker channel. Idempotent.
    fn disconnect(&mut self);

    /// True while both directions of the channel are open.
    fn is_connected(&self) -> bool;

    /// Delivers an OS signal to the worker.
    fn signal(&self, signal: StopSignal) -> Result<(), SupervisorError>;
}

/// Starts workers.
pub trait Spawn: Send + 'static {
    /// Starts one worker whose activity will be reported on `events`.
    fn spawn(
        &mut self,
        events: mpsc::UnboundedSender<WorkerEvent>,
    ) -> Result<Box<dyn WorkerHandle>, SupervisorError>;
}

/// Spawns workers by re-executing a program with [`WORKER_ROLE_ENV`] set.
#[derive(Clone, Debug)]
pub struct ProcessSpawner {
    program: PathBuf,
    args: Vec<OsString>,
}

impl ProcessSpawner {
    /// Re-executes the current binary with the current arguments.
    pub fn current() -> Result<Self, SupervisorError> {
        let program =
            std::env::current_exe().map_err(|source| SupervisorError::CurrentExe { source })?;
        Ok(Self::new(program, std::env::args_os().skip(1)))
    }

    pub fn new(program: impl Into<PathBuf>, args: impl IntoIterator<Item = OsString>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().collect(),
        }
    }
}

impl Spawn for ProcessSpawner {
    fn spawn(
        &mut self,
        events: mpsc::UnboundedSender<WorkerEvent>,
    ) -> Result<Box<dyn WorkerHandle>, SupervisorError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env(WORKER_ROLE_ENV, "1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| SupervisorError::Spawn { source })?;

        let id = child.id().ok_or(SupervisorError::MissingPid)?;
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(SupervisorError::Spawn {
                source: std::io::Error::other("worker stdio was not piped"),
            });
        };

        let connected = Arc::new(AtomicBool::new(true));
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<LifecycleMessage>();

        tokio::spawn(async move {
            let mut sink = FramedWrite::new(stdin, LifecycleCodec::new());
            while let Some(message) = outbound_rx.recv().await {
                if let Err(e) = sink.send(message).await {
                    debug!(worker = id, error = %e, "worker channel write failed");
                    break;
                }
            }
        });

        let reader_events = events.clone();
        let reader_connected = connected.clone();
        tokio::spawn(async move {
            let mut frames = FramedRead::new(stdout, LifecycleCodec::new());
            while let Some(frame) = frames.next().await {
                match frame {
                    Ok(message) => {
                        let _ = reader_events.send(WorkerEvent::Message { id, message });
                    }
                    Err(e) => {
                        warn!(worker = id, error = %e, "worker channel read failed");
                        break;
                    }
                }
            }
            reader_connected.store(false, Ordering::Release);
            let _ = reader_events.send(WorkerEvent::Disconnected { id });
        });

        tokio::spawn(async move {
            let outcome = match child.wait().await {
                Ok(status) => ExitOutcome::from_status(status),
                Err(e) => {
                    warn!(worker = id, error = %e, "failed to wait for worker");
                    ExitOutcome::default()
                }
            };
            let _ = events.send(WorkerEvent::Exited { id, outcome });
        });

        Ok(Box::new(ProcessHandle {
            id,
            outbound: Some(outbound),
            connected,
        }))
    }
}

struct ProcessHandle {
    id: WorkerId,
    outbound: Option<mpsc::UnboundedSender<LifecycleMessage>>,
    connected: Arc<AtomicBool>,
}

impl WorkerHandle for ProcessHandle {
    fn id(&self) -> WorkerId {
        self.id
    }

    fn send(&mut self, message: LifecycleMessage) -> Result<(), SupervisorError> {
        let worker = self.id;
        self.outbound
            .as_ref()
            .ok_or(SupervisorError::Disconnected { worker })?
            .send(message)
            .map_err(|_| SupervisorError::Disconnected { worker })
    }

    fn disconnect(&mut self) {
        self.outbound = None;
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
            && self.outbound.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    fn signal(&self, signal: StopSignal) -> Result<(), SupervisorError> {
        let sig = match signal {
            StopSignal::Terminate => Signal::SIGTERM,
            StopSignal::Kill => Signal::SIGKILL,
        };
        let pid = i32::try_from(self.id).map_err(|_| SupervisorError::Kill {
            worker: self.id,
            source: nix::errno::Errno::ESRCH,
        })?;
        signal::kill(Pid::from_raw(pid), sig).map_err(|source| SupervisorError::Kill {
            worker: self.id,
            source,
        })
    }
}
