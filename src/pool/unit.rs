//! # Task Unit: one long-lived OS thread running one handler.
//!
//! ```text
//! loop {
//!   task = jobs.blocking_recv()   (None → channel closed → exit)
//!   catch_unwind(handler.handle(task))
//!     ├─ Ok(result) ─► reports.send(Completed)
//!     └─ panic      ─► reports.send(Faulted), exit
//! }
//! ```

use std::panic::{self, AssertUnwindSafe};
use std::thread;

use tokio::sync::mpsc;

use crate::error::PoolError;
use crate::pool::TaskHandler;

pub(crate) type UnitId = u64;

/// Message from a unit thread to the pool actor.
pub(crate) enum UnitReport<O> {
    Completed {
        unit: UnitId,
        result: Result<O, String>,
    },
    Faulted {
        unit: UnitId,
        reason: String,
    },
}

pub(crate) struct Unit<T> {
    jobs: mpsc::UnboundedSender<T>,
    thread: thread::JoinHandle<()>,
}

impl<T: Send + 'static> Unit<T> {
    /// Starts a unit thread named `task-unit-<id>`.
    pub(crate) fn spawn<H>(
        id: UnitId,
        mut handler: H,
        reports: mpsc::UnboundedSender<UnitReport<H::Output>>,
    ) -> Result<Self, PoolError>
    where
        H: TaskHandler<Task = T>,
    {
        let (jobs, mut rx) = mpsc::unbounded_channel::<T>();
        let thread = thread::Builder::new()
            .name(format!("task-unit-{id}"))
            .spawn(move || {
                while let Some(task) = rx.blocking_recv() {
                    match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(task))) {
                        Ok(result) => {
                            if reports
                                .send(UnitReport::Completed { unit: id, result })
                                .is_err()
                            {
                                break;
                            }
                        }
                        Err(payload) => {
                            let reason = crate::panic_message(payload.as_ref());
                            let _ = reports.send(UnitReport::Faulted { unit: id, reason });
                            break;
                        }
                    }
                }
            })
            .map_err(|e| PoolError::UnitSpawn {
                error: e.to_string(),
            })?;

        Ok(Self { jobs, thread })
    }

    /// Hands a task to the unit; gives it back if the thread is gone.
    pub(crate) fn send(&self, task: T) -> Result<(), T> {
        self.jobs.send(task).map_err(|e| e.0)
    }

    /// Closes the job channel and returns the thread for joining.
    pub(crate) fn close(self) -> thread::JoinHandle<()> {
        drop(self.jobs);
        self.thread
    }
}
