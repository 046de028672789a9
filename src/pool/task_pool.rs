//! # TaskPool handle and pool actor.
//!
//! [`TaskPool`] is a cheap, cloneable handle. All bookkeeping (`units`, `free`, `queue`,
//! `in_flight`) lives in a single actor task; handles and unit threads only exchange
//! messages with it.
//!
//! ## Dispatch
//! ```text
//! Submit(task)
//!   ├─ free.pop() ─► unit.send(task), in_flight[unit] = reply
//!   └─ none free  ─► queue.push_back(task)
//!
//! Completed(unit, result)
//!   ├─ in_flight.remove(unit) ─► reply(result)
//!   ├─ free.push(unit)
//!   └─ queue.pop_front() ─► dispatch
//!
//! Faulted(unit)
//!   ├─ in_flight.remove(unit) ─► reply(TaskLost)
//!   ├─ remove unit from units and free, spawn a replacement
//!   └─ dispatch queued tasks onto free units
//! ```

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::thread;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::error::PoolError;
use crate::pool::unit::{Unit, UnitId, UnitReport};
use crate::pool::{PoolGauge, PoolSnapshot, TaskHandler};

type Reply<O> = oneshot::Sender<Result<O, PoolError>>;

enum Command<T, O> {
    Submit { task: T, reply: Reply<O> },
    Terminate { done: oneshot::Sender<()> },
}

/// An unstarted task awaiting a free unit.
struct QueuedTask<T, O> {
    payload: T,
    reply: Reply<O>,
}

/// Handle to a pool of Task Units.
///
/// Dropping every handle terminates the pool in the background.
pub struct TaskPool<T, O> {
    commands: mpsc::UnboundedSender<Command<T, O>>,
    gauge: PoolGauge,
}

impl<T, O> Clone for TaskPool<T, O> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
            gauge: self.gauge.clone(),
        }
    }
}

impl<T: Send + 'static, O: Send + 'static> TaskPool<T, O> {
    /// Starts `size` units (minimum 1), each with its own handler from `factory`.
    ///
    /// Must be called from within a tokio runtime: the pool actor is spawned onto it.
    pub fn new<H, F>(size: usize, factory: F) -> Result<Self, PoolError>
    where
        H: TaskHandler<Task = T, Output = O>,
        F: Fn() -> H + Send + 'static,
    {
        let target = size.max(1);
        let (reports_tx, reports_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let gauge = PoolGauge::new(target);

        let mut core = PoolCore {
            factory,
            target,
            units: HashMap::with_capacity(target),
            free: Vec::with_capacity(target),
            in_flight: HashMap::with_capacity(target),
            queue: VecDeque::new(),
            next_id: 0,
            reports: reports_tx,
            gauge: gauge.clone(),
        };
        for _ in 0..target {
            core.add_unit()?;
        }
        core.publish_gauge();
        info!(pool_size = target, "task pool initialized");

        tokio::spawn(core.run(commands_rx, reports_rx));
        Ok(Self {
            commands: commands_tx,
            gauge,
        })
    }

    /// Submits a task. Never blocks; the returned future resolves exactly once.
    pub fn submit(&self, task: T) -> Pending<O> {
        let (reply, rx) = oneshot::channel();
        // A closed actor drops `reply`, which resolves the future as `Terminated`.
        let _ = self.commands.send(Command::Submit { task, reply });
        Pending { rx }
    }

    /// Shuts down every unit.
    ///
    /// Queued tasks are rejected with [`PoolError::Terminated`]; in-flight tasks finish and
    /// resolve normally. Resolves once every unit thread has exited. Later calls return
    /// immediately.
    pub async fn terminate(&self) {
        let (done, rx) = oneshot::channel();
        if self.commands.send(Command::Terminate { done }).is_err() {
            return;
        }
        let _ = rx.await;
    }

    /// Target number of units.
    pub fn pool_size(&self) -> usize {
        self.gauge.pool_size()
    }

    /// Units currently busy (`pool_size - free units`).
    pub fn active_count(&self) -> usize {
        self.gauge.active_count()
    }

    /// Reads the occupancy counters.
    pub fn snapshot(&self) -> PoolSnapshot {
        self.gauge.snapshot()
    }

    /// Shares the occupancy counters (e.g. with health reporting).
    pub fn gauge(&self) -> PoolGauge {
        self.gauge.clone()
    }
}

/// Result of [`TaskPool::submit`].
#[must_use = "the task result is only observable by awaiting it"]
pub struct Pending<O> {
    rx: oneshot::Receiver<Result<O, PoolError>>,
}

impl<O> Future for Pending<O> {
    type Output = Result<O, PoolError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.unwrap_or(Err(PoolError::Terminated)))
    }
}

struct PoolCore<H: TaskHandler, F> {
    factory: F,
    target: usize,
    units: HashMap<UnitId, Unit<H::Task>>,
    free: Vec<UnitId>,
    in_flight: HashMap<UnitId, Reply<H::Output>>,
    queue: VecDeque<QueuedTask<H::Task, H::Output>>,
    next_id: UnitId,
    reports: mpsc::UnboundedSender<UnitReport<H::Output>>,
    gauge: PoolGauge,
}

impl<H, F> PoolCore<H, F>
where
    H: TaskHandler,
    F: Fn() -> H + Send + 'static,
{
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command<H::Task, H::Output>>,
        mut reports: mpsc::UnboundedReceiver<UnitReport<H::Output>>,
    ) {
        loop {
            tokio::select! {
                biased;
                Some(report) = reports.recv() => self.on_report(report),
                cmd = commands.recv() => match cmd {
                    Some(Command::Submit { task, reply }) => {
                        self.dispatch(QueuedTask { payload: task, reply });
                    }
                    Some(Command::Terminate { done }) => {
                        self.terminate(&mut reports).await;
                        let _ = done.send(());
                        break;
                    }
                    None => {
                        self.terminate(&mut reports).await;
                        break;
                    }
                },
            }
        }
    }

    fn add_unit(&mut self) -> Result<UnitId, PoolError> {
        let id = self.next_id;
        self.next_id += 1;
        let unit = Unit::spawn(id, (self.factory)(), self.reports.clone())?;
        self.units.insert(id, unit);
        self.free.push(id);
        debug!(unit = id, "task unit started");
        Ok(id)
    }

    fn dispatch(&mut self, task: QueuedTask<H::Task, H::Output>) {
        let QueuedTask { mut payload, reply } = task;
        loop {
            let Some(id) = self.free.pop() else {
                self.queue.push_back(QueuedTask { payload, reply });
                break;
            };
            let Some(unit) = self.units.get(&id) else {
                continue;
            };
            match unit.send(payload) {
                Ok(()) => {
                    self.in_flight.insert(id, reply);
                    break;
                }
                Err(returned) => {
                    // Thread exited without a report; treat like a fault and try another unit.
                    payload = returned;
                    self.replace(id, "job channel closed");
                }
            }
        }
        self.publish_gauge();
    }

    fn on_report(&mut self, report: UnitReport<H::Output>) {
        match report {
            UnitReport::Completed { unit, result } => {
                if !self.units.contains_key(&unit) {
                    return;
                }
                if let Some(reply) = self.in_flight.remove(&unit) {
                    let _ = reply.send(result.map_err(|reason| PoolError::TaskFailed { reason }));
                }
                self.free.push(unit);
                if let Some(next) = self.queue.pop_front() {
                    self.dispatch(next);
                }
            }
            UnitReport::Faulted { unit, reason } => {
                warn!(unit, reason, "task unit faulted, replacing");
                self.replace(unit, &reason);
                self.drain_queue();
            }
        }
        self.publish_gauge();
    }

    /// Removes a faulted unit from both collections and starts a fresh one.
    fn replace(&mut self, id: UnitId, reason: &str) {
        let Some(unit) = self.units.remove(&id) else {
            return;
        };
        self.free.retain(|u| *u != id);
        if let Some(reply) = self.in_flight.remove(&id) {
            let _ = reply.send(Err(PoolError::TaskLost { unit: id }));
        }
        let thread = unit.close();
        tokio::task::spawn_blocking(move || {
            let _ = thread.join();
        });

        if self.units.len() < self.target {
            match self.add_unit() {
                Ok(new_id) => debug!(faulted = id, replacement = new_id, reason, "task unit replaced"),
                Err(e) => error!(faulted = id, error = %e, "failed to replace task unit"),
            }
        }
    }

    fn drain_queue(&mut self) {
        while !self.free.is_empty() {
            let Some(next) = self.queue.pop_front() else {
                break;
            };
            self.dispatch(next);
        }
    }

    async fn terminate(&mut self, reports: &mut mpsc::UnboundedReceiver<UnitReport<H::Output>>) {
        for queued in self.queue.drain(..) {
            let _ = queued.reply.send(Err(PoolError::Terminated));
        }

        self.free.clear();
        let threads: Vec<thread::JoinHandle<()>> =
            self.units.drain().map(|(_, unit)| unit.close()).collect();
        let joined = tokio::task::spawn_blocking(move || {
            for t in threads {
                let _ = t.join();
            }
        })
        .await;
        if joined.is_err() {
            warn!("task unit join was interrupted");
        }

        // Units finish their current task before exiting; hand those results out.
        while let Ok(report) = reports.try_recv() {
            if let UnitReport::Completed { unit, result } = report {
                if let Some(reply) = self.in_flight.remove(&unit) {
                    let _ = reply.send(result.map_err(|reason| PoolError::TaskFailed { reason }));
                }
            }
        }
        for (_, reply) in self.in_flight.drain() {
            let _ = reply.send(Err(PoolError::Terminated));
        }

        self.publish_gauge();
        info!("task pool terminated");
    }

    fn publish_gauge(&self) {
        self.gauge
            .record(self.units.len(), self.free.len(), self.queue.len());
    }
}
