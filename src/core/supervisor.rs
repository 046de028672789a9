//! # Supervisor: forks workers, refills crashed slots, drives the coordinated shutdown.
//!
//! The [`Supervisor`] is a single-owner event loop. It alone owns the worker table; spawned
//! helpers (pipe readers, process waiters, timers) only send it messages.
//!
//! ## High-level architecture
//! ```text
//! start(n) ── clamp(n, 1, 2×cores) ──► fork × n ──► WorkerRecord{history, epoch}
//!                                         └─► timer(worker_ready_timeout) ─► Deadline::Ready
//!
//! run():
//!   loop {
//!     select! {
//!       shutdown triggered / OS signal  ─► break
//!       WorkerEvent::Message(ready | health | shutdown-complete)
//!       WorkerEvent::Disconnected
//!       WorkerEvent::Exited ─► on_exit
//!       Deadline::Ready    ─► not ready yet? SIGTERM (no proactive refork)
//!       Deadline::Respawn  ─► fork(carried history)
//!     }
//!     no workers and no pending respawns ─► return Ok
//!   }
//!   graceful_shutdown()
//!
//! on_exit(worker):
//!   remove record
//!   ├─ shutting down or released on purpose ─► done
//!   ├─ exit code 0                           ─► CleanExit, slot not refilled
//!   └─ RestartPolicy::evaluate(history)
//!        ├─ Restart(h)  ─► RestartScheduled, fork now, or after backoff.next(h) if configured
//!        └─ Exhausted   ─► RestartExhausted, slot abandoned
//!
//! graceful_shutdown():
//!   send `shutdown` to every connected worker   (send failure ─► treat as gone)
//!   per worker: timer(worker_shutdown_timeout) ─► disconnect unilaterally
//!   race: all settled  vs  shutdown_timeout
//!   SIGKILL every worker still connected
//! ```
//!
//! A fork failure is fatal: the supervisor runs the shutdown sequence for the workers it
//! still has and returns the error.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

use crate::config::{clamp_worker_count, ClusterConfig};
use crate::core::record::WorkerRecord;
use crate::core::{ExitOutcome, Spawn, StopSignal, WorkerEvent, WorkerId};
use crate::error::SupervisorError;
use crate::events::{Bus, Event, EventKind, ShutdownCause};
use crate::ipc::LifecycleMessage;
use crate::policies::{RestartDecision, RestartHistory};
use crate::shutdown::{ShutdownHandle, ShutdownSignals};
use crate::subscribers::SubscriberSet;

/// Timer expirations delivered back into the event loop.
enum Deadline {
    Ready { id: WorkerId, epoch: u64 },
    Respawn { history: RestartHistory },
}

/// Process supervisor. Build one with [`SupervisorBuilder`](crate::SupervisorBuilder).
pub struct Supervisor<S: Spawn> {
    cfg: ClusterConfig,
    cores: usize,
    spawner: S,
    bus: Bus,
    subs: Option<SubscriberSet>,
    shutdown: ShutdownHandle,
    handle_signals: bool,

    workers: HashMap<WorkerId, WorkerRecord>,
    events_tx: mpsc::UnboundedSender<WorkerEvent>,
    events_rx: mpsc::UnboundedReceiver<WorkerEvent>,
    deadlines_tx: mpsc::UnboundedSender<Deadline>,
    deadlines_rx: mpsc::UnboundedReceiver<Deadline>,
    pending_respawns: usize,
    next_epoch: u64,
    stopped: bool,
}

impl<S: Spawn> Supervisor<S> {
    pub(crate) fn new_internal(
        cfg: ClusterConfig,
        cores: usize,
        spawner: S,
        subs: SubscriberSet,
        shutdown: ShutdownHandle,
        handle_signals: bool,
    ) -> Self {
        let bus = Bus::new(cfg.bus_capacity_clamped());
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (deadlines_tx, deadlines_rx) = mpsc::unbounded_channel();
        Self {
            cfg,
            cores,
            spawner,
            bus,
            subs: Some(subs),
            shutdown,
            handle_signals,
            workers: HashMap::new(),
            events_tx,
            events_rx,
            deadlines_tx,
            deadlines_rx,
            pending_respawns: 0,
            next_epoch: 0,
            stopped: false,
        }
    }

    /// Event bus carrying every supervisor [`Event`].
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Handle that starts the coordinated shutdown when triggered.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Workers currently tracked.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Forks `requested` workers, clamped into `[1, 2 × cores]`.
    ///
    /// Returns the effective count once every fork has been issued; readiness is not awaited.
    /// If a fork fails, the workers already started are shut down and the error is returned.
    pub async fn start(&mut self, requested: usize) -> Result<usize, SupervisorError> {
        let effective = clamp_worker_count(requested, self.cores);
        if effective != requested {
            self.publish(
                Event::new(EventKind::WorkerCountAdjusted)
                    .with_count(effective)
                    .with_reason(format!(
                        "requested {requested}, {} cores available",
                        self.cores
                    )),
            );
        }
        info!(workers = effective, cores = self.cores, "setting up workers");

        let now = Instant::now();
        for _ in 0..effective {
            if let Err(err) = self.fork(RestartHistory::fresh(now)) {
                return Err(self.abort(err).await);
            }
        }
        Ok(effective)
    }

    /// Supervises until shutdown completes or no workers remain.
    pub async fn run(mut self) -> Result<(), SupervisorError> {
        let mut signals = if self.handle_signals {
            match ShutdownSignals::new() {
                Ok(s) => Some(s),
                Err(source) => return Err(self.abort(SupervisorError::Signal { source }).await),
            }
        } else {
            None
        };

        let shutdown = self.shutdown.clone();
        loop {
            if shutdown.is_shutting_down() {
                break;
            }
            if self.workers.is_empty() && self.pending_respawns == 0 {
                info!("no workers left to supervise");
                self.close_subscribers().await;
                return Ok(());
            }

            let step = tokio::select! {
                biased;
                _ = shutdown.triggered() => Ok(()),
                name = next_signal(&mut signals) => {
                    self.shutdown.trigger(name);
                    Ok(())
                }
                Some(ev) = self.events_rx.recv() => self.on_worker_event(ev),
                Some(deadline) = self.deadlines_rx.recv() => self.on_deadline(deadline),
            };
            if let Err(err) = step {
                return Err(self.abort(err).await);
            }
        }

        self.graceful_shutdown(ShutdownCause::Requested).await;
        Ok(())
    }

    fn publish(&self, ev: Event) {
        if let Some(subs) = &self.subs {
            subs.emit(&ev);
        }
        self.bus.publish(ev);
    }

    fn schedule(&self, after: Duration, deadline: Deadline) {
        let tx = self.deadlines_tx.clone();
        tokio::spawn(async move {
            time::sleep(after).await;
            let _ = tx.send(deadline);
        });
    }

    fn fork(&mut self, history: RestartHistory) -> Result<(), SupervisorError> {
        if self.shutdown.is_shutting_down() {
            info!("shutdown in progress, not forking new worker");
            return Ok(());
        }

        let handle = self.spawner.spawn(self.events_tx.clone())?;
        let id = handle.id();
        let epoch = self.next_epoch;
        self.next_epoch += 1;

        self.publish(
            Event::new(EventKind::WorkerForked)
                .with_worker(id)
                .with_restarts(history.restarts()),
        );
        self.schedule(self.cfg.worker_ready_timeout, Deadline::Ready { id, epoch });
        self.workers
            .insert(id, WorkerRecord::new(handle, history, epoch));
        Ok(())
    }

    fn on_worker_event(&mut self, ev: WorkerEvent) -> Result<(), SupervisorError> {
        match ev {
            WorkerEvent::Message { id, message } => self.on_message(id, message),
            WorkerEvent::Disconnected { id } => {
                if let Some(record) = self.workers.get_mut(&id) {
                    record.settled = true;
                    self.publish(Event::new(EventKind::WorkerDisconnected).with_worker(id));
                }
            }
            WorkerEvent::Exited { id, outcome } => return self.on_exit(id, outcome),
        }
        Ok(())
    }

    fn on_message(&mut self, id: WorkerId, message: LifecycleMessage) {
        let Some(record) = self.workers.get_mut(&id) else {
            debug!(worker = id, kind = message.label(), "message from untracked worker");
            return;
        };
        match message {
            LifecycleMessage::Ready => {
                record.ready = true;
                self.publish(Event::new(EventKind::WorkerReady).with_worker(id));
            }
            LifecycleMessage::Health { data } => {
                self.publish(
                    Event::new(EventKind::WorkerHealth)
                        .with_worker(id)
                        .with_health(data),
                );
            }
            LifecycleMessage::ShutdownComplete => {
                record.release();
                self.publish(Event::new(EventKind::ShutdownAcknowledged).with_worker(id));
            }
            LifecycleMessage::Shutdown => {
                debug!(worker = id, "ignoring shutdown message sent by a worker");
            }
        }
    }

    fn on_exit(&mut self, id: WorkerId, outcome: ExitOutcome) -> Result<(), SupervisorError> {
        let Some(record) = self.workers.remove(&id) else {
            return Ok(());
        };
        self.publish(
            Event::new(EventKind::WorkerExited)
                .with_worker(id)
                .with_exit(outcome.code, outcome.signal),
        );

        if self.shutdown.is_shutting_down() || record.disconnected {
            return Ok(());
        }
        if outcome.is_clean() {
            self.publish(Event::new(EventKind::CleanExit).with_worker(id));
            return Ok(());
        }

        match self.cfg.restart.evaluate(&record.history, Instant::now()) {
            RestartDecision::Restart(history) => {
                let delay = self
                    .cfg
                    .restart_backoff
                    .next(history.restarts().saturating_sub(1));
                self.publish(
                    Event::new(EventKind::RestartScheduled)
                        .with_worker(id)
                        .with_restarts(history.restarts())
                        .with_delay(delay),
                );
                if delay.is_zero() {
                    self.fork(history)?;
                } else {
                    self.pending_respawns += 1;
                    self.schedule(delay, Deadline::Respawn { history });
                }
            }
            RestartDecision::Exhausted => {
                self.publish(
                    Event::new(EventKind::RestartExhausted)
                        .with_worker(id)
                        .with_restarts(record.history.restarts())
                        .with_reason(format!(
                            "{} restarts within {}ms",
                            self.cfg.restart.max_restarts,
                            self.cfg.restart.window.as_millis()
                        )),
                );
            }
        }
        Ok(())
    }

    fn on_deadline(&mut self, deadline: Deadline) -> Result<(), SupervisorError> {
        match deadline {
            Deadline::Ready { id, epoch } => {
                let Some(record) = self.workers.get(&id) else {
                    return Ok(());
                };
                if record.epoch != epoch || record.ready {
                    return Ok(());
                }
                self.publish(
                    Event::new(EventKind::ReadyTimeout)
                        .with_worker(id)
                        .with_timeout(self.cfg.worker_ready_timeout),
                );
                if let Err(e) = record.handle.signal(StopSignal::Terminate) {
                    warn!(worker = id, error = %e, "failed to terminate unready worker");
                }
            }
            Deadline::Respawn { history } => {
                self.pending_respawns = self.pending_respawns.saturating_sub(1);
                self.fork(history)?;
            }
        }
        Ok(())
    }

    /// Fatal path: report, shut the remaining workers down, hand the error back.
    async fn abort(&mut self, err: SupervisorError) -> SupervisorError {
        match err {
            SupervisorError::Spawn { .. }
            | SupervisorError::MissingPid
            | SupervisorError::CurrentExe { .. } => {
                self.publish(Event::new(EventKind::SpawnFailed).with_reason(err.to_string()));
            }
            _ => error!(error = %err, label = err.as_label(), "supervisor fault"),
        }
        self.shutdown.trigger(err.as_label());
        self.graceful_shutdown(ShutdownCause::Fault).await;
        err
    }

    async fn graceful_shutdown(&mut self, cause: ShutdownCause) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.publish(
            Event::new(EventKind::ShutdownRequested)
                .with_cause(cause)
                .with_count(self.workers.len()),
        );

        let per_worker = self.cfg.worker_shutdown_timeout;
        let (ack_tx, mut ack_rx) = mpsc::unbounded_channel::<(WorkerId, u64)>();
        let mut notify_failed = Vec::new();
        for (id, record) in self.workers.iter_mut() {
            if !record.handle.is_connected() {
                record.settled = true;
                continue;
            }
            match record.handle.send(LifecycleMessage::Shutdown) {
                Ok(()) => {
                    let tx = ack_tx.clone();
                    let (id, epoch) = (*id, record.epoch);
                    tokio::spawn(async move {
                        time::sleep(per_worker).await;
                        let _ = tx.send((id, epoch));
                    });
                }
                Err(e) => {
                    record.release();
                    notify_failed.push((*id, e.to_string()));
                }
            }
        }
        for (id, reason) in notify_failed {
            self.publish(
                Event::new(EventKind::ShutdownNotifyFailed)
                    .with_worker(id)
                    .with_reason(reason),
            );
        }

        let outer = time::sleep(self.cfg.shutdown_timeout);
        tokio::pin!(outer);
        let completed = loop {
            if self.workers.values().all(|r| r.settled) {
                break true;
            }
            tokio::select! {
                biased;
                Some(ev) = self.events_rx.recv() => {
                    // Nothing is forked while shutting down, so this cannot fail.
                    let _ = self.on_worker_event(ev);
                }
                Some((id, epoch)) = ack_rx.recv() => self.on_ack_timeout(id, epoch),
                _ = &mut outer => break false,
            }
        };

        if completed {
            self.publish(Event::new(EventKind::AllStoppedWithin));
        } else {
            let remaining = self.workers.values().filter(|r| !r.settled).count();
            self.publish(
                Event::new(EventKind::ShutdownTimeout)
                    .with_timeout(self.cfg.shutdown_timeout)
                    .with_count(remaining),
            );
        }

        let mut killed = Vec::new();
        for (id, record) in &self.workers {
            if !record.handle.is_connected() {
                continue;
            }
            if let Err(e) = record.handle.signal(StopSignal::Kill) {
                warn!(worker = id, error = %e, "failed to kill worker");
            }
            killed.push(*id);
        }
        for id in killed {
            self.publish(Event::new(EventKind::WorkerForceKilled).with_worker(id));
        }

        self.close_subscribers().await;
    }

    fn on_ack_timeout(&mut self, id: WorkerId, epoch: u64) {
        let Some(record) = self.workers.get_mut(&id) else {
            return;
        };
        if record.epoch != epoch || record.settled {
            return;
        }
        record.release();
        self.publish(
            Event::new(EventKind::ShutdownAckTimeout)
                .with_worker(id)
                .with_timeout(self.cfg.worker_shutdown_timeout),
        );
    }

    async fn close_subscribers(&mut self) {
        if let Some(subs) = self.subs.take() {
            subs.shutdown().await;
        }
    }
}

async fn next_signal(signals: &mut Option<ShutdownSignals>) -> &'static str {
    match signals {
        Some(s) => s.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex, MutexGuard};

    use tokio::sync::broadcast;

    use super::*;
    use crate::core::{SupervisorBuilder, WorkerHandle};
    use crate::policies::{BackoffPolicy, JitterPolicy, RestartPolicy};

    #[derive(Default)]
    struct FakeState {
        spawned: Vec<WorkerId>,
        sent: Vec<(WorkerId, LifecycleMessage)>,
        signals: Vec<(WorkerId, StopSignal)>,
        events: Option<mpsc::UnboundedSender<WorkerEvent>>,
        auto_ready: bool,
        ack_shutdown: bool,
        fail_send: bool,
        fail_spawn_at: Option<usize>,
    }

    #[derive(Clone, Default)]
    struct Fake(Arc<Mutex<FakeState>>);

    impl Fake {
        fn with(f: impl FnOnce(&mut FakeState)) -> Self {
            let fake = Self::default();
            f(&mut fake.state());
            fake
        }

        fn state(&self) -> MutexGuard<'_, FakeState> {
            self.0.lock().expect("fake state")
        }

        fn spawned(&self) -> Vec<WorkerId> {
            self.state().spawned.clone()
        }

        fn last(&self) -> WorkerId {
            *self.state().spawned.last().expect("spawned")
        }

        fn signals(&self) -> Vec<(WorkerId, StopSignal)> {
            self.state().signals.clone()
        }

        fn emit(&self, ev: WorkerEvent) {
            let tx = self.state().events.clone().expect("events");
            tx.send(ev).expect("send");
        }

        fn exit(&self, id: WorkerId, outcome: ExitOutcome) {
            self.emit(WorkerEvent::Exited { id, outcome });
        }
    }

    impl Spawn for Fake {
        fn spawn(
            &mut self,
            events: mpsc::UnboundedSender<WorkerEvent>,
        ) -> Result<Box<dyn WorkerHandle>, SupervisorError> {
            let mut st = self.state();
            if st.fail_spawn_at == Some(st.spawned.len()) {
                return Err(SupervisorError::Spawn {
                    source: io::Error::other("fork refused"),
                });
            }
            let id = 1000 + st.spawned.len() as WorkerId;
            st.spawned.push(id);
            if st.auto_ready {
                let _ = events.send(WorkerEvent::Message {
                    id,
                    message: LifecycleMessage::Ready,
                });
            }
            st.events = Some(events);
            Ok(Box::new(FakeHandle {
                id,
                state: self.0.clone(),
                connected: true,
            }))
        }
    }

    struct FakeHandle {
        id: WorkerId,
        state: Arc<Mutex<FakeState>>,
        connected: bool,
    }

    impl WorkerHandle for FakeHandle {
        fn id(&self) -> WorkerId {
            self.id
        }

        fn send(&mut self, message: LifecycleMessage) -> Result<(), SupervisorError> {
            let mut st = self.state.lock().expect("fake state");
            if st.fail_send {
                return Err(SupervisorError::Disconnected { worker: self.id });
            }
            st.sent.push((self.id, message.clone()));
            if message == LifecycleMessage::Shutdown && st.ack_shutdown {
                if let Some(tx) = &st.events {
                    let _ = tx.send(WorkerEvent::Message {
                        id: self.id,
                        message: LifecycleMessage::ShutdownComplete,
                    });
                    let _ = tx.send(WorkerEvent::Exited {
                        id: self.id,
                        outcome: ExitOutcome::code(0),
                    });
                }
            }
            Ok(())
        }

        fn disconnect(&mut self) {
            self.connected = false;
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        fn signal(&self, signal: StopSignal) -> Result<(), SupervisorError> {
            self.state
                .lock()
                .expect("fake state")
                .signals
                .push((self.id, signal));
            Ok(())
        }
    }

    fn cfg() -> ClusterConfig {
        ClusterConfig {
            restart_backoff: BackoffPolicy::immediate(),
            ..ClusterConfig::default()
        }
    }

    fn supervisor(cfg: ClusterConfig, fake: &Fake) -> Supervisor<Fake> {
        SupervisorBuilder::new(cfg, fake.clone())
            .with_cores(2)
            .handle_signals(false)
            .build()
    }

    async fn settle() {
        time::sleep(Duration::from_millis(1)).await;
    }

    fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    fn count(events: &[Event], kind: EventKind) -> usize {
        events.iter().filter(|e| e.kind == kind).count()
    }

    #[tokio::test(start_paused = true)]
    async fn start_clamps_requested_count() {
        let fake = Fake::with(|s| s.auto_ready = true);
        let mut sup = supervisor(cfg(), &fake);
        let mut rx = sup.bus().subscribe();

        assert_eq!(sup.start(10).await.expect("start"), 4);
        assert_eq!(fake.spawned().len(), 4);
        assert_eq!(sup.worker_count(), 4);

        let events = drain(&mut rx);
        assert_eq!(count(&events, EventKind::WorkerForked), 4);
        let adjusted: Vec<_> = events
            .iter()
            .filter(|e| e.kind == EventKind::WorkerCountAdjusted)
            .collect();
        assert_eq!(adjusted.len(), 1);
        assert_eq!(adjusted[0].count, Some(4));

        let other = Fake::default();
        let mut sup = supervisor(cfg(), &other);
        assert_eq!(sup.start(0).await.expect("start"), 1);
        assert_eq!(other.spawned().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn clean_exit_is_not_reforked() {
        let fake = Fake::with(|s| s.auto_ready = true);
        let mut sup = supervisor(cfg(), &fake);
        let mut rx = sup.bus().subscribe();
        sup.start(1).await.expect("start");
        let run = tokio::spawn(sup.run());

        fake.exit(fake.last(), ExitOutcome::code(0));
        run.await.expect("join").expect("run");

        assert_eq!(fake.spawned().len(), 1);
        let events = drain(&mut rx);
        assert_eq!(count(&events, EventKind::WorkerReady), 1);
        assert_eq!(count(&events, EventKind::CleanExit), 1);
        assert_eq!(count(&events, EventKind::RestartScheduled), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn crash_loop_stops_after_max_restarts() {
        let fake = Fake::with(|s| s.auto_ready = true);
        let cfg = ClusterConfig {
            restart: RestartPolicy {
                max_restarts: 3,
                window: Duration::from_secs(60),
            },
            ..cfg()
        };
        let mut sup = supervisor(cfg, &fake);
        let mut rx = sup.bus().subscribe();
        sup.start(1).await.expect("start");
        let run = tokio::spawn(sup.run());

        for _ in 0..4 {
            fake.exit(fake.last(), ExitOutcome::code(1));
            settle().await;
        }
        run.await.expect("join").expect("run");

        assert_eq!(fake.spawned().len(), 4);
        let events = drain(&mut rx);
        assert_eq!(count(&events, EventKind::RestartScheduled), 3);
        assert_eq!(count(&events, EventKind::RestartExhausted), 1);

        let restarts: Vec<_> = events
            .iter()
            .filter(|e| e.kind == EventKind::WorkerForked)
            .map(|e| e.restarts)
            .collect();
        assert_eq!(restarts, vec![Some(0), Some(1), Some(2), Some(3)]);
    }

    #[tokio::test(start_paused = true)]
    async fn default_config_reforks_on_the_exit_itself() {
        let fake = Fake::with(|s| {
            s.auto_ready = true;
            s.ack_shutdown = true;
        });
        let mut sup = supervisor(ClusterConfig::default(), &fake);
        let shutdown = sup.shutdown_handle();
        let mut rx = sup.bus().subscribe();
        sup.start(1).await.expect("start");
        let run = tokio::spawn(sup.run());

        fake.exit(fake.last(), ExitOutcome::code(1));
        settle().await;
        assert_eq!(fake.spawned().len(), 2);

        shutdown.trigger("test");
        run.await.expect("join").expect("run");
        let scheduled: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter(|e| e.kind == EventKind::RestartScheduled)
            .collect();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].delay_ms, Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn released_worker_crash_is_not_reforked() {
        let fake = Fake::with(|s| s.auto_ready = true);
        let mut sup = supervisor(cfg(), &fake);
        let mut rx = sup.bus().subscribe();
        sup.start(1).await.expect("start");
        let id = fake.last();
        let run = tokio::spawn(sup.run());

        fake.emit(WorkerEvent::Message {
            id,
            message: LifecycleMessage::ShutdownComplete,
        });
        fake.exit(id, ExitOutcome::code(1));
        run.await.expect("join").expect("run");

        assert_eq!(fake.spawned().len(), 1);
        let events = drain(&mut rx);
        assert_eq!(count(&events, EventKind::ShutdownAcknowledged), 1);
        assert_eq!(count(&events, EventKind::WorkerExited), 1);
        assert_eq!(count(&events, EventKind::RestartScheduled), 0);
        assert_eq!(count(&events, EventKind::RestartExhausted), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn crash_during_shutdown_is_not_reforked() {
        let fake = Fake::with(|s| s.auto_ready = true);
        let mut sup = supervisor(cfg(), &fake);
        let shutdown = sup.shutdown_handle();
        let mut rx = sup.bus().subscribe();
        sup.start(1).await.expect("start");
        let id = fake.last();
        let run = tokio::spawn(sup.run());
        settle().await;

        let began = Instant::now();
        shutdown.trigger("test");
        settle().await;
        fake.exit(id, ExitOutcome::code(1));
        run.await.expect("join").expect("run");
        assert!(began.elapsed() < Duration::from_secs(1));

        assert_eq!(fake.spawned().len(), 1);
        assert!(fake.signals().is_empty());
        let events = drain(&mut rx);
        assert_eq!(count(&events, EventKind::WorkerExited), 1);
        assert_eq!(count(&events, EventKind::RestartScheduled), 0);
        assert_eq!(count(&events, EventKind::AllStoppedWithin), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_window_resets_after_expiry() {
        let fake = Fake::with(|s| s.auto_ready = true);
        let cfg = ClusterConfig {
            restart: RestartPolicy {
                max_restarts: 1,
                window: Duration::from_secs(10),
            },
            ..cfg()
        };
        let mut sup = supervisor(cfg, &fake);
        sup.start(1).await.expect("start");
        let run = tokio::spawn(sup.run());

        fake.exit(fake.last(), ExitOutcome::code(1));
        settle().await;
        assert_eq!(fake.spawned().len(), 2);

        time::sleep(Duration::from_secs(11)).await;
        fake.exit(fake.last(), ExitOutcome::code(1));
        settle().await;
        assert_eq!(fake.spawned().len(), 3, "expired window grants a fresh budget");

        fake.exit(fake.last(), ExitOutcome::code(1));
        settle().await;
        assert_eq!(fake.spawned().len(), 4);

        fake.exit(fake.last(), ExitOutcome::code(1));
        run.await.expect("join").expect("run");
        assert_eq!(fake.spawned().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn unready_worker_is_terminated_not_replaced() {
        let fake = Fake::with(|s| s.ack_shutdown = true);
        let cfg = ClusterConfig {
            worker_ready_timeout: Duration::from_secs(5),
            ..cfg()
        };
        let mut sup = supervisor(cfg, &fake);
        let shutdown = sup.shutdown_handle();
        let mut rx = sup.bus().subscribe();
        sup.start(1).await.expect("start");
        let first = fake.last();
        let run = tokio::spawn(sup.run());

        time::sleep(Duration::from_secs(6)).await;
        assert_eq!(fake.signals(), vec![(first, StopSignal::Terminate)]);
        assert_eq!(fake.spawned().len(), 1);

        fake.exit(first, ExitOutcome::signaled(15));
        settle().await;
        assert_eq!(fake.spawned().len(), 2, "terminated worker goes through the crash path");

        shutdown.trigger("test");
        run.await.expect("join").expect("run");
        assert_eq!(count(&drain(&mut rx), EventKind::ReadyTimeout), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn ready_worker_is_left_alone() {
        let fake = Fake::with(|s| {
            s.auto_ready = true;
            s.ack_shutdown = true;
        });
        let cfg = ClusterConfig {
            worker_ready_timeout: Duration::from_secs(5),
            ..cfg()
        };
        let mut sup = supervisor(cfg, &fake);
        let shutdown = sup.shutdown_handle();
        sup.start(2).await.expect("start");
        let run = tokio::spawn(sup.run());

        time::sleep(Duration::from_secs(6)).await;
        shutdown.trigger("test");
        run.await.expect("join").expect("run");
        assert!(fake.signals().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_delays_the_replacement_fork() {
        let fake = Fake::with(|s| {
            s.auto_ready = true;
            s.ack_shutdown = true;
        });
        let cfg = ClusterConfig {
            restart_backoff: BackoffPolicy {
                first: Duration::from_secs(1),
                max: Duration::from_secs(10),
                factor: 2.0,
                jitter: JitterPolicy::None,
            },
            ..cfg()
        };
        let mut sup = supervisor(cfg, &fake);
        let shutdown = sup.shutdown_handle();
        let mut rx = sup.bus().subscribe();
        sup.start(1).await.expect("start");
        let run = tokio::spawn(sup.run());

        fake.exit(fake.last(), ExitOutcome::code(1));
        time::sleep(Duration::from_millis(500)).await;
        assert_eq!(fake.spawned().len(), 1, "no worker yet, but the respawn keeps run alive");

        time::sleep(Duration::from_millis(600)).await;
        assert_eq!(fake.spawned().len(), 2);

        shutdown.trigger("test");
        run.await.expect("join").expect("run");
        let scheduled: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter(|e| e.kind == EventKind::RestartScheduled)
            .collect();
        assert_eq!(scheduled[0].delay_ms, Some(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_shutdown_runs_once() {
        let fake = Fake::with(|s| {
            s.auto_ready = true;
            s.ack_shutdown = true;
        });
        let mut sup = supervisor(cfg(), &fake);
        let shutdown = sup.shutdown_handle();
        let mut rx = sup.bus().subscribe();
        sup.start(2).await.expect("start");
        let run = tokio::spawn(sup.run());
        settle().await;

        let a = tokio::spawn({
            let s = shutdown.clone();
            async move { s.trigger("first") }
        });
        let b = tokio::spawn({
            let s = shutdown.clone();
            async move { s.trigger("second") }
        });
        let winners = [a.await.expect("join"), b.await.expect("join")];
        assert_eq!(winners.iter().filter(|w| **w).count(), 1);
        run.await.expect("join").expect("run");

        let events = drain(&mut rx);
        assert_eq!(count(&events, EventKind::ShutdownRequested), 1);
        assert_eq!(count(&events, EventKind::ShutdownAcknowledged), 2);
        assert_eq!(count(&events, EventKind::AllStoppedWithin), 1);
        let notified = fake
            .state()
            .sent
            .iter()
            .filter(|(_, m)| *m == LifecycleMessage::Shutdown)
            .count();
        assert_eq!(notified, 2);
        assert!(fake.signals().is_empty());
        assert_eq!(fake.spawned().len(), 2, "no refork during shutdown");
    }

    #[tokio::test(start_paused = true)]
    async fn unacknowledged_shutdown_is_force_killed() {
        let fake = Fake::with(|s| s.auto_ready = true);
        let cfg = ClusterConfig {
            shutdown_timeout: Duration::from_secs(2),
            ..cfg()
        };
        let mut sup = supervisor(cfg, &fake);
        let shutdown = sup.shutdown_handle();
        let mut rx = sup.bus().subscribe();
        sup.start(2).await.expect("start");
        let run = tokio::spawn(sup.run());
        settle().await;

        let began = Instant::now();
        shutdown.trigger("test");
        run.await.expect("join").expect("run");
        assert!(began.elapsed() >= Duration::from_secs(2));

        let mut signals = fake.signals();
        signals.sort_by_key(|(id, _)| *id);
        assert_eq!(
            signals,
            vec![(1000, StopSignal::Kill), (1001, StopSignal::Kill)]
        );
        let events = drain(&mut rx);
        assert_eq!(count(&events, EventKind::ShutdownTimeout), 1);
        assert_eq!(count(&events, EventKind::WorkerForceKilled), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_worker_is_disconnected_after_its_own_deadline() {
        let fake = Fake::with(|s| s.auto_ready = true);
        let cfg = ClusterConfig {
            worker_shutdown_timeout: Duration::from_secs(1),
            ..cfg()
        };
        let mut sup = supervisor(cfg, &fake);
        let shutdown = sup.shutdown_handle();
        let mut rx = sup.bus().subscribe();
        sup.start(1).await.expect("start");
        let run = tokio::spawn(sup.run());
        settle().await;

        let began = Instant::now();
        shutdown.trigger("test");
        run.await.expect("join").expect("run");
        assert!(began.elapsed() < Duration::from_secs(2));

        let events = drain(&mut rx);
        assert_eq!(count(&events, EventKind::ShutdownAckTimeout), 1);
        assert_eq!(count(&events, EventKind::AllStoppedWithin), 1);
        assert!(fake.signals().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_notification_counts_as_gone() {
        let fake = Fake::with(|s| {
            s.auto_ready = true;
            s.fail_send = true;
        });
        let mut sup = supervisor(cfg(), &fake);
        let shutdown = sup.shutdown_handle();
        let mut rx = sup.bus().subscribe();
        sup.start(1).await.expect("start");
        let run = tokio::spawn(sup.run());
        settle().await;

        let began = Instant::now();
        shutdown.trigger("test");
        run.await.expect("join").expect("run");
        assert!(began.elapsed() < Duration::from_millis(10));

        let events = drain(&mut rx);
        assert_eq!(count(&events, EventKind::ShutdownNotifyFailed), 1);
        assert_eq!(count(&events, EventKind::AllStoppedWithin), 1);
        assert!(fake.signals().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn fork_failure_shuts_down_and_fails() {
        let fake = Fake::with(|s| {
            s.auto_ready = true;
            s.ack_shutdown = true;
            s.fail_spawn_at = Some(2);
        });
        let mut sup = supervisor(cfg(), &fake);
        let mut rx = sup.bus().subscribe();
        sup.start(2).await.expect("start");
        let run = tokio::spawn(sup.run());

        fake.exit(1000, ExitOutcome::code(1));
        let err = run.await.expect("join").unwrap_err();
        assert_eq!(err.as_label(), "supervisor_spawn_failed");

        let events = drain(&mut rx);
        assert_eq!(count(&events, EventKind::SpawnFailed), 1);
        let requested: Vec<_> = events
            .iter()
            .filter(|e| e.kind == EventKind::ShutdownRequested)
            .collect();
        assert_eq!(requested.len(), 1);
        assert_eq!(requested[0].cause, Some(ShutdownCause::Fault));
        assert_eq!(count(&events, EventKind::ShutdownAcknowledged), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fork_failure_during_start_is_reported() {
        let fake = Fake::with(|s| {
            s.ack_shutdown = true;
            s.fail_spawn_at = Some(1);
        });
        let mut sup = supervisor(cfg(), &fake);
        let err = sup.start(2).await.unwrap_err();
        assert_eq!(err.as_label(), "supervisor_spawn_failed");
        let notified: Vec<_> = fake
            .state()
            .sent
            .iter()
            .map(|(id, m)| (*id, m.clone()))
            .collect();
        assert_eq!(notified, vec![(1000, LifecycleMessage::Shutdown)]);
    }
}
