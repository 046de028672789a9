use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::ipc::{HealthMetrics, LifecycleMessage};
use crate::pool::PoolGauge;
use crate::worker::memory::memory_usage;
use crate::shutdown::ShutdownHandle;

/// What an [`Entrypoint`](crate::Entrypoint) gets to talk to its runtime.
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct WorkerContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    outbound: Mutex<Option<mpsc::UnboundedSender<LifecycleMessage>>>,
    clustered: bool,
    shutdown: ShutdownHandle,
    pool: OnceLock<PoolGauge>,
    ready: AtomicBool,
    started: Instant,
}

impl WorkerContext {
    pub(crate) fn new(
        outbound: Option<mpsc::UnboundedSender<LifecycleMessage>>,
        shutdown: ShutdownHandle,
    ) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                clustered: outbound.is_some(),
                outbound: Mutex::new(outbound),
                shutdown,
                pool: OnceLock::new(),
                ready: AtomicBool::new(false),
                started: Instant::now(),
            }),
        }
    }

    /// A context with no supervisor attached, driven by `shutdown`.
    pub fn detached(shutdown: ShutdownHandle) -> Self {
        Self::new(None, shutdown)
    }

    /// Reports that the serving instance is bound and accepting work. Only the first call
    /// has an effect.
    pub fn ready(&self) {
        if self.inner.ready.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(pid = std::process::id(), clustered = self.inner.clustered, "worker ready");
        self.send(LifecycleMessage::Ready);
    }

    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::Acquire)
    }

    /// Includes this pool's occupancy in health reports. Only the first pool is kept.
    pub fn attach_pool(&self, gauge: PoolGauge) {
        if self.inner.pool.set(gauge).is_err() {
            debug!("task pool already attached to worker context");
        }
    }

    /// Completes once the worker has been asked to stop.
    pub async fn shutdown_requested(&self) {
        self.inner.shutdown.triggered().await
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.is_shutting_down()
    }

    /// Token cancelled when the worker has been asked to stop.
    pub fn token(&self) -> CancellationToken {
        self.inner.shutdown.token()
    }

    /// True when running under a supervisor.
    pub fn is_clustered(&self) -> bool {
        self.inner.clustered
    }

    /// Current health snapshot.
    pub fn health(&self) -> HealthMetrics {
        HealthMetrics {
            pid: std::process::id(),
            uptime_ms: self
                .inner
                .started
                .elapsed()
                .as_millis()
                .min(u128::from(u64::MAX)) as u64,
            memory: memory_usage(),
            pool: self.inner.pool.get().map(PoolGauge::snapshot),
        }
    }

    pub(crate) fn send(&self, message: LifecycleMessage) {
        let guard = match self.inner.outbound.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(tx) = guard.as_ref() {
            if tx.send(message).is_err() {
                debug!("lifecycle writer is gone, dropping message");
            }
        }
    }

    /// Closes the outbound channel so the writer can flush and exit.
    pub(crate) fn close(&self) {
        let mut guard = match self.inner.outbound.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{HandlerFn, TaskPool};

    #[tokio::test]
    async fn ready_is_sent_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ctx = WorkerContext::new(Some(tx), ShutdownHandle::new());
        assert!(ctx.is_clustered());

        ctx.ready();
        ctx.clone().ready();
        ctx.close();

        assert_eq!(rx.recv().await, Some(LifecycleMessage::Ready));
        assert_eq!(rx.recv().await, None);
        assert!(ctx.is_ready());
    }

    #[tokio::test]
    async fn health_includes_attached_pool() {
        let ctx = WorkerContext::detached(ShutdownHandle::new());
        assert!(ctx.health().pool.is_none());

        let pool: TaskPool<u32, u32> =
            TaskPool::new(3, || HandlerFn::new(|n: u32| Ok(n))).expect("pool");
        ctx.attach_pool(pool.gauge());

        let health = ctx.health();
        assert_eq!(health.pid, std::process::id());
        assert_eq!(health.pool.map(|p| p.pool_size), Some(3));
        #[cfg(target_os = "linux")]
        assert!(health.memory.is_some_and(|m| m.rss > 0));
        pool.terminate().await;
    }
}
