use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Point-in-time view of a pool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolSnapshot {
    /// Target number of units.
    pub pool_size: usize,
    /// Units currently alive (equals `pool_size` except while a faulted unit is being replaced).
    pub live_units: usize,
    /// `pool_size - free units`.
    pub active_units: usize,
    /// Tasks waiting for a free unit.
    pub queued_tasks: usize,
    /// Highest `active_units` observed.
    pub peak_active: usize,
    /// Highest `queued_tasks` observed.
    pub peak_queued: usize,
}

/// Lock-free occupancy counters written by the pool actor and read by anyone.
#[derive(Clone, Debug)]
pub struct PoolGauge {
    inner: Arc<GaugeInner>,
}

#[derive(Debug)]
struct GaugeInner {
    pool_size: usize,
    live: AtomicUsize,
    active: AtomicUsize,
    queued: AtomicUsize,
    peak_active: AtomicUsize,
    peak_queued: AtomicUsize,
}

impl PoolGauge {
    pub(crate) fn new(pool_size: usize) -> Self {
        Self {
            inner: Arc::new(GaugeInner {
                pool_size,
                live: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                queued: AtomicUsize::new(0),
                peak_active: AtomicUsize::new(0),
                peak_queued: AtomicUsize::new(0),
            }),
        }
    }

    pub(crate) fn record(&self, live: usize, free: usize, queued: usize) {
        let g = &self.inner;
        let active = g.pool_size.saturating_sub(free);
        g.live.store(live, Ordering::Release);
        g.active.store(active, Ordering::Release);
        g.queued.store(queued, Ordering::Release);
        g.peak_active.fetch_max(active, Ordering::AcqRel);
        g.peak_queued.fetch_max(queued, Ordering::AcqRel);
    }

    /// Target pool size.
    pub fn pool_size(&self) -> usize {
        self.inner.pool_size
    }

    /// Units currently busy.
    pub fn active_count(&self) -> usize {
        self.inner.active.load(Ordering::Acquire)
    }

    /// Reads all counters.
    pub fn snapshot(&self) -> PoolSnapshot {
        let g = &self.inner;
        PoolSnapshot {
            pool_size: g.pool_size,
            live_units: g.live.load(Ordering::Acquire),
            active_units: g.active.load(Ordering::Acquire),
            queued_tasks: g.queued.load(Ordering::Acquire),
            peak_active: g.peak_active.load(Ordering::Acquire),
            peak_queued: g.peak_queued.load(Ordering::Acquire),
        }
    }
}
