//! # Cluster configuration.
//!
//! Provides [`ClusterConfig`] centralized settings for both tiers:
//! the process supervisor (worker count, restart policy, timeouts) and the per-worker
//! task pool (pool size, health reporting).
//!
//! ## Sentinel values
//! - `workers = None` → one worker per available core
//! - `pool_size = 0` → clamped to 1
//! - `health_interval = 0s` → health reporting disabled

use std::num::NonZeroUsize;
use std::time::Duration;

use crate::policies::{BackoffPolicy, RestartPolicy};

/// Per-worker acknowledgement deadline during a coordinated shutdown.
pub const WORKER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Global configuration for a cluster.
///
/// ## Field semantics
/// - `workers`: requested worker count (`None` = available cores); clamped to `[1, 2 × cores]`
/// - `restart`: sliding-window crash-loop breaker (`MAX_RESTARTS`, `RESTART_WINDOW`)
/// - `restart_backoff`: delay before a replacement fork (default: none)
/// - `shutdown_timeout`: outer deadline for the whole shutdown batch (`SHUTDOWN_TIMEOUT`)
/// - `worker_shutdown_timeout`: inner per-worker acknowledgement deadline
/// - `worker_ready_timeout`: deadline for a forked worker to report `ready` (`WORKER_READY_TIMEOUT`)
/// - `health_interval`: period of worker health reports
/// - `pool_size`: task units per worker
/// - `bus_capacity`: event bus ring buffer size (min 1)
#[derive(Clone, Debug)]
pub struct ClusterConfig {
    /// Requested number of worker processes.
    pub workers: Option<usize>,

    /// When a crashed slot is refilled.
    pub restart: RestartPolicy,

    /// How long to wait before the replacement fork.
    pub restart_backoff: BackoffPolicy,

    /// Upper bound on the coordinated shutdown of all workers.
    ///
    /// Workers still connected when it elapses are killed unconditionally.
    pub shutdown_timeout: Duration,

    /// How long a single worker may take to acknowledge `shutdown` before it is disconnected.
    pub worker_shutdown_timeout: Duration,

    /// How long a freshly forked worker may take to report `ready` before it is terminated.
    pub worker_ready_timeout: Duration,

    /// Period of `health` reports sent by workers.
    pub health_interval: Duration,

    /// Number of task units in each worker's pool.
    pub pool_size: usize,

    /// Capacity of the supervisor event bus.
    pub bus_capacity: usize,
}

impl ClusterConfig {
    /// Worker count to use on a machine with `cores` cores, before clamping.
    #[inline]
    pub fn requested_workers(&self, cores: usize) -> usize {
        self.workers.unwrap_or(cores)
    }

    /// Pool size clamped to a minimum of 1.
    #[inline]
    pub fn pool_size_clamped(&self) -> usize {
        self.pool_size.max(1)
    }

    /// Health reporting period as an `Option`.
    ///
    /// - `None` → health reporting disabled
    #[inline]
    pub fn health_period(&self) -> Option<Duration> {
        if self.health_interval == Duration::ZERO {
            None
        } else {
            Some(self.health_interval)
        }
    }

    /// Bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for ClusterConfig {
    /// Default configuration:
    ///
    /// - `workers = None` (one per core)
    /// - `restart = 5 restarts / 60s`
    /// - `restart_backoff = BackoffPolicy::immediate()` (refork on the exit event)
    /// - `shutdown_timeout = 30s`, `worker_shutdown_timeout = 10s`
    /// - `worker_ready_timeout = 30s`
    /// - `health_interval = 30s`
    /// - `pool_size = 4`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            workers: None,
            restart: RestartPolicy::default(),
            restart_backoff: BackoffPolicy::immediate(),
            shutdown_timeout: Duration::from_secs(30),
            worker_shutdown_timeout: WORKER_SHUTDOWN_TIMEOUT,
            worker_ready_timeout: Duration::from_secs(30),
            health_interval: Duration::from_secs(30),
            pool_size: 4,
            bus_capacity: 1024,
        }
    }
}

/// Number of cores available to this process (at least 1).
pub fn available_cores() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Clamps a requested worker count into `[1, 2 × cores]`.
///
/// # Example
/// ```
/// use clustervisor::clamp_worker_count;
///
/// assert_eq!(clamp_worker_count(0, 4), 1);
/// assert_eq!(clamp_worker_count(3, 4), 3);
/// assert_eq!(clamp_worker_count(64, 4), 8);
/// ```
pub fn clamp_worker_count(requested: usize, cores: usize) -> usize {
    let upper = cores.max(1).saturating_mul(2);
    requested.clamp(1, upper)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_covers_both_bounds() {
        for cores in 1..=16 {
            assert_eq!(clamp_worker_count(0, cores), 1);
            assert_eq!(clamp_worker_count(usize::MAX, cores), cores * 2);
            assert_eq!(clamp_worker_count(cores, cores), cores);
        }
    }

    #[test]
    fn zero_cores_still_allows_two_workers() {
        assert_eq!(clamp_worker_count(5, 0), 2);
    }

    #[test]
    fn sentinels() {
        let cfg = ClusterConfig {
            pool_size: 0,
            health_interval: Duration::ZERO,
            bus_capacity: 0,
            ..ClusterConfig::default()
        };
        assert_eq!(cfg.pool_size_clamped(), 1);
        assert_eq!(cfg.health_period(), None);
        assert_eq!(cfg.bus_capacity_clamped(), 1);
        assert_eq!(cfg.requested_workers(6), 6);
    }

    #[test]
    fn replacements_are_forked_without_delay_by_default() {
        let cfg = ClusterConfig::default();
        assert_eq!(cfg.restart_backoff, BackoffPolicy::immediate());
        assert_eq!(cfg.restart_backoff.next(3), Duration::ZERO);
    }
}
