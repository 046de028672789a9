//! # Backoff before a replacement fork.
//!
//! [`BackoffPolicy`] delays the fork of a replacement worker so that a slot that keeps
//! crashing does not spin the machine while it burns through its restart budget.
//!
//! The delay for a slot that has accumulated `n` restarts in its current window is
//! `first × factor^n`, clamped to `max`, then jitter is applied. The base delay is derived
//! from the restart count only, so jitter never feeds back into later delays.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use clustervisor::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_millis(100),
//!     max: Duration::from_secs(5),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(backoff.next(0), Duration::from_millis(100));
//! assert_eq!(backoff.next(3), Duration::from_millis(800));
//! assert_eq!(backoff.next(20), Duration::from_secs(5));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Respawn backoff policy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the replacement of a slot with no restarts in its window.
    pub first: Duration,
    /// Maximum delay cap.
    pub max: Duration,
    /// Multiplicative growth factor per accumulated restart.
    pub factor: f64,
    /// Jitter applied to the clamped delay.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Returns `first = 100ms`, `factor = 2.0`, `max = 5s`, equal jitter.
    fn default() -> Self {
        Self {
            first: Duration::from_millis(100),
            max: Duration::from_secs(5),
            factor: 2.0,
            jitter: JitterPolicy::Equal,
        }
    }
}

impl BackoffPolicy {
    /// A policy that reforks immediately.
    pub const fn immediate() -> Self {
        Self {
            first: Duration::ZERO,
            max: Duration::ZERO,
            factor: 1.0,
            jitter: JitterPolicy::None,
        }
    }

    /// Computes the delay for a slot that has accumulated `restarts` restarts.
    pub fn next(&self, restarts: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let exp = restarts.min(i32::MAX as u32) as i32;
        let unclamped_secs = self.first.as_secs_f64() * self.factor.powi(exp);

        let base =
            if !unclamped_secs.is_finite() || unclamped_secs < 0.0 || unclamped_secs > max_secs {
                self.max
            } else {
                Duration::from_secs_f64(unclamped_secs)
            };

        self.jitter.apply(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exp(jitter: JitterPolicy) -> BackoffPolicy {
        BackoffPolicy {
            first: Duration::from_millis(100),
            max: Duration::from_secs(30),
            factor: 2.0,
            jitter,
        }
    }

    #[test]
    fn test_exponential_growth_no_jitter() {
        let policy = exp(JitterPolicy::None);
        assert_eq!(policy.next(0), Duration::from_millis(100));
        assert_eq!(policy.next(1), Duration::from_millis(200));
        assert_eq!(policy.next(2), Duration::from_millis(400));
        assert_eq!(policy.next(4), Duration::from_millis(1600));
    }

    #[test]
    fn test_huge_restart_count_clamps_to_max() {
        let policy = exp(JitterPolicy::None);
        assert_eq!(policy.next(100), Duration::from_secs(30));
        assert_eq!(policy.next(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_immediate_is_zero() {
        let policy = BackoffPolicy::immediate();
        for n in 0..10 {
            assert_eq!(policy.next(n), Duration::ZERO);
        }
    }

    #[test]
    fn test_equal_jitter_stays_within_half_and_base() {
        let policy = exp(JitterPolicy::Equal);
        for restarts in 0..12 {
            let base_ms = (100.0 * 2.0f64.powi(restarts as i32)).min(30_000.0);
            let delay = policy.next(restarts);
            assert!(delay >= Duration::from_millis((base_ms / 2.0) as u64));
            assert!(delay <= Duration::from_millis(base_ms as u64));
        }
    }
}
