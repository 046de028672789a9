//! # Restart policy for crashed worker slots.
//!
//! [`RestartPolicy`] is a sliding-window crash-loop breaker. Each worker slot carries a
//! [`RestartHistory`] (`restarts`, `window_start`) that is handed from a dead worker to its
//! replacement.
//!
//! ```text
//! now - window_start >  window   → Restart { restarts: 0, window_start: now }
//! restarts           <  max      → Restart { restarts: restarts + 1, window_start }
//! otherwise                      → Exhausted (slot abandoned)
//! ```
//!
//! With `max = 3` a slot may be refilled three times inside one window; the fourth crash in
//! the same window is refused. A slot that fails faster than it can be usefully replaced is
//! worse than running short-handed.

use std::time::Duration;

use tokio::time::Instant;

/// Sliding-window restart limit for worker slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RestartPolicy {
    /// Maximum number of restarts accepted inside one window.
    pub max_restarts: u32,
    /// Length of the window.
    pub window: Duration,
}

impl Default for RestartPolicy {
    /// Returns `max_restarts = 5`, `window = 60s`.
    fn default() -> Self {
        Self {
            max_restarts: 5,
            window: Duration::from_secs(60),
        }
    }
}

/// Restart bookkeeping of one worker slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RestartHistory {
    restarts: u32,
    window_start: Instant,
}

impl RestartHistory {
    /// History of a freshly started slot: no restarts, window opened at `now`.
    pub fn fresh(now: Instant) -> Self {
        Self {
            restarts: 0,
            window_start: now,
        }
    }

    /// Restarts accumulated inside the current window.
    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    /// Start of the current window.
    pub fn window_start(&self) -> Instant {
        self.window_start
    }
}

/// Outcome of [`RestartPolicy::evaluate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RestartDecision {
    /// Fork a replacement that carries this history.
    Restart(RestartHistory),
    /// The slot exceeded its budget for the current window; do not refork.
    Exhausted,
}

impl RestartPolicy {
    /// Decides whether the slot described by `history` may be refilled at `now`.
    pub fn evaluate(&self, history: &RestartHistory, now: Instant) -> RestartDecision {
        let elapsed = now.saturating_duration_since(history.window_start);
        if elapsed > self.window {
            return RestartDecision::Restart(RestartHistory::fresh(now));
        }
        if history.restarts < self.max_restarts {
            return RestartDecision::Restart(RestartHistory {
                restarts: history.restarts + 1,
                window_start: history.window_start,
            });
        }
        RestartDecision::Exhausted
    }
}
