//! Restart and respawn policies.
//!
//! This module groups the knobs that control **whether** a crashed worker slot is
//! refilled and **how long** to wait before the replacement fork.
//!
//! ## Contents
//! - [`RestartPolicy`]  sliding-window crash-loop breaker (max restarts per window)
//! - [`RestartHistory`] per-slot restart counter carried from a dead worker to its replacement
//! - [`BackoffPolicy`]  delay before a replacement fork (first / factor / max + jitter)
//! - [`JitterPolicy`]   randomization so that simultaneous crashes do not refork in lockstep
//!
//! ## Quick wiring
//! ```text
//! worker exit (crash) ──► RestartPolicy::evaluate(&history, now)
//!                            ├─ Restart(next) ──► BackoffPolicy::next(next.restarts()) ──► fork
//!                            └─ Exhausted     ──► slot abandoned (RestartExhausted event)
//! ```

mod backoff;
mod jitter;
mod restart;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
pub use restart::{RestartDecision, RestartHistory, RestartPolicy};
