//! # Event subscribers for the supervisor.
//!
//! This module provides the [`Subscribe`] trait, the non-blocking [`SubscriberSet`]
//! fan-out and the built-in [`LogWriter`].
//!
//! ## Architecture
//! ```text
//! Supervisor ── publish(Event) ──┬──► Bus (broadcast, external receivers)
//!                                └──► SubscriberSet::emit(&Event)
//!                                        ├──► [queue S1] ─► worker S1 ─► on_event()
//!                                        └──► [queue SN] ─► worker SN ─► on_event()
//! ```
//!
//! ## Implementing custom subscribers
//! ```no_run
//! use async_trait::async_trait;
//! use clustervisor::{Event, EventKind, Subscribe};
//!
//! struct CrashCounter;
//!
//! #[async_trait]
//! impl Subscribe for CrashCounter {
//!     async fn on_event(&self, event: &Event) {
//!         if matches!(event.kind, EventKind::RestartExhausted) {
//!             // page someone
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "crash-counter" }
//! }
//! ```

mod log;
mod set;
mod subscriber;

pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscriber::Subscribe;
