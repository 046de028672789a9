//! Supervisor events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to publish
//! supervisor lifecycle events (forks, exits, restarts, shutdown progress).
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publisher**: [`Supervisor`](crate::Supervisor) (every state change of a worker slot).
//! - **Consumers**: the supervisor's [`SubscriberSet`](crate::SubscriberSet)
//!   (e.g. [`LogWriter`](crate::LogWriter)) and any receiver obtained from [`Bus::subscribe`].

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind, ShutdownCause};
