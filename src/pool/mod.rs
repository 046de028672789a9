//! # Task pool: CPU-bound work off the request path.
//!
//! A [`TaskPool`] owns a fixed number of Task Units. Each unit is a dedicated OS thread
//! running one [`TaskHandler`] instance; it receives one task at a time and replies with
//! one result.
//!
//! ## Architecture
//! ```text
//! submit(task) ──► [commands] ──► pool actor ──┬─ free unit?  yes ─► unit.jobs ─► thread ─► handler.handle()
//!   (returns                      (owns        │                                              │
//!    Pending)                      all/free/   └─ no ─► queue (FIFO)                           │
//!                                  queue)  ◄──────────── [reports] ◄── Completed / Faulted ◄──┘
//! ```
//!
//! ## Rules
//! - At most `pool_size` tasks are in flight; excess demand is queued FIFO.
//! - A completed unit returns to the free list **before** the oldest queued task is dispatched.
//! - `Err(reason)` from a handler rejects that caller only ([`PoolError::TaskFailed`](crate::PoolError::TaskFailed)).
//! - A handler panic is a fatal fault: the unit is replaced and the in-flight caller gets
//!   [`PoolError::TaskLost`](crate::PoolError::TaskLost). Lost tasks are never retried.
//! - Every submission resolves exactly once.
//! - Only the actor touches the unit collections; callers talk to it by message.

mod gauge;
mod handler;
mod task_pool;
mod unit;

pub use gauge::{PoolGauge, PoolSnapshot};
pub use handler::{HandlerFn, TaskHandler};
pub use task_pool::{Pending, TaskPool};
