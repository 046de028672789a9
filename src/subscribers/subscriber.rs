//! # Event subscriber trait.
//!
//! Each subscriber gets a dedicated worker task and a bounded queue
//! (capacity via [`Subscribe::queue_capacity`]). A slow subscriber only affects its own
//! queue; overflow drops the event for that subscriber only.

use async_trait::async_trait;

use crate::events::Event;

/// Supervisor event subscriber.
///
/// ### Implementation requirements
/// - Use async I/O; avoid blocking the executor.
/// - Handle errors internally; panics are caught and logged.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Processes a single event. Events arrive in FIFO order per subscriber.
    async fn on_event(&self, event: &Event);

    /// Subscriber name used in logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred queue capacity (clamped to a minimum of 1). Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
