use serde::{Deserialize, Serialize};

use crate::pool::PoolSnapshot;

/// Control-plane message exchanged between the supervisor and one worker.
///
/// Within one worker the channel preserves send order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum LifecycleMessage {
    /// Worker → supervisor: the serving instance is bound and accepting work.
    Ready,
    /// Worker → supervisor: periodic health report.
    Health {
        /// Reported metrics.
        data: HealthMetrics,
    },
    /// Supervisor → worker: drain and exit.
    Shutdown,
    /// Worker → supervisor: drain finished, about to exit.
    ShutdownComplete,
}

impl LifecycleMessage {
    /// Short label used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            LifecycleMessage::Ready => "ready",
            LifecycleMessage::Health { .. } => "health",
            LifecycleMessage::Shutdown => "shutdown",
            LifecycleMessage::ShutdownComplete => "shutdown-complete",
        }
    }
}

/// Payload of [`LifecycleMessage::Health`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthMetrics {
    /// Worker process id.
    pub pid: u32,
    /// Time since the worker runtime started.
    pub uptime_ms: u64,
    /// Process memory, where the platform reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemoryUsage>,
    /// Task pool occupancy, if the entrypoint attached one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool: Option<PoolSnapshot>,
}

/// Memory figures of a worker process, in bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryUsage {
    /// Resident set size.
    pub rss: u64,
}
