use std::sync::Arc;

use crate::config::{available_cores, ClusterConfig};
use crate::core::{Spawn, Supervisor};
use crate::shutdown::ShutdownHandle;
use crate::subscribers::{Subscribe, SubscriberSet};

/// Builder for constructing a [`Supervisor`].
pub struct SupervisorBuilder<S> {
    cfg: ClusterConfig,
    spawner: S,
    subscribers: Vec<Arc<dyn Subscribe>>,
    cores: Option<usize>,
    handle_signals: bool,
}

impl<S: Spawn> SupervisorBuilder<S> {
    /// Creates a builder that starts workers through `spawner`.
    pub fn new(cfg: ClusterConfig, spawner: S) -> Self {
        Self {
            cfg,
            spawner,
            subscribers: Vec::new(),
            cores: None,
            handle_signals: true,
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive supervisor events through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Overrides the detected core count used for worker-count clamping.
    pub fn with_cores(mut self, cores: usize) -> Self {
        self.cores = Some(cores);
        self
    }

    /// Whether `run()` listens for SIGINT/SIGTERM/SIGQUIT itself (default `true`).
    pub fn handle_signals(mut self, enabled: bool) -> Self {
        self.handle_signals = enabled;
        self
    }

    /// Builds the supervisor. Must be called inside a tokio runtime.
    pub fn build(self) -> Supervisor<S> {
        let subs = SubscriberSet::new(self.subscribers);
        let cores = self.cores.unwrap_or_else(available_cores);
        Supervisor::new_internal(
            self.cfg,
            cores,
            self.spawner,
            subs,
            ShutdownHandle::new(),
            self.handle_signals,
        )
    }
}
