//! # Graceful-shutdown coordination shared by both tiers.
//!
//! - [`ShutdownSignals`] completes when the process receives a termination signal.
//! - [`ShutdownHandle`] is an idempotent, cloneable trigger: the first [`ShutdownHandle::trigger`]
//!   wins and cancels the token, every later call is a logged no-op.
//!
//! The supervisor uses a handle to enter `ShuttingDown` exactly once, whether the request
//! comes from SIGINT/SIGTERM, from an embedding application or from an internal fault.
//! A worker uses one to fold the three ways it can be asked to stop (a `shutdown` message,
//! the supervisor closing the channel, a signal in standalone mode) into a single edge.
//!
//! ## Signals
//! **Unix platforms:** `SIGINT`, `SIGTERM`, `SIGQUIT`
//!
//! **Other platforms:** `Ctrl-C` via [`tokio::signal::ctrl_c`]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Registered termination-signal listeners.
///
/// Registration happens in [`ShutdownSignals::new`], so a failure surfaces before the
/// caller starts waiting.
#[cfg(unix)]
pub struct ShutdownSignals {
    sigint: tokio::signal::unix::Signal,
    sigterm: tokio::signal::unix::Signal,
    sigquit: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl ShutdownSignals {
    /// Installs listeners for `SIGINT`, `SIGTERM` and `SIGQUIT`.
    pub fn new() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            sigint: signal(SignalKind::interrupt())?,
            sigterm: signal(SignalKind::terminate())?,
            sigquit: signal(SignalKind::quit())?,
        })
    }

    /// Completes on the next signal and returns its name.
    pub async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.sigint.recv()  => "SIGINT",
            _ = self.sigterm.recv() => "SIGTERM",
            _ = self.sigquit.recv() => "SIGQUIT",
        }
    }
}

/// Registered Ctrl-C listener.
#[cfg(not(unix))]
pub struct ShutdownSignals(());

#[cfg(not(unix))]
impl ShutdownSignals {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self(()))
    }

    pub async fn recv(&mut self) -> &'static str {
        let _ = tokio::signal::ctrl_c().await;
        "ctrl-c"
    }
}

/// Idempotent shutdown trigger.
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone, Debug, Default)]
pub struct ShutdownHandle {
    token: CancellationToken,
    started: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// Creates a handle in the "running" state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests shutdown.
    ///
    /// Returns `true` for the call that actually started the shutdown and `false`
    /// (with a warning) for every later call.
    pub fn trigger(&self, reason: &str) -> bool {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(reason, "shutdown already in progress");
            return false;
        }
        self.token.cancel();
        true
    }

    /// True once any clone has triggered.
    pub fn is_shutting_down(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Completes once shutdown has been triggered.
    pub async fn triggered(&self) {
        self.token.cancelled().await
    }

    /// Token cancelled when shutdown is triggered.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}
