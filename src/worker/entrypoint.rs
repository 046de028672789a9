//! # Entrypoint abstraction.
//!
//! An [`Entrypoint`] starts one serving instance. It receives a [`WorkerContext`], calls
//! [`WorkerContext::ready`] once it is bound and accepting work, and returns after it has
//! drained in response to [`WorkerContext::shutdown_requested`].
//!
//! ## Example
//! ```rust
//! use clustervisor::{EntrypointFn, EntrypointRef, WorkerContext, WorkerError};
//!
//! let ep: EntrypointRef = EntrypointFn::arc(|ctx: WorkerContext| async move {
//!     ctx.ready();
//!     ctx.shutdown_requested().await;
//!     Ok::<_, WorkerError>(())
//! });
//! # let _ = ep;
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::WorkerError;
use crate::worker::WorkerContext;

/// Future returned by [`Entrypoint::start`].
pub type BoxEntrypointFuture = Pin<Box<dyn Future<Output = Result<(), WorkerError>> + Send + 'static>>;

/// Shared entrypoint handle.
pub type EntrypointRef = Arc<dyn Entrypoint>;

/// Starts one serving instance inside a worker (or in-process in standalone mode).
pub trait Entrypoint: Send + Sync + 'static {
    /// Creates the serving future. Called once per process.
    fn start(&self, ctx: WorkerContext) -> BoxEntrypointFuture;
}

/// Closure-backed entrypoint.
#[derive(Debug)]
pub struct EntrypointFn<F> {
    f: F,
}

impl<F> EntrypointFn<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Creates the entrypoint and returns it as a shared handle.
    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }
}

impl<F, Fut> Entrypoint for EntrypointFn<F>
where
    F: Fn(WorkerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), WorkerError>> + Send + 'static,
{
    fn start(&self, ctx: WorkerContext) -> BoxEntrypointFuture {
        Box::pin((self.f)(ctx))
    }
}
