//! # Worker process runtime.
//!
//! A worker is the current binary re-executed with [`WORKER_ROLE_ENV`](crate::WORKER_ROLE_ENV)
//! set. It runs one [`Entrypoint`] and speaks the lifecycle protocol with the supervisor
//! over its stdin/stdout:
//!
//! ```text
//! entrypoint binds ─► ctx.ready()        ─► {"type":"ready"}
//! every health_interval                  ─► {"type":"health","data":{pid,uptimeMs,memory,pool}}
//! {"type":"shutdown"} or stdin EOF       ─► ctx.shutdown_requested() resolves
//! entrypoint drains and returns Ok       ─► {"type":"shutdown-complete"}, exit 0
//! entrypoint fails / panics              ─► exit 1
//! ```
//!
//! `SIGINT` is ignored in workers: a terminal Ctrl-C reaches the whole process group and
//! the supervisor coordinates the shutdown.

mod context;
mod entrypoint;
mod memory;
mod runtime;

pub use context::WorkerContext;
pub use entrypoint::{BoxEntrypointFuture, Entrypoint, EntrypointFn, EntrypointRef};
pub use runtime::{run_standalone, run_worker, run_worker_with};
