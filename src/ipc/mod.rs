//! Supervisor ⇄ worker lifecycle channel.
//!
//! The control plane between the supervisor and a worker process is a pair of pipes:
//! the worker's stdin carries supervisor → worker messages and its stdout carries
//! worker → supervisor messages. Task data never travels on this channel.
//!
//! ## Contents
//! - [`LifecycleMessage`] tagged union (`ready | health | shutdown | shutdown-complete`)
//! - [`HealthMetrics`] payload of `health`
//! - [`LifecycleCodec`] newline-delimited JSON framing for `tokio_util::codec`
//!
//! ## Wire format
//! ```text
//! {"type":"ready"}
//! {"type":"health","data":{"pid":4242,"uptimeMs":30001,"memory":{"rss":31457280},"pool":{"poolSize":4,"activeUnits":1,"queuedTasks":0}}}
//! {"type":"shutdown"}
//! {"type":"shutdown-complete"}
//! ```

mod codec;
mod message;

pub use codec::LifecycleCodec;
pub use message::{HealthMetrics, LifecycleMessage, MemoryUsage};
