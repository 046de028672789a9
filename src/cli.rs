//! # Command-line and environment configuration.
//!
//! Every flag has an environment fallback so the same binary can be configured either way.
//! Flags win over the environment; both win over the defaults.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use clap::{ArgAction, Parser};

use crate::config::{ClusterConfig, WORKER_SHUTDOWN_TIMEOUT};
use crate::policies::{BackoffPolicy, JitterPolicy, RestartPolicy};

/// Clustered number-crunching server.
#[derive(Parser, Debug, Clone)]
#[command(name = "clustervisor", version)]
#[command(about = "Runs a TCP number cruncher on every core, restarting crashed workers")]
pub struct Cli {
    /// Worker processes to fork (default: one per core, clamped to [1, 2 x cores])
    #[arg(long, env = "WORKER_COUNT")]
    pub workers: Option<usize>,

    /// Crash restarts allowed per worker slot inside one restart window
    #[arg(long, env = "MAX_RESTARTS", default_value_t = 5)]
    pub max_restarts: u32,

    /// Length of the restart window in milliseconds
    #[arg(long, env = "RESTART_WINDOW", default_value_t = 60_000)]
    pub restart_window_ms: u64,

    /// Delay before the first replacement fork in milliseconds, doubling per restart
    /// (0 reforks on the exit itself)
    #[arg(long, env = "RESTART_BACKOFF", default_value_t = 0)]
    pub restart_backoff_ms: u64,

    /// Cap on the replacement delay in milliseconds
    #[arg(long, env = "RESTART_BACKOFF_MAX", default_value_t = 5_000)]
    pub restart_backoff_max_ms: u64,

    /// Jitter on the replacement delay: none, full or equal
    #[arg(long, env = "RESTART_JITTER", default_value_t = JitterPolicy::Equal)]
    pub restart_jitter: JitterPolicy,

    /// Upper bound on the coordinated shutdown in milliseconds
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 30_000)]
    pub shutdown_timeout_ms: u64,

    /// How long a forked worker may take to report ready, in milliseconds
    #[arg(long, env = "WORKER_READY_TIMEOUT", default_value_t = 30_000)]
    pub worker_ready_timeout_ms: u64,

    /// Task units per worker
    #[arg(long, env = "TASK_POOL_SIZE", default_value_t = 4)]
    pub pool_size: usize,

    /// Period of worker health reports in milliseconds (0 disables them)
    #[arg(long, env = "HEALTH_INTERVAL", default_value_t = 30_000)]
    pub health_interval_ms: u64,

    /// Address to listen on
    #[arg(long, env = "HOST", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub host: IpAddr,

    /// Port shared by every worker
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Log filter (overridden by RUST_LOG)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Fork workers (set CLUSTERING=false to run in-process)
    #[arg(long, env = "CLUSTERING", default_value_t = true, action = ArgAction::Set)]
    pub clustering: bool,

    /// Run the server in-process without forking workers
    #[arg(long, default_value_t = false)]
    pub no_cluster: bool,
}

impl Cli {
    /// Whether workers should be forked.
    pub fn clustered(&self) -> bool {
        self.clustering && !self.no_cluster
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Replacement delay; immediate unless `--restart-backoff-ms` is set.
    pub fn restart_backoff(&self) -> BackoffPolicy {
        if self.restart_backoff_ms == 0 {
            return BackoffPolicy::immediate();
        }
        let first = Duration::from_millis(self.restart_backoff_ms);
        BackoffPolicy {
            first,
            max: Duration::from_millis(self.restart_backoff_max_ms).max(first),
            jitter: self.restart_jitter,
            ..BackoffPolicy::default()
        }
    }

    pub fn cluster_config(&self) -> ClusterConfig {
        ClusterConfig {
            workers: self.workers,
            restart: RestartPolicy {
                max_restarts: self.max_restarts,
                window: Duration::from_millis(self.restart_window_ms),
            },
            restart_backoff: self.restart_backoff(),
            shutdown_timeout: Duration::from_millis(self.shutdown_timeout_ms),
            worker_shutdown_timeout: WORKER_SHUTDOWN_TIMEOUT,
            worker_ready_timeout: Duration::from_millis(self.worker_ready_timeout_ms),
            health_interval: Duration::from_millis(self.health_interval_ms),
            pool_size: self.pool_size,
            ..ClusterConfig::default()
        }
    }
}
