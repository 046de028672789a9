//! Clustered TCP number cruncher.
//!
//! Every worker binds the same port and answers one JSON line per request:
//!
//! ```text
//! > {"number":10}            (or just: 10)
//! < {"input":10,"factorial":3628800,"fibonacci":55,"isPrime":false,"thread":"task-unit-0"}
//! ```

use std::io;
use std::net::SocketAddr;

use anyhow::Context;
use clap::Parser;
use futures::{SinkExt, StreamExt};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::codec::{Framed, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use clustervisor::{
    launch, Cli, EntrypointFn, EntrypointRef, NumberCruncher, NumberReport, NumberTask, TaskPool,
    WorkerContext, WorkerError,
};

const MAX_LINE: usize = 1024;
const BACKLOG: i32 = 1024;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let code = match run(cli).await {
        Ok(()) => 0,
        Err(e) => {
            error!(error = format!("{e:#}"), "exiting with failure");
            1
        }
    };
    // A worker's stdin reader may still sit in a blocking read; leave without waiting on it.
    std::process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let cfg = cli.cluster_config();
    let entrypoint = number_server(cli.listen_addr(), cfg.pool_size_clamped());
    launch(cfg, cli.clustered(), entrypoint)
        .await
        .context("clustervisor failed")
}

/// Logs go to stderr; stdout belongs to the lifecycle channel in workers.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn number_server(addr: SocketAddr, pool_size: usize) -> EntrypointRef {
    EntrypointFn::arc(move |ctx: WorkerContext| async move {
        let listener = bind_shared(addr).map_err(|source| WorkerError::Bind { addr, source })?;
        let pool: TaskPool<NumberTask, NumberReport> = TaskPool::new(pool_size, NumberCruncher::new)?;
        ctx.attach_pool(pool.gauge());
        info!(%addr, pool_size = pool.pool_size(), "listening");
        ctx.ready();

        let stop = ctx.token();
        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        connections.spawn(serve_connection(stream, peer, pool.clone(), stop.clone()));
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        drop(listener);
        info!(open = connections.len(), "stopped accepting, draining connections");
        while connections.join_next().await.is_some() {}
        pool.terminate().await;
        Ok(())
    })
}

/// Binds `addr` with `SO_REUSEPORT` so every worker can listen on the same port.
fn bind_shared(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
    socket.set_reuse_port(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(BACKLOG)?;
    TcpListener::from_std(socket.into())
}

/// Answers requests until the peer hangs up or shutdown begins. A request already being
/// computed is answered before the connection closes.
async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    pool: TaskPool<NumberTask, NumberReport>,
    stop: CancellationToken,
) {
    let mut lines = Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE));
    loop {
        let line = tokio::select! {
            _ = stop.cancelled() => break,
            line = lines.next() => line,
        };
        let line = match line {
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                debug!(%peer, error = %e, "dropping connection");
                break;
            }
            None => break,
        };

        let reply = match parse_request(&line) {
            Ok(task) => match pool.submit(task).await {
                Ok(report) => render(&report),
                Err(e) => error_line(&e.to_string()),
            },
            Err(reason) => error_line(&reason),
        };
        if let Err(e) = lines.send(reply).await {
            debug!(%peer, error = %e, "reply failed");
            break;
        }
    }
}

/// Accepts `{"number":N}` or a bare integer.
fn parse_request(line: &str) -> Result<NumberTask, String> {
    let line = line.trim();
    if line.is_empty() {
        return Err("empty request".to_string());
    }
    if let Ok(number) = line.parse::<u64>() {
        return Ok(NumberTask { number });
    }
    serde_json::from_str::<NumberTask>(line).map_err(|e| format!("invalid request: {e}"))
}

fn render(report: &NumberReport) -> String {
    serde_json::to_string(report).unwrap_or_else(|e| error_line(&e.to_string()))
}

fn error_line(reason: &str) -> String {
    serde_json::json!({ "error": reason }).to_string()
}
