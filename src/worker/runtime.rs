use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

use crate::config::ClusterConfig;
use crate::error::WorkerError;
use crate::ipc::{LifecycleCodec, LifecycleMessage};
use crate::shutdown::{ShutdownHandle, ShutdownSignals};
use crate::worker::{EntrypointRef, WorkerContext};

/// Runs `entrypoint` as a supervised worker, talking to the supervisor over stdin/stdout.
///
/// Returns once the entrypoint has returned and every outbound message has been written.
pub async fn run_worker(cfg: &ClusterConfig, entrypoint: EntrypointRef) -> Result<(), WorkerError> {
    let _sigint = ignore_interrupts()?;
    run_worker_with(cfg, entrypoint, tokio::io::stdin(), tokio::io::stdout()).await
}

/// [`run_worker`] over arbitrary pipes.
pub async fn run_worker_with<R, W>(
    cfg: &ClusterConfig,
    entrypoint: EntrypointRef,
    input: R,
    output: W,
) -> Result<(), WorkerError>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let shutdown = ShutdownHandle::new();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_lifecycle(output, outbound_rx));
    let reader = tokio::spawn(read_lifecycle(input, shutdown.clone()));

    let ctx = WorkerContext::new(Some(outbound_tx), shutdown.clone());
    let health = cfg
        .health_period()
        .map(|period| tokio::spawn(report_health(ctx.clone(), period)));

    let result = serve(entrypoint, ctx.clone()).await;

    if let Some(h) = health {
        h.abort();
    }
    reader.abort();
    match &result {
        Ok(()) if shutdown.is_shutting_down() => {
            info!("drain finished, acknowledging shutdown");
            ctx.send(LifecycleMessage::ShutdownComplete);
        }
        Ok(()) => info!("entrypoint returned, exiting"),
        Err(e) => warn!(error = %e, label = e.as_label(), "entrypoint failed"),
    }
    ctx.close();
    let _ = writer.await;
    result
}

/// Runs `entrypoint` in-process without a supervisor; OS signals drive the shutdown.
pub async fn run_standalone(entrypoint: EntrypointRef) -> Result<(), WorkerError> {
    let mut signals = ShutdownSignals::new().map_err(|source| WorkerError::Signal { source })?;
    let shutdown = ShutdownHandle::new();
    let trigger = shutdown.clone();
    let watcher = tokio::spawn(async move {
        let name = signals.recv().await;
        trigger.trigger(name);
    });

    info!("running without clustering");
    let result = serve(entrypoint, WorkerContext::detached(shutdown)).await;
    watcher.abort();
    result
}

/// Drives the entrypoint on its own task so a panic becomes an error.
async fn serve(entrypoint: EntrypointRef, ctx: WorkerContext) -> Result<(), WorkerError> {
    match tokio::spawn(entrypoint.start(ctx)).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(WorkerError::Panicked {
            info: crate::panic_message(e.into_panic().as_ref()),
        }),
        Err(e) => Err(WorkerError::Panicked {
            info: e.to_string(),
        }),
    }
}

#[cfg(unix)]
fn ignore_interrupts() -> Result<tokio::signal::unix::Signal, WorkerError> {
    use tokio::signal::unix::{signal, SignalKind};
    signal(SignalKind::interrupt()).map_err(|source| WorkerError::Signal { source })
}

#[cfg(not(unix))]
fn ignore_interrupts() -> Result<(), WorkerError> {
    Ok(())
}

async fn read_lifecycle<R: AsyncRead + Unpin>(input: R, shutdown: ShutdownHandle) {
    let mut frames = FramedRead::new(input, LifecycleCodec::new());
    while let Some(frame) = frames.next().await {
        match frame {
            Ok(LifecycleMessage::Shutdown) => {
                info!("shutdown requested by supervisor");
                shutdown.trigger("supervisor request");
            }
            Ok(other) => debug!(kind = other.label(), "ignoring lifecycle message"),
            Err(e) => {
                warn!(error = %e, "lifecycle channel read failed");
                break;
            }
        }
    }
    if !shutdown.is_shutting_down() {
        info!("supervisor disconnected, shutting down");
        shutdown.trigger("supervisor disconnected");
    }
}

async fn write_lifecycle<W: AsyncWrite + Unpin>(
    output: W,
    mut messages: mpsc::UnboundedReceiver<LifecycleMessage>,
) {
    let mut sink = FramedWrite::new(output, LifecycleCodec::new());
    while let Some(message) = messages.recv().await {
        let kind = message.label();
        if let Err(e) = sink.send(message).await {
            warn!(kind, error = %e, "lifecycle channel write failed");
            break;
        }
    }
}

async fn report_health(ctx: WorkerContext, period: Duration) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if ctx.is_shutting_down() {
            break;
        }
        ctx.send(LifecycleMessage::Health { data: ctx.health() });
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines};

    use super::*;
    use crate::pool::{HandlerFn, TaskPool};
    use crate::worker::EntrypointFn;

    fn quiet() -> ClusterConfig {
        ClusterConfig {
            health_interval: Duration::ZERO,
            ..ClusterConfig::default()
        }
    }

    struct Pipes {
        to_worker: DuplexStream,
        from_worker: Lines<BufReader<DuplexStream>>,
    }

    fn spawn_worker(
        cfg: ClusterConfig,
        entrypoint: EntrypointRef,
    ) -> (Pipes, tokio::task::JoinHandle<Result<(), WorkerError>>) {
        let (to_worker, worker_in) = duplex(1024);
        let (worker_out, from_worker) = duplex(1024);
        let join = tokio::spawn(async move {
            run_worker_with(&cfg, entrypoint, worker_in, worker_out).await
        });
        let pipes = Pipes {
            to_worker,
            from_worker: BufReader::new(from_worker).lines(),
        };
        (pipes, join)
    }

    async fn next_line(pipes: &mut Pipes) -> Option<String> {
        pipes.from_worker.next_line().await.expect("read")
    }

    fn drainer() -> EntrypointRef {
        EntrypointFn::arc(|ctx: WorkerContext| async move {
            ctx.ready();
            ctx.shutdown_requested().await;
            Ok::<(), WorkerError>(())
        })
    }

    #[tokio::test]
    async fn ready_then_acknowledged_shutdown() {
        let (mut pipes, join) = spawn_worker(quiet(), drainer());

        assert_eq!(next_line(&mut pipes).await.as_deref(), Some(r#"{"type":"ready"}"#));
        pipes
            .to_worker
            .write_all(b"{\"type\":\"shutdown\"}\n")
            .await
            .expect("write");

        assert_eq!(
            next_line(&mut pipes).await.as_deref(),
            Some(r#"{"type":"shutdown-complete"}"#)
        );
        assert_eq!(next_line(&mut pipes).await, None);
        join.await.expect("join").expect("worker");
    }

    #[tokio::test]
    async fn closed_channel_counts_as_shutdown() {
        let (mut pipes, join) = spawn_worker(quiet(), drainer());
        assert_eq!(next_line(&mut pipes).await.as_deref(), Some(r#"{"type":"ready"}"#));

        drop(pipes.to_worker);
        join.await.expect("join").expect("worker");
        assert_eq!(
            pipes.from_worker.next_line().await.expect("read").as_deref(),
            Some(r#"{"type":"shutdown-complete"}"#)
        );
    }

    #[tokio::test]
    async fn panicking_entrypoint_fails_without_acknowledging() {
        let ep: EntrypointRef = EntrypointFn::arc(|_ctx: WorkerContext| async move {
            if true {
                panic!("bind exploded");
            }
            Ok::<(), WorkerError>(())
        });
        let (mut pipes, join) = spawn_worker(quiet(), ep);

        let err = join.await.expect("join").unwrap_err();
        assert!(matches!(err, WorkerError::Panicked { ref info } if info.contains("bind exploded")));
        assert_eq!(next_line(&mut pipes).await, None);
    }

    #[tokio::test]
    async fn failing_entrypoint_is_reported() {
        let ep: EntrypointRef = EntrypointFn::arc(|_ctx: WorkerContext| async move {
            Err::<(), _>(WorkerError::Entrypoint {
                error: "no port".into(),
            })
        });
        let (_pipes, join) = spawn_worker(quiet(), ep);
        let err = join.await.expect("join").unwrap_err();
        assert_eq!(err.as_label(), "worker_entrypoint_failed");
    }

    #[tokio::test(start_paused = true)]
    async fn health_reports_carry_pool_occupancy() {
        let cfg = ClusterConfig {
            health_interval: Duration::from_secs(1),
            ..ClusterConfig::default()
        };
        let ep: EntrypointRef = EntrypointFn::arc(|ctx: WorkerContext| async move {
            let pool: TaskPool<u32, u32> = TaskPool::new(2, || HandlerFn::new(|n: u32| Ok(n)))?;
            ctx.attach_pool(pool.gauge());
            ctx.ready();
            ctx.shutdown_requested().await;
            pool.terminate().await;
            Ok::<(), WorkerError>(())
        });
        let (mut pipes, join) = spawn_worker(cfg, ep);

        assert_eq!(next_line(&mut pipes).await.as_deref(), Some(r#"{"type":"ready"}"#));
        let line = next_line(&mut pipes).await.expect("health");
        match serde_json::from_str::<LifecycleMessage>(&line).expect("json") {
            LifecycleMessage::Health { data } => {
                assert_eq!(data.pid, std::process::id());
                assert!(data.uptime_ms >= 1000);
                assert_eq!(data.pool.map(|p| p.pool_size), Some(2));
                #[cfg(target_os = "linux")]
                assert!(data.memory.is_some());
            }
            other => panic!("unexpected {other:?}"),
        }

        pipes
            .to_worker
            .write_all(b"{\"type\":\"shutdown\"}\n")
            .await
            .expect("write");

        let mut last = None;
        while let Some(line) = next_line(&mut pipes).await {
            last = Some(line);
        }
        assert_eq!(last.as_deref(), Some(r#"{"type":"shutdown-complete"}"#));
        join.await.expect("join").expect("worker");
    }
}
