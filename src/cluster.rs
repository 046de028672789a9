//! # Role dispatch.
//!
//! The same binary plays three roles:
//!
//! ```text
//! clustered, no CLUSTERVISOR_WORKER ─► Primary    : Supervisor + ProcessSpawner (re-exec self)
//! clustered, CLUSTERVISOR_WORKER=1  ─► Worker     : run_worker(entrypoint) over stdin/stdout
//! not clustered                     ─► Standalone : run_standalone(entrypoint), OS signals
//! ```

use std::sync::Arc;

use tracing::{error, info};

use crate::config::{available_cores, ClusterConfig};
use crate::core::{ProcessSpawner, Spawn, Supervisor, SupervisorBuilder, WORKER_ROLE_ENV};
use crate::error::{ClusterError, SupervisorError};
use crate::subscribers::{LogWriter, Subscribe};
use crate::worker::{run_standalone, run_worker, EntrypointRef};

/// Which part this process plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Primary,
    Worker,
    Standalone,
}

impl Role {
    /// Resolves the role from the clustering switch and the worker marker.
    pub fn resolve(clustered: bool, worker_marker: bool) -> Self {
        match (clustered, worker_marker) {
            (false, _) => Role::Standalone,
            (true, true) => Role::Worker,
            (true, false) => Role::Primary,
        }
    }

    /// Resolves the role of the current process.
    pub fn detect(clustered: bool) -> Self {
        Self::resolve(clustered, std::env::var_os(WORKER_ROLE_ENV).is_some())
    }
}

/// Runs this process in its role until it is done.
///
/// The primary supervises workers that re-execute this binary, so `entrypoint` only runs in
/// workers and in standalone mode.
pub async fn launch(
    cfg: ClusterConfig,
    clustered: bool,
    entrypoint: EntrypointRef,
) -> Result<(), ClusterError> {
    let role = Role::detect(clustered);
    info!(?role, pid = std::process::id(), "starting");
    match role {
        Role::Standalone => run_standalone(entrypoint).await?,
        Role::Worker => run_worker(&cfg, entrypoint).await?,
        Role::Primary => {
            let spawner = ProcessSpawner::current()?;
            let requested = cfg.requested_workers(available_cores());
            let subscribers: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
            let supervisor = SupervisorBuilder::new(cfg, spawner)
                .with_subscribers(subscribers)
                .build();
            supervise(supervisor, requested).await?;
        }
    }
    Ok(())
}

/// Starts and runs `supervisor` on its own task.
///
/// A panic drops the worker table, which closes every worker's stdin; the workers see EOF
/// and drain on their own. The panic comes back as [`SupervisorError::Panicked`].
async fn supervise<S: Spawn>(
    mut supervisor: Supervisor<S>,
    requested: usize,
) -> Result<(), SupervisorError> {
    let shutdown = supervisor.shutdown_handle();
    let task = tokio::spawn(async move {
        supervisor.start(requested).await?;
        supervisor.run().await
    });
    match task.await {
        Ok(result) => result,
        Err(e) => {
            shutdown.trigger("supervisor fault");
            let info = if e.is_panic() {
                crate::panic_message(e.into_panic().as_ref())
            } else {
                e.to_string()
            };
            error!(info, "supervisor panicked, worker channels closed");
            Err(SupervisorError::Panicked { info })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use tokio::sync::mpsc;

    use super::*;
    use crate::core::{StopSignal, WorkerEvent, WorkerHandle, WorkerId};
    use crate::ipc::LifecycleMessage;

    /// Hands out one worker, then panics.
    struct Exploding {
        calls: usize,
        released: Arc<AtomicBool>,
    }

    struct Tracked {
        released: Arc<AtomicBool>,
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    impl WorkerHandle for Tracked {
        fn id(&self) -> WorkerId {
            7
        }

        fn send(&mut self, _message: LifecycleMessage) -> Result<(), SupervisorError> {
            Ok(())
        }

        fn disconnect(&mut self) {}

        fn is_connected(&self) -> bool {
            true
        }

        fn signal(&self, _signal: StopSignal) -> Result<(), SupervisorError> {
            Ok(())
        }
    }

    impl Spawn for Exploding {
        fn spawn(
            &mut self,
            _events: mpsc::UnboundedSender<WorkerEvent>,
        ) -> Result<Box<dyn WorkerHandle>, SupervisorError> {
            self.calls += 1;
            if self.calls > 1 {
                panic!("spawner exploded");
            }
            Ok(Box::new(Tracked {
                released: self.released.clone(),
            }))
        }
    }

    #[tokio::test]
    async fn supervisor_panic_is_an_error_and_releases_workers() {
        let released = Arc::new(AtomicBool::new(false));
        let spawner = Exploding {
            calls: 0,
            released: released.clone(),
        };
        let supervisor = SupervisorBuilder::new(ClusterConfig::default(), spawner)
            .with_cores(2)
            .handle_signals(false)
            .build();

        let err = supervise(supervisor, 2).await.unwrap_err();
        assert!(matches!(err, SupervisorError::Panicked { ref info } if info.contains("spawner exploded")));
        assert_eq!(err.as_label(), "supervisor_panicked");
        assert!(released.load(Ordering::SeqCst), "worker handle dropped by the unwind");

        let err: ClusterError = err.into();
        assert_eq!(err.as_label(), "supervisor_panicked");
    }

    #[test]
    fn roles() {
        assert_eq!(Role::resolve(false, false), Role::Standalone);
        assert_eq!(Role::resolve(false, true), Role::Standalone);
        assert_eq!(Role::resolve(true, true), Role::Worker);
        assert_eq!(Role::resolve(true, false), Role::Primary);
    }
}
