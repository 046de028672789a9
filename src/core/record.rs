use crate::core::WorkerHandle;
use crate::policies::RestartHistory;

/// Supervisor-owned bookkeeping for one live worker.
///
/// Created on fork, mutated on message receipt, removed on exit.
pub(crate) struct WorkerRecord {
    pub(crate) handle: Box<dyn WorkerHandle>,
    /// Restart accounting carried over from the slot this worker refilled.
    pub(crate) history: RestartHistory,
    /// Distinguishes this fork from a later worker that reuses the pid.
    pub(crate) epoch: u64,
    pub(crate) ready: bool,
    /// The supervisor closed the channel on purpose (acknowledged or timed-out shutdown).
    pub(crate) disconnected: bool,
    /// Shutdown no longer waits on this worker.
    pub(crate) settled: bool,
}

impl WorkerRecord {
    pub(crate) fn new(handle: Box<dyn WorkerHandle>, history: RestartHistory, epoch: u64) -> Self {
        Self {
            handle,
            history,
            epoch,
            ready: false,
            disconnected: false,
            settled: false,
        }
    }

    /// Closes the channel from the supervisor side and stops waiting on the worker.
    pub(crate) fn release(&mut self) {
        self.handle.disconnect();
        self.disconnected = true;
        self.settled = true;
    }
}
