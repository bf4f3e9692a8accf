use std::{
    sync::{
        Mutex,
        MutexGuard,
    },
    thread::JoinHandle,
};

use anyhow::{
    Error,
    Result,
};
use log::{
    debug,
    error,
};
use tokio::sync::mpsc::{
    UnboundedReceiver,
    UnboundedSender,
    unbounded_channel,
};

use crate::{
    core::types::Dictionary,
    executor::{
        Callback,
        CallbackExecutor,
        executor::run_callback,
    },
};

struct Job {
    callback: Callback,
    payload: Dictionary,
}

#[derive(Default)]
struct WorkerState {
    job_tx: Option<UnboundedSender<Job>>,
    worker: Option<JoinHandle<()>>,
}

/// A [`CallbackExecutor`] that runs all callbacks, one at a time, on a single worker thread.
///
/// Callbacks run in the order they were scheduled. Stopping the executor closes the job queue;
/// callbacks that were already scheduled still run before the worker exits.
pub struct SequentialCallbackExecutor {
    name: String,
    state: Mutex<WorkerState>,
}

impl SequentialCallbackExecutor {
    /// Creates a new executor.
    ///
    /// The name is used for the worker thread.
    pub fn new<S>(name: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            name: name.into(),
            state: Mutex::new(WorkerState::default()),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, WorkerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Checks if the executor is accepting callbacks.
    pub fn running(&self) -> bool {
        self.lock_state().job_tx.is_some()
    }

    /// Stops the executor and waits for all scheduled callbacks to finish.
    ///
    /// Must not be called from a callback running on this executor.
    pub fn join(&self) -> Result<()> {
        let worker = {
            let mut state = self.lock_state();
            state.job_tx.take();
            state.worker.take()
        };
        match worker {
            Some(worker) if worker.thread().id() == std::thread::current().id() => Ok(()),
            Some(worker) => worker
                .join()
                .map_err(|_| Error::msg(format!("executor {} worker panicked", self.name))),
            None => Ok(()),
        }
    }

    fn work(name: String, mut job_rx: UnboundedReceiver<Job>) {
        while let Some(job) = job_rx.blocking_recv() {
            run_callback(&name, job.callback, job.payload);
        }
        debug!("Executor {name} worker finished");
    }
}

impl Default for SequentialCallbackExecutor {
    fn default() -> Self {
        Self::new("callback-executor")
    }
}

impl CallbackExecutor for SequentialCallbackExecutor {
    fn start(&self) {
        let mut state = self.lock_state();
        if state.job_tx.is_some() {
            return;
        }

        let (job_tx, job_rx) = unbounded_channel();
        let name = self.name.clone();
        match std::thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || Self::work(name, job_rx))
        {
            Ok(worker) => {
                // A previous worker may still be draining its queue. It exits on its own.
                state.job_tx = Some(job_tx);
                state.worker = Some(worker);
            }
            Err(err) => error!("Failed to start executor {}: {err}", self.name),
        }
    }

    fn stop(&self) {
        if self.lock_state().job_tx.take().is_some() {
            debug!("Executor {} stopped accepting callbacks", self.name);
        }
    }

    fn execute(&self, callback: Callback, payload: Dictionary) {
        match &self.lock_state().job_tx {
            Some(job_tx) => {
                if job_tx.send(Job { callback, payload }).is_err() {
                    error!("Executor {} worker exited unexpectedly", self.name);
                }
            }
            None => debug!(
                "Executor {} is not running, so callback was dropped",
                self.name
            ),
        }
    }
}

impl Drop for SequentialCallbackExecutor {
    fn drop(&mut self) {
        if let Err(err) = self.join() {
            error!("{err}");
        }
    }
}
