use std::{
    sync::{
        Mutex,
        MutexGuard,
        atomic::{
            AtomicBool,
            Ordering,
        },
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

use crate::{
    core::types::Dictionary,
    executor::{
        Callback,
        CallbackExecutor,
        executor::run_callback,
    },
};

/// A [`CallbackExecutor`] that runs every callback on its own thread.
///
/// Callbacks run concurrently, so no ordering is guaranteed between them.
pub struct ThreadPerCallbackExecutor {
    name: String,
    running: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadPerCallbackExecutor {
    /// Creates a new executor.
    ///
    /// The name is used for every callback thread.
    pub fn new<S>(name: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            name: name.into(),
            running: AtomicBool::new(false),
            workers: Mutex::new(Vec::new()),
        }
    }

    fn lock_workers(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.workers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Checks if the executor is accepting callbacks.
    pub fn running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stops the executor and waits for all callback threads to finish.
    ///
    /// Must not be called from a callback running on this executor.
    pub fn join(&self) -> Result<()> {
        self.stop();
        let workers = std::mem::take(&mut *self.lock_workers());
        let mut panicked = 0;
        for worker in workers {
            if worker.thread().id() == std::thread::current().id() {
                continue;
            }
            if worker.join().is_err() {
                panicked += 1;
            }
        }
        if panicked > 0 {
            return Err(Error::msg(format!(
                "{panicked} callback thread(s) of executor {} panicked",
                self.name
            )));
        }
        Ok(())
    }
}

impl Default for ThreadPerCallbackExecutor {
    fn default() -> Self {
        Self::new("callback")
    }
}

impl CallbackExecutor for ThreadPerCallbackExecutor {
    fn start(&self) {
        self.running.store(true, Ordering::Release);
    }

    fn stop(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            debug!("Executor {} stopped accepting callbacks", self.name);
        }
    }

    fn execute(&self, callback: Callback, payload: Dictionary) {
        if !self.running() {
            debug!(
                "Executor {} is not running, so callback was dropped",
                self.name
            );
            return;
        }

        let name = self.name.clone();
        match std::thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || run_callback(&name, callback, payload))
        {
            Ok(worker) => {
                let mut workers = self.lock_workers();
                workers.retain(|worker| !worker.is_finished());
                workers.push(worker);
            }
            Err(err) => error!("Failed to spawn callback thread for {}: {err}", self.name),
        }
    }
}

impl Drop for ThreadPerCallbackExecutor {
    fn drop(&mut self) {
        if let Err(err) = self.join() {
            error!("{err}");
        }
    }
}
