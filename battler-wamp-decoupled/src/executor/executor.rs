use std::{
    fmt::Debug,
    panic::AssertUnwindSafe,
    sync::Arc,
};

use log::error;

use crate::core::types::Dictionary;

/// A user callback, invoked with the keyword payload of a call result or published event.
pub type Callback = Arc<dyn Fn(Dictionary) + Send + Sync>;

/// Wraps a closure as a [`Callback`].
pub fn callback<F>(f: F) -> Callback
where
    F: Fn(Dictionary) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Executes user callbacks away from the event loop thread.
///
/// User code may be slow or may enqueue more requests and wait on them, so it must never run on the
/// thread driving the session.
pub trait CallbackExecutor: Send + Sync {
    /// Starts accepting callbacks.
    fn start(&self);

    /// Stops accepting callbacks.
    ///
    /// Must not wait for running callbacks to finish, since a callback may be waiting on the event
    /// loop that calls this method.
    fn stop(&self);

    /// Schedules `callback(payload)` to run asynchronously.
    fn execute(&self, callback: Callback, payload: Dictionary);
}

/// Runs a single callback, containing any panic to the callback itself.
pub(crate) fn run_callback(executor: &str, callback: Callback, payload: Dictionary) {
    if std::panic::catch_unwind(AssertUnwindSafe(|| callback(payload))).is_err() {
        error!("Callback on executor {executor} panicked");
    }
}

/// Wraps an optional user callback with the executor responsible for running it.
#[derive(Clone)]
pub struct CallbackHandler {
    callback: Option<Callback>,
    executor: Arc<dyn CallbackExecutor>,
}

impl CallbackHandler {
    pub fn new(callback: Option<Callback>, executor: Arc<dyn CallbackExecutor>) -> Self {
        Self { callback, executor }
    }

    /// Checks if there is a callback to invoke.
    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    /// Hands the callback and payload off to the executor.
    ///
    /// Does nothing if there is no callback.
    pub fn invoke(&self, payload: Dictionary) {
        if let Some(callback) = &self.callback {
            self.executor.execute(callback.clone(), payload);
        }
    }
}

impl Debug for CallbackHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackHandler")
            .field("callback", &self.callback.is_some())
            .finish()
    }
}
