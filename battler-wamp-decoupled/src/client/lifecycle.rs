use std::sync::Arc;

use anyhow::Result;
use log::{
    debug,
    info,
};
use tokio::sync::{
    broadcast,
    watch,
};

use crate::{
    decoupler::{
        Decoupler,
        PendingRequestReceiver,
        RequestReceiver,
        SessionState,
    },
    executor::CallbackExecutor,
    session::JoinDetails,
};

/// A handle for stopping an event loop.
///
/// Stopping is idempotent. A stopped event loop finishes the request it is currently serving, if
/// any, and then exits without serving any more requests.
#[derive(Clone)]
pub struct LoopHandle {
    stop_tx: Arc<watch::Sender<bool>>,
}

impl LoopHandle {
    pub fn new() -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            stop_tx: Arc::new(stop_tx),
        }
    }

    /// Stops the event loop.
    ///
    /// Returns `true` if this call stopped the loop, or `false` if it was already stopped.
    pub fn stop(&self) -> bool {
        !self.stop_tx.send_replace(true)
    }

    /// Checks if the event loop was stopped.
    pub fn stopped(&self) -> bool {
        *self.stop_tx.borrow()
    }

    /// Waits until the event loop is stopped.
    pub async fn wait_stopped(&self) {
        let mut stop_rx = self.stop_tx.subscribe();
        // The sender lives as long as this handle, so waiting cannot fail.
        stop_rx.wait_for(|stopped| *stopped).await.ok();
    }
}

impl Default for LoopHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Reacts to lifecycle events of the session driven by an event loop.
#[derive(Clone)]
pub(crate) struct SessionLifecycle {
    name: String,
    decoupler: Decoupler,
    executor: Arc<dyn CallbackExecutor>,
    loop_handle: LoopHandle,
}

impl SessionLifecycle {
    pub fn new(
        name: String,
        decoupler: Decoupler,
        executor: Arc<dyn CallbackExecutor>,
        loop_handle: LoopHandle,
    ) -> Self {
        Self {
            name,
            decoupler,
            executor,
            loop_handle,
        }
    }

    pub fn loop_handle(&self) -> &LoopHandle {
        &self.loop_handle
    }

    /// Opens the request queue and starts the callback executor.
    pub fn on_join(
        &self,
        receiver: PendingRequestReceiver,
        details: &JoinDetails,
    ) -> Result<RequestReceiver> {
        info!(
            "Client {} joined realm {} with session {}",
            self.name, details.realm, details.session_id
        );
        self.executor.start();
        let receiver = receiver.set_joined()?;
        Ok(receiver)
    }

    /// Marks the session as stopping, for a STOP request.
    pub fn on_stop(&self) -> Result<()> {
        self.decoupler.transition(SessionState::Stopping)?;
        Ok(())
    }

    /// Stops the event loop, so that its thread can exit.
    ///
    /// Safe to call any number of times, including after a STOP request already disconnected the
    /// session.
    pub fn on_disconnect(&self) {
        if self.loop_handle.stop() {
            info!(
                "Client {} was disconnected, so its event loop is stopping",
                self.name
            );
        } else {
            debug!(
                "Client {} was disconnected after its event loop stopped",
                self.name
            );
        }
    }

    /// Releases everything the session was holding once the event loop exits.
    pub fn on_terminate(&self) {
        // Idempotent for executors, so it does not matter if a STOP request already stopped it.
        self.executor.stop();
        self.decoupler.terminate();
        info!("Client {} event loop terminated", self.name);
    }
}

/// Forwards the session's disconnection to the lifecycle.
pub(crate) async fn watch_for_disconnect(
    mut disconnected_rx: broadcast::Receiver<()>,
    lifecycle: SessionLifecycle,
) {
    // A closed channel means the session is gone, which is treated the same as a disconnect.
    disconnected_rx.recv().await.ok();
    lifecycle.on_disconnect();
}

#[cfg(test)]
mod lifecycle_test {
    use std::{
        sync::{
            Arc,
            Mutex,
        },
        time::Duration,
    };

    use tokio::sync::broadcast;

    use crate::{
        client::lifecycle::{
            LoopHandle,
            SessionLifecycle,
            watch_for_disconnect,
        },
        core::types::Dictionary,
        decoupler::{
            Decoupler,
            JoinPolicy,
            SessionState,
        },
        executor::{
            Callback,
            CallbackExecutor,
        },
        session::JoinDetails,
    };

    #[derive(Default)]
    struct CountingExecutor {
        starts: Mutex<u32>,
        stops: Mutex<u32>,
    }

    impl CallbackExecutor for CountingExecutor {
        fn start(&self) {
            *self.starts.lock().unwrap() += 1;
        }
        fn stop(&self) {
            *self.stops.lock().unwrap() += 1;
        }
        fn execute(&self, _: Callback, _: Dictionary) {}
    }

    #[test]
    fn stopping_loop_is_idempotent() {
        let handle = LoopHandle::new();
        assert!(!handle.stopped());
        assert!(handle.stop());
        assert!(!handle.stop());
        assert!(handle.clone().stopped());
    }

    #[tokio::test]
    async fn waits_for_loop_to_stop() {
        let handle = LoopHandle::new();
        let waiter = tokio::spawn({
            let handle = handle.clone();
            async move { handle.wait_stopped().await }
        });
        handle.stop();
        assert_matches::assert_matches!(
            tokio::time::timeout(Duration::from_secs(5), waiter).await,
            Ok(Ok(()))
        );
        // Already stopped, so this returns immediately.
        handle.wait_stopped().await;
    }

    #[tokio::test]
    async fn joins_then_terminates() {
        let executor = Arc::new(CountingExecutor::default());
        let (decoupler, receiver) = Decoupler::new("test", JoinPolicy::Queue);
        let lifecycle = SessionLifecycle::new(
            "test".to_owned(),
            decoupler.clone(),
            executor.clone(),
            LoopHandle::new(),
        );

        let receiver = lifecycle
            .on_join(receiver, &JoinDetails::default())
            .unwrap();
        pretty_assertions::assert_eq!(decoupler.state(), SessionState::Serving);
        pretty_assertions::assert_eq!(*executor.starts.lock().unwrap(), 1);

        assert_matches::assert_matches!(lifecycle.on_stop(), Ok(()));
        pretty_assertions::assert_eq!(decoupler.state(), SessionState::Stopping);

        receiver.close();
        lifecycle.on_terminate();
        lifecycle.on_terminate();
        pretty_assertions::assert_eq!(decoupler.state(), SessionState::Terminated);
        pretty_assertions::assert_eq!(*executor.stops.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn disconnect_stops_loop() {
        let (decoupler, _receiver) = Decoupler::new("test", JoinPolicy::Queue);
        let handle = LoopHandle::new();
        let lifecycle = SessionLifecycle::new(
            "test".to_owned(),
            decoupler,
            Arc::new(CountingExecutor::default()),
            handle.clone(),
        );
        let (disconnected_tx, disconnected_rx) = broadcast::channel(1);
        let watcher = tokio::spawn(watch_for_disconnect(disconnected_rx, lifecycle.clone()));

        disconnected_tx.send(()).unwrap();
        assert_matches::assert_matches!(watcher.await, Ok(()));
        assert!(handle.stopped());

        // A second notification, such as one following a STOP request, is harmless.
        lifecycle.on_disconnect();
        assert!(handle.stopped());
    }
}
