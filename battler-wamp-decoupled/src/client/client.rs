use std::{
    sync::Arc,
    thread::JoinHandle,
    time::Duration,
};

use anyhow::{
    Context,
    Error,
    Result,
};
use log::{
    error,
    info,
};

use crate::{
    client::{
        DecoupledClientConfig,
        LoopHandle,
        dispatch::SessionLoop,
    },
    core::{
        id::Id,
        types::Dictionary,
        uri::Uri,
    },
    decoupler::{
        Call,
        ClientNotRunningError,
        Decoupler,
        Request,
        RequestCanceledError,
        RequestFuture,
        SessionState,
        Subscribe,
        Unsubscribe,
    },
    executor::{
        Callback,
        CallbackExecutor,
    },
    session::{
        Session,
        SubscriptionHandle,
    },
};

/// A WAMP client usable from ordinary threads.
///
/// The session is owned by an event loop running on a dedicated thread. Any number of producer
/// threads enqueue requests through the client and receive a [`RequestFuture`] for each one,
/// which they may block on or await.
///
/// Call [`Self::disconnect`] for a graceful shutdown. Dropping the client stops the event loop
/// without disconnecting the session, after the request being served (if any) finishes.
pub struct DecoupledClient {
    name: String,
    decoupler: Decoupler,
    loop_handle: LoopHandle,
    loop_thread: Option<JoinHandle<()>>,
}

impl DecoupledClient {
    /// Starts the event loop for the session on a new thread.
    ///
    /// Returns immediately. The session connects and joins in the background; requests enqueued
    /// in the meantime are handled according to the configured join policy.
    pub fn start<S>(
        session: S,
        executor: Arc<dyn CallbackExecutor>,
        config: DecoupledClientConfig,
    ) -> Result<Self>
    where
        S: Session + 'static,
    {
        config.validate()?;
        let (decoupler, receiver) = Decoupler::new(config.name.clone(), config.join_policy);
        let loop_handle = LoopHandle::new();
        let session_loop = SessionLoop::new(
            &config,
            session,
            decoupler.clone(),
            executor,
            loop_handle.clone(),
        );

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to build event loop runtime")?;
        let loop_thread = std::thread::Builder::new()
            .name(config.name.clone())
            .spawn(move || runtime.block_on(session_loop.run(receiver)))
            .context("failed to spawn event loop thread")?;
        info!("Client {} started", config.name);

        Ok(Self {
            name: config.name,
            decoupler,
            loop_handle,
            loop_thread: Some(loop_thread),
        })
    }

    /// The name of the client.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The current state of the session.
    pub fn state(&self) -> SessionState {
        self.decoupler.state()
    }

    /// Checks if the session is joined and serving requests.
    pub fn is_joined(&self) -> bool {
        self.state() == SessionState::Serving
    }

    /// Blocks until the session joins.
    pub fn wait_until_joined(&self, timeout: Duration) -> Result<()> {
        self.decoupler.wait_until_joined(timeout)
    }

    /// Blocks until the event loop terminates.
    ///
    /// Returns `false` if the timeout elapses first.
    pub fn wait_until_terminated(&self, timeout: Duration) -> bool {
        self.decoupler.wait_until_terminated(timeout)
    }

    /// A handle for stopping the event loop directly.
    pub fn loop_handle(&self) -> LoopHandle {
        self.loop_handle.clone()
    }

    /// Enqueues a request built with one of the [`Request`] constructors.
    pub fn enqueue(&self, request: Request) -> Result<Id> {
        self.decoupler.enqueue(request)
    }

    fn submit<T>(&self, (request, future): (Request, RequestFuture<T>)) -> Result<RequestFuture<T>> {
        self.enqueue(request)?;
        Ok(future)
    }

    /// Calls a procedure.
    ///
    /// The future resolves to the keyword arguments of the result.
    pub fn call(
        &self,
        procedure: Uri,
        kwargs: Dictionary,
    ) -> Result<RequestFuture<Option<Dictionary>>> {
        self.submit(Request::call(Call::new(procedure).with_kwargs(kwargs)))
    }

    /// Calls a procedure, invoking the callback with the keyword arguments of the result on the
    /// callback executor.
    pub fn call_with_callback(
        &self,
        procedure: Uri,
        kwargs: Dictionary,
        callback: Callback,
    ) -> Result<RequestFuture<Option<Dictionary>>> {
        self.submit(Request::call(
            Call::new(procedure)
                .with_kwargs(kwargs)
                .with_callback(callback),
        ))
    }

    /// Subscribes to a topic, invoking the callback with the keyword arguments of every event on
    /// the callback executor.
    pub fn subscribe(
        &self,
        topic: Uri,
        options: Dictionary,
        callback: Callback,
    ) -> Result<RequestFuture<Option<SubscriptionHandle>>> {
        self.submit(Request::subscribe(
            Subscribe::new(topic)
                .with_options(options)
                .with_callback(callback),
        ))
    }

    /// Unsubscribes from a subscription.
    ///
    /// The future resolves to `false` if the subscription could not be removed.
    pub fn unsubscribe(&self, subscription: SubscriptionHandle) -> Result<RequestFuture<bool>> {
        self.submit(Request::unsubscribe(Unsubscribe::new(subscription)))
    }

    /// Enqueues a STOP request, without waiting for it.
    pub fn stop(&self) -> Result<RequestFuture<Option<bool>>> {
        self.submit(Request::stop())
    }

    /// Stops the client gracefully, disconnecting the session and waiting for the event loop
    /// thread to exit.
    ///
    /// Returns `false` if the client was already stopping or terminated. Blocks, so it must not be
    /// called from within an asynchronous runtime.
    pub fn disconnect(&mut self) -> Result<bool> {
        let stopped = match self.stop() {
            Ok(future) => match future.wait() {
                Ok(stopped) => stopped.unwrap_or(false),
                // The event loop was stopped before it could serve the request.
                Err(err) if err.is::<RequestCanceledError>() => false,
                Err(err) => return Err(err),
            },
            Err(err) if err.is::<ClientNotRunningError>() => false,
            Err(err) => return Err(err),
        };
        self.join()?;
        Ok(stopped)
    }

    /// Waits for the event loop thread to exit.
    pub fn join(&mut self) -> Result<()> {
        let loop_thread = match self.loop_thread.take() {
            Some(loop_thread) => loop_thread,
            None => return Ok(()),
        };
        if loop_thread.thread().id() == std::thread::current().id() {
            // The event loop cannot wait for itself.
            return Ok(());
        }
        loop_thread.join().map_err(|_| {
            Error::msg(format!(
                "event loop thread for client {} panicked",
                self.name
            ))
        })
    }
}

impl Drop for DecoupledClient {
    fn drop(&mut self) {
        if self.loop_thread.is_none() {
            return;
        }
        self.loop_handle.stop();
        if let Err(err) = self.join() {
            error!("Failed to join client {}: {err:#}", self.name);
        }
    }
}
