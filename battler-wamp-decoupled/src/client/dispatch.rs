use std::sync::Arc;

use anyhow::{
    Context,
    Result,
};
use log::{
    debug,
    error,
    info,
};
use tokio::{
    sync::broadcast::{
        self,
        error::RecvError,
    },
    task::JoinHandle,
};

use crate::{
    client::{
        DecoupledClientConfig,
        lifecycle::{
            LoopHandle,
            SessionLifecycle,
            watch_for_disconnect,
        },
    },
    core::{
        error::is_protocol_error,
        hash::HashMap,
        id::Id,
        types::Dictionary,
    },
    decoupler::{
        Call,
        Decoupler,
        PendingRequestReceiver,
        QueuedRequest,
        Request,
        RequestFailedError,
        RequestKind,
        RequestReceiver,
        ResultSender,
        Subscribe,
        Unsubscribe,
    },
    executor::{
        CallbackExecutor,
        CallbackHandler,
    },
    session::{
        Event,
        JoinDetails,
        Session,
        SubscriptionHandle,
    },
};

enum Flow {
    Continue,
    Break,
}

/// The event loop that owns a session and serves requests from the queue, one at a time.
pub(crate) struct SessionLoop<S> {
    name: String,
    session: S,
    executor: Arc<dyn CallbackExecutor>,
    lifecycle: SessionLifecycle,
    allow_exception: bool,
    subscriptions: HashMap<Id, JoinHandle<()>>,
}

impl<S> SessionLoop<S>
where
    S: Session + 'static,
{
    pub fn new(
        config: &DecoupledClientConfig,
        session: S,
        decoupler: Decoupler,
        executor: Arc<dyn CallbackExecutor>,
        loop_handle: LoopHandle,
    ) -> Self {
        let lifecycle = SessionLifecycle::new(
            config.name.clone(),
            decoupler,
            executor.clone(),
            loop_handle,
        );
        Self {
            name: config.name.clone(),
            session,
            executor,
            lifecycle,
            allow_exception: config.allow_exception,
            subscriptions: HashMap::default(),
        }
    }

    /// Runs the event loop to completion.
    ///
    /// The session is connected and joined, and then requests are served until a STOP request is
    /// served or the loop is stopped. Every request left in the queue is canceled on the way out.
    pub async fn run(mut self, receiver: PendingRequestReceiver) {
        let loop_handle = self.lifecycle.loop_handle().clone();
        tokio::spawn(watch_for_disconnect(
            self.session.disconnected_rx(),
            self.lifecycle.clone(),
        ));

        let joined = tokio::select! {
            biased;
            _ = loop_handle.wait_stopped() => None,
            result = self.connect_and_join() => Some(result),
        };

        let receiver = match joined {
            Some(Ok(details)) => match self.lifecycle.on_join(receiver, &details) {
                Ok(receiver) => receiver,
                Err(err) => {
                    error!("Client {} failed to start serving: {err:#}", self.name);
                    self.finish();
                    return;
                }
            },
            Some(Err(err)) => {
                error!("Client {} failed to join a session: {err:#}", self.name);
                receiver.close();
                self.finish();
                return;
            }
            None => {
                info!("Client {} stopped before joining a session", self.name);
                receiver.close();
                self.finish();
                return;
            }
        };

        let receiver = self.serve(receiver, &loop_handle).await;
        receiver.close();
        self.finish();
    }

    async fn connect_and_join(&mut self) -> Result<JoinDetails> {
        self.session
            .connect()
            .await
            .context("failed to connect session")?;
        info!("Client {} connected", self.name);
        self.session.join().await.context("failed to join realm")
    }

    async fn serve(
        &mut self,
        mut receiver: RequestReceiver,
        loop_handle: &LoopHandle,
    ) -> RequestReceiver {
        loop {
            // Stopping the loop only interrupts waiting for a request, never serving one.
            let queued = tokio::select! {
                biased;
                _ = loop_handle.wait_stopped() => None,
                queued = receiver.get_request() => queued,
            };
            let queued = match queued {
                Some(queued) => queued,
                None => {
                    debug!(
                        "Client {} event loop stopped while waiting for a request",
                        self.name
                    );
                    break;
                }
            };

            let id = queued.id;
            let kind = queued.request.kind();
            debug!("Client {} received {kind} request {id}", self.name);
            let flow = self.dispatch(queued).await;
            debug!("Client {} finished {kind} request {id}", self.name);

            if let Flow::Break = flow {
                break;
            }
        }
        receiver
    }

    async fn dispatch(&mut self, queued: QueuedRequest) -> Flow {
        let QueuedRequest { id, request } = queued;
        match request {
            Request::Stop(result_tx) => {
                let result = self.handle_stop(id).await;
                self.settle(id, RequestKind::Stop, result_tx, result);
                Flow::Break
            }
            Request::Call(call, result_tx) => {
                let result = self.handle_call(id, call).await;
                self.settle(id, RequestKind::Call, result_tx, result);
                Flow::Continue
            }
            Request::Subscribe(subscribe, result_tx) => {
                let result = self.handle_subscribe(id, subscribe).await;
                self.settle(id, RequestKind::Subscribe, result_tx, result);
                Flow::Continue
            }
            Request::Unsubscribe(unsubscribe, result_tx) => {
                let removed = self.handle_unsubscribe(id, unsubscribe).await;
                if !result_tx.resolve(Ok(removed)) {
                    debug!(
                        "Client {} resolved UNSUBSCRIBE request {id}, but no producer was waiting",
                        self.name
                    );
                }
                Flow::Continue
            }
        }
    }

    /// Resolves a request future with the result of its handler.
    ///
    /// Failures are only surfaced to the producer if exceptions are allowed. Otherwise, the future
    /// resolves to `None`.
    fn settle<T>(
        &self,
        id: Id,
        kind: RequestKind,
        result_tx: ResultSender<Option<T>>,
        result: Result<T>,
    ) {
        let result = match result {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                error!("Client {} failed {kind} request {id}: {err:#}", self.name);
                if self.allow_exception {
                    Err(err.context(RequestFailedError::new(kind)))
                } else {
                    Ok(None)
                }
            }
        };
        if !result_tx.resolve(result) {
            debug!(
                "Client {} resolved {kind} request {id}, but no producer was waiting",
                self.name
            );
        }
    }

    async fn handle_stop(&mut self, id: Id) -> Result<bool> {
        self.lifecycle.on_stop()?;
        debug!(
            "Client {} stopping callback executor for STOP request {id}",
            self.name
        );
        self.executor.stop();
        self.session
            .disconnect()
            .await
            .context("failed to disconnect session")?;
        info!("Client {} disconnected", self.name);
        Ok(true)
    }

    async fn handle_call(&mut self, id: Id, call: Call) -> Result<Dictionary> {
        let Call {
            procedure,
            kwargs,
            callback,
        } = call;
        debug!(
            "Client {} calling {procedure} for CALL request {id}",
            self.name
        );
        let result = self
            .session
            .call(procedure.clone(), kwargs)
            .await
            .with_context(|| format!("failed to call {procedure}"))?;
        let payload = result
            .map(|result| result.arguments_keyword)
            .unwrap_or_default();

        let handler = CallbackHandler::new(callback, self.executor.clone());
        if handler.has_callback() {
            debug!(
                "Client {} scheduling callback for CALL request {id}",
                self.name
            );
        }
        // Scheduled before the future resolves, so a producer that sees the result can rely on the
        // callback having been handed off.
        handler.invoke(payload.clone());
        Ok(payload)
    }

    async fn handle_subscribe(
        &mut self,
        id: Id,
        subscribe: Subscribe,
    ) -> Result<SubscriptionHandle> {
        let Subscribe {
            topic,
            options,
            callback,
        } = subscribe;
        debug!(
            "Client {} subscribing to {topic} for SUBSCRIBE request {id}",
            self.name
        );
        let subscription = self
            .session
            .subscribe(topic.clone(), options)
            .await
            .with_context(|| format!("failed to subscribe to {topic}"))?;
        let handle = subscription.handle.clone();

        let handler = CallbackHandler::new(callback, self.executor.clone());
        if handler.has_callback() {
            let forwarder = tokio::spawn(forward_events(
                self.name.clone(),
                handle.clone(),
                subscription.event_rx,
                handler,
            ));
            if let Some(previous) = self.subscriptions.insert(handle.id, forwarder) {
                previous.abort();
            }
        }
        Ok(handle)
    }

    async fn handle_unsubscribe(&mut self, id: Id, unsubscribe: Unsubscribe) -> bool {
        let subscription = unsubscribe.subscription;
        debug!(
            "Client {} unsubscribing from {} ({}) for UNSUBSCRIBE request {id}",
            self.name, subscription.topic, subscription.id
        );
        match self.session.unsubscribe(&subscription).await {
            Ok(()) => {
                if let Some(forwarder) = self.subscriptions.remove(&subscription.id) {
                    forwarder.abort();
                }
                true
            }
            Err(err) if is_protocol_error(&err) => {
                debug!(
                    "Client {} could not unsubscribe from {}: {err:#}",
                    self.name, subscription.topic
                );
                false
            }
            Err(err) => {
                error!(
                    "Client {} failed to unsubscribe from {}: {err:#}",
                    self.name, subscription.topic
                );
                false
            }
        }
    }

    fn finish(&mut self) {
        for (_, forwarder) in self.subscriptions.drain() {
            forwarder.abort();
        }
        self.lifecycle.on_terminate();
    }
}

async fn forward_events(
    name: String,
    subscription: SubscriptionHandle,
    mut event_rx: broadcast::Receiver<Event>,
    handler: CallbackHandler,
) {
    loop {
        match event_rx.recv().await {
            Ok(event) => handler.invoke(event.arguments_keyword),
            Err(RecvError::Lagged(skipped)) => {
                error!(
                    "Client {name} dropped {skipped} event(s) for subscription {} to {}",
                    subscription.id, subscription.topic
                );
            }
            Err(RecvError::Closed) => break,
        }
    }
    debug!(
        "Client {name} event stream for subscription {} to {} closed",
        subscription.id, subscription.topic
    );
}
