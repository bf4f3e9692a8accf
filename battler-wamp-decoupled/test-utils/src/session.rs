use std::{
    sync::{
        Arc,
        Mutex,
    },
    time::Duration,
};

use anyhow::{
    Error,
    Result,
};
use async_trait::async_trait;
use battler_wamp_decoupled::{
    core::{
        error::{
            ApplicationError,
            InteractionError,
            error_from_uri_reason_and_message,
        },
        hash::HashMap,
        id::{
            Id,
            SequentialIdAllocator,
        },
        types::Dictionary,
        uri::Uri,
    },
    session::{
        Event,
        JoinDetails,
        RpcResult,
        Session,
        Subscription,
        SubscriptionHandle,
    },
};
use tokio::sync::{
    broadcast,
    watch,
};

use crate::operations::{
    Operation,
    OperationLog,
};

/// Handles a call to a fake procedure.
pub type ProcedureHandler = Arc<dyn Fn(Dictionary) -> Result<Option<RpcResult>> + Send + Sync>;

struct Procedure {
    handler: ProcedureHandler,
    delay: Option<Duration>,
}

#[derive(Default)]
struct FakeState {
    procedures: HashMap<String, Procedure>,
    subscriptions: HashMap<Id, (String, broadcast::Sender<Event>)>,
    fail_connect: bool,
    fail_join: bool,
    fail_unsubscribe: bool,
    fail_disconnect: bool,
}

/// Builds an error the way it arrives from a router, as an error URI and a message.
fn router_error(err: InteractionError) -> Error {
    let message = err.to_string();
    error_from_uri_reason_and_message(err.uri(), message)
}

/// An in-memory session that serves procedures and topics configured through its
/// [`FakeSessionHandle`].
pub struct FakeSession {
    state: Arc<Mutex<FakeState>>,
    log: OperationLog,
    ids: Arc<SequentialIdAllocator>,
    join_released_rx: watch::Receiver<bool>,
    disconnected_tx: broadcast::Sender<()>,
}

/// A handle for configuring and driving a [`FakeSession`] from the test thread.
#[derive(Clone)]
pub struct FakeSessionHandle {
    state: Arc<Mutex<FakeState>>,
    join_released_tx: Arc<watch::Sender<bool>>,
    disconnected_tx: broadcast::Sender<()>,
}

impl FakeSession {
    pub fn new(log: OperationLog) -> (Self, FakeSessionHandle) {
        let state = Arc::new(Mutex::new(FakeState::default()));
        let (join_released_tx, join_released_rx) = watch::channel(true);
        let (disconnected_tx, _) = broadcast::channel(4);
        let session = Self {
            state: state.clone(),
            log,
            ids: Arc::new(SequentialIdAllocator::default()),
            join_released_rx,
            disconnected_tx: disconnected_tx.clone(),
        };
        let handle = FakeSessionHandle {
            state,
            join_released_tx: Arc::new(join_released_tx),
            disconnected_tx,
        };
        (session, handle)
    }
}

impl FakeSessionHandle {
    /// Registers a procedure that callers can call.
    pub fn register<F>(&self, procedure: &str, handler: F)
    where
        F: Fn(Dictionary) -> Result<Option<RpcResult>> + Send + Sync + 'static,
    {
        self.register_with_delay(procedure, None, handler)
    }

    /// Registers a procedure that takes some time to respond.
    pub fn register_with_delay<F>(&self, procedure: &str, delay: Option<Duration>, handler: F)
    where
        F: Fn(Dictionary) -> Result<Option<RpcResult>> + Send + Sync + 'static,
    {
        self.state.lock().unwrap().procedures.insert(
            procedure.to_owned(),
            Procedure {
                handler: Arc::new(handler),
                delay,
            },
        );
    }

    /// Publishes an event to every subscriber of the topic, returning how many subscriptions
    /// received it.
    pub fn publish(&self, topic: &str, arguments_keyword: Dictionary) -> usize {
        let state = self.state.lock().unwrap();
        let mut delivered = 0;
        for (subscribed, event_tx) in state.subscriptions.values() {
            if subscribed != topic {
                continue;
            }
            let event = Event {
                arguments: Vec::new(),
                arguments_keyword: arguments_keyword.clone(),
            };
            if event_tx.send(event).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// The number of active subscriptions to the topic.
    pub fn subscription_count(&self, topic: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .subscriptions
            .values()
            .filter(|(subscribed, _)| subscribed == topic)
            .count()
    }

    pub fn fail_connect(&self) {
        self.state.lock().unwrap().fail_connect = true;
    }

    pub fn fail_join(&self) {
        self.state.lock().unwrap().fail_join = true;
    }

    /// Makes unsubscribing fail with a transport error instead of a router error.
    pub fn fail_unsubscribe(&self) {
        self.state.lock().unwrap().fail_unsubscribe = true;
    }

    pub fn fail_disconnect(&self) {
        self.state.lock().unwrap().fail_disconnect = true;
    }

    /// Makes joining wait until [`Self::release_join`] is called.
    pub fn hold_join(&self) {
        self.join_released_tx.send_replace(false);
    }

    pub fn release_join(&self) {
        self.join_released_tx.send_replace(true);
    }

    /// Drops the connection, as if the transport failed.
    pub fn force_disconnect(&self) {
        self.state.lock().unwrap().subscriptions.clear();
        self.disconnected_tx.send(()).ok();
    }
}

#[async_trait]
impl Session for FakeSession {
    async fn connect(&mut self) -> Result<()> {
        self.log.record(Operation::Connect);
        if self.state.lock().unwrap().fail_connect {
            return Err(Error::msg("connection refused"));
        }
        Ok(())
    }

    async fn join(&mut self) -> Result<JoinDetails> {
        self.join_released_rx
            .wait_for(|released| *released)
            .await
            .ok();
        self.log.record(Operation::Join);
        if self.state.lock().unwrap().fail_join {
            return Err(router_error(InteractionError::NoSuchRealm));
        }
        Ok(JoinDetails {
            realm: Uri::try_from("realm")?,
            session_id: self.ids.generate_id(),
            details: Dictionary::default(),
        })
    }

    async fn call(
        &mut self,
        procedure: Uri,
        arguments_keyword: Dictionary,
    ) -> Result<Option<RpcResult>> {
        self.log.record(Operation::Call(procedure.to_string()));
        let (handler, delay) = {
            let state = self.state.lock().unwrap();
            match state.procedures.get(procedure.as_ref()) {
                Some(registered) => (registered.handler.clone(), registered.delay),
                None => return Err(router_error(InteractionError::NoSuchProcedure)),
            }
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        // Application errors only cross the wire as an error URI and a message.
        handler(arguments_keyword).map_err(|err| {
            let reported = err.downcast_ref::<ApplicationError>().map(|err| {
                error_from_uri_reason_and_message(err.reason.clone(), err.message.clone())
            });
            reported.unwrap_or(err)
        })
    }

    async fn subscribe(&mut self, topic: Uri, _: Dictionary) -> Result<Subscription> {
        self.log.record(Operation::Subscribe(topic.to_string()));
        let id = self.ids.generate_id();
        let (event_tx, event_rx) = broadcast::channel(16);
        self.state
            .lock()
            .unwrap()
            .subscriptions
            .insert(id, (topic.to_string(), event_tx));
        Ok(Subscription {
            handle: SubscriptionHandle { id, topic },
            event_rx,
        })
    }

    async fn unsubscribe(&mut self, subscription: &SubscriptionHandle) -> Result<()> {
        self.log.record(Operation::Unsubscribe(subscription.id));
        let mut state = self.state.lock().unwrap();
        if state.fail_unsubscribe {
            return Err(Error::msg("socket reset"));
        }
        match state.subscriptions.remove(&subscription.id) {
            Some(_) => Ok(()),
            None => Err(router_error(InteractionError::NoSuchSubscription)),
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.log.record(Operation::Disconnect);
        let fail = {
            let mut state = self.state.lock().unwrap();
            state.subscriptions.clear();
            state.fail_disconnect
        };
        self.disconnected_tx.send(()).ok();
        if fail {
            return Err(Error::msg("transport already closed"));
        }
        Ok(())
    }

    fn disconnected_rx(&self) -> broadcast::Receiver<()> {
        self.disconnected_tx.subscribe()
    }
}
