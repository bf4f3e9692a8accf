use std::fmt::{
    Debug,
    Display,
};

use anyhow::{
    Error,
    Result,
};
use tokio::sync::oneshot;

use crate::{
    core::{
        types::Dictionary,
        uri::Uri,
    },
    decoupler::{
        RequestCanceledError,
        RequestFuture,
    },
    executor::Callback,
    session::SubscriptionHandle,
};

/// The kind of a [`Request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Stop,
    Call,
    Subscribe,
    Unsubscribe,
}

impl Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stop => write!(f, "STOP"),
            Self::Call => write!(f, "CALL"),
            Self::Subscribe => write!(f, "SUBSCRIBE"),
            Self::Unsubscribe => write!(f, "UNSUBSCRIBE"),
        }
    }
}

/// A procedure call.
#[derive(Clone)]
pub struct Call {
    pub procedure: Uri,
    pub kwargs: Dictionary,
    /// Invoked with the keyword results of the call.
    pub callback: Option<Callback>,
}

impl Call {
    pub fn new(procedure: Uri) -> Self {
        Self {
            procedure,
            kwargs: Dictionary::default(),
            callback: None,
        }
    }

    pub fn with_kwargs(mut self, kwargs: Dictionary) -> Self {
        self.kwargs = kwargs;
        self
    }

    pub fn with_callback(mut self, callback: Callback) -> Self {
        self.callback = Some(callback);
        self
    }
}

impl Debug for Call {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Call")
            .field("procedure", &self.procedure)
            .field("kwargs", &self.kwargs)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

/// A subscription to a topic.
#[derive(Clone)]
pub struct Subscribe {
    pub topic: Uri,
    /// Subscription options, passed through to the session.
    pub options: Dictionary,
    /// Invoked with the keyword arguments of every event published to the topic.
    pub callback: Option<Callback>,
}

impl Subscribe {
    pub fn new(topic: Uri) -> Self {
        Self {
            topic,
            options: Dictionary::default(),
            callback: None,
        }
    }

    pub fn with_options(mut self, options: Dictionary) -> Self {
        self.options = options;
        self
    }

    pub fn with_callback(mut self, callback: Callback) -> Self {
        self.callback = Some(callback);
        self
    }
}

impl Debug for Subscribe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscribe")
            .field("topic", &self.topic)
            .field("options", &self.options)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

/// Removal of an existing subscription.
#[derive(Debug, Clone)]
pub struct Unsubscribe {
    pub subscription: SubscriptionHandle,
}

impl Unsubscribe {
    pub fn new(subscription: SubscriptionHandle) -> Self {
        Self { subscription }
    }
}

/// The sending half of a request's single-assignment result slot.
///
/// Resolving consumes the sender, so a result can be set at most once. Dropping an unresolved
/// sender cancels the request from the producer's point of view.
pub struct ResultSender<T> {
    result_tx: oneshot::Sender<Result<T>>,
}

impl<T> ResultSender<T> {
    fn new() -> (Self, oneshot::Receiver<Result<T>>) {
        let (result_tx, result_rx) = oneshot::channel();
        (Self { result_tx }, result_rx)
    }

    /// Resolves the result slot.
    ///
    /// Returns `false` if the producer is no longer waiting for the result.
    pub fn resolve(self, result: Result<T>) -> bool {
        self.result_tx.send(result).is_ok()
    }
}

/// One unit of work for the event loop, along with its result slot.
///
/// Created alongside the [`RequestFuture`] that the producer waits on.
pub enum Request {
    Stop(ResultSender<Option<bool>>),
    Call(Call, ResultSender<Option<Dictionary>>),
    Subscribe(Subscribe, ResultSender<Option<SubscriptionHandle>>),
    Unsubscribe(Unsubscribe, ResultSender<bool>),
}

impl Request {
    /// Creates a request to stop the event loop.
    ///
    /// Resolves to `true` once the session is disconnected.
    pub fn stop() -> (Self, RequestFuture<Option<bool>>) {
        let (result_tx, result_rx) = ResultSender::new();
        (
            Self::Stop(result_tx),
            RequestFuture::new(RequestKind::Stop, result_rx),
        )
    }

    /// Creates a request to call a procedure.
    ///
    /// Resolves to the keyword results of the call.
    pub fn call(call: Call) -> (Self, RequestFuture<Option<Dictionary>>) {
        let (result_tx, result_rx) = ResultSender::new();
        (
            Self::Call(call, result_tx),
            RequestFuture::new(RequestKind::Call, result_rx),
        )
    }

    /// Creates a request to subscribe to a topic.
    ///
    /// Resolves to the handle of the new subscription.
    pub fn subscribe(subscribe: Subscribe) -> (Self, RequestFuture<Option<SubscriptionHandle>>) {
        let (result_tx, result_rx) = ResultSender::new();
        (
            Self::Subscribe(subscribe, result_tx),
            RequestFuture::new(RequestKind::Subscribe, result_rx),
        )
    }

    /// Creates a request to remove a subscription.
    ///
    /// Resolves to whether the subscription was removed. Never resolves to an error when served.
    pub fn unsubscribe(unsubscribe: Unsubscribe) -> (Self, RequestFuture<bool>) {
        let (result_tx, result_rx) = ResultSender::new();
        (
            Self::Unsubscribe(unsubscribe, result_tx),
            RequestFuture::new(RequestKind::Unsubscribe, result_rx),
        )
    }

    /// The kind of request.
    pub fn kind(&self) -> RequestKind {
        match self {
            Self::Stop(_) => RequestKind::Stop,
            Self::Call(..) => RequestKind::Call,
            Self::Subscribe(..) => RequestKind::Subscribe,
            Self::Unsubscribe(..) => RequestKind::Unsubscribe,
        }
    }

    /// Resolves the request with [`RequestCanceledError`] without serving it.
    pub fn cancel(self) {
        let kind = self.kind();
        let err = || -> Error { RequestCanceledError::new(kind).into() };
        match self {
            Self::Stop(result_tx) => result_tx.resolve(Err(err())),
            Self::Call(_, result_tx) => result_tx.resolve(Err(err())),
            Self::Subscribe(_, result_tx) => result_tx.resolve(Err(err())),
            Self::Unsubscribe(_, result_tx) => result_tx.resolve(Err(err())),
        };
    }
}

impl Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stop(_) => f.debug_tuple("Stop").finish(),
            Self::Call(call, _) => f.debug_tuple("Call").field(call).finish(),
            Self::Subscribe(subscribe, _) => f.debug_tuple("Subscribe").field(subscribe).finish(),
            Self::Unsubscribe(unsubscribe, _) => {
                f.debug_tuple("Unsubscribe").field(unsubscribe).finish()
            }
        }
    }
}
