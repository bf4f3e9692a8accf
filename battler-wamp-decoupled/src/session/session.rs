use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::core::{
    id::Id,
    types::{
        Dictionary,
        List,
    },
    uri::Uri,
};

/// Details about a joined session.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct JoinDetails {
    /// The realm that was joined.
    pub realm: Uri,
    /// The session ID, as given by the router.
    pub session_id: Id,
    /// Additional details sent by the router.
    pub details: Dictionary,
}

/// A result of a procedure call.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RpcResult {
    pub arguments: List,
    pub arguments_keyword: Dictionary,
}

/// An event published to a topic.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Event {
    pub arguments: List,
    pub arguments_keyword: Dictionary,
}

/// An opaque handle to an active subscription, used for unsubscribing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    /// The subscription ID.
    pub id: Id,
    /// The topic subscribed to.
    pub topic: Uri,
}

/// A subscription to a topic.
#[derive(Debug)]
pub struct Subscription {
    pub handle: SubscriptionHandle,
    /// The event receiver channel.
    ///
    /// The channel closes when the subscription is removed or the session ends.
    pub event_rx: broadcast::Receiver<Event>,
}

/// A WAMP session that requests are executed against.
///
/// The session is owned by the event loop thread, so no two operations are ever in flight at the
/// same time. Every method is a suspension point of the loop.
#[async_trait]
pub trait Session: Send {
    /// Establishes the underlying connection to the router.
    async fn connect(&mut self) -> Result<()>;

    /// Joins the realm, establishing the WAMP session.
    async fn join(&mut self) -> Result<JoinDetails>;

    /// Calls a procedure.
    ///
    /// A procedure may finish without producing any result.
    async fn call(
        &mut self,
        procedure: Uri,
        arguments_keyword: Dictionary,
    ) -> Result<Option<RpcResult>>;

    /// Subscribes to a topic.
    async fn subscribe(&mut self, topic: Uri, options: Dictionary) -> Result<Subscription>;

    /// Removes a subscription.
    async fn unsubscribe(&mut self, subscription: &SubscriptionHandle) -> Result<()>;

    /// Leaves the realm and closes the connection.
    async fn disconnect(&mut self) -> Result<()>;

    /// Receiver channel for the session disconnecting, for any reason.
    fn disconnected_rx(&self) -> broadcast::Receiver<()>;
}
