use thiserror::Error;

use crate::decoupler::RequestKind;

/// Context for a request failure surfaced to the producer.
///
/// The original failure remains in the error chain, so it can still be inspected with
/// [`anyhow::Error::downcast_ref`].
#[derive(Debug, Error)]
#[error("{kind} request failed")]
pub struct RequestFailedError {
    kind: RequestKind,
}

impl RequestFailedError {
    pub fn new(kind: RequestKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> RequestKind {
        self.kind
    }
}

/// Error for a request that was discarded without being served.
#[derive(Debug, Error)]
#[error("{kind} request was canceled before being served")]
pub struct RequestCanceledError {
    kind: RequestKind,
}

impl RequestCanceledError {
    pub fn new(kind: RequestKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> RequestKind {
        self.kind
    }
}

/// Error for a producer giving up on waiting for a request.
#[derive(Debug, Error)]
#[error("timed out waiting for {kind} request")]
pub struct RequestTimedOutError {
    kind: RequestKind,
}

impl RequestTimedOutError {
    pub fn new(kind: RequestKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> RequestKind {
        self.kind
    }
}

/// Error for blocking on a request from a thread that is driving an asynchronous runtime.
///
/// Blocking there could stall the runtime that is supposed to resolve the request, so the future
/// must be awaited instead.
#[derive(Debug, Error)]
#[error("cannot block on {kind} request from within an asynchronous runtime")]
pub struct BlockingInRuntimeError {
    kind: RequestKind,
}

impl BlockingInRuntimeError {
    pub fn new(kind: RequestKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> RequestKind {
        self.kind
    }
}

/// Error for the client no longer accepting requests.
#[derive(Debug, Error)]
#[error("client is not running")]
pub struct ClientNotRunningError;

/// Error for the session not being joined yet.
#[derive(Debug, Error)]
#[error("session is not joined")]
pub struct SessionNotJoinedError;
