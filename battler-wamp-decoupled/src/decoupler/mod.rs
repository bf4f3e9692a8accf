mod decoupler;
mod error;
mod future;
mod request;
mod state;

pub use decoupler::{
    Decoupler,
    JoinPolicy,
    PendingRequestReceiver,
    QueuedRequest,
    RequestReceiver,
};
pub use error::{
    BlockingInRuntimeError,
    ClientNotRunningError,
    RequestCanceledError,
    RequestFailedError,
    RequestTimedOutError,
    SessionNotJoinedError,
};
pub use future::RequestFuture;
pub use request::{
    Call,
    Request,
    RequestKind,
    ResultSender,
    Subscribe,
    Unsubscribe,
};
pub use state::{
    InvalidStateTransition,
    SessionState,
};
