mod session;

pub use session::{
    Event,
    JoinDetails,
    RpcResult,
    Session,
    Subscription,
    SubscriptionHandle,
};
