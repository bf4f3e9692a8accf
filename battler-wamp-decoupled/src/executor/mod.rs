mod executor;
mod per_callback;
mod sequential;

pub use executor::{
    Callback,
    CallbackExecutor,
    CallbackHandler,
    callback,
};
pub use per_callback::ThreadPerCallbackExecutor;
pub use sequential::SequentialCallbackExecutor;
