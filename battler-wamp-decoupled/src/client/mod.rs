mod client;
mod config;
mod dispatch;
mod lifecycle;

pub use client::DecoupledClient;
pub use config::DecoupledClientConfig;
pub use lifecycle::LoopHandle;
