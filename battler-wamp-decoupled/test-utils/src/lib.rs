pub mod executor;
pub mod operations;
pub mod session;
pub mod setup;
