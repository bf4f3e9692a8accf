//! # battler-wamp-decoupled
//! ## A WAMP client for synchronous code
//!
//! **battler-wamp-decoupled** lets ordinary threads use a **Web Application Message Protocol**
//! (WAMP) session that lives on an asynchronous event loop.
//!
//! A WAMP session is single-threaded: every interaction with it must happen on the event loop that
//! owns it. Application code, on the other hand, often runs on plain threads that should never
//! touch the event loop directly. This library sits between the two.
//!
//! ## Usage
//!
//! A [`DecoupledClient`][`crate::client::DecoupledClient`] is started with a
//! [`Session`][`crate::session::Session`] implementation, a
//! [`CallbackExecutor`][`crate::executor::CallbackExecutor`], and a
//! [`DecoupledClientConfig`][`crate::client::DecoupledClientConfig`]. The client spawns a dedicated
//! thread that runs a single-threaded [`tokio`](https://tokio.rs) runtime, which connects and joins
//! the session and then serves requests one at a time, in the order they were enqueued.
//!
//! Producer threads enqueue requests (procedure calls, subscriptions, unsubscriptions, and a final
//! stop) through the client. Every request returns a
//! [`RequestFuture`][`crate::decoupler::RequestFuture`] that resolves exactly once. A producer may
//! block on it, block with a timeout, poll it, or `.await` it from asynchronous code.
//!
//! Callbacks attached to calls and subscriptions never run on the event loop. They are handed to
//! the callback executor, so that slow user code cannot stall the session.
//!
//! ## Failures
//!
//! By default, a failed request resolves to `None` and the failure is logged. With
//! [`allow_exception`][`crate::client::DecoupledClientConfig::allow_exception`] set, the failure is
//! surfaced to the producer instead, as a
//! [`RequestFailedError`][`crate::decoupler::RequestFailedError`] wrapping the original error.
//!
//! Unsubscribing is the exception to both: it always resolves to `true` or `false`.
pub mod client;
pub mod core;
pub mod decoupler;
pub mod executor;
pub mod session;
