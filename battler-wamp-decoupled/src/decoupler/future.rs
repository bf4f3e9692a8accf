use std::{
    fmt::Debug,
    pin::Pin,
    task::{
        Context,
        Poll,
    },
    time::Duration,
};

use anyhow::{
    Error,
    Result,
};
use tokio::sync::oneshot::{
    self,
    error::TryRecvError,
};

use crate::decoupler::{
    BlockingInRuntimeError,
    RequestCanceledError,
    RequestKind,
    RequestTimedOutError,
};

/// The producer's view of a request's result.
///
/// The result is set exactly once by the event loop. If the request is discarded without being
/// served, the future resolves to [`RequestCanceledError`].
///
/// The future can be waited on synchronously with [`Self::wait`] or [`Self::wait_timeout`], or
/// awaited from asynchronous code. The blocking methods fail with [`BlockingInRuntimeError`] when
/// called from within an asynchronous runtime.
pub struct RequestFuture<T> {
    kind: RequestKind,
    result_rx: oneshot::Receiver<Result<T>>,
}

impl<T> RequestFuture<T> {
    pub(crate) fn new(kind: RequestKind, result_rx: oneshot::Receiver<Result<T>>) -> Self {
        Self { kind, result_rx }
    }

    fn canceled(&self) -> Error {
        RequestCanceledError::new(self.kind).into()
    }

    fn check_blocking_allowed(&self) -> Result<()> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(BlockingInRuntimeError::new(self.kind).into());
        }
        Ok(())
    }

    /// The kind of request this future belongs to.
    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    /// Blocks the current thread until the request is resolved.
    ///
    /// Fails without waiting if called from within an asynchronous runtime. The request is still
    /// served, but its result is discarded.
    pub fn wait(self) -> Result<T> {
        self.check_blocking_allowed()?;
        let kind = self.kind;
        match self.result_rx.blocking_recv() {
            Ok(result) => result,
            Err(_) => Err(RequestCanceledError::new(kind).into()),
        }
    }

    /// Blocks the current thread until the request is resolved or the timeout elapses.
    ///
    /// Timing out does not cancel the request. The event loop still serves it, and its result is
    /// discarded.
    ///
    /// Every call drives the wait on a new single-threaded runtime with only a timer, so this fails
    /// without waiting if called from within an asynchronous runtime. Use
    /// [`tokio::time::timeout`] on the future there instead.
    pub fn wait_timeout(self, timeout: Duration) -> Result<T> {
        self.check_blocking_allowed()?;
        let kind = self.kind;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        runtime.block_on(async move {
            match tokio::time::timeout(timeout, self).await {
                Ok(result) => result,
                Err(_) => Err(RequestTimedOutError::new(kind).into()),
            }
        })
    }

    /// Reads the result if the request is already resolved, without blocking.
    ///
    /// Once a result is returned, the future is spent. Later calls report the request as canceled.
    pub fn try_result(&mut self) -> Option<Result<T>> {
        match self.result_rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(self.canceled())),
        }
    }
}

impl<T> Future for RequestFuture<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.result_rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(this.canceled())),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> Debug for RequestFuture<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestFuture")
            .field("kind", &self.kind)
            .finish()
    }
}

#[cfg(test)]
mod future_test {
    use std::time::Duration;

    use crate::{
        core::{
            types::{
                Dictionary,
                Value,
            },
            uri::Uri,
        },
        decoupler::{
            BlockingInRuntimeError,
            Call,
            Request,
            RequestCanceledError,
            RequestKind,
            RequestTimedOutError,
        },
    };

    fn ping() -> Call {
        Call::new(Uri::try_from("ns.ping").unwrap())
    }

    #[test]
    fn resolves_once_with_result() {
        let (request, future) = Request::call(ping());
        pretty_assertions::assert_eq!(future.kind(), RequestKind::Call);
        match request {
            Request::Call(_, result_tx) => {
                assert!(result_tx.resolve(Ok(Some(Dictionary::from_iter([(
                    "pong".to_owned(),
                    Value::Bool(true)
                )])))));
            }
            _ => panic!("expected call request"),
        }
        assert_matches::assert_matches!(future.wait(), Ok(Some(result)) => {
            pretty_assertions::assert_eq!(result.get("pong"), Some(&Value::Bool(true)));
        });
    }

    #[test]
    fn reports_canceled_when_dropped_unresolved() {
        let (request, future) = Request::stop();
        drop(request);
        assert_matches::assert_matches!(future.wait(), Err(err) => {
            assert_matches::assert_matches!(err.downcast_ref::<RequestCanceledError>(), Some(err) => {
                pretty_assertions::assert_eq!(err.kind(), RequestKind::Stop);
            });
        });
    }

    #[test]
    fn reports_canceled_when_canceled_explicitly() {
        let (request, future) = Request::call(ping());
        request.cancel();
        assert_matches::assert_matches!(future.wait(), Err(err) => {
            assert!(err.is::<RequestCanceledError>());
        });
    }

    #[test]
    fn polls_without_blocking() {
        let (request, mut future) = Request::stop();
        assert_matches::assert_matches!(future.try_result(), None);
        match request {
            Request::Stop(result_tx) => assert!(result_tx.resolve(Ok(Some(true)))),
            _ => panic!("expected stop request"),
        }
        assert_matches::assert_matches!(future.try_result(), Some(Ok(Some(true))));
    }

    #[test]
    fn times_out_waiting_for_result() {
        let (_request, future) = Request::call(ping());
        assert_matches::assert_matches!(future.wait_timeout(Duration::from_millis(10)), Err(err) => {
            assert!(err.is::<RequestTimedOutError>());
        });
    }

    #[test]
    fn producer_dropping_future_does_not_fail_resolution() {
        let (request, future) = Request::stop();
        drop(future);
        match request {
            Request::Stop(result_tx) => assert!(!result_tx.resolve(Ok(Some(true)))),
            _ => panic!("expected stop request"),
        }
    }

    #[tokio::test]
    async fn refuses_to_block_inside_runtime() {
        let (_request, future) = Request::call(ping());
        assert_matches::assert_matches!(future.wait_timeout(Duration::from_secs(5)), Err(err) => {
            assert_matches::assert_matches!(err.downcast_ref::<BlockingInRuntimeError>(), Some(err) => {
                pretty_assertions::assert_eq!(err.kind(), RequestKind::Call);
            });
        });
        let (_request, future) = Request::stop();
        assert_matches::assert_matches!(future.wait(), Err(err) => {
            assert!(err.is::<BlockingInRuntimeError>());
        });
    }

    #[tokio::test]
    async fn resolves_when_awaited() {
        let (request, future) = Request::stop();
        tokio::spawn(async move {
            match request {
                Request::Stop(result_tx) => result_tx.resolve(Ok(Some(true))),
                _ => false,
            }
        });
        assert_matches::assert_matches!(future.await, Ok(Some(true)));
    }
}
