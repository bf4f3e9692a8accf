use std::{
    sync::{
        Arc,
        Condvar,
        Mutex,
        MutexGuard,
    },
    time::Duration,
};

use anyhow::Result;
use log::{
    debug,
    error,
};
use tokio::sync::mpsc::{
    UnboundedReceiver,
    UnboundedSender,
    unbounded_channel,
};

use crate::{
    core::id::{
        Id,
        SequentialIdAllocator,
    },
    decoupler::{
        ClientNotRunningError,
        InvalidStateTransition,
        Request,
        RequestKind,
        SessionNotJoinedError,
        SessionState,
    },
};

/// How requests enqueued before the session joins are treated.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum JoinPolicy {
    /// Requests are queued and served in order once the session joins.
    #[default]
    Queue,
    /// Requests are rejected with [`SessionNotJoinedError`].
    FailFast,
}

/// A request waiting in the queue, tagged with the ID it was assigned when enqueued.
#[derive(Debug)]
pub struct QueuedRequest {
    pub id: Id,
    pub request: Request,
}

#[derive(Default)]
struct SharedState {
    session_state: SessionState,
    stop_enqueued: bool,
}

struct DecouplerInner {
    name: String,
    join_policy: JoinPolicy,
    request_tx: UnboundedSender<QueuedRequest>,
    state: Mutex<SharedState>,
    state_changed: Condvar,
    id_allocator: SequentialIdAllocator,
}

/// The producer side of the hand-off between caller threads and the event loop thread.
///
/// Any thread may enqueue requests. Enqueueing never blocks beyond lock contention. Requests are
/// received by the event loop in the order they were enqueued.
///
/// The decoupler also carries the [`SessionState`] of the event loop, which decides if requests
/// are accepted:
/// - Before the session joins, requests are queued or rejected according to the [`JoinPolicy`].
/// - Once a STOP request is enqueued, no more requests are accepted, since they would never be
///   served.
/// - Once the event loop terminates, no more requests are accepted.
#[derive(Clone)]
pub struct Decoupler {
    inner: Arc<DecouplerInner>,
}

impl Decoupler {
    /// Creates a new decoupler and the receiver for the event loop.
    pub fn new<S>(name: S, join_policy: JoinPolicy) -> (Self, PendingRequestReceiver)
    where
        S: Into<String>,
    {
        let (request_tx, request_rx) = unbounded_channel();
        let decoupler = Self {
            inner: Arc::new(DecouplerInner {
                name: name.into(),
                join_policy,
                request_tx,
                state: Mutex::new(SharedState::default()),
                state_changed: Condvar::new(),
                id_allocator: SequentialIdAllocator::default(),
            }),
        };
        let receiver = PendingRequestReceiver {
            decoupler: decoupler.clone(),
            request_rx,
        };
        (decoupler, receiver)
    }

    fn lock_state(&self) -> MutexGuard<'_, SharedState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The name of the client the decoupler belongs to.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The current state of the session.
    pub fn state(&self) -> SessionState {
        self.lock_state().session_state
    }

    /// Enqueues a request for the event loop.
    ///
    /// Returns the ID assigned to the request. If the request is rejected, its future resolves to
    /// [`RequestCanceledError`][`crate::decoupler::RequestCanceledError`].
    pub fn enqueue(&self, request: Request) -> Result<Id> {
        let kind = request.kind();
        let mut state = self.lock_state();
        match state.session_state {
            SessionState::Stopping | SessionState::Terminated => {
                return Err(ClientNotRunningError.into());
            }
            SessionState::AwaitingJoin if self.inner.join_policy == JoinPolicy::FailFast => {
                return Err(SessionNotJoinedError.into());
            }
            _ => (),
        }
        if state.stop_enqueued {
            return Err(ClientNotRunningError.into());
        }

        let id = self.inner.id_allocator.generate_id();
        // Send while holding the lock, so that the event loop cannot terminate in between the state
        // check and the request entering the queue.
        if self
            .inner
            .request_tx
            .send(QueuedRequest { id, request })
            .is_err()
        {
            return Err(ClientNotRunningError.into());
        }
        if kind == RequestKind::Stop {
            state.stop_enqueued = true;
        }
        debug!("Client {} enqueued {kind} request {id}", self.inner.name);
        Ok(id)
    }

    /// Moves the session to the next state, waking up any producer waiting on the session state.
    pub(crate) fn transition(&self, next: SessionState) -> Result<(), InvalidStateTransition> {
        let mut state = self.lock_state();
        let current = state.session_state;
        if !current.can_transition_to(next) {
            return Err(InvalidStateTransition {
                from: current,
                to: next,
            });
        }
        state.session_state = next;
        self.inner.state_changed.notify_all();
        debug!(
            "Client {} session moved from {current} to {next}",
            self.inner.name
        );
        Ok(())
    }

    /// Moves the session to [`SessionState::Terminated`], if it is not already there.
    pub(crate) fn terminate(&self) {
        if self.state().terminated() {
            return;
        }
        if let Err(err) = self.transition(SessionState::Terminated) {
            error!("Failed to terminate client {}: {err}", self.inner.name);
        }
    }

    /// Blocks the current thread until the session has joined.
    ///
    /// Fails if the timeout elapses first, or if the event loop terminates without ever joining.
    pub fn wait_until_joined(&self, timeout: Duration) -> Result<()> {
        let state = self.lock_state();
        let (state, _) = self
            .inner
            .state_changed
            .wait_timeout_while(state, timeout, |state| {
                state.session_state == SessionState::AwaitingJoin
            })
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match state.session_state {
            SessionState::AwaitingJoin => Err(SessionNotJoinedError.into()),
            SessionState::Terminated => Err(ClientNotRunningError.into()),
            SessionState::Serving | SessionState::Stopping => Ok(()),
        }
    }

    /// Blocks the current thread until the event loop terminates.
    ///
    /// Returns `false` if the timeout elapses first.
    pub fn wait_until_terminated(&self, timeout: Duration) -> bool {
        let state = self.lock_state();
        let (state, _) = self
            .inner
            .state_changed
            .wait_timeout_while(state, timeout, |state| {
                !state.session_state.terminated()
            })
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        state.session_state.terminated()
    }
}

fn cancel_remaining(name: &str, request_rx: &mut UnboundedReceiver<QueuedRequest>) {
    request_rx.close();
    while let Ok(queued) = request_rx.try_recv() {
        debug!(
            "Client {name} canceled {} request {} that was never served",
            queued.request.kind(),
            queued.id
        );
        queued.request.cancel();
    }
}

/// The event loop's side of the queue, before the session has joined.
///
/// Requests cannot be received until the session joins, which is enforced by
/// [`Self::set_joined`] producing the [`RequestReceiver`].
pub struct PendingRequestReceiver {
    decoupler: Decoupler,
    request_rx: UnboundedReceiver<QueuedRequest>,
}

impl PendingRequestReceiver {
    /// Signals that the session has joined, opening the queue for the event loop.
    pub fn set_joined(self) -> Result<RequestReceiver, InvalidStateTransition> {
        self.decoupler.transition(SessionState::Serving)?;
        Ok(RequestReceiver {
            decoupler: self.decoupler,
            request_rx: self.request_rx,
        })
    }

    /// Terminates the session without it ever joining.
    ///
    /// Every queued request is canceled.
    pub fn close(mut self) {
        self.decoupler.terminate();
        cancel_remaining(self.decoupler.name(), &mut self.request_rx);
    }
}

/// The event loop's side of the queue.
pub struct RequestReceiver {
    decoupler: Decoupler,
    request_rx: UnboundedReceiver<QueuedRequest>,
}

impl RequestReceiver {
    /// Waits for the oldest request in the queue.
    ///
    /// Suspends the event loop, not the thread, while the queue is empty.
    pub async fn get_request(&mut self) -> Option<QueuedRequest> {
        self.request_rx.recv().await
    }

    /// Terminates the session.
    ///
    /// Every request still in the queue is canceled.
    pub fn close(mut self) {
        self.decoupler.terminate();
        cancel_remaining(self.decoupler.name(), &mut self.request_rx);
    }
}
