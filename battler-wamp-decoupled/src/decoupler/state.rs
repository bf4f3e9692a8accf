use std::fmt::Display;

use thiserror::Error;

/// The lifecycle state of a decoupled session.
///
/// ```text
/// AwaitingJoin -> Serving -> Stopping -> Terminated
///      |             |                      ^
///      +-------------+----------------------+
/// ```
///
/// A session that fails to join, or that is disconnected while serving, moves directly to
/// [`SessionState::Terminated`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// The event loop is connecting and joining the realm.
    #[default]
    AwaitingJoin,
    /// The event loop is serving requests.
    Serving,
    /// A STOP request is being served.
    Stopping,
    /// The event loop has exited.
    Terminated,
}

impl SessionState {
    /// Checks if moving to the next state is a valid transition.
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        match (self, next) {
            (Self::AwaitingJoin, Self::Serving) => true,
            (Self::Serving, Self::Stopping) => true,
            (Self::Terminated, _) => false,
            (_, Self::Terminated) => true,
            _ => false,
        }
    }

    /// Checks if the state is final.
    pub fn terminated(&self) -> bool {
        match self {
            Self::Terminated => true,
            _ => false,
        }
    }
}

impl Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AwaitingJoin => write!(f, "awaiting join"),
            Self::Serving => write!(f, "serving"),
            Self::Stopping => write!(f, "stopping"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

/// Error for an invalid [`SessionState`] transition.
#[derive(Debug, Error)]
#[error("invalid session state transition from {from} to {to}")]
pub struct InvalidStateTransition {
    pub from: SessionState,
    pub to: SessionState,
}

#[cfg(test)]
mod state_test {
    use crate::decoupler::SessionState;

    #[test]
    fn allows_lifecycle_transitions() {
        assert!(SessionState::AwaitingJoin.can_transition_to(SessionState::Serving));
        assert!(SessionState::Serving.can_transition_to(SessionState::Stopping));
        assert!(SessionState::Stopping.can_transition_to(SessionState::Terminated));
        assert!(SessionState::Serving.can_transition_to(SessionState::Terminated));
        assert!(SessionState::AwaitingJoin.can_transition_to(SessionState::Terminated));
    }

    #[test]
    fn rejects_out_of_order_transitions() {
        assert!(!SessionState::AwaitingJoin.can_transition_to(SessionState::Stopping));
        assert!(!SessionState::Serving.can_transition_to(SessionState::AwaitingJoin));
        assert!(!SessionState::Stopping.can_transition_to(SessionState::Serving));
        assert!(!SessionState::Serving.can_transition_to(SessionState::Serving));
        assert!(!SessionState::Terminated.can_transition_to(SessionState::Terminated));
        assert!(!SessionState::Terminated.can_transition_to(SessionState::Serving));
    }
}
