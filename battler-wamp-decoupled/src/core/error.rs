use anyhow::Error;
use thiserror::Error;

use crate::core::uri::Uri;

/// An application error reported by the remote side of a session.
///
/// Routers and callees report failures as an error URI and a human-readable message. Errors with
/// a URI that is not defined by the WAMP standard are represented by this type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}: {message}")]
pub struct ApplicationError {
    pub reason: Uri,
    pub message: String,
}

impl ApplicationError {
    pub fn new<S>(reason: Uri, message: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            reason,
            message: message.into(),
        }
    }
}

/// An interaction error defined by the WAMP standard.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InteractionError {
    /// A message violated the WAMP protocol.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    /// The procedure being called does not exist.
    #[error("no such procedure")]
    NoSuchProcedure,
    /// The subscription being referenced does not exist.
    ///
    /// Reported when unsubscribing twice.
    #[error("no such subscription")]
    NoSuchSubscription,
    /// The realm being joined does not exist.
    #[error("no such realm")]
    NoSuchRealm,
    /// The operation was canceled.
    #[error("canceled")]
    Canceled,
}

impl InteractionError {
    /// The trailing URI component for the error.
    pub fn uri_component(&self) -> &str {
        match self {
            Self::ProtocolViolation(_) => "protocol_violation",
            Self::NoSuchProcedure => "no_such_procedure",
            Self::NoSuchSubscription => "no_such_subscription",
            Self::NoSuchRealm => "no_such_realm",
            Self::Canceled => "canceled",
        }
    }

    /// The full error URI.
    pub fn uri(&self) -> Uri {
        Uri::from_known(format!("wamp.error.{}", self.uri_component()))
    }
}

/// Creates an [`struct@Error`] from a URI error reason and message.
pub fn error_from_uri_reason_and_message(reason: Uri, message: String) -> Error {
    match reason.as_ref() {
        "wamp.error.protocol_violation" => InteractionError::ProtocolViolation(message).into(),
        "wamp.error.no_such_procedure" => InteractionError::NoSuchProcedure.into(),
        "wamp.error.no_such_subscription" => InteractionError::NoSuchSubscription.into(),
        "wamp.error.no_such_realm" => InteractionError::NoSuchRealm.into(),
        "wamp.error.canceled" => InteractionError::Canceled.into(),
        _ => ApplicationError::new(reason, message).into(),
    }
}

/// Checks if the error, or anything in its chain, is a structured error reported by the remote
/// side.
pub fn is_protocol_error(err: &Error) -> bool {
    err.downcast_ref::<ApplicationError>().is_some()
        || err.downcast_ref::<InteractionError>().is_some()
        || err
            .chain()
            .any(|cause| cause.is::<ApplicationError>() || cause.is::<InteractionError>())
}

#[cfg(test)]
mod error_test {
    use anyhow::Error;

    use crate::core::{
        error::{
            ApplicationError,
            InteractionError,
            error_from_uri_reason_and_message,
            is_protocol_error,
        },
        uri::Uri,
    };

    #[test]
    fn maps_standard_error_uris() {
        let err = error_from_uri_reason_and_message(
            InteractionError::NoSuchSubscription.uri(),
            "gone".to_owned(),
        );
        assert_matches::assert_matches!(
            err.downcast_ref::<InteractionError>(),
            Some(InteractionError::NoSuchSubscription)
        );

        let err = error_from_uri_reason_and_message(
            Uri::try_from("wamp.error.protocol_violation").unwrap(),
            "bad message".to_owned(),
        );
        pretty_assertions::assert_eq!(err.to_string(), "protocol violation: bad message");
    }

    #[test]
    fn maps_custom_error_uris_to_application_errors() {
        let reason = Uri::try_from("ak.wwise.invalid_arguments").unwrap();
        let err = error_from_uri_reason_and_message(reason.clone(), "missing object".to_owned());
        assert_matches::assert_matches!(err.downcast_ref::<ApplicationError>(), Some(err) => {
            pretty_assertions::assert_eq!(err, &ApplicationError::new(reason, "missing object"));
        });
        pretty_assertions::assert_eq!(
            err.to_string(),
            "ak.wwise.invalid_arguments: missing object"
        );
    }

    #[test]
    fn recognizes_protocol_errors_through_context() {
        let err: Error = InteractionError::NoSuchProcedure.into();
        assert!(is_protocol_error(&err));
        assert!(is_protocol_error(&err.context("failed to call ns.ping")));
        assert!(!is_protocol_error(&Error::msg("connection reset")));
        assert!(!is_protocol_error(
            &Error::msg("connection reset").context("failed to call ns.ping")
        ));
    }
}
