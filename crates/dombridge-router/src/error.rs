//! Failure taxonomy surfaced to callers awaiting a command.

use thiserror::Error;

use dombridge_wire::WireError;

/// Why a submitted command did not produce executor data. Every variant maps
/// to exactly one terminal state of a pending entry; no command ever observes
/// more than one.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubmitError {
    /// No executor connection existed when the command was submitted.
    #[error("no executor connected")]
    Unavailable,
    /// The command was sent but no response arrived within the deadline.
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    /// The connection dropped while the command was in flight.
    #[error("connection to executor lost while request was in flight")]
    ConnectionLost,
    /// The executor answered with an error response.
    #[error("executor error ({kind}): {message}")]
    Executor { kind: String, message: String },
    /// The action name is not in the catalog.
    #[error("unsupported action: {0}")]
    UnsupportedAction(String),
    /// The parameters fail the action's shape contract.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
    /// A broker-side bug or resource failure.
    #[error("internal broker error: {0}")]
    Internal(String),
}

impl SubmitError {
    /// Stable machine-readable tag for wire and log surfaces.
    pub fn kind(&self) -> &'static str {
        match self {
            SubmitError::Unavailable => "unavailable",
            SubmitError::Timeout { .. } => "timeout",
            SubmitError::ConnectionLost => "connection_lost",
            SubmitError::Executor { .. } => "executor_error",
            SubmitError::UnsupportedAction(_) => "unsupported_action",
            SubmitError::InvalidParameters(_) => "invalid_parameters",
            SubmitError::Internal(_) => "internal",
        }
    }

    /// Whether retrying the same command later can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SubmitError::Unavailable | SubmitError::Timeout { .. } | SubmitError::ConnectionLost
        )
    }
}

impl From<WireError> for SubmitError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::UnknownAction(name) => SubmitError::UnsupportedAction(name),
            other => SubmitError::InvalidParameters(other.to_string()),
        }
    }
}

/// Failures inside the connection manager. These never reach callers
/// directly; they drive the backoff state machine and logs.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("no peer connected")]
    NotConnected,
    #[error("connection closed by peer")]
    Closed,
    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("refusing to bind non-loopback address {0} without DOMBRIDGE_ALLOW_REMOTE")]
    NonLoopback(String),
    #[error("invalid listen address: {0}")]
    InvalidAddr(String),
    #[error("websocket handshake failed: {0}")]
    Handshake(String),
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags_are_stable() {
        assert_eq!(SubmitError::Unavailable.kind(), "unavailable");
        assert_eq!(SubmitError::Timeout { timeout_ms: 10 }.kind(), "timeout");
        assert_eq!(SubmitError::ConnectionLost.kind(), "connection_lost");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(SubmitError::Unavailable.is_retryable());
        assert!(SubmitError::ConnectionLost.is_retryable());
        assert!(!SubmitError::UnsupportedAction("x".into()).is_retryable());
        assert!(
            !SubmitError::Executor {
                kind: "element_not_found".into(),
                message: "no match".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_wire_error_mapping() {
        let err: SubmitError = WireError::UnknownAction("warp".into()).into();
        assert_eq!(err, SubmitError::UnsupportedAction("warp".into()));
    }
}
