//! Wire-level error types.

use thiserror::Error;

use crate::action::ActionKind;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("unknown action: {0}")]
    UnknownAction(String),
    #[error("action '{action}' requires parameter '{name}'")]
    MissingParameter {
        action: ActionKind,
        name: &'static str,
    },
    #[error("action '{action}' only accepts scalar parameter values")]
    NonScalarParameter { action: ActionKind },
    #[error("failed to serialize wire message: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("malformed inbound frame: {0}")]
    MalformedFrame(#[source] serde_json::Error),
}
