//! Wire protocol between the broker and the DOM executor peer.
//!
//! Every command the broker sends is a [`CommandEnvelope`]; every reply the
//! executor returns is a [`ResponseEnvelope`] echoing the command id verbatim.
//! Control frames (heartbeats, greetings) never carry a correlation id and are
//! handled below the router.
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

mod action;
mod envelope;
mod error;
mod frame;

pub use action::ActionKind;
pub use action::CallerKind;
pub use envelope::CommandEnvelope;
pub use envelope::ErrorDetail;
pub use envelope::Parameters;
pub use envelope::ResponseEnvelope;
pub use envelope::ResponseStatus;
pub use error::WireError;
pub use frame::ControlFrame;
pub use frame::InboundFrame;
