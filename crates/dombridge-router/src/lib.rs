//! Command broker between concurrent local callers and a single remote DOM
//! executor attached over one persistent websocket.
//!
//! The [`Broker`] owns three workers: a connection manager running the
//! accept/backoff state machine, a dispatch worker resolving responses
//! against the correlation table, and a sweeper enforcing deadlines.
//! Callers interact only with the [`Router`].
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

mod backoff;
mod config;
mod connection;
mod correlation;
mod error;
mod router;
mod service;
pub mod testing;

pub use backoff::BackoffPolicy;
pub use config::RouterConfig;
pub use connection::ConnectionHandle;
pub use connection::ConnectionState;
pub use connection::ConnectionStatus;
pub use connection::ExecutorConnection;
pub use connection::ExecutorListener;
pub use connection::WsListener;
pub use correlation::CorrelationTable;
pub use correlation::Outcome;
pub use correlation::PendingEntry;
pub use error::ConnectionError;
pub use error::SubmitError;
pub use router::Router;
pub use service::Broker;
