//! Shared support code for the dombridge workspace.
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod error_codes;
pub mod ipc;
pub mod telemetry;

pub use ipc::socket_path;
pub use telemetry::TelemetryGuard;
pub use telemetry::init_tracing;
