//! Daemon process: runs the broker and exposes it to local clients over a
//! line-delimited JSON-RPC Unix socket.
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

mod error;
mod handlers;
mod rpc;
mod server;
mod store;

pub use error::DaemonError;
pub use rpc::RpcRequest;
pub use rpc::RpcResponse;
pub use server::run;
pub use store::SelectorRecord;
pub use store::SelectorStore;
pub use store::StoreError;
pub use store::store_path;
