//! Daemon-level failures.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("another daemon instance holds the lock at {0}")]
    AlreadyRunning(PathBuf),
    #[error("failed to bind control socket at {path}: {source}")]
    Bind {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("selector store error: {0}")]
    Store(#[from] crate::store::StoreError),
    #[error("broker failed to start: {0}")]
    Broker(#[from] dombridge_router::ConnectionError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
