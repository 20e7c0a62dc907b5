//! Control socket server: lock file, Unix listener and connection loop.

use std::fs;
use std::os::fd::AsRawFd;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::net::UnixListener;
use tokio::net::UnixStream;
use tokio::sync::watch;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use dombridge_common::socket_path;
use dombridge_router::Broker;
use dombridge_router::RouterConfig;

use crate::error::DaemonError;
use crate::handlers::Ctx;
use crate::handlers::handle;
use crate::rpc::PARSE_ERROR;
use crate::rpc::RpcRequest;
use crate::rpc::RpcResponse;
use crate::store::SelectorStore;
use crate::store::store_path;

/// Exclusive advisory lock proving this is the only daemon instance. Held
/// for the process lifetime; the kernel releases it on exit.
struct LockFile {
    path: PathBuf,
    _file: fs::File,
}

impl LockFile {
    fn acquire(path: PathBuf) -> Result<Self, DaemonError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;
        // SAFETY: flock on a valid owned fd.
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc != 0 {
            return Err(DaemonError::AlreadyRunning(path));
        }
        Ok(Self { path, _file: file })
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Runs the daemon until a shutdown request or signal arrives.
pub async fn run(router_config: RouterConfig) -> Result<(), DaemonError> {
    let socket = socket_path();
    let lock = LockFile::acquire(socket.with_extension("lock"))?;
    remove_stale_socket(&socket)?;

    let broker = Broker::start(router_config).await?;
    let store = SelectorStore::open(store_path())?;

    let listener = UnixListener::bind(&socket).map_err(|source| DaemonError::Bind {
        path: socket.clone(),
        source,
    })?;
    info!(socket = %socket.display(), "daemon listening");

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let ctx = Arc::new(Ctx {
        router: broker.router(),
        store: Arc::new(store),
        started_at: Instant::now(),
        shutdown: shutdown_tx,
    });

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    let ctx = Arc::clone(&ctx);
                    tokio::spawn(async move {
                        if let Err(err) = serve_connection(stream, ctx).await {
                            debug!(error = %err, "control connection ended with error");
                        }
                    });
                }
                Err(err) => {
                    error!(error = %err, "control socket accept failed");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, shutting down");
                break;
            }
            _ = sigterm.recv() => {
                info!("termination signal received, shutting down");
                break;
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }

    broker.stop().await;
    if let Err(err) = fs::remove_file(&socket) {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!(error = %err, "failed to remove control socket");
        }
    }
    drop(lock);
    info!("daemon stopped");
    Ok(())
}

/// The socket file can survive a crashed daemon. The lock file already
/// proved no live instance exists, so an existing socket is stale.
fn remove_stale_socket(path: &Path) -> Result<(), DaemonError> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(socket = %path.display(), "removed stale socket");
            Ok(())
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

/// One line-delimited JSON-RPC session.
async fn serve_connection(stream: UnixStream, ctx: Arc<Ctx>) -> std::io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<RpcRequest>(&line) {
            Ok(request) => handle(&ctx, request).await,
            Err(err) => RpcResponse::error(
                serde_json::Value::Null,
                PARSE_ERROR,
                format!("invalid request: {err}"),
            ),
        };
        let mut payload = response.to_json();
        payload.push('\n');
        write_half.write_all(payload.as_bytes()).await?;
    }
    Ok(())
}
