//! Broker assembly: wires the manager, dispatcher and sweeper together.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::RouterConfig;
use crate::connection::ConnectionManager;
use crate::connection::ExecutorListener;
use crate::connection::WsListener;
use crate::correlation::CorrelationTable;
use crate::error::ConnectionError;
use crate::router::Router;
use crate::router::run_dispatch;
use crate::router::run_sweeper;

/// A running broker: connection manager, dispatch worker and deadline
/// sweeper, sharing one correlation table behind one [`Router`].
pub struct Broker {
    router: Arc<Router>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Broker {
    /// Binds the configured websocket listener and starts all workers.
    pub async fn start(config: RouterConfig) -> Result<Self, ConnectionError> {
        let listener = WsListener::bind(
            &config.listen_addr,
            config.allow_remote,
            config.handshake_timeout,
        )
        .await?;
        info!(addr = %config.listen_addr, "executor listener bound");
        Ok(Self::start_with_listener(Box::new(listener), config))
    }

    /// Starts the broker over an already-built listener. Tests use this with
    /// the in-memory transport.
    pub fn start_with_listener(listener: Box<dyn ExecutorListener>, config: RouterConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (events_tx, events_rx) = mpsc::channel(config.event_buffer);
        let (manager, handle) =
            ConnectionManager::new(listener, &config, events_tx, shutdown_rx.clone());
        let table = Arc::new(CorrelationTable::new());
        let router = Arc::new(Router::new(
            Arc::clone(&table),
            handle,
            config.default_timeout,
        ));

        let tasks = vec![
            tokio::spawn(manager.run()),
            tokio::spawn(run_dispatch(Arc::clone(&table), events_rx)),
            tokio::spawn(run_sweeper(table, config.sweep_interval, shutdown_rx)),
        ];

        Self {
            router,
            shutdown: shutdown_tx,
            tasks,
        }
    }

    pub fn router(&self) -> Arc<Router> {
        Arc::clone(&self.router)
    }

    /// Signals shutdown and waits for all workers to drain. Remaining
    /// in-flight requests fail with a connection-lost outcome.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
        info!("broker stopped");
    }
}
