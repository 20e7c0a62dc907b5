//! In-memory executor transport for exercising the broker without sockets.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::connection::ExecutorConnection;
use crate::connection::ExecutorListener;
use crate::error::ConnectionError;

/// Builds a paired in-memory listener and connector. The listener plugs into
/// the connection manager; the connector plays the executor peer.
pub fn memory_transport() -> (MemoryListener, MemoryConnector) {
    let (tx, rx) = mpsc::channel(8);
    (MemoryListener { incoming: rx }, MemoryConnector { dial: tx })
}

pub struct MemoryListener {
    incoming: mpsc::Receiver<MemoryConnection>,
}

#[async_trait]
impl ExecutorListener for MemoryListener {
    async fn accept(&mut self) -> Result<Box<dyn ExecutorConnection>, ConnectionError> {
        match self.incoming.recv().await {
            Some(conn) => Ok(Box::new(conn)),
            None => Err(ConnectionError::Closed),
        }
    }
}

/// Executor-side dialer. Clone it to simulate reconnects across epochs.
#[derive(Clone)]
pub struct MemoryConnector {
    dial: mpsc::Sender<MemoryConnection>,
}

impl MemoryConnector {
    /// Dials the broker, returning the peer half once the listener accepts.
    pub async fn connect(&self) -> MemoryPeer {
        let (to_peer_tx, to_peer_rx) = mpsc::unbounded_channel();
        let (to_broker_tx, to_broker_rx) = mpsc::unbounded_channel();
        let broker_side = MemoryConnection {
            outgoing: Some(to_peer_tx),
            incoming: to_broker_rx,
        };
        self.dial
            .send(broker_side)
            .await
            .unwrap_or_else(|_| panic!("broker listener dropped"));
        MemoryPeer {
            outgoing: to_broker_tx,
            incoming: to_peer_rx,
        }
    }
}

/// The executor's end of one in-memory connection.
pub struct MemoryPeer {
    outgoing: mpsc::UnboundedSender<String>,
    incoming: mpsc::UnboundedReceiver<String>,
}

impl MemoryPeer {
    /// Sends one text frame toward the broker. Returns false once the broker
    /// has hung up.
    pub fn send(&self, text: impl Into<String>) -> bool {
        self.outgoing.send(text.into()).is_ok()
    }

    /// Next frame from the broker, or `None` when it disconnected.
    pub async fn recv(&mut self) -> Option<String> {
        self.incoming.recv().await
    }

    /// Drops the sending half, which the broker observes as a peer close.
    pub fn disconnect(self) {}
}

struct MemoryConnection {
    outgoing: Option<mpsc::UnboundedSender<String>>,
    incoming: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl ExecutorConnection for MemoryConnection {
    async fn send(&mut self, text: String) -> Result<(), ConnectionError> {
        match &self.outgoing {
            Some(tx) => tx.send(text).map_err(|_| ConnectionError::Closed),
            None => Err(ConnectionError::Closed),
        }
    }

    async fn recv(&mut self) -> Result<Option<String>, ConnectionError> {
        Ok(self.incoming.recv().await)
    }

    async fn close(&mut self) {
        self.outgoing = None;
        self.incoming.close();
    }
}
