//! Connection manager: owns the executor listener and the single live socket.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::SinkExt;
use futures_util::StreamExt;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::sync::watch;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;
use tracing::info;
use tracing::warn;

use dombridge_wire::ControlFrame;
use dombridge_wire::InboundFrame;
use dombridge_wire::ResponseEnvelope;

use crate::backoff::BackoffPolicy;
use crate::config::RouterConfig;
use crate::error::ConnectionError;

/// Lifecycle of the executor link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and none being attempted.
    Disconnected,
    /// Waiting for a peer to complete accept and handshake.
    Connecting,
    /// A peer is attached and commands may flow.
    Connected,
    /// Last attempt or connection failed; sleeping before retry.
    Backoff,
}

/// Snapshot published through the status watch channel. The epoch counts
/// established connections; it only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub epoch: u64,
}

impl ConnectionStatus {
    pub fn disconnected() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            epoch: 0,
        }
    }
}

/// Events delivered to the dispatch worker. A single ordered channel carries
/// both responses and lifecycle transitions, so loss fan-out can never
/// overtake a response that arrived first.
#[derive(Debug)]
pub enum RouterEvent {
    /// A correlated response arrived on the given epoch.
    Inbound {
        epoch: u64,
        response: ResponseEnvelope,
    },
    /// A new connection epoch opened.
    Established { epoch: u64 },
    /// The connection for the given epoch dropped.
    Lost { epoch: u64 },
}

/// Source of executor connections. Production binds a websocket listener;
/// tests plug in an in-memory pair.
#[async_trait]
pub trait ExecutorListener: Send + Sync {
    async fn accept(&mut self) -> Result<Box<dyn ExecutorConnection>, ConnectionError>;
}

/// One attached executor peer carrying text frames both ways.
#[async_trait]
pub trait ExecutorConnection: Send + Sync {
    async fn send(&mut self, text: String) -> Result<(), ConnectionError>;
    /// Next text frame, or `None` on orderly close.
    async fn recv(&mut self) -> Result<Option<String>, ConnectionError>;
    async fn close(&mut self);
}

/// Websocket listener bound to the configured address. Refuses non-loopback
/// binds unless remote access was explicitly allowed.
#[derive(Debug)]
pub struct WsListener {
    listener: TcpListener,
    handshake_timeout: Duration,
}

impl WsListener {
    pub async fn bind(
        addr: &str,
        allow_remote: bool,
        handshake_timeout: Duration,
    ) -> Result<Self, ConnectionError> {
        let parsed: SocketAddr = addr
            .parse()
            .map_err(|_| ConnectionError::InvalidAddr(addr.to_string()))?;
        if !parsed.ip().is_loopback() && !allow_remote {
            return Err(ConnectionError::NonLoopback(addr.to_string()));
        }
        let listener = TcpListener::bind(parsed)
            .await
            .map_err(|source| ConnectionError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        Ok(Self {
            listener,
            handshake_timeout,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ConnectionError> {
        Ok(self.listener.local_addr()?)
    }
}

#[async_trait]
impl ExecutorListener for WsListener {
    async fn accept(&mut self) -> Result<Box<dyn ExecutorConnection>, ConnectionError> {
        let (stream, peer) = self.listener.accept().await?;
        debug!(peer = %peer, "tcp connection accepted, starting websocket handshake");
        let ws = tokio::time::timeout(self.handshake_timeout, accept_async(stream))
            .await
            .map_err(|_| ConnectionError::Handshake("handshake timed out".to_string()))?
            .map_err(|err| ConnectionError::Handshake(err.to_string()))?;
        Ok(Box::new(WsConnection { ws }))
    }
}

struct WsConnection {
    ws: WebSocketStream<TcpStream>,
}

#[async_trait]
impl ExecutorConnection for WsConnection {
    async fn send(&mut self, text: String) -> Result<(), ConnectionError> {
        self.ws
            .send(Message::Text(text))
            .await
            .map_err(|_| ConnectionError::Closed)
    }

    async fn recv(&mut self) -> Result<Option<String>, ConnectionError> {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                // Ping/pong are answered by the stream itself on flush.
                Some(Ok(_)) => continue,
                Some(Err(err)) => {
                    debug!(error = %err, "websocket read error");
                    return Err(ConnectionError::Closed);
                }
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.ws.close(None).await;
    }
}

/// Outbound send request handed to the manager by the router. Carries the
/// epoch the caller stamped its pending entry with; the manager refuses to
/// transmit on any other epoch.
pub(crate) struct SendCommand {
    pub text: String,
    pub epoch: u64,
    pub ack: oneshot::Sender<Result<u64, ConnectionError>>,
}

/// Cheap clone handed to the router for sends and status reads.
#[derive(Clone)]
pub struct ConnectionHandle {
    outbound: mpsc::Sender<SendCommand>,
    status: watch::Receiver<ConnectionStatus>,
}

impl ConnectionHandle {
    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Sends one text frame to the attached peer, confirming it left on
    /// `epoch`. Fails fast when no peer is connected, and fails rather than
    /// transmits when the connection was replaced since the caller read its
    /// epoch.
    pub async fn send(&self, text: String, epoch: u64) -> Result<u64, ConnectionError> {
        if self.status().state != ConnectionState::Connected {
            return Err(ConnectionError::NotConnected);
        }
        let (ack_tx, ack_rx) = oneshot::channel();
        self.outbound
            .send(SendCommand {
                text,
                epoch,
                ack: ack_tx,
            })
            .await
            .map_err(|_| ConnectionError::NotConnected)?;
        ack_rx.await.map_err(|_| ConnectionError::NotConnected)?
    }

    /// Watch receiver for callers that want to await state changes.
    pub fn watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }
}

/// Why the connected phase ended.
enum SessionEnd {
    PeerGone,
    Shutdown,
}

/// Runs the accept/connected/backoff loop until shutdown. All lifecycle and
/// inbound traffic is forwarded as [`RouterEvent`]s on one channel.
pub struct ConnectionManager {
    listener: Box<dyn ExecutorListener>,
    events: mpsc::Sender<RouterEvent>,
    outbound: mpsc::Receiver<SendCommand>,
    status: watch::Sender<ConnectionStatus>,
    shutdown: watch::Receiver<bool>,
    backoff: BackoffPolicy,
    epoch: u64,
}

impl ConnectionManager {
    /// Wires up a manager plus the handle the router uses to reach it.
    pub fn new(
        listener: Box<dyn ExecutorListener>,
        config: &RouterConfig,
        events: mpsc::Sender<RouterEvent>,
        shutdown: watch::Receiver<bool>,
    ) -> (Self, ConnectionHandle) {
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_buffer);
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::disconnected());
        let manager = Self {
            listener,
            events,
            outbound: outbound_rx,
            status: status_tx,
            shutdown,
            backoff: BackoffPolicy::new(config.backoff_base, config.backoff_max),
            epoch: 0,
        };
        let handle = ConnectionHandle {
            outbound: outbound_tx,
            status: status_rx,
        };
        (manager, handle)
    }

    pub async fn run(mut self) {
        let mut attempt: u32 = 0;
        loop {
            if self.shutdown_requested() {
                break;
            }
            self.set_state(ConnectionState::Connecting);

            let mut conn = tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(err) => {
                        warn!(error = %err, attempt, "executor accept failed");
                        if self.backoff_sleep(attempt).await {
                            break;
                        }
                        attempt = attempt.saturating_add(1);
                        continue;
                    }
                },
                _ = wait_for_shutdown(&mut self.shutdown) => break,
            };

            self.epoch += 1;
            attempt = 0;
            info!(epoch = self.epoch, "executor connected");

            if let Ok(greeting) = ControlFrame::greeting().to_json() {
                if let Err(err) = conn.send(greeting).await {
                    warn!(error = %err, epoch = self.epoch, "greeting failed, dropping peer");
                    conn.close().await;
                    continue;
                }
            }

            self.set_state(ConnectionState::Connected);
            if self
                .events
                .send(RouterEvent::Established { epoch: self.epoch })
                .await
                .is_err()
            {
                break;
            }

            let end = self.run_connected(conn.as_mut()).await;
            // Unpublish Connected before the loss fan-out so new submissions
            // fail fast instead of queueing into the gap.
            self.set_state(ConnectionState::Backoff);
            conn.close().await;
            info!(epoch = self.epoch, "executor disconnected");
            let _ = self
                .events
                .send(RouterEvent::Lost { epoch: self.epoch })
                .await;
            // Sends queued behind the dead session must fail now, not ride
            // into the next epoch.
            self.drain_outbound();

            match end {
                SessionEnd::Shutdown => break,
                SessionEnd::PeerGone => {
                    if self.backoff_sleep(attempt).await {
                        break;
                    }
                    attempt = attempt.saturating_add(1);
                }
            }
        }
        self.set_state(ConnectionState::Disconnected);
        self.drain_outbound();
    }

    async fn run_connected(&mut self, conn: &mut dyn ExecutorConnection) -> SessionEnd {
        loop {
            tokio::select! {
                // Order matters: deliver inbound frames before accepting
                // new outbound work, so a response and the send that raced
                // it resolve deterministically.
                biased;

                _ = wait_for_shutdown(&mut self.shutdown) => return SessionEnd::Shutdown,

                frame = conn.recv() => match frame {
                    Ok(Some(text)) => {
                        if let Some(reply) = self.handle_frame(&text).await {
                            if conn.send(reply).await.is_err() {
                                return SessionEnd::PeerGone;
                            }
                        }
                    }
                    Ok(None) | Err(_) => return SessionEnd::PeerGone,
                },

                cmd = self.outbound.recv() => match cmd {
                    Some(SendCommand { text, epoch, ack }) => {
                        if epoch != self.epoch {
                            // Queued before a reconnect; its pending entry
                            // was already failed, so transmitting now would
                            // replay a dead request.
                            let _ = ack.send(Err(ConnectionError::NotConnected));
                            continue;
                        }
                        let result = conn.send(text).await.map(|()| self.epoch);
                        let failed = result.is_err();
                        let _ = ack.send(result);
                        if failed {
                            return SessionEnd::PeerGone;
                        }
                    }
                    None => return SessionEnd::Shutdown,
                },

                // A second peer dialing in while one is attached gets
                // dropped; the broker serves exactly one executor.
                intruder = self.listener.accept() => {
                    if let Ok(mut extra) = intruder {
                        warn!(epoch = self.epoch, "rejecting second executor connection");
                        extra.close().await;
                    }
                },
            }
        }
    }

    /// Classifies one inbound frame, forwarding responses to the dispatcher.
    /// Returns a reply frame when the peer expects one.
    async fn handle_frame(&self, text: &str) -> Option<String> {
        match InboundFrame::parse(text) {
            Ok(InboundFrame::Response(response)) => {
                let _ = self
                    .events
                    .send(RouterEvent::Inbound {
                        epoch: self.epoch,
                        response,
                    })
                    .await;
                None
            }
            Ok(InboundFrame::Heartbeat) => ControlFrame::HeartbeatResponse.to_json().ok(),
            Ok(InboundFrame::Unknown(kind)) => {
                debug!(epoch = self.epoch, kind = %kind, "ignoring unknown frame");
                None
            }
            Err(err) => {
                warn!(epoch = self.epoch, error = %err, "dropping malformed frame");
                None
            }
        }
    }

    /// Sleeps out the backoff delay. Returns true when shutdown interrupted.
    async fn backoff_sleep(&mut self, attempt: u32) -> bool {
        self.set_state(ConnectionState::Backoff);
        let delay = self.backoff.delay_for(attempt);
        debug!(attempt, delay_ms = delay.as_millis() as u64, "backing off");
        tokio::select! {
            _ = tokio::time::sleep(delay) => false,
            _ = wait_for_shutdown(&mut self.shutdown) => true,
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let _ = self.status.send(ConnectionStatus {
            state,
            epoch: self.epoch,
        });
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Fails any sends that were queued behind the final disconnect.
    fn drain_outbound(&mut self) {
        while let Ok(SendCommand { ack, .. }) = self.outbound.try_recv() {
            let _ = ack.send(Err(ConnectionError::NotConnected));
        }
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::memory_transport;

    async fn connected_harness() -> (
        ConnectionHandle,
        crate::testing::MemoryPeer,
        mpsc::Receiver<RouterEvent>,
        watch::Sender<bool>,
    ) {
        let config = RouterConfig::default();
        let (listener, connector) = memory_transport();
        let (events_tx, events_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (manager, handle) =
            ConnectionManager::new(Box::new(listener), &config, events_tx, shutdown_rx);
        tokio::spawn(manager.run());

        let mut peer = connector.connect().await;
        let greeting = peer.recv().await.unwrap();
        assert!(greeting.contains("connection_established"));
        for _ in 0..200 {
            if handle.status().state == ConnectionState::Connected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert_eq!(handle.status().state, ConnectionState::Connected);
        (handle, peer, events_rx, shutdown_tx)
    }

    #[tokio::test]
    async fn test_send_confirms_current_epoch() {
        let (handle, mut peer, _events, shutdown) = connected_harness().await;
        let sent_epoch = handle.send(r#"{"id":"r1"}"#.to_string(), 1).await.unwrap();
        assert_eq!(sent_epoch, 1);
        assert_eq!(peer.recv().await.unwrap(), r#"{"id":"r1"}"#);
        let _ = shutdown.send(true);
    }

    #[tokio::test]
    async fn test_send_stamped_with_stale_epoch_is_refused() {
        let (handle, mut peer, _events, shutdown) = connected_harness().await;
        let err = handle
            .send(r#"{"id":"r1"}"#.to_string(), 99)
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectionError::NotConnected));

        // The session survives the refusal and still serves current sends.
        let sent_epoch = handle.send(r#"{"id":"r2"}"#.to_string(), 1).await.unwrap();
        assert_eq!(sent_epoch, 1);
        assert_eq!(peer.recv().await.unwrap(), r#"{"id":"r2"}"#);
        let _ = shutdown.send(true);
    }
}
