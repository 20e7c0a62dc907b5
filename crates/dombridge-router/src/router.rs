//! The router: submits commands, dispatches responses, sweeps deadlines.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use dombridge_wire::ActionKind;
use dombridge_wire::CallerKind;
use dombridge_wire::CommandEnvelope;
use dombridge_wire::Parameters;

use crate::connection::ConnectionHandle;
use crate::connection::ConnectionState;
use crate::connection::ConnectionStatus;
use crate::connection::RouterEvent;
use crate::correlation::CorrelationTable;
use crate::correlation::InsertError;
use crate::correlation::PendingEntry;
use crate::correlation::ResolveError;
use crate::error::SubmitError;

/// Brokers commands from any number of concurrent callers onto the single
/// executor connection. The router is the only mint for request ids, so two
/// in-flight commands can never collide.
pub struct Router {
    table: Arc<CorrelationTable>,
    conn: ConnectionHandle,
    next_id: AtomicU64,
    default_timeout: Duration,
}

impl Router {
    pub fn new(
        table: Arc<CorrelationTable>,
        conn: ConnectionHandle,
        default_timeout: Duration,
    ) -> Self {
        Self {
            table,
            conn,
            next_id: AtomicU64::new(1),
            default_timeout,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.conn.status()
    }

    pub fn pending_count(&self) -> usize {
        self.table.len()
    }

    /// Submits one command and awaits its single terminal outcome. Dropping
    /// the returned future abandons the command; a response arriving after
    /// that is treated as stray.
    pub async fn submit(
        &self,
        action: &str,
        parameters: Parameters,
        source: CallerKind,
        timeout: Option<Duration>,
    ) -> Result<Value, SubmitError> {
        let action: ActionKind = action.parse()?;
        action.validate(&parameters)?;
        let timeout = timeout.unwrap_or(self.default_timeout);

        let status = self.conn.status();
        if status.state != ConnectionState::Connected {
            return Err(SubmitError::Unavailable);
        }

        let id = self.mint_id();
        let envelope = CommandEnvelope::new(id.clone(), action, parameters, source)?;
        let text = envelope
            .to_json()
            .map_err(|err| SubmitError::Internal(err.to_string()))?;

        let (tx, rx) = oneshot::channel();
        let entry = PendingEntry::new(action, source, status.epoch, timeout, tx);
        if let Err(InsertError::DuplicateId) = self.table.insert(id.clone(), entry) {
            error!(id = %id, "request id collision in correlation table");
            return Err(SubmitError::Internal("request id collision".to_string()));
        }

        // Removes the entry if this future is dropped or errors out before
        // the dispatcher resolves it.
        let guard = CancelGuard {
            table: &self.table,
            id: &id,
            armed: true,
        };

        debug!(id = %id, action = %action, source = %source, epoch = status.epoch, "command submitted");
        // The manager only transmits on the epoch the entry is tagged with;
        // a reconnect racing this send fails it here instead of letting the
        // frame leave on a connection the entry does not match.
        if let Err(err) = self.conn.send(text, status.epoch).await {
            debug!(id = %id, error = %err, "send failed before response");
            drop(guard);
            return Err(SubmitError::ConnectionLost);
        }

        let outcome = rx.await;
        let mut guard = guard;
        guard.armed = false;
        match outcome {
            Ok(result) => result,
            // Sender dropped without resolving; only possible if the
            // dispatcher died.
            Err(_) => Err(SubmitError::Internal(
                "pending request dropped unresolved".to_string(),
            )),
        }
    }

    fn mint_id(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        format!("r{n}")
    }
}

struct CancelGuard<'a> {
    table: &'a CorrelationTable,
    id: &'a str,
    armed: bool,
}

impl Drop for CancelGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.table.cancel(self.id);
        }
    }
}

/// Consumes the manager's ordered event stream and resolves pending entries.
/// Running on one task guarantees a response that beat the disconnect also
/// beats the loss fan-out.
pub(crate) async fn run_dispatch(
    table: Arc<CorrelationTable>,
    mut events: mpsc::Receiver<RouterEvent>,
) {
    while let Some(event) = events.recv().await {
        match event {
            RouterEvent::Inbound { epoch, response } => {
                let id = response.id.clone();
                match table.resolve(&id, epoch) {
                    Ok(entry) => {
                        let outcome = response.into_outcome().map_err(|detail| {
                            SubmitError::Executor {
                                kind: detail.kind,
                                message: detail.message,
                            }
                        });
                        entry.complete(outcome);
                    }
                    Err(ResolveError::UnknownId) => {
                        debug!(id = %id, epoch, "stray response for unknown id");
                    }
                    Err(ResolveError::EpochMismatch { pending, response }) => {
                        debug!(
                            id = %id,
                            pending_epoch = pending,
                            response_epoch = response,
                            "stray response from stale epoch"
                        );
                    }
                }
            }
            RouterEvent::Established { epoch } => {
                info!(epoch, "dispatching on new connection epoch");
            }
            RouterEvent::Lost { epoch } => {
                let dropped = table.expire_epoch(epoch);
                if !dropped.is_empty() {
                    warn!(epoch, count = dropped.len(), "failing in-flight requests after disconnect");
                }
                for (_, entry) in dropped {
                    entry.complete(Err(SubmitError::ConnectionLost));
                }
            }
        }
    }
    // Manager gone: nothing can resolve the remainder.
    for (_, entry) in table.expire_all() {
        entry.complete(Err(SubmitError::ConnectionLost));
    }
}

/// Periodically fails entries whose deadline passed. A request times out no
/// earlier than its deadline and no later than one sweep interval after it.
pub(crate) async fn run_sweeper(
    table: Arc<CorrelationTable>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let expired = table.expire_older_than(Instant::now());
                for (id, entry) in expired {
                    let timeout_ms = entry.timeout.as_millis() as u64;
                    debug!(id = %id, timeout_ms, "request timed out");
                    entry.complete(Err(SubmitError::Timeout { timeout_ms }));
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}
