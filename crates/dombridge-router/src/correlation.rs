//! The correlation table: in-flight commands keyed by request id.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;

use dombridge_wire::ActionKind;
use dombridge_wire::CallerKind;

use crate::error::SubmitError;

/// Terminal result delivered to the caller awaiting a command.
pub type Outcome = Result<Value, SubmitError>;

/// One in-flight command. Owns the completion channel; whoever removes the
/// entry from the table owns the sole right to resolve it.
#[derive(Debug)]
pub struct PendingEntry {
    pub action: ActionKind,
    pub source: CallerKind,
    /// Connection epoch the command was sent on. Responses from a different
    /// epoch are stray and must not resolve this entry.
    pub epoch: u64,
    pub deadline: Instant,
    pub timeout: Duration,
    completion: oneshot::Sender<Outcome>,
}

impl PendingEntry {
    pub fn new(
        action: ActionKind,
        source: CallerKind,
        epoch: u64,
        timeout: Duration,
        completion: oneshot::Sender<Outcome>,
    ) -> Self {
        Self {
            action,
            source,
            epoch,
            deadline: Instant::now() + timeout,
            timeout,
            completion,
        }
    }

    /// Delivers the terminal outcome. A dropped receiver means the caller
    /// cancelled; that is not an error.
    pub fn complete(self, outcome: Outcome) {
        let _ = self.completion.send(outcome);
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum InsertError {
    /// An entry with this id is already pending.
    DuplicateId,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ResolveError {
    /// No pending entry carries this id.
    UnknownId,
    /// The entry was sent on a different connection epoch; the response is
    /// stray and the entry stays pending until its own epoch's loss fan-out.
    EpochMismatch { pending: u64, response: u64 },
}

/// Pending commands indexed by id. All mutation goes through `&self`; a
/// poisoned lock is recovered because every operation leaves the map valid.
#[derive(Debug, Default)]
pub struct CorrelationTable {
    entries: Mutex<HashMap<String, PendingEntry>>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: String, entry: PendingEntry) -> Result<(), InsertError> {
        let mut entries = self.lock();
        if entries.contains_key(&id) {
            return Err(InsertError::DuplicateId);
        }
        entries.insert(id, entry);
        Ok(())
    }

    /// Removes and returns the entry for `id` if it belongs to `epoch`. On an
    /// epoch mismatch the entry is left in place.
    pub fn resolve(&self, id: &str, epoch: u64) -> Result<PendingEntry, ResolveError> {
        let mut entries = self.lock();
        let pending_epoch = match entries.get(id) {
            Some(entry) => entry.epoch,
            None => return Err(ResolveError::UnknownId),
        };
        if pending_epoch != epoch {
            return Err(ResolveError::EpochMismatch {
                pending: pending_epoch,
                response: epoch,
            });
        }
        entries
            .remove(id)
            .ok_or(ResolveError::UnknownId)
    }

    /// Removes and returns every entry whose deadline is at or before `now`.
    pub fn expire_older_than(&self, now: Instant) -> Vec<(String, PendingEntry)> {
        let mut entries = self.lock();
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();
        expired
            .into_iter()
            .filter_map(|id| entries.remove(&id).map(|entry| (id, entry)))
            .collect()
    }

    /// Drains every entry belonging to `epoch`. Entries from other epochs
    /// (none in practice, since loss fan-out runs before the next epoch
    /// sends) are untouched.
    pub fn expire_epoch(&self, epoch: u64) -> Vec<(String, PendingEntry)> {
        let mut entries = self.lock();
        let matching: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.epoch == epoch)
            .map(|(id, _)| id.clone())
            .collect();
        matching
            .into_iter()
            .filter_map(|id| entries.remove(&id).map(|entry| (id, entry)))
            .collect()
    }

    /// Drains every entry regardless of epoch. Used on shutdown.
    pub fn expire_all(&self) -> Vec<(String, PendingEntry)> {
        self.lock().drain().collect()
    }

    /// Removes an entry without resolving it. Idempotent; used when the
    /// caller abandons the await.
    pub fn cancel(&self, id: &str) {
        self.lock().remove(id);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, PendingEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(epoch: u64, timeout: Duration) -> (PendingEntry, oneshot::Receiver<Outcome>) {
        let (tx, rx) = oneshot::channel();
        let entry = PendingEntry::new(
            ActionKind::GetPageInfo,
            CallerKind::Interactive,
            epoch,
            timeout,
            tx,
        );
        (entry, rx)
    }

    #[tokio::test]
    async fn test_insert_and_resolve() {
        let table = CorrelationTable::new();
        let (pending, mut rx) = entry(1, Duration::from_secs(30));
        table.insert("r1".to_string(), pending).unwrap();
        assert_eq!(table.len(), 1);

        let resolved = table.resolve("r1", 1).unwrap();
        resolved.complete(Ok(Value::Null));
        assert_eq!(rx.try_recv().unwrap(), Ok(Value::Null));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let table = CorrelationTable::new();
        let (first, _rx1) = entry(1, Duration::from_secs(30));
        let (second, _rx2) = entry(1, Duration::from_secs(30));
        table.insert("r1".to_string(), first).unwrap();
        assert_eq!(
            table.insert("r1".to_string(), second),
            Err(InsertError::DuplicateId)
        );
        assert_eq!(table.len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_unknown_id() {
        let table = CorrelationTable::new();
        assert_eq!(table.resolve("r9", 1).unwrap_err(), ResolveError::UnknownId);
    }

    #[tokio::test]
    async fn test_resolve_wrong_epoch_leaves_entry() {
        let table = CorrelationTable::new();
        let (pending, _rx) = entry(1, Duration::from_secs(30));
        table.insert("r1".to_string(), pending).unwrap();

        let err = table.resolve("r1", 2).unwrap_err();
        assert_eq!(
            err,
            ResolveError::EpochMismatch {
                pending: 1,
                response: 2
            }
        );
        assert_eq!(table.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_older_than_takes_only_past_deadlines() {
        let table = CorrelationTable::new();
        let (short, _rx1) = entry(1, Duration::from_millis(100));
        let (long, _rx2) = entry(1, Duration::from_secs(60));
        table.insert("r1".to_string(), short).unwrap();
        table.insert("r2".to_string(), long).unwrap();

        tokio::time::advance(Duration::from_millis(200)).await;
        let expired = table.expire_older_than(Instant::now());
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].0, "r1");
        assert_eq!(table.len(), 1);
    }

    #[tokio::test]
    async fn test_expire_epoch_drains_only_that_epoch() {
        let table = CorrelationTable::new();
        let (old, _rx1) = entry(1, Duration::from_secs(60));
        let (new, _rx2) = entry(2, Duration::from_secs(60));
        table.insert("r1".to_string(), old).unwrap();
        table.insert("r2".to_string(), new).unwrap();

        let drained = table.expire_epoch(1);
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].0, "r1");
        assert_eq!(table.len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let table = CorrelationTable::new();
        let (pending, _rx) = entry(1, Duration::from_secs(60));
        table.insert("r1".to_string(), pending).unwrap();
        table.cancel("r1");
        table.cancel("r1");
        assert!(table.is_empty());
    }
}
