//! The change store: an in-memory record map mutated through origin-tagged
//! atomic batches.
//!
//! DESIGN
//! ======
//! All writes go through [`ChangeStore::apply`], which takes effect under a
//! single lock and notifies every subscriber with the computed batch before
//! the lock is released. Subscribers therefore observe batches in apply
//! order, and a batch is all-or-nothing: no reader can see a partially
//! applied mutation. Writes win unconditionally (last writer wins); there is
//! no merging and no conflict detection.
//!
//! The origin tag is the echo-loop breaker: the sync engine relays
//! user-origin batches to peers and applies inbound state with remote
//! origin, which it then ignores on the way back out.

#[cfg(test)]
#[path = "store_test.rs"]
mod store_test;

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::record::{Record, RecordId, RecordKind};

/// Who authored a change batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// The local editing surface. Relayed to peers.
    User,
    /// The engine applying remote or mirrored state. Never relayed.
    Remote,
}

/// Before/after bodies of one changed record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordUpdate {
    pub from: Record,
    pub to: Record,
}

/// One atomic store mutation, as observed by subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeBatch {
    pub origin: ChangeOrigin,
    /// Records that did not exist before this batch.
    pub added: HashMap<RecordId, Record>,
    /// Records overwritten by this batch, with both sides.
    pub updated: HashMap<RecordId, RecordUpdate>,
    /// Records deleted by this batch, with their last body.
    pub removed: HashMap<RecordId, Record>,
}

impl ChangeBatch {
    fn new(origin: ChangeOrigin) -> Self {
        Self {
            origin,
            added: HashMap::new(),
            updated: HashMap::new(),
            removed: HashMap::new(),
        }
    }

    /// True when the batch carries no mutations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// In-memory record store shared by the editing surface and the sync engine.
pub struct ChangeStore {
    inner: Mutex<Inner>,
}

struct Inner {
    records: HashMap<RecordId, Record>,
    subscribers: Vec<mpsc::UnboundedSender<ChangeBatch>>,
}

impl ChangeStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner { records: HashMap::new(), subscribers: Vec::new() }),
        }
    }

    /// Subscribe to every non-empty batch applied from now on, in apply
    /// order. Dropped receivers are pruned on the next notification.
    #[must_use]
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ChangeBatch> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().subscribers.push(tx);
        rx
    }

    /// Apply a multi-record mutation atomically and return the computed
    /// batch. Upserts in `put` overwrite unconditionally; re-putting an
    /// identical body is a no-op and does not notify. Removing an absent id
    /// is a no-op.
    pub fn apply(
        &self,
        put: Vec<Record>,
        remove: Vec<RecordId>,
        origin: ChangeOrigin,
    ) -> ChangeBatch {
        let mut inner = self.lock();
        let mut batch = ChangeBatch::new(origin);

        for record in put {
            let id = record.id.clone();
            match inner.records.insert(id.clone(), record.clone()) {
                None => {
                    batch.added.insert(id, record);
                }
                Some(prev) if prev != record => {
                    batch.updated.insert(id, RecordUpdate { from: prev, to: record });
                }
                Some(_) => {}
            }
        }
        for id in remove {
            if let Some(prev) = inner.records.remove(&id) {
                batch.removed.insert(id, prev);
            }
        }

        if !batch.is_empty() {
            inner.subscribers.retain(|tx| tx.send(batch.clone()).is_ok());
        }
        batch
    }

    /// Upsert a single record.
    pub fn put(&self, record: Record, origin: ChangeOrigin) -> ChangeBatch {
        self.apply(vec![record], Vec::new(), origin)
    }

    /// Remove a single record.
    pub fn remove(&self, id: RecordId, origin: ChangeOrigin) -> ChangeBatch {
        self.apply(Vec::new(), vec![id], origin)
    }

    /// Clone of the record with this id, if present.
    #[must_use]
    pub fn get(&self, id: &RecordId) -> Option<Record> {
        self.lock().records.get(id).cloned()
    }

    /// True when a record with this id exists.
    #[must_use]
    pub fn contains(&self, id: &RecordId) -> bool {
        self.lock().records.contains_key(id)
    }

    /// All records of one kind, sorted by id for deterministic iteration.
    #[must_use]
    pub fn records_of(&self, kind: RecordKind) -> Vec<Record> {
        let mut out: Vec<Record> = self
            .lock()
            .records
            .values()
            .filter(|r| r.kind() == kind)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// All records, sorted by id.
    #[must_use]
    pub fn all(&self) -> Vec<Record> {
        let mut out: Vec<Record> = self.lock().records.values().cloned().collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// Number of records currently in the store.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    /// Returns `true` if the store contains no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Poisoning is not propagated; the store stays usable after a
        // panicked writer.
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Default for ChangeStore {
    fn default() -> Self {
        Self::new()
    }
}
