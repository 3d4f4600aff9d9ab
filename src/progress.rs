//! Progress tracking for in-flight sync events

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use crate::model::SyncEvent;

/// One in-flight (or failed) sync operation.
///
/// Created when an event leaves the waiting buffer and enters dispatch,
/// mutated by progress callbacks during handling, removed on success and
/// retained with `error = true` on failure until retried or dismissed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncProgress {
    pub id: u64,
    pub message: String,
    pub progress: u8,
    pub done: bool,
    pub error: bool,
    pub event: SyncEvent,
}

/// Partial update applied to a [`SyncProgress`] record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressPatch {
    pub message: Option<String>,
    pub progress: Option<u8>,
    pub done: Option<bool>,
    pub error: Option<bool>,
}

impl ProgressPatch {
    /// Patch carrying only a completion percentage.
    pub fn percent(value: u8) -> Self {
        Self {
            progress: Some(value),
            ..Self::default()
        }
    }
}

/// Ordered, observable collection of progress records.
///
/// Records are kept sorted by their monotonically increasing ids and the
/// whole snapshot is re-published on every mutation.
#[derive(Clone)]
pub struct ProgressLedger {
    records: Arc<watch::Sender<Vec<SyncProgress>>>,
    next_id: Arc<AtomicU64>,
}

impl ProgressLedger {
    pub fn new() -> Self {
        let (records, _) = watch::channel(Vec::new());
        Self {
            records: Arc::new(records),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Mint a fresh record for `event` and insert it into the ledger.
    pub fn begin(&self, event: SyncEvent) -> SyncProgress {
        let record = SyncProgress {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            message: event.path().to_string(),
            progress: 0,
            done: false,
            error: false,
            event,
        };

        self.records.send_modify(|records| {
            let index = records
                .binary_search_by(|it| it.id.cmp(&record.id))
                .unwrap_or_else(|insert_at| insert_at);
            records.insert(index, record.clone());
        });

        record
    }

    pub fn get(&self, id: u64) -> Option<SyncProgress> {
        let records = self.records.borrow();
        records
            .binary_search_by(|it| it.id.cmp(&id))
            .ok()
            .map(|index| records[index].clone())
    }

    /// Apply `patch` to the record with `id`; unknown ids are a no-op.
    pub fn apply(&self, id: u64, patch: ProgressPatch) {
        self.records.send_modify(|records| {
            let Ok(index) = records.binary_search_by(|it| it.id.cmp(&id)) else {
                return;
            };
            let record = &mut records[index];
            if let Some(message) = patch.message {
                record.message = message;
            }
            if let Some(progress) = patch.progress {
                record.progress = progress.min(100);
            }
            if let Some(done) = patch.done {
                record.done = done;
            }
            if let Some(error) = patch.error {
                record.error = error;
            }
        });
    }

    pub fn remove(&self, id: u64) {
        self.records.send_modify(|records| {
            if let Ok(index) = records.binary_search_by(|it| it.id.cmp(&id)) {
                records.remove(index);
            }
        });
    }

    pub fn snapshot(&self) -> Vec<SyncProgress> {
        self.records.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<SyncProgress>> {
        self.records.subscribe()
    }

    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }
}

impl Default for ProgressLedger {
    fn default() -> Self {
        Self::new()
    }
}
