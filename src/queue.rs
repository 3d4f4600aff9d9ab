//! The event dispatch queue
//!
//! Accepts events from the change detectors, debounces and deduplicates
//! them, persists them while offline, and releases them to the registered
//! handlers in bounded-concurrency batches while tracking per-event
//! progress. Also exposes the suppression predicate the detectors consult
//! to avoid echoing sync-applied writes back into the queue.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::config::SyncSettings;
use crate::errors::{Result, SyncError};
use crate::model::{Direction, EventKind, SyncEvent};
use crate::online::OnlineMonitor;
use crate::progress::{ProgressLedger, ProgressPatch, SyncProgress};
use crate::store::StateStore;

/// Callback handle handed to a handler for reporting progress on the
/// record that owns the invocation.
#[derive(Clone)]
pub struct ProgressReporter {
    report: Arc<dyn Fn(ProgressPatch) + Send + Sync>,
}

impl ProgressReporter {
    pub fn new(report: impl Fn(ProgressPatch) + Send + Sync + 'static) -> Self {
        Self {
            report: Arc::new(report),
        }
    }

    pub fn send(&self, patch: ProgressPatch) {
        (self.report.as_ref())(patch);
    }

    pub fn percent(&self, value: u8) {
        self.send(ProgressPatch::percent(value));
    }
}

/// Applies one [`SyncEvent`] to the opposite store.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &SyncEvent, progress: ProgressReporter) -> Result<()>;
}

/// Handle returned by [`EventQueue::on`]; clears the registration.
pub struct Registration {
    inner: Weak<Inner>,
    kind: EventKind,
}

impl Registration {
    pub async fn unsubscribe(self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.handlers.lock().await.remove(&self.kind);
        }
    }
}

/// The dispatch core. Cheap to clone; all clones share one queue instance
/// which exclusively owns the waiting buffer, the pending batch, and the
/// progress ledger.
#[derive(Clone)]
pub struct EventQueue {
    inner: Arc<Inner>,
}

struct Inner {
    settings: SyncSettings,
    online: OnlineMonitor,
    journal: Arc<dyn StateStore>,
    handlers: Mutex<HashMap<EventKind, Arc<dyn EventHandler>>>,
    waitings: Mutex<Vec<SyncEvent>>,
    pendings: Mutex<VecDeque<(SyncEvent, u64)>>,
    draining: AtomicBool,
    ledger: ProgressLedger,
    debounce: Mutex<Option<JoinHandle<()>>>,
    online_task: Mutex<Option<JoinHandle<()>>>,
}

impl EventQueue {
    pub async fn new(
        settings: SyncSettings,
        online: OnlineMonitor,
        journal: Arc<dyn StateStore>,
    ) -> Self {
        let inner = Arc::new(Inner {
            settings,
            online,
            journal,
            handlers: Mutex::new(HashMap::new()),
            waitings: Mutex::new(Vec::new()),
            pendings: Mutex::new(VecDeque::new()),
            draining: AtomicBool::new(false),
            ledger: ProgressLedger::new(),
            debounce: Mutex::new(None),
            online_task: Mutex::new(None),
        });

        // Events persisted by a previous offline run are picked up right
        // away when we start connected.
        if inner.online.is_online() {
            if let Err(err) = inner.clone().drain_journal().await {
                warn!("failed to restore persisted events: {}", err);
            }
        }

        let task = tokio::spawn({
            let inner = inner.clone();
            let mut rx = inner.online.subscribe();
            async move {
                while rx.changed().await.is_ok() {
                    let is_online = *rx.borrow_and_update();
                    debug!("online: {}", is_online);

                    if is_online {
                        if let Err(err) = inner.clone().drain_journal().await {
                            warn!("failed to restore persisted events: {}", err);
                        }
                    } else {
                        let waitings = inner.waitings.lock().await.clone();
                        if let Err(err) = inner.journal.save_events(&waitings).await {
                            warn!("failed to persist waiting events: {}", err);
                        }
                    }
                }
            }
        });
        *inner.online_task.lock().await = Some(task);

        Self { inner }
    }

    /// Enqueue a new event.
    ///
    /// While offline the event is merged straight into the persisted
    /// journal. While online it lands in the waiting buffer; every kind
    /// except `local/modify` flushes immediately, repeated local edits are
    /// coalesced by the debounce timer.
    pub async fn add(&self, event: SyncEvent) -> Result<()> {
        debug!("event added: {} for path: {}", event.kind(), event.path());
        let inner = &self.inner;

        if !inner.online.is_online() {
            debug!("storing event while offline");
            let mut events = inner.journal.load_events().await?;
            events.push(event);
            inner.journal.save_events(&distinct_events(events)).await?;
            return Ok(());
        }

        inner.waitings.lock().await.push(event.clone());

        if let Some(timer) = inner.debounce.lock().await.take() {
            timer.abort();
        }

        if event.kind() != EventKind::LocalModify {
            self.flush();
            return Ok(());
        }

        let timer = tokio::spawn({
            let inner = inner.clone();
            async move {
                tokio::time::sleep(inner.settings.debounce()).await;
                inner.consume_waitings().await;
            }
        });
        *inner.debounce.lock().await = Some(timer);

        Ok(())
    }

    /// Flush the waiting buffer without waiting for the debounce timer.
    pub fn flush(&self) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            inner.consume_waitings().await;
        });
    }

    /// Re-enqueue the event behind a failed record under a fresh id.
    pub async fn retry(&self, id: u64) {
        debug!("event retry: {}", id);

        let Some(record) = self.inner.ledger.get(id) else {
            debug!("no progress found: {}", id);
            return;
        };

        self.inner.ledger.remove(id);
        self.inner.waitings.lock().await.push(record.event);
        self.flush();
    }

    /// Dismiss a record unconditionally; the underlying stores are not
    /// touched.
    pub fn delete(&self, id: u64) {
        debug!("event delete: {}", id);
        self.inner.ledger.remove(id);
    }

    /// Register the handler for `kind`, replacing any previous one.
    pub async fn on(&self, kind: EventKind, handler: Arc<dyn EventHandler>) -> Registration {
        self.inner.handlers.lock().await.insert(kind, handler);
        Registration {
            inner: Arc::downgrade(&self.inner),
            kind,
        }
    }

    /// Anti-echo predicate: true while any in-flight event of the opposite
    /// direction references `path`, either as its primary path or, for a
    /// rename, as the path it moved away from.
    pub fn is_suppressed(&self, direction: Direction, path: &str) -> bool {
        let opposite = direction.opposite();
        self.inner.ledger.snapshot().iter().any(|record| {
            record.event.direction() == opposite
                && (record.event.path() == path || record.event.previous() == Some(path))
        })
    }

    /// Snapshot stream of the progress ledger, re-published on every
    /// mutation.
    pub fn subscribe(&self) -> watch::Receiver<Vec<SyncProgress>> {
        self.inner.ledger.subscribe()
    }

    pub fn snapshot(&self) -> Vec<SyncProgress> {
        self.inner.ledger.snapshot()
    }

    pub fn online(&self) -> &OnlineMonitor {
        &self.inner.online
    }

    /// Detach the connectivity subscription and any pending debounce timer.
    /// Persisted state is left untouched.
    pub async fn destroy(&self) {
        if let Some(task) = self.inner.online_task.lock().await.take() {
            task.abort();
        }
        if let Some(timer) = self.inner.debounce.lock().await.take() {
            timer.abort();
        }
    }
}

impl Inner {
    /// Move the persisted journal into the waiting buffer and flush.
    async fn drain_journal(self: Arc<Self>) -> Result<()> {
        let events = self.journal.load_events().await?;
        if events.is_empty() {
            return Ok(());
        }

        debug!("found {} saved event(s)", events.len());
        self.journal.save_events(&[]).await?;

        {
            let mut waitings = self.waitings.lock().await;
            let current = std::mem::take(&mut *waitings);
            *waitings = events;
            waitings.extend(current);
        }

        self.consume_waitings().await;
        Ok(())
    }

    async fn consume_waitings(self: Arc<Self>) {
        debug!("consuming waiting events");

        let drained = std::mem::take(&mut *self.waitings.lock().await);
        let candidates = distinct_events(drained);

        {
            let mut pendings = self.pendings.lock().await;
            for event in candidates {
                let record = self.ledger.begin(event.clone());
                pendings.push_back((event, record.id));
            }
        }

        // Single-flight: a concurrent flush only feeds the pending queue.
        if self.draining.swap(true, Ordering::SeqCst) {
            debug!("dispatch loop already running");
            return;
        }

        loop {
            let batch: Vec<(SyncEvent, u64)> = {
                let mut pendings = self.pendings.lock().await;
                let take = self.settings.concurrency.max(1).min(pendings.len());
                pendings.drain(..take).collect()
            };

            if batch.is_empty() {
                self.draining.store(false, Ordering::SeqCst);
                // Items appended between the final drain and the flag reset
                // saw the loop as running; pick them up here instead of
                // stranding them until the next add.
                if self.pendings.lock().await.is_empty()
                    || self.draining.swap(true, Ordering::SeqCst)
                {
                    break;
                }
                continue;
            }

            self.run_batch(batch).await;
        }
    }

    /// Fan a batch out to handler tasks and await them all; one failure
    /// never aborts its siblings or the dispatch loop.
    async fn run_batch(self: &Arc<Self>, batch: Vec<(SyncEvent, u64)>) {
        let handles: Vec<(u64, JoinHandle<Result<()>>)> = batch
            .into_iter()
            .map(|(event, id)| {
                let inner = Arc::clone(self);
                (id, tokio::spawn(async move { inner.run_one(event, id).await }))
            })
            .collect();

        let mut succeeded = 0usize;
        let mut failed = 0usize;

        for (id, handle) in handles {
            match handle.await {
                Ok(Ok(())) => succeeded += 1,
                Ok(Err(_)) => failed += 1,
                Err(join_err) => {
                    failed += 1;
                    error!("handler task aborted for progress {}: {}", id, join_err);
                    self.ledger.apply(
                        id,
                        ProgressPatch {
                            error: Some(true),
                            message: Some(format!("handler aborted: {join_err}")),
                            ..ProgressPatch::default()
                        },
                    );
                }
            }
        }

        debug!("{} handler(s) succeeded, {} handler(s) failed", succeeded, failed);
    }

    async fn run_one(&self, event: SyncEvent, id: u64) -> Result<()> {
        let handler = self.handlers.lock().await.get(&event.kind()).cloned();

        let Some(handler) = handler else {
            warn!("missing handler for event type: {}", event.kind());
            self.ledger.apply(
                id,
                ProgressPatch {
                    error: Some(true),
                    message: Some(format!("no handler registered for {}", event.kind())),
                    ..ProgressPatch::default()
                },
            );
            return Err(SyncError::HandlerNotFound(event.kind()));
        };

        debug!("start handling {} for path: {}", event.kind(), event.path());

        let reporter = {
            let ledger = self.ledger.clone();
            ProgressReporter::new(move |patch| ledger.apply(id, patch))
        };

        match handler.handle(&event, reporter).await {
            Ok(()) => {
                self.ledger.apply(
                    id,
                    ProgressPatch {
                        done: Some(true),
                        progress: Some(100),
                        ..ProgressPatch::default()
                    },
                );
                self.ledger.remove(id);
                debug!("finished handling {} for path: {}", event.kind(), event.path());
                Ok(())
            }
            Err(err) => {
                error!(
                    "error while handling {} for path {}: {}",
                    event.kind(),
                    event.path(),
                    err
                );
                self.ledger.apply(
                    id,
                    ProgressPatch {
                        error: Some(true),
                        message: Some(err.to_string()),
                        ..ProgressPatch::default()
                    },
                );
                Err(err)
            }
        }
    }
}

/// Last-wins dedup by `(kind, path)`: the surviving event keeps the
/// position of its first occurrence and the payload of its last.
fn distinct_events(events: Vec<SyncEvent>) -> Vec<SyncEvent> {
    let mut distinct: Vec<SyncEvent> = Vec::with_capacity(events.len());

    for next in events {
        let found = distinct
            .iter()
            .position(|previous| previous.kind() == next.kind() && previous.path() == next.path());

        match found {
            Some(index) => distinct[index] = next,
            None => distinct.push(next),
        }
    }

    distinct
}
