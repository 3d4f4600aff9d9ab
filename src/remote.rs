//! Remote-change detector
//!
//! Consumes the remote store's ordered change feed, classifies each record
//! against the last-known local state, and emits remote events into the
//! queue. The watermark tracks remote time seen, not local application
//! success, so it advances for every change whether or not an event was
//! produced.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::SyncSettings;
use crate::errors::Result;
use crate::ignore::IgnoreFilter;
use crate::model::{Direction, EntryKind, RemoteChange, RemoteChangeKind, SyncEvent, SyncFile};
use crate::queue::EventQueue;
use crate::store::{LocalStore, StateStore};

pub struct RemoteDetector {
    queue: EventQueue,
    local: Arc<dyn LocalStore>,
    state: Arc<dyn StateStore>,
    ignores: IgnoreFilter,
    settings: SyncSettings,
    watermark: AtomicI64,
}

impl RemoteDetector {
    pub async fn new(
        queue: EventQueue,
        local: Arc<dyn LocalStore>,
        state: Arc<dyn StateStore>,
        ignores: IgnoreFilter,
        settings: SyncSettings,
    ) -> Result<Self> {
        let watermark = state.watermark().await?;
        Ok(Self {
            queue,
            local,
            state,
            ignores,
            settings,
            watermark: AtomicI64::new(watermark),
        })
    }

    pub fn watermark(&self) -> i64 {
        self.watermark.load(Ordering::Relaxed)
    }

    /// Process one batch of the live change feed, advancing the persisted
    /// watermark past every consumed change.
    pub async fn handle_changes(&self, changes: Vec<RemoteChange>) -> Result<()> {
        for change in changes {
            let mtime = change.record.mtime;

            match change.kind {
                RemoteChangeKind::Added | RemoteChangeKind::Modified => {
                    if let Err(err) = self.on_changed(change.record).await {
                        warn!("failed to process remote change: {}", err);
                    }
                }
                RemoteChangeKind::Removed => {
                    // Record deletion is signaled through the deleted and
                    // trashed flags, not feed removal.
                    debug!("removed feed entry ignored: {}", change.record.path);
                }
            }

            if mtime > self.watermark.load(Ordering::Relaxed) {
                self.watermark.store(mtime, Ordering::Relaxed);
                self.state.set_watermark(mtime).await?;
            }
        }

        Ok(())
    }

    /// Classify one added-or-modified record and emit the matching remote
    /// event, if any. No watermark side effects.
    pub async fn on_changed(&self, remote: SyncFile) -> Result<()> {
        debug!("remote change occurred: {}", remote.path);

        if self.queue.is_suppressed(Direction::Remote, &remote.path) {
            debug!("remote events suppressed for path: {}", remote.path);
            return Ok(());
        }

        if self.settings.is_internal(&remote.path) && !self.settings.internal_sync_enabled {
            debug!("internal sync disabled: {}. ignored", remote.path);
            return Ok(());
        }

        if self.ignores.is_ignored(&remote.path) {
            debug!("path matches ignore patterns: {}. ignored", remote.path);
            return Ok(());
        }

        let Some(local) = self.local.stat(&remote.path).await? else {
            if remote.deleted || remote.trashed {
                debug!("record already deleted or trashed: {}. ignored", remote.path);
                return Ok(());
            }
            return self.queue.add(SyncEvent::RemoteCreate { file: remote }).await;
        };

        if local.kind != EntryKind::File {
            debug!("local entry is not a plain file: {}. ignored", remote.path);
            return Ok(());
        }

        if remote.mtime <= local.mtime {
            debug!("remote mtime not newer than local: {}. ignored", remote.path);
            return Ok(());
        }

        if remote.deleted {
            return self.queue.add(SyncEvent::RemoteDelete { file: remote }).await;
        }

        if remote.trashed {
            return self.queue.add(SyncEvent::RemoteTrash { file: remote }).await;
        }

        let content = self.local.read(&remote.path).await?;
        if SyncFile::content_digest(&content) == remote.hash {
            debug!("same hash detected: {}. ignored", remote.path);
            return Ok(());
        }

        self.queue.add(SyncEvent::RemoteModify { file: remote }).await
    }
}
