//! Startup reconciliation
//!
//! One-shot merge of the remote record listing against the local file
//! listing that seeds the queue after install (first sync) or a cold start
//! with a known watermark (startup sync). One pass, O(n log m): the remote
//! list is sorted by path once, each local file is binary-searched against
//! it, and matched records are consumed so the leftovers are exactly the
//! remote-only novelties.

use std::sync::Arc;
use tracing::debug;

use crate::config::SyncSettings;
use crate::errors::Result;
use crate::local::LocalDetector;
use crate::remote::RemoteDetector;
use crate::store::{LocalStore, RemoteIndex};

pub struct Reconciler {
    local_detector: Arc<LocalDetector>,
    remote_detector: Arc<RemoteDetector>,
    local: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteIndex>,
    settings: SyncSettings,
}

impl Reconciler {
    pub fn new(
        local_detector: Arc<LocalDetector>,
        remote_detector: Arc<RemoteDetector>,
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteIndex>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            local_detector,
            remote_detector,
            local,
            remote,
            settings,
        }
    }

    /// Full reconciliation for a store with no previous watermark.
    /// Returns the new watermark: the maximum remote mtime seen across
    /// matched and applied records.
    pub async fn first_sync(&self) -> Result<i64> {
        let internal = self.settings.internal_sync_enabled;

        let mut remotes: Vec<_> = self
            .remote
            .list_after(0)
            .await?
            .into_iter()
            .filter(|record| internal || !self.settings.is_internal(&record.path))
            .collect();
        remotes.sort_by(|a, b| a.path.cmp(&b.path));

        let mut locals = self.local.files().await?;
        if internal {
            locals.extend(self.local.internal_files().await?);
        }

        debug!(
            "first sync over {} local file(s) and {} remote record(s)",
            locals.len(),
            remotes.len()
        );

        let mut watermark = 0i64;

        for local in &locals {
            let found = remotes.binary_search_by(|record| record.path.as_str().cmp(&local.path));

            let Ok(index) = found else {
                debug!("found unmanaged local file: {}", local.path);
                self.local_detector.on_create(&local.path).await?;
                continue;
            };

            let record = remotes.remove(index);
            watermark = watermark.max(record.mtime);

            if local.mtime < record.mtime {
                debug!("remote record is newer than local file: {}", local.path);
                self.remote_detector.on_changed(record).await?;
            } else if local.mtime > record.mtime {
                debug!("local file is newer than remote record: {}", local.path);
                self.local_detector.on_modify(&local.path).await?;
            } else {
                debug!("local file and remote record share mtime: {}", local.path);
            }
        }

        // Whatever was not consumed by a local match exists only remotely.
        for record in remotes {
            watermark = watermark.max(record.mtime);
            self.remote_detector.on_changed(record).await?;
        }

        Ok(watermark)
    }

    /// Warm start: feed every record newer than `watermark` through the
    /// same classification the live detector uses.
    pub async fn startup_sync(&self, watermark: i64) -> Result<i64> {
        let records = self.remote.list_after(watermark).await?;
        debug!("{} remote record(s) found after watermark {}", records.len(), watermark);

        let mut latest = watermark;
        for record in records {
            latest = latest.max(record.mtime);
            self.remote_detector.on_changed(record).await?;
        }

        Ok(latest)
    }
}
