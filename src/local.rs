//! Local-change detector
//!
//! Observes the local store's change notifications and, after the
//! suppression/ignore/conflict checks, emits the corresponding local
//! events into the queue. Content is read and hashed at detection time so
//! the event carries the state of the file at that instant.

use std::sync::Arc;
use tracing::debug;

use crate::config::SyncSettings;
use crate::errors::Result;
use crate::ignore::IgnoreFilter;
use crate::model::{now_ms, Direction, EntryKind, LocalChange, LocalEntry, SyncEvent, SyncFile};
use crate::queue::EventQueue;
use crate::store::{LocalStore, RemoteIndex};

pub struct LocalDetector {
    queue: EventQueue,
    local: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteIndex>,
    ignores: IgnoreFilter,
    settings: SyncSettings,
}

impl LocalDetector {
    pub fn new(
        queue: EventQueue,
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteIndex>,
        ignores: IgnoreFilter,
        settings: SyncSettings,
    ) -> Self {
        Self {
            queue,
            local,
            remote,
            ignores,
            settings,
        }
    }

    pub async fn dispatch(&self, change: LocalChange) -> Result<()> {
        match change {
            LocalChange::Create(path) => self.on_create(&path).await,
            LocalChange::Modify(path) => self.on_modify(&path).await,
            LocalChange::Delete { path, kind } => self.on_delete(&path, kind).await,
            LocalChange::Rename { path, previous } => self.on_rename(&path, &previous).await,
            LocalChange::Raw(path) => self.on_raw(&path).await,
        }
    }

    pub async fn on_create(&self, path: &str) -> Result<()> {
        debug!("create event occurred: {}", path);

        let Some(entry) = self.observable_file(path).await? else {
            return Ok(());
        };

        if self.queue.online().is_online() {
            if let Some(remote) = self.remote.get(path).await? {
                // A tombstoned record never short-circuits a re-creation.
                if !remote.deleted && !remote.trashed {
                    let digest = self.digest(path).await?;
                    if digest == remote.hash {
                        debug!("same hash detected: {}. ignored", remote.path);
                        return Ok(());
                    }
                }
            }
        }

        let file = self.sync_file(&entry).await?;
        self.queue.add(SyncEvent::LocalCreate { file }).await
    }

    pub async fn on_modify(&self, path: &str) -> Result<()> {
        debug!("modify event occurred: {}", path);

        let Some(entry) = self.observable_file(path).await? else {
            return Ok(());
        };

        if self.queue.online().is_online() {
            let Some(remote) = self.remote.get(path).await? else {
                // Nothing to diff against; the pending create arrives via
                // the create path.
                debug!("remote record missing: {}. ignored", path);
                return Ok(());
            };

            let digest = self.digest(path).await?;
            if digest == remote.hash {
                debug!("same hash detected: {}. ignored", remote.path);
                return Ok(());
            }
        }

        let file = self.sync_file(&entry).await?;
        self.queue.add(SyncEvent::LocalModify { file }).await
    }

    pub async fn on_delete(&self, path: &str, kind: EntryKind) -> Result<()> {
        debug!("delete event occurred: {}", path);

        if self.queue.is_suppressed(Direction::Local, path) {
            debug!("local events suppressed for path: {}", path);
            return Ok(());
        }

        if kind != EntryKind::File {
            debug!("entry is not a plain file: {}. ignored", path);
            return Ok(());
        }

        if self.ignores.is_ignored(path) {
            debug!("path matches ignore patterns: {}. ignored", path);
            return Ok(());
        }

        if self.queue.online().is_online() {
            let Some(remote) = self.remote.get(path).await? else {
                debug!("remote record missing: {}. ignored", path);
                return Ok(());
            };

            if remote.deleted || remote.trashed {
                debug!("remote record already deleted or trashed: {}. ignored", path);
                return Ok(());
            }
        }

        // The entry is gone, so the record is synthesized from the path;
        // the delete flow only consumes the path-derived id.
        let file = SyncFile {
            id: SyncFile::path_id(path),
            path: path.to_string(),
            hash: String::new(),
            mtime: now_ms(),
            deleted: false,
            trashed: false,
        };
        self.queue.add(SyncEvent::LocalDelete { file }).await
    }

    /// A rename is one event carrying the new file plus the previous path,
    /// so the remote side can apply a move instead of delete-then-create.
    pub async fn on_rename(&self, path: &str, previous: &str) -> Result<()> {
        debug!("rename event occurred: {} (from {})", path, previous);

        let Some(entry) = self.observable_file(path).await? else {
            return Ok(());
        };

        if self.queue.online().is_online() {
            if let Some(remote) = self.remote.get(path).await? {
                if !remote.deleted && !remote.trashed {
                    let digest = self.digest(path).await?;
                    if digest == remote.hash {
                        debug!("same hash detected: {}. ignored", remote.path);
                        return Ok(());
                    }
                }
            }
        }

        let file = self.sync_file(&entry).await?;
        self.queue
            .add(SyncEvent::LocalRename {
                file,
                previous: previous.to_string(),
            })
            .await
    }

    /// Internal-namespace channel: a touched path is classified as a
    /// create when its creation and modification times match, otherwise as
    /// a modify, then re-dispatched.
    pub async fn on_raw(&self, path: &str) -> Result<()> {
        if !self.settings.is_internal(path) {
            return Ok(());
        }

        let Some(entry) = self.local.stat(path).await? else {
            return Ok(());
        };

        if entry.ctime == entry.mtime {
            self.on_create(path).await
        } else {
            self.on_modify(path).await
        }
    }

    /// Shared gate for create/modify/rename: suppression, plain-file, and
    /// ignore-pattern checks. Returns the entry when the event should be
    /// considered further.
    async fn observable_file(&self, path: &str) -> Result<Option<LocalEntry>> {
        if self.queue.is_suppressed(Direction::Local, path) {
            debug!("local events suppressed for path: {}", path);
            return Ok(None);
        }

        let Some(entry) = self.local.stat(path).await? else {
            debug!("no entry found for path: {}. ignored", path);
            return Ok(None);
        };

        if entry.kind != EntryKind::File {
            debug!("entry is not a plain file: {}. ignored", path);
            return Ok(None);
        }

        if self.ignores.is_ignored(path) {
            debug!("path matches ignore patterns: {}. ignored", path);
            return Ok(None);
        }

        Ok(Some(entry))
    }

    async fn sync_file(&self, entry: &LocalEntry) -> Result<SyncFile> {
        let content = self.local.read(&entry.path).await?;
        Ok(SyncFile {
            id: SyncFile::path_id(&entry.path),
            path: entry.path.clone(),
            hash: SyncFile::content_digest(&content),
            mtime: entry.mtime,
            deleted: false,
            trashed: false,
        })
    }

    async fn digest(&self, path: &str) -> Result<String> {
        Ok(SyncFile::content_digest(&self.local.read(path).await?))
    }
}
