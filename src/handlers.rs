//! Event handlers
//!
//! Each handler applies one event kind to the opposite store, reporting
//! progress milestones through the queue's callback. Uploads and downloads
//! are the multi-step flows: version lookup, byte transfer with
//! incremental progress, then the record write. A rename is a create plus
//! a tombstone of the previous record, not an atomic move; the stores need
//! not share a rename primitive, and the tombstone converges the duplicate.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::errors::{Result, SyncError};
use crate::model::{now_ms, EntryKind, SyncEvent, SyncFile, SyncFilePatch};
use crate::queue::{EventHandler, EventQueue, ProgressReporter, Registration};
use crate::retry::with_retry;
use crate::store::{LocalStore, RemoteIndex, RemoteObjects, TransferProgress};

/// The three adapter endpoints the handlers write through.
#[derive(Clone)]
pub struct Stores {
    pub local: Arc<dyn LocalStore>,
    pub index: Arc<dyn RemoteIndex>,
    pub objects: Arc<dyn RemoteObjects>,
}

/// Register the four local-origin handlers.
pub async fn register_local_handlers(
    queue: &EventQueue,
    stores: Stores,
    max_retries: u32,
) -> Vec<Registration> {
    debug!("registering local event handlers");
    use crate::model::EventKind::*;

    vec![
        queue
            .on(LocalCreate, Arc::new(LocalCreateHandler { stores: stores.clone(), max_retries }))
            .await,
        queue
            .on(LocalModify, Arc::new(LocalModifyHandler { stores: stores.clone(), max_retries }))
            .await,
        queue
            .on(LocalDelete, Arc::new(LocalDeleteHandler { stores: stores.clone() }))
            .await,
        queue
            .on(LocalRename, Arc::new(LocalRenameHandler { stores, max_retries }))
            .await,
    ]
}

/// Register the four remote-origin handlers.
pub async fn register_remote_handlers(
    queue: &EventQueue,
    stores: Stores,
    max_retries: u32,
) -> Vec<Registration> {
    debug!("registering remote event handlers");
    use crate::model::EventKind::*;

    vec![
        queue
            .on(RemoteCreate, Arc::new(RemoteCreateHandler { stores: stores.clone(), max_retries }))
            .await,
        queue
            .on(RemoteModify, Arc::new(RemoteModifyHandler { stores: stores.clone(), max_retries }))
            .await,
        queue
            .on(RemoteDelete, Arc::new(RemoteDeleteHandler { stores: stores.clone() }))
            .await,
        queue
            .on(RemoteTrash, Arc::new(RemoteTrashHandler { stores }))
            .await,
    ]
}

pub struct LocalCreateHandler {
    stores: Stores,
    max_retries: u32,
}

#[async_trait]
impl EventHandler for LocalCreateHandler {
    async fn handle(&self, event: &SyncEvent, progress: ProgressReporter) -> Result<()> {
        let file = event.file();
        upload_file(&self.stores, self.max_retries, file, &progress).await?;
        self.stores.index.put(file).await
    }
}

pub struct LocalModifyHandler {
    stores: Stores,
    max_retries: u32,
}

#[async_trait]
impl EventHandler for LocalModifyHandler {
    async fn handle(&self, event: &SyncEvent, progress: ProgressReporter) -> Result<()> {
        let file = event.file();
        upload_file(&self.stores, self.max_retries, file, &progress).await?;
        self.stores.index.put(file).await
    }
}

pub struct LocalDeleteHandler {
    stores: Stores,
}

#[async_trait]
impl EventHandler for LocalDeleteHandler {
    async fn handle(&self, event: &SyncEvent, _progress: ProgressReporter) -> Result<()> {
        let file = event.file();
        self.stores
            .index
            .patch(&SyncFilePatch {
                id: file.id.clone(),
                mtime: Some(now_ms()),
                deleted: None,
                trashed: Some(true),
            })
            .await
    }
}

pub struct LocalRenameHandler {
    stores: Stores,
    max_retries: u32,
}

#[async_trait]
impl EventHandler for LocalRenameHandler {
    async fn handle(&self, event: &SyncEvent, progress: ProgressReporter) -> Result<()> {
        let SyncEvent::LocalRename { file, previous } = event else {
            return Err(SyncError::UnexpectedEvent(event.kind()));
        };

        upload_file(&self.stores, self.max_retries, file, &progress).await?;
        self.stores.index.put(file).await?;
        progress.percent(90);

        self.stores
            .index
            .patch(&SyncFilePatch {
                id: SyncFile::path_id(previous),
                mtime: Some(now_ms()),
                deleted: Some(true),
                trashed: None,
            })
            .await
    }
}

pub struct RemoteCreateHandler {
    stores: Stores,
    max_retries: u32,
}

#[async_trait]
impl EventHandler for RemoteCreateHandler {
    async fn handle(&self, event: &SyncEvent, progress: ProgressReporter) -> Result<()> {
        download_and_write(&self.stores, self.max_retries, event.file(), &progress).await
    }
}

pub struct RemoteModifyHandler {
    stores: Stores,
    max_retries: u32,
}

#[async_trait]
impl EventHandler for RemoteModifyHandler {
    async fn handle(&self, event: &SyncEvent, progress: ProgressReporter) -> Result<()> {
        download_and_write(&self.stores, self.max_retries, event.file(), &progress).await
    }
}

pub struct RemoteDeleteHandler {
    stores: Stores,
}

#[async_trait]
impl EventHandler for RemoteDeleteHandler {
    async fn handle(&self, event: &SyncEvent, progress: ProgressReporter) -> Result<()> {
        let file = event.file();
        let entry = self.stores.local.stat(&file.path).await?;
        progress.percent(50);

        if let Some(entry) = entry {
            if entry.kind == EntryKind::File {
                self.stores.local.delete(&file.path).await?;
            }
        }
        Ok(())
    }
}

pub struct RemoteTrashHandler {
    stores: Stores,
}

#[async_trait]
impl EventHandler for RemoteTrashHandler {
    async fn handle(&self, event: &SyncEvent, progress: ProgressReporter) -> Result<()> {
        let file = event.file();
        let entry = self.stores.local.stat(&file.path).await?;
        progress.percent(50);

        if let Some(entry) = entry {
            if entry.kind == EntryKind::File {
                self.stores.local.trash(&file.path).await?;
            }
        }
        Ok(())
    }
}

/// Shared upload flow: next version, byte transfer mapped onto the
/// 10..=80 percent window, then the caller writes the record.
async fn upload_file(
    stores: &Stores,
    max_retries: u32,
    file: &SyncFile,
    progress: &ProgressReporter,
) -> Result<()> {
    let objects = stores.objects.clone();
    let path = file.path.clone();

    let version = with_retry(max_retries, || {
        let objects = objects.clone();
        let path = path.clone();
        async move { objects.next_version(&path).await }
    })
    .await?;

    progress.percent(10);

    let bytes = Arc::new(stores.local.read(&file.path).await?);

    let transfer = {
        let progress = progress.clone();
        TransferProgress::new(move |proportion| {
            let scaled = (proportion.clamp(0.0, 1.0) * 70.0).round() as u8;
            progress.percent(10 + scaled);
        })
    };

    with_retry(max_retries, || {
        let objects = objects.clone();
        let path = path.clone();
        let bytes = bytes.clone();
        let transfer = transfer.clone();
        async move { objects.upload(&path, version, &bytes, transfer).await }
    })
    .await?;

    progress.percent(80);
    Ok(())
}

/// Shared download flow: byte transfer mapped onto 0..=70 percent, parent
/// directories ensured, then the bytes land locally.
async fn download_and_write(
    stores: &Stores,
    max_retries: u32,
    remote: &SyncFile,
    progress: &ProgressReporter,
) -> Result<()> {
    let objects = stores.objects.clone();
    let path = remote.path.clone();

    let transfer = {
        let progress = progress.clone();
        TransferProgress::new(move |proportion| {
            let scaled = (proportion.clamp(0.0, 1.0) * 70.0).round() as u8;
            progress.percent(scaled);
        })
    };

    let bytes = with_retry(max_retries, || {
        let objects = objects.clone();
        let path = path.clone();
        let transfer = transfer.clone();
        async move { objects.download(&path, transfer).await }
    })
    .await?;

    stores.local.mkdirp(&remote.path).await?;
    progress.percent(90);
    stores.local.write(&remote.path, &bytes).await
}
