//! Boundary contracts for the external stores
//!
//! The engine never reimplements storage. It consumes a local file store,
//! a remote record index with its object-storage counterpart, and a small
//! persistence surface for the offline journal and watermark, all through
//! the traits below.

use async_trait::async_trait;
use std::sync::Arc;

use crate::errors::Result;
use crate::model::{LocalEntry, SyncEvent, SyncFile, SyncFilePatch};

/// Progress callback for object transfers, reporting a proportion in
/// `0.0..=1.0`.
#[derive(Clone)]
pub struct TransferProgress {
    report: Arc<dyn Fn(f64) + Send + Sync>,
}

impl TransferProgress {
    pub fn new(report: impl Fn(f64) + Send + Sync + 'static) -> Self {
        Self {
            report: Arc::new(report),
        }
    }

    /// Reporter for callers that do not track transfer progress.
    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    pub fn send(&self, proportion: f64) {
        (self.report.as_ref())(proportion);
    }
}

/// The local file tree.
///
/// Change notifications are not part of this trait; the adapter owns its
/// watcher and hands the engine a [`crate::model::LocalChange`] channel.
#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn read(&self, path: &str) -> Result<Vec<u8>>;
    async fn write(&self, path: &str, bytes: &[u8]) -> Result<()>;
    async fn delete(&self, path: &str) -> Result<()>;
    /// Recoverable soft-delete.
    async fn trash(&self, path: &str) -> Result<()>;
    /// Create every missing parent directory of `path`.
    async fn mkdirp(&self, path: &str) -> Result<()>;
    async fn stat(&self, path: &str) -> Result<Option<LocalEntry>>;
    async fn exists(&self, path: &str) -> Result<bool>;
    /// Every plain file in the tree (internal namespace excluded), with stats.
    async fn files(&self) -> Result<Vec<LocalEntry>>;
    /// Every plain file under the internal namespace, with stats.
    async fn internal_files(&self) -> Result<Vec<LocalEntry>>;
}

/// The remote record index.
#[async_trait]
pub trait RemoteIndex: Send + Sync {
    async fn get(&self, path: &str) -> Result<Option<SyncFile>>;
    async fn put(&self, file: &SyncFile) -> Result<()>;
    /// Merge a partial update into the record with `patch.id`.
    async fn patch(&self, patch: &SyncFilePatch) -> Result<()>;
    /// Records with `mtime` strictly greater than `watermark`, unordered.
    async fn list_after(&self, watermark: i64) -> Result<Vec<SyncFile>>;
}

/// The remote payload store backing the record index.
#[async_trait]
pub trait RemoteObjects: Send + Sync {
    async fn next_version(&self, path: &str) -> Result<u64>;
    async fn upload(
        &self,
        path: &str,
        version: u64,
        bytes: &[u8],
        progress: TransferProgress,
    ) -> Result<()>;
    async fn download(&self, path: &str, progress: TransferProgress) -> Result<Vec<u8>>;
}

/// Persistence for the offline event journal and the remote watermark.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn save_events(&self, events: &[SyncEvent]) -> Result<()>;
    async fn load_events(&self) -> Result<Vec<SyncEvent>>;
    async fn watermark(&self) -> Result<i64>;
    async fn set_watermark(&self, watermark: i64) -> Result<()>;
}
