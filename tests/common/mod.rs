//! Shared in-memory adapter fakes for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

use vaultsync::{
    now_ms, EntryKind, LocalEntry, LocalStore, RemoteIndex, RemoteObjects, Result, StateStore,
    SyncError, SyncEvent, SyncFile, SyncFilePatch, TransferProgress,
};

#[derive(Debug, Clone)]
pub struct MemoryFile {
    pub bytes: Vec<u8>,
    pub ctime: i64,
    pub mtime: i64,
}

/// Local tree held in memory. Trashed paths are remembered so tests can
/// tell a soft delete from a hard delete.
pub struct MemoryLocalStore {
    internal_dir: String,
    pub files: Mutex<HashMap<String, MemoryFile>>,
    pub directories: Mutex<HashSet<String>>,
    pub trashed: Mutex<Vec<String>>,
}

impl MemoryLocalStore {
    pub fn new(internal_dir: &str) -> Self {
        Self {
            internal_dir: internal_dir.to_string(),
            files: Mutex::new(HashMap::new()),
            directories: Mutex::new(HashSet::new()),
            trashed: Mutex::new(Vec::new()),
        }
    }

    pub async fn insert(&self, path: &str, bytes: &[u8], ctime: i64, mtime: i64) {
        self.files.lock().await.insert(
            path.to_string(),
            MemoryFile {
                bytes: bytes.to_vec(),
                ctime,
                mtime,
            },
        );
    }

    pub async fn insert_directory(&self, path: &str) {
        self.directories.lock().await.insert(path.to_string());
    }

    pub async fn bytes_of(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().await.get(path).map(|file| file.bytes.clone())
    }

    fn entry(path: &str, file: &MemoryFile) -> LocalEntry {
        LocalEntry {
            path: path.to_string(),
            kind: EntryKind::File,
            ctime: file.ctime,
            mtime: file.mtime,
            size: file.bytes.len() as u64,
        }
    }
}

#[async_trait]
impl LocalStore for MemoryLocalStore {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.files
            .lock()
            .await
            .get(path)
            .map(|file| file.bytes.clone())
            .ok_or_else(|| SyncError::Storage(format!("missing file: {path}")))
    }

    async fn write(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let now = now_ms();
        let mut files = self.files.lock().await;
        let ctime = files.get(path).map(|file| file.ctime).unwrap_or(now);
        files.insert(
            path.to_string(),
            MemoryFile {
                bytes: bytes.to_vec(),
                ctime,
                mtime: now,
            },
        );
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.files.lock().await.remove(path);
        Ok(())
    }

    async fn trash(&self, path: &str) -> Result<()> {
        self.files.lock().await.remove(path);
        self.trashed.lock().await.push(path.to_string());
        Ok(())
    }

    async fn mkdirp(&self, path: &str) -> Result<()> {
        let segments: Vec<&str> = path.split('/').collect();
        let Some((_, parents)) = segments.split_last() else {
            return Ok(());
        };

        let mut directories = self.directories.lock().await;
        let mut ancestors = Vec::new();
        for segment in parents {
            ancestors.push(*segment);
            directories.insert(ancestors.join("/"));
        }
        Ok(())
    }

    async fn stat(&self, path: &str) -> Result<Option<LocalEntry>> {
        if let Some(file) = self.files.lock().await.get(path) {
            return Ok(Some(Self::entry(path, file)));
        }
        if self.directories.lock().await.contains(path) {
            return Ok(Some(LocalEntry {
                path: path.to_string(),
                kind: EntryKind::Directory,
                ctime: 0,
                mtime: 0,
                size: 0,
            }));
        }
        Ok(None)
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.stat(path).await?.is_some())
    }

    async fn files(&self) -> Result<Vec<LocalEntry>> {
        Ok(self
            .files
            .lock()
            .await
            .iter()
            .filter(|(path, _)| !path.starts_with(&self.internal_dir))
            .map(|(path, file)| Self::entry(path, file))
            .collect())
    }

    async fn internal_files(&self) -> Result<Vec<LocalEntry>> {
        Ok(self
            .files
            .lock()
            .await
            .iter()
            .filter(|(path, _)| path.starts_with(&self.internal_dir))
            .map(|(path, file)| Self::entry(path, file))
            .collect())
    }
}

/// Remote record index held in memory, keyed by path.
#[derive(Default)]
pub struct MemoryRemoteIndex {
    pub records: Mutex<HashMap<String, SyncFile>>,
}

impl MemoryRemoteIndex {
    pub async fn insert(&self, record: SyncFile) {
        self.records.lock().await.insert(record.path.clone(), record);
    }

    pub async fn record(&self, path: &str) -> Option<SyncFile> {
        self.records.lock().await.get(path).cloned()
    }
}

#[async_trait]
impl RemoteIndex for MemoryRemoteIndex {
    async fn get(&self, path: &str) -> Result<Option<SyncFile>> {
        Ok(self.records.lock().await.get(path).cloned())
    }

    async fn put(&self, file: &SyncFile) -> Result<()> {
        self.records.lock().await.insert(file.path.clone(), file.clone());
        Ok(())
    }

    async fn patch(&self, patch: &SyncFilePatch) -> Result<()> {
        let mut records = self.records.lock().await;
        let record = records
            .values_mut()
            .find(|record| record.id == patch.id)
            .ok_or_else(|| SyncError::Remote(format!("no record for id: {}", patch.id)))?;

        if let Some(mtime) = patch.mtime {
            record.mtime = mtime;
        }
        if let Some(deleted) = patch.deleted {
            record.deleted = deleted;
        }
        if let Some(trashed) = patch.trashed {
            record.trashed = trashed;
        }
        Ok(())
    }

    async fn list_after(&self, watermark: i64) -> Result<Vec<SyncFile>> {
        Ok(self
            .records
            .lock()
            .await
            .values()
            .filter(|record| record.mtime > watermark)
            .cloned()
            .collect())
    }
}

/// Object storage held in memory: payload bytes plus the last written
/// version per key. Downloads can be delayed or made to fail for a number
/// of attempts.
#[derive(Default)]
pub struct MemoryObjects {
    pub objects: Mutex<HashMap<String, (u64, Vec<u8>)>>,
    pub download_delay: Mutex<Option<Duration>>,
    pub failing_downloads: AtomicU32,
}

impl MemoryObjects {
    pub async fn seed(&self, path: &str, bytes: &[u8]) {
        self.objects
            .lock()
            .await
            .insert(path.to_string(), (0, bytes.to_vec()));
    }

    pub async fn delay_downloads(&self, delay: Duration) {
        *self.download_delay.lock().await = Some(delay);
    }

    pub fn fail_downloads(&self, times: u32) {
        self.failing_downloads.store(times, Ordering::SeqCst);
    }

    pub async fn object(&self, path: &str) -> Option<(u64, Vec<u8>)> {
        self.objects.lock().await.get(path).cloned()
    }
}

#[async_trait]
impl RemoteObjects for MemoryObjects {
    async fn next_version(&self, path: &str) -> Result<u64> {
        Ok(self
            .objects
            .lock()
            .await
            .get(path)
            .map(|(version, _)| version + 1)
            .unwrap_or(0))
    }

    async fn upload(
        &self,
        path: &str,
        version: u64,
        bytes: &[u8],
        progress: TransferProgress,
    ) -> Result<()> {
        progress.send(0.5);
        self.objects
            .lock()
            .await
            .insert(path.to_string(), (version, bytes.to_vec()));
        progress.send(1.0);
        Ok(())
    }

    async fn download(&self, path: &str, progress: TransferProgress) -> Result<Vec<u8>> {
        let delay = *self.download_delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let remaining = self.failing_downloads.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_downloads.store(remaining - 1, Ordering::SeqCst);
            return Err(SyncError::Remote(format!("download failed: {path}")));
        }

        let bytes = self
            .objects
            .lock()
            .await
            .get(path)
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| SyncError::Remote(format!("object not found: {path}")))?;

        progress.send(1.0);
        Ok(bytes)
    }
}

/// [`StateStore`] held in memory.
#[derive(Default)]
pub struct MemoryStateStore {
    pub events: Mutex<Vec<SyncEvent>>,
    pub mark: Mutex<i64>,
}

impl MemoryStateStore {
    pub async fn with_watermark(watermark: i64) -> Self {
        let store = Self::default();
        *store.mark.lock().await = watermark;
        store
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn save_events(&self, events: &[SyncEvent]) -> Result<()> {
        *self.events.lock().await = events.to_vec();
        Ok(())
    }

    async fn load_events(&self) -> Result<Vec<SyncEvent>> {
        Ok(self.events.lock().await.clone())
    }

    async fn watermark(&self) -> Result<i64> {
        Ok(*self.mark.lock().await)
    }

    async fn set_watermark(&self, watermark: i64) -> Result<()> {
        *self.mark.lock().await = watermark;
        Ok(())
    }
}

/// A remote record whose id and hash follow the engine's own derivation
/// rules.
pub fn remote_record(path: &str, content: &[u8], mtime: i64) -> SyncFile {
    SyncFile {
        id: SyncFile::path_id(path),
        path: path.to_string(),
        hash: SyncFile::content_digest(content),
        mtime,
        deleted: false,
        trashed: false,
    }
}

/// Poll `condition` until it holds, letting (possibly paused) time advance.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("condition not met in time");
}
