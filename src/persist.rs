//! File-backed persistence for the offline journal and watermark

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::debug;

use crate::errors::Result;
use crate::model::SyncEvent;
use crate::store::StateStore;

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedState {
    events: Vec<SyncEvent>,
    watermark: i64,
}

/// [`StateStore`] keeping the whole state in one JSON document.
///
/// The state is tiny (a handful of queued events and one integer), so the
/// document is rewritten in full on every mutation.
pub struct JsonStateStore {
    path: PathBuf,
    state: Mutex<PersistedState>,
}

impl JsonStateStore {
    /// Open the store at `path`, loading existing state if present.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => PersistedState::default(),
            Err(err) => return Err(err.into()),
        };

        debug!("sync state loaded from {}", path.display());
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    async fn flush(&self, state: &PersistedState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_vec_pretty(state)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for JsonStateStore {
    async fn save_events(&self, events: &[SyncEvent]) -> Result<()> {
        let mut state = self.state.lock().await;
        state.events = events.to_vec();
        self.flush(&state).await
    }

    async fn load_events(&self) -> Result<Vec<SyncEvent>> {
        Ok(self.state.lock().await.events.clone())
    }

    async fn watermark(&self) -> Result<i64> {
        Ok(self.state.lock().await.watermark)
    }

    async fn set_watermark(&self, watermark: i64) -> Result<()> {
        let mut state = self.state.lock().await;
        state.watermark = watermark;
        self.flush(&state).await
    }
}
