//! Error types for sync operations

use thiserror::Error;

use crate::model::EventKind;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Glob pattern error: {0}")]
    Glob(#[from] globset::Error),

    #[error("Local store error: {0}")]
    Storage(String),

    #[error("Remote store error: {0}")]
    Remote(String),

    #[error("No handler registered for event type: {0}")]
    HandlerNotFound(EventKind),

    #[error("Handler received unexpected event type: {0}")]
    UnexpectedEvent(EventKind),

    #[error("Retries exceeded after {attempts} attempt(s): {source}")]
    RetriesExceeded {
        attempts: u32,
        #[source]
        source: Box<SyncError>,
    },
}

pub type Result<T> = std::result::Result<T, SyncError>;
