//! Engine configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration surface consumed by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Master switch; when false the engine starts no detectors or loops.
    pub sync_enabled: bool,
    /// Whether the internal/config namespace participates in sync.
    pub internal_sync_enabled: bool,
    /// Path prefix of the internal/config namespace.
    pub internal_dir: String,
    /// Extra ignore patterns on top of the built-in defaults.
    pub ignore_patterns: Vec<String>,
    /// How long to coalesce rapid local modify events.
    pub debounce_ms: u64,
    /// Fan-out bound per dispatch batch.
    pub concurrency: usize,
    /// Attempt ceiling for the low-level retry wrapper.
    pub max_retries: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            sync_enabled: true,
            internal_sync_enabled: true,
            internal_dir: ".vault".to_string(),
            ignore_patterns: Vec::new(),
            debounce_ms: 3000,
            concurrency: 6,
            max_retries: 10,
        }
    }
}

impl SyncSettings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn is_internal(&self, path: &str) -> bool {
        path.starts_with(&self.internal_dir)
    }
}
