//! Bidirectional synchronization engine for a local vault and a remote
//! document store
//!
//! This crate keeps a local file tree and a remote record/blob store
//! eventually consistent. It provides:
//! - The change-event taxonomy (`SyncFile`, `SyncEvent`) shared by both
//!   sides
//! - A debounced, deduplicated, concurrency-bounded event queue with
//!   offline persistence and per-event progress tracking
//! - Echo suppression so a sync-applied write is never misread as a new
//!   user change by the opposite detector
//! - Local and remote change detectors with conflict/no-op short circuits
//! - One-pass startup reconciliation seeding the queue after install or a
//!   cold start
//! - Bounded-retry handlers applying events to the opposite store
//!
//! The stores themselves stay behind the narrow adapter traits in
//! [`store`]; this crate never reimplements storage, authentication, or
//! UI concerns.

pub mod config;
pub mod engine;
pub mod errors;
pub mod handlers;
pub mod ignore;
pub mod local;
pub mod model;
pub mod online;
pub mod persist;
pub mod progress;
pub mod queue;
pub mod reconcile;
pub mod remote;
pub mod retry;
pub mod store;

pub use config::SyncSettings;
pub use engine::SyncEngine;
pub use errors::{Result, SyncError};
pub use handlers::{register_local_handlers, register_remote_handlers, Stores};
pub use ignore::IgnoreFilter;
pub use local::LocalDetector;
pub use model::{
    now_ms, Direction, EntryKind, EventKind, LocalChange, LocalEntry, RemoteChange,
    RemoteChangeKind, SyncEvent, SyncFile, SyncFilePatch,
};
pub use online::OnlineMonitor;
pub use persist::JsonStateStore;
pub use progress::{ProgressLedger, ProgressPatch, SyncProgress};
pub use queue::{EventHandler, EventQueue, ProgressReporter, Registration};
pub use reconcile::Reconciler;
pub use remote::RemoteDetector;
pub use retry::with_retry;
pub use store::{LocalStore, RemoteIndex, RemoteObjects, StateStore, TransferProgress};
