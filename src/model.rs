//! Data model for the synchronization engine

use serde::{Deserialize, Serialize};
use std::fmt;

/// Current time as integer epoch milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Canonical description of one file for sync purposes.
///
/// `id` is a pure function of `path` (see [`SyncFile::path_id`]) and is
/// recomputed wherever needed, never derived by a different rule. `mtime`
/// is integer epoch milliseconds and only meaningfully ordered within one
/// store. `deleted` and `trashed` are mutually exclusive in practice but
/// both may be read independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFile {
    pub id: String,
    pub path: String,
    pub hash: String,
    pub mtime: i64,
    pub deleted: bool,
    pub trashed: bool,
}

impl SyncFile {
    /// Stable, content-independent identifier for a path.
    pub fn path_id(path: &str) -> String {
        blake3::hash(path.as_bytes()).to_hex().to_string()
    }

    /// Content digest used for the no-op short circuit.
    pub fn content_digest(bytes: &[u8]) -> String {
        blake3::hash(bytes).to_hex().to_string()
    }
}

/// Partial update of a remote record, keyed by id. Absent fields are left
/// untouched by the remote index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFilePatch {
    pub id: String,
    pub mtime: Option<i64>,
    pub deleted: Option<bool>,
    pub trashed: Option<bool>,
}

/// A change observed on one side of the sync pair, ready for dispatch.
///
/// Events are immutable once constructed. Every variant except
/// `LocalRename` carries exactly one file; the rename additionally carries
/// the path it moved away from. `LocalRaw` is the reserved internal-file
/// channel: the raw detector re-dispatches into create/modify, so this
/// variant is never emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SyncEvent {
    #[serde(rename = "local/create")]
    LocalCreate { file: SyncFile },
    #[serde(rename = "local/modify")]
    LocalModify { file: SyncFile },
    #[serde(rename = "local/delete")]
    LocalDelete { file: SyncFile },
    #[serde(rename = "local/rename")]
    LocalRename { file: SyncFile, previous: String },
    #[serde(rename = "local/raw")]
    LocalRaw { file: SyncFile },
    #[serde(rename = "remote/create")]
    RemoteCreate { file: SyncFile },
    #[serde(rename = "remote/modify")]
    RemoteModify { file: SyncFile },
    #[serde(rename = "remote/delete")]
    RemoteDelete { file: SyncFile },
    #[serde(rename = "remote/trash")]
    RemoteTrash { file: SyncFile },
}

impl SyncEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SyncEvent::LocalCreate { .. } => EventKind::LocalCreate,
            SyncEvent::LocalModify { .. } => EventKind::LocalModify,
            SyncEvent::LocalDelete { .. } => EventKind::LocalDelete,
            SyncEvent::LocalRename { .. } => EventKind::LocalRename,
            SyncEvent::LocalRaw { .. } => EventKind::LocalRaw,
            SyncEvent::RemoteCreate { .. } => EventKind::RemoteCreate,
            SyncEvent::RemoteModify { .. } => EventKind::RemoteModify,
            SyncEvent::RemoteDelete { .. } => EventKind::RemoteDelete,
            SyncEvent::RemoteTrash { .. } => EventKind::RemoteTrash,
        }
    }

    pub fn file(&self) -> &SyncFile {
        match self {
            SyncEvent::LocalCreate { file }
            | SyncEvent::LocalModify { file }
            | SyncEvent::LocalDelete { file }
            | SyncEvent::LocalRename { file, .. }
            | SyncEvent::LocalRaw { file }
            | SyncEvent::RemoteCreate { file }
            | SyncEvent::RemoteModify { file }
            | SyncEvent::RemoteDelete { file }
            | SyncEvent::RemoteTrash { file } => file,
        }
    }

    pub fn path(&self) -> &str {
        &self.file().path
    }

    /// The path a rename moved away from; `None` for every other kind.
    pub fn previous(&self) -> Option<&str> {
        match self {
            SyncEvent::LocalRename { previous, .. } => Some(previous),
            _ => None,
        }
    }

    pub fn direction(&self) -> Direction {
        self.kind().direction()
    }
}

/// Fieldless discriminant of [`SyncEvent`], used as the handler-registry
/// and dedup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    LocalCreate,
    LocalModify,
    LocalDelete,
    LocalRename,
    LocalRaw,
    RemoteCreate,
    RemoteModify,
    RemoteDelete,
    RemoteTrash,
}

impl EventKind {
    pub fn direction(self) -> Direction {
        match self {
            EventKind::LocalCreate
            | EventKind::LocalModify
            | EventKind::LocalDelete
            | EventKind::LocalRename
            | EventKind::LocalRaw => Direction::Local,
            EventKind::RemoteCreate
            | EventKind::RemoteModify
            | EventKind::RemoteDelete
            | EventKind::RemoteTrash => Direction::Remote,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::LocalCreate => "local/create",
            EventKind::LocalModify => "local/modify",
            EventKind::LocalDelete => "local/delete",
            EventKind::LocalRename => "local/rename",
            EventKind::LocalRaw => "local/raw",
            EventKind::RemoteCreate => "remote/create",
            EventKind::RemoteModify => "remote/modify",
            EventKind::RemoteDelete => "remote/delete",
            EventKind::RemoteTrash => "remote/trash",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of the sync pair an event originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Local,
    Remote,
}

impl Direction {
    pub fn opposite(self) -> Direction {
        match self {
            Direction::Local => Direction::Remote,
            Direction::Remote => Direction::Local,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Local => "local",
            Direction::Remote => "remote",
        })
    }
}

/// Kind of entry a local path resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// One local entry with its stats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEntry {
    pub path: String,
    pub kind: EntryKind,
    pub ctime: i64,
    pub mtime: i64,
    pub size: u64,
}

/// Raw change notification emitted by the local-store adapter.
///
/// `Delete` carries the entry kind because the entry no longer exists to
/// stat. `Raw` is the internal/config namespace channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalChange {
    Create(String),
    Modify(String),
    Delete { path: String, kind: EntryKind },
    Rename { path: String, previous: String },
    Raw(String),
}

/// One element of the remote subscription feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteChange {
    pub kind: RemoteChangeKind,
    pub record: SyncFile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteChangeKind {
    Added,
    Modified,
    Removed,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str) -> SyncFile {
        SyncFile {
            id: SyncFile::path_id(path),
            path: path.to_string(),
            hash: SyncFile::content_digest(b"content"),
            mtime: 1_700_000_000_000,
            deleted: false,
            trashed: false,
        }
    }

    #[test]
    fn path_id_is_stable_and_content_independent() {
        assert_eq!(SyncFile::path_id("notes/a.md"), SyncFile::path_id("notes/a.md"));
        assert_ne!(SyncFile::path_id("notes/a.md"), SyncFile::path_id("notes/b.md"));
    }

    #[test]
    fn event_tags_match_wire_format() {
        let event = SyncEvent::LocalRename {
            file: file("notes/new.md"),
            previous: "notes/old.md".to_string(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "local/rename");
        assert_eq!(json["previous"], "notes/old.md");

        let restored: SyncEvent = serde_json::from_value(json).unwrap();
        assert_eq!(restored, event);
    }

    #[test]
    fn kinds_report_their_direction() {
        assert_eq!(EventKind::LocalRename.direction(), Direction::Local);
        assert_eq!(EventKind::RemoteTrash.direction(), Direction::Remote);
        assert_eq!(Direction::Local.opposite(), Direction::Remote);
    }

    #[test]
    fn previous_is_rename_only() {
        let rename = SyncEvent::LocalRename {
            file: file("notes/new.md"),
            previous: "notes/old.md".to_string(),
        };
        assert_eq!(rename.previous(), Some("notes/old.md"));
        assert_eq!(SyncEvent::LocalCreate { file: file("a.md") }.previous(), None);
    }
}
