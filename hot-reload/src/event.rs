//! File change and reload events.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A filesystem event for a watched file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEvent {
    /// The kind of event.
    pub kind: FileEventKind,

    /// Path to the affected file.
    pub path: PathBuf,

    /// When the event was observed.
    pub timestamp: DateTime<Utc>,
}

impl FileEvent {
    /// Create a new file event.
    pub fn new(kind: FileEventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
            timestamp: Utc::now(),
        }
    }

    /// Whether the event means the file content may have changed.
    pub fn is_change(&self) -> bool {
        self.kind.is_change()
    }
}

/// Kind of file event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileEventKind {
    /// File was created (editors that save by replacing the file).
    Created,

    /// File content was modified.
    Modified,

    /// File was deleted.
    Deleted,

    /// File was renamed away from the watched path.
    RenamedFrom,

    /// File was renamed onto the watched path.
    RenamedTo,

    /// File metadata changed (polling reports writes this way).
    MetadataChanged,

    /// Access time changed.
    Accessed,

    /// Unknown event type.
    Unknown,
}

impl FileEventKind {
    /// Whether this kind should trigger a reload.
    pub fn is_change(self) -> bool {
        matches!(
            self,
            Self::Created | Self::Modified | Self::RenamedTo | Self::MetadataChanged
        )
    }
}

impl From<notify::EventKind> for FileEventKind {
    fn from(kind: notify::EventKind) -> Self {
        match kind {
            notify::EventKind::Create(_) => Self::Created,
            notify::EventKind::Modify(modify_kind) => match modify_kind {
                notify::event::ModifyKind::Name(rename) => match rename {
                    notify::event::RenameMode::From => Self::RenamedFrom,
                    notify::event::RenameMode::To => Self::RenamedTo,
                    _ => Self::Modified,
                },
                notify::event::ModifyKind::Metadata(_) => Self::MetadataChanged,
                _ => Self::Modified,
            },
            notify::EventKind::Remove(_) => Self::Deleted,
            notify::EventKind::Access(_) => Self::Accessed,
            _ => Self::Unknown,
        }
    }
}

/// Emitted after an invalidation pass completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReloadEvent {
    /// The changed file that started the pass.
    pub path: PathBuf,

    /// Every module freshly loaded by the pass, changed file first.
    pub reloaded: Vec<PathBuf>,

    /// When the pass finished.
    pub timestamp: DateTime<Utc>,
}

impl ReloadEvent {
    /// Create a reload event for a finished pass.
    pub fn new(path: impl Into<PathBuf>, reloaded: Vec<PathBuf>) -> Self {
        Self {
            path: path.into(),
            reloaded,
            timestamp: Utc::now(),
        }
    }
}
