//! Filesystem events consumed by the service, and notifications it emits
//!
//! The service is driven by two kinds of [`FileSystemEvent`]:
//!
//! - `workspace_files` - full enumeration of a workspace folder (snapshot)
//! - `workspace_file` - one created/changed/deleted path (incremental)
//!
//! Both serialize as single-line JSON objects tagged with a `type` field, so
//! they can be piped between processes as JSON Lines.

use std::io::{self, Write};

use serde::{Deserialize, Serialize};

use crate::paths::{NormalizedPath, WorkspaceFolder};

/// What happened to a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileChangeType {
    Created,
    Changed,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEvent {
    pub uri: NormalizedPath,
    pub change_type: FileChangeType,
}

impl FileEvent {
    pub fn new(uri: impl Into<NormalizedPath>, change_type: FileChangeType) -> Self {
        Self {
            uri: uri.into(),
            change_type,
        }
    }
}

/// Every file currently in a workspace folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceFilesEvent {
    pub folder: WorkspaceFolder,
    pub files: Vec<NormalizedPath>,
}

/// One change inside a workspace folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceFileEvent {
    pub folder: WorkspaceFolder,
    pub file_event: FileEvent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FileSystemEvent {
    WorkspaceFiles(WorkspaceFilesEvent),
    WorkspaceFile(WorkspaceFileEvent),
}

impl FileSystemEvent {
    pub fn folder(&self) -> &WorkspaceFolder {
        match self {
            Self::WorkspaceFiles(event) => &event.folder,
            Self::WorkspaceFile(event) => &event.folder,
        }
    }
}

/// Emitted after a workspace folder's repositories were rebuilt
#[derive(Debug, Clone, Serialize)]
pub struct RepositoriesSetEvent {
    pub folder: WorkspaceFolder,
    pub repositories: Vec<NormalizedPath>,
    pub files: usize,
}

/// Writes events to stdout as JSON Lines
pub struct EventEmitter {
    enabled: bool,
}

impl EventEmitter {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn emit<E: Serialize>(&self, event_type: &'static str, event: &E) {
        if !self.enabled {
            return;
        }
        let Some(json) = to_json_line(event_type, event) else {
            return;
        };
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        // The reader may have gone away
        let _ = writeln!(handle, "{}", json);
        let _ = handle.flush();
    }
}

#[derive(Serialize)]
struct EventWrapper<'a, P: Serialize> {
    #[serde(rename = "type")]
    event_type: &'static str,
    #[serde(flatten)]
    payload: &'a P,
}

fn to_json_line<E: Serialize>(event_type: &'static str, event: &E) -> Option<String> {
    serde_json::to_string(&EventWrapper {
        event_type,
        payload: event,
    })
    .ok()
}
