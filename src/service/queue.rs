//! Serialization domains for repository updates
//!
//! ```text
//!  snapshot(folder A) ──> [ folder queue A ] ──┐
//!  snapshot(folder B) ──> [ folder queue B ] ──┤ pause (write)
//!                                              ▼
//!  file events ──> [ incremental queue ] ──> PauseGate ──> apply (read)
//! ```
//!
//! Snapshots for one folder run one at a time in arrival order. While any
//! snapshot runs, the incremental worker cannot start its next event.
//! Acquire the folder queue before the gate, never the other way round.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{oneshot, OwnedMutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::paths::NormalizedPath;

use super::events::WorkspaceFileEvent;

/// An incremental event waiting for the worker
#[derive(Debug)]
pub(crate) struct QueuedFileEvent {
    pub event: WorkspaceFileEvent,
    /// Signalled once the event (and any escalation it caused) is applied
    pub done: Option<oneshot::Sender<()>>,
}

/// Lets snapshots hold off the incremental worker
#[derive(Debug, Default)]
pub(crate) struct PauseGate {
    lock: RwLock<()>,
}

impl PauseGate {
    /// Held by the worker while it applies one event
    pub async fn run(&self) -> RwLockReadGuard<'_, ()> {
        self.lock.read().await
    }

    /// Held by a snapshot for its whole duration
    pub async fn pause(&self) -> RwLockWriteGuard<'_, ()> {
        self.lock.write().await
    }
}

/// One FIFO queue per workspace folder
#[derive(Debug, Default)]
pub(crate) struct FolderQueues {
    queues: Mutex<HashMap<NormalizedPath, Arc<tokio::sync::Mutex<()>>>>,
}

impl FolderQueues {
    /// Wait for this folder's turn; the turn lasts until the guard drops.
    pub async fn enter(&self, folder: &NormalizedPath) -> OwnedMutexGuard<()> {
        let queue = Arc::clone(self.queues.lock().entry(folder.clone()).or_default());
        queue.lock_owned().await
    }

    pub fn clear(&self) {
        self.queues.lock().clear();
    }
}
