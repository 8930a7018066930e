//! Native filesystem watcher feeding the repository service
//!
//! Uses the `notify` crate to watch a workspace folder recursively and turn
//! native notifications into [`FileSystemEvent`]s.
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌───────────────────┐
//! │   notify    │────>│   batcher   │────>│ FileSystemEvent    │
//! │   watcher   │     │  (100ms)    │     │ channel (service)  │
//! └─────────────┘     └─────────────┘     └───────────────────┘
//! ```
//!
//! On start the watcher emits one `WorkspaceFiles` snapshot of the folder,
//! then a `WorkspaceFile` event per change. Renames become a delete of the old
//! path followed by a create of the new one.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::WatcherConfig;
use crate::error::{RepoError, Result};
use crate::fs::{DirectoryToSearch, DirectoryWalker};
use crate::paths::{NormalizedPath, WorkspaceFolder};
use crate::service::{
    FileChangeType, FileEvent, FileSystemEvent, WorkspaceFileEvent, WorkspaceFilesEvent,
};

/// Watches one workspace folder
pub struct WorkspaceWatcher {
    folder: WorkspaceFolder,
    config: WatcherConfig,
    walker: Arc<dyn DirectoryWalker>,
}

impl WorkspaceWatcher {
    pub fn new(folder: WorkspaceFolder, walker: Arc<dyn DirectoryWalker>) -> Self {
        Self::with_config(folder, walker, WatcherConfig::default())
    }

    pub fn with_config(
        folder: WorkspaceFolder,
        walker: Arc<dyn DirectoryWalker>,
        config: WatcherConfig,
    ) -> Self {
        Self {
            folder,
            config,
            walker,
        }
    }

    pub fn folder(&self) -> &WorkspaceFolder {
        &self.folder
    }

    /// Start watching and send the initial snapshot to `events`.
    ///
    /// Watching starts before the folder is enumerated so that no change
    /// between the two is lost.
    pub async fn start(&self, events: mpsc::Sender<FileSystemEvent>) -> Result<WatcherHandle> {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for change in classify_event(&event) {
                    let _ = raw_tx.send(change);
                }
            }
            Err(err) => tracing::error!("[WATCHER] Watcher error: {:?}", err),
        })?;
        watcher.watch(self.folder.uri.as_path(), RecursiveMode::Recursive)?;
        tracing::info!("[WATCHER] Watching {}", self.folder.uri);

        let files = self
            .walker
            .find_files_for_directory(DirectoryToSearch::new(self.folder.uri.clone()))
            .await?;
        tracing::info!("[WATCHER] Initial snapshot of {} files", files.len());
        events
            .send(FileSystemEvent::WorkspaceFiles(WorkspaceFilesEvent {
                folder: self.folder.clone(),
                files,
            }))
            .await
            .map_err(|_| RepoError::Watcher {
                message: "event receiver closed".to_string(),
            })?;

        let running = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(forward_batches(
            self.folder.clone(),
            self.config.clone(),
            raw_rx,
            events,
            Arc::clone(&running),
        ));

        Ok(WatcherHandle {
            running,
            watcher: Mutex::new(Some(watcher)),
            task: Mutex::new(Some(task)),
        })
    }
}

/// Turn one native notification into path changes
fn classify_event(event: &Event) -> Vec<(PathBuf, FileChangeType)> {
    let single = |change_type: FileChangeType| -> Vec<(PathBuf, FileChangeType)> {
        event
            .paths
            .iter()
            .map(|path| (path.clone(), change_type))
            .collect()
    };

    match event.kind {
        EventKind::Create(_) => single(FileChangeType::Created),
        EventKind::Remove(_) => single(FileChangeType::Deleted),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => single(FileChangeType::Deleted),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => single(FileChangeType::Created),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match event.paths.as_slice() {
            [from, to] => vec![
                (from.clone(), FileChangeType::Deleted),
                (to.clone(), FileChangeType::Created),
            ],
            _ => Vec::new(),
        },
        EventKind::Modify(ModifyKind::Name(_)) => event
            .paths
            .iter()
            .map(|path| {
                let change_type = if path.exists() {
                    FileChangeType::Created
                } else {
                    FileChangeType::Deleted
                };
                (path.clone(), change_type)
            })
            .collect(),
        // Permission and timestamp changes, often on directories
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(_) | EventKind::Any => single(FileChangeType::Changed),
        EventKind::Access(_) | EventKind::Other => Vec::new(),
    }
}

/// Drop repeats of the same change to the same path within one batch
fn coalesce(batch: Vec<(PathBuf, FileChangeType)>) -> Vec<(PathBuf, FileChangeType)> {
    let mut last: HashMap<PathBuf, FileChangeType> = HashMap::new();
    let mut out = Vec::with_capacity(batch.len());
    for (path, change_type) in batch {
        if last.get(&path) == Some(&change_type) {
            continue;
        }
        last.insert(path.clone(), change_type);
        out.push((path, change_type));
    }
    out
}

async fn forward_batches(
    folder: WorkspaceFolder,
    config: WatcherConfig,
    mut raw: mpsc::UnboundedReceiver<(PathBuf, FileChangeType)>,
    events: mpsc::Sender<FileSystemEvent>,
    running: Arc<AtomicBool>,
) {
    while let Some(first) = raw.recv().await {
        let mut batch = vec![first];
        let deadline = tokio::time::sleep(config.debounce_duration);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                next = raw.recv() => match next {
                    Some(change) => batch.push(change),
                    None => break,
                },
            }
        }

        let batch = coalesce(batch);
        tracing::debug!("[WATCHER] Forwarding {} changes", batch.len());
        for (path, change_type) in batch {
            let event = FileSystemEvent::WorkspaceFile(WorkspaceFileEvent {
                folder: folder.clone(),
                file_event: FileEvent::new(NormalizedPath::new(path), change_type),
            });
            if events.send(event).await.is_err() {
                tracing::debug!("[WATCHER] Event receiver closed");
                running.store(false, Ordering::SeqCst);
                return;
            }
        }
    }
    running.store(false, Ordering::SeqCst);
}

/// Handle for controlling a running watcher
pub struct WatcherHandle {
    running: Arc<AtomicBool>,
    watcher: Mutex<Option<RecommendedWatcher>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl WatcherHandle {
    /// Stop the watcher
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.watcher.lock().take();
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }

    /// Check if the watcher is still running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
