//! Repository state for workspace folders
//!
//! [`RepositoryService`] is the single source of truth for which repositories
//! exist in each workspace folder and which of their files are tracked or
//! ignored. It is driven by [`FileSystemEvent`]s:
//!
//! ```text
//! WorkspaceFiles ──> folder queue ──> pause incremental ──> rebuild folder
//!                                                             │
//! WorkspaceFile ──> incremental queue ──> route ──> apply ────┤
//!                                           └── git rules changed: re-walk,
//!                                               rebuild folder
//! ```
//!
//! Rebuilds never mutate existing [`Repository`] values: each one constructs
//! fresh repositories, so work still in flight against a discarded
//! repository cannot leak into the new state.

pub mod events;
pub mod filter;
mod queue;

pub use events::{
    EventEmitter, FileChangeType, FileEvent, FileSystemEvent, RepositoriesSetEvent,
    WorkspaceFileEvent, WorkspaceFilesEvent,
};
pub use filter::SkipFilter;

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use futures_util::future::join_all;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::ServiceConfig;
use crate::dir_matcher::FastDirectoryMatcher;
use crate::error::{RepoError, Result};
use crate::fs::{DirectoryToSearch, DirectoryWalker, LocalDirectoryWalker, LocalFs};
use crate::git::{CommandGitPlumbing, CommandRemoteInfo};
use crate::paths::{NormalizedPath, WorkspaceFolder};
use crate::repository::{GetFileOptions, GitContext, Repository, RepositoryFile};

use queue::{FolderQueues, PauseGate, QueuedFileEvent};

type Listener = Arc<dyn Fn(&WorkspaceFolder) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(u64, Listener)>,
}

/// Registration returned by [`RepositoryService::on_workspace_repositories_set`].
///
/// The listener stays registered until this is disposed or dropped.
pub struct Subscription {
    id: u64,
    listeners: Weak<Mutex<Listeners>>,
}

impl Subscription {
    pub fn dispose(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.lock().entries.retain(|(id, _)| *id != self.id);
        }
    }
}

/// Repositories of one workspace folder
#[derive(Default)]
struct FolderState {
    matcher: FastDirectoryMatcher,
    repositories: HashMap<NormalizedPath, Arc<Repository>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Applied,
    /// Git or ignore rules changed; the folder must be rebuilt
    Escalate,
}

enum Route {
    Skip,
    Escalate,
    Apply(Arc<Repository>),
}

struct ServiceInner {
    context: GitContext,
    walker: Arc<dyn DirectoryWalker>,
    config: ServiceConfig,
    skip: SkipFilter,
    folders: RwLock<HashMap<NormalizedPath, FolderState>>,
    listeners: Arc<Mutex<Listeners>>,
    gate: PauseGate,
    folder_queues: FolderQueues,
}

/// Tracks git repositories and their files across workspace folders
pub struct RepositoryService {
    inner: Arc<ServiceInner>,
    incremental: Mutex<Option<mpsc::UnboundedSender<QueuedFileEvent>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl RepositoryService {
    /// Create the service and start its incremental worker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(context: GitContext, walker: Arc<dyn DirectoryWalker>, config: ServiceConfig) -> Self {
        let inner = Arc::new(ServiceInner {
            skip: SkipFilter::new(config.skip_patterns.as_slice()),
            context,
            walker,
            config,
            folders: RwLock::new(HashMap::new()),
            listeners: Arc::new(Mutex::new(Listeners::default())),
            gate: PauseGate::default(),
            folder_queues: FolderQueues::default(),
        });

        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_incremental_worker(Arc::clone(&inner), rx));

        Self {
            inner,
            incremental: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Service backed by the local disk and the `git` binary
    pub fn with_local_collaborators(config: ServiceConfig) -> Self {
        let context = GitContext {
            fs: Arc::new(LocalFs::new()),
            git: Arc::new(CommandGitPlumbing::new()),
            remote_info: Arc::new(CommandRemoteInfo::new()),
        };
        Self::new(context, Arc::new(LocalDirectoryWalker::new()), config)
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.inner.config
    }

    /// Apply one event and wait until it has taken effect.
    ///
    /// Snapshots run on the folder's queue; file events run on the global
    /// incremental queue, behind every event submitted before them.
    pub async fn handle_event(&self, event: FileSystemEvent) -> Result<()> {
        match event {
            FileSystemEvent::WorkspaceFiles(event) => {
                self.ensure_running()?;
                self.inner
                    .set_workspace_repositories(&event.folder, &event.files)
                    .await;
                Ok(())
            }
            FileSystemEvent::WorkspaceFile(event) => {
                let done = self.enqueue(event)?;
                done.await.map_err(|_| RepoError::Disposed)
            }
        }
    }

    /// Put a file event on the incremental queue without waiting for it
    pub fn enqueue(&self, event: WorkspaceFileEvent) -> Result<oneshot::Receiver<()>> {
        let (done, rx) = oneshot::channel();
        let sender = self.incremental.lock();
        let sender = sender.as_ref().ok_or(RepoError::Disposed)?;
        sender
            .send(QueuedFileEvent {
                event,
                done: Some(done),
            })
            .map_err(|_| RepoError::Disposed)?;
        Ok(rx)
    }

    /// Consume events from `events` until the channel closes.
    ///
    /// Snapshots are applied before the next event is read; file events are
    /// queued in arrival order.
    pub fn subscribe(&self, mut events: mpsc::Receiver<FileSystemEvent>) -> Result<JoinHandle<()>> {
        let inner = Arc::clone(&self.inner);
        let sender = self
            .incremental
            .lock()
            .as_ref()
            .cloned()
            .ok_or(RepoError::Disposed)?;

        Ok(tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    FileSystemEvent::WorkspaceFiles(event) => {
                        inner
                            .set_workspace_repositories(&event.folder, &event.files)
                            .await;
                    }
                    FileSystemEvent::WorkspaceFile(event) => {
                        let queued = QueuedFileEvent { event, done: None };
                        if sender.send(queued).is_err() {
                            tracing::debug!("[RepositoryService] Incremental queue closed, stopping subscription");
                            break;
                        }
                    }
                }
            }
        }))
    }

    /// Enumerate `folder` with the directory walker and rebuild it
    pub async fn scan_workspace_folder(&self, folder: &WorkspaceFolder) -> Result<()> {
        self.ensure_running()?;
        self.inner.handle_workspace_folder_state_change(folder).await
    }

    /// Called after every rebuild of a workspace folder
    pub fn on_workspace_repositories_set<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&WorkspaceFolder) + Send + Sync + 'static,
    {
        let mut listeners = self.inner.listeners.lock();
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.entries.push((id, Arc::new(listener)));
        Subscription {
            id,
            listeners: Arc::downgrade(&self.inner.listeners),
        }
    }

    /// Innermost repository containing `file`
    pub fn get_matching_repository(
        &self,
        file: &NormalizedPath,
        folder: &NormalizedPath,
    ) -> Option<Arc<Repository>> {
        self.inner.get_matching_repository(file, folder)
    }

    pub fn get_repository_file_for_uri(
        &self,
        file: &NormalizedPath,
        repository: &NormalizedPath,
        folder: &WorkspaceFolder,
    ) -> Option<RepositoryFile> {
        self.get_repository_for_workspace(&folder.uri, repository)?
            .get_file(file, GetFileOptions::default())
    }

    pub fn get_current_files_for_repository(
        &self,
        repository: &NormalizedPath,
        folder: &NormalizedPath,
        options: GetFileOptions,
    ) -> Vec<RepositoryFile> {
        self.get_repository_for_workspace(folder, repository)
            .map(|repo| repo.get_current_tree_files(options))
            .unwrap_or_default()
    }

    pub fn get_current_files_for_workspace(
        &self,
        folder: &NormalizedPath,
        options: GetFileOptions,
    ) -> Vec<RepositoryFile> {
        self.get_repositories_for_workspace(folder)
            .values()
            .flat_map(|repo| repo.get_current_tree_files(options))
            .collect()
    }

    pub fn get_repositories_for_workspace(
        &self,
        folder: &NormalizedPath,
    ) -> HashMap<NormalizedPath, Arc<Repository>> {
        self.inner
            .folders
            .read()
            .get(folder)
            .map(|state| state.repositories.clone())
            .unwrap_or_default()
    }

    pub fn get_repository_for_workspace(
        &self,
        folder: &NormalizedPath,
        repository: &NormalizedPath,
    ) -> Option<Arc<Repository>> {
        self.inner
            .folders
            .read()
            .get(folder)
            .and_then(|state| state.repositories.get(repository).cloned())
    }

    /// Drop all repositories and stop the incremental worker
    pub fn dispose(&self) {
        self.incremental.lock().take();
        if let Some(worker) = self.worker.lock().take() {
            worker.abort();
        }
        let folders: Vec<NormalizedPath> = self.inner.folders.read().keys().cloned().collect();
        for folder in &folders {
            self.inner.clear_repositories_for_workspace(folder);
        }
        self.inner.folder_queues.clear();
        self.inner.listeners.lock().entries.clear();
        tracing::debug!("[RepositoryService] Disposed");
    }

    fn ensure_running(&self) -> Result<()> {
        if self.incremental.lock().is_some() {
            Ok(())
        } else {
            Err(RepoError::Disposed)
        }
    }
}

impl Drop for RepositoryService {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.lock().take() {
            worker.abort();
        }
    }
}

async fn run_incremental_worker(
    inner: Arc<ServiceInner>,
    mut events: mpsc::UnboundedReceiver<QueuedFileEvent>,
) {
    while let Some(QueuedFileEvent { event, done }) = events.recv().await {
        let outcome = {
            let _running = inner.gate.run().await;
            inner.handle_workspace_file_update(&event).await
        };
        // The gate is released here so the rebuild can pause the queue
        if outcome == Outcome::Escalate {
            if let Err(err) = inner.handle_workspace_folder_state_change(&event.folder).await {
                tracing::error!(
                    "[RepositoryService] Could not rebuild workspace {}: {}",
                    event.folder.uri,
                    err
                );
            }
        }
        if let Some(done) = done {
            let _ = done.send(());
        }
    }
    tracing::debug!("[RepositoryService] Incremental queue closed");
}

impl ServiceInner {
    /// Replace every repository of `folder` with ones built from `files`
    async fn set_workspace_repositories(&self, folder: &WorkspaceFolder, files: &[NormalizedPath]) {
        let _turn = self.folder_queues.enter(&folder.uri).await;
        let _paused = self.gate.pause().await;
        let started = std::time::Instant::now();

        tracing::info!("[RepositoryService] Clearing repositories for workspace {}", folder.uri);
        self.clear_repositories_for_workspace(&folder.uri);

        let repositories = self.detect_repositories(files, folder);
        tracing::info!(
            "[RepositoryService] Detected {} repositories for workspace {}",
            repositories.len(),
            folder.uri
        );

        let mut state = FolderState::default();
        for repository in &repositories {
            tracing::info!(
                "[RepositoryService] Adding repository {} to workspace {}",
                repository.uri(),
                folder.uri
            );
            state.matcher.add_directory_to_match(repository.uri());
            state
                .repositories
                .insert(repository.uri().clone(), Arc::clone(repository));
        }

        let mut files_by_repository: HashMap<NormalizedPath, Vec<NormalizedPath>> = HashMap::new();
        let mut unowned = 0usize;
        for file in files {
            match state.matcher.find_deepest(file) {
                Some(root) => files_by_repository.entry(root).or_default().push(file.clone()),
                None => unowned += 1,
            }
        }
        if unowned > 0 {
            tracing::debug!(
                "[RepositoryService] {} files in {} belong to no repository",
                unowned,
                folder.uri
            );
        }

        let jobs: Vec<(Arc<Repository>, Vec<NormalizedPath>)> = files_by_repository
            .into_iter()
            .filter_map(|(root, files)| {
                state
                    .repositories
                    .get(&root)
                    .map(|repo| (Arc::clone(repo), files))
            })
            .collect();
        self.folders.write().insert(folder.uri.clone(), state);

        let counts = join_all(
            jobs.into_iter()
                .map(|(repository, files)| setup_and_add_files(repository, files)),
        )
        .await;

        tracing::info!(
            "[RepositoryService] Added {} files to {} repositories in {}ms",
            counts.iter().sum::<usize>(),
            repositories.len(),
            started.elapsed().as_millis()
        );

        self.notify_repositories_set(folder);
    }

    fn detect_repositories(
        &self,
        files: &[NormalizedPath],
        folder: &WorkspaceFolder,
    ) -> Vec<Arc<Repository>> {
        Repository::get_git_config_files(files)
            .into_iter()
            .map(|config| {
                tracing::info!("[RepositoryService] Detected repository at {}", config);
                Arc::new(Repository::with_tracked_files_debounce(
                    config,
                    folder.clone(),
                    self.context.clone(),
                    self.config.tracked_files_debounce(),
                ))
            })
            .collect()
    }

    fn clear_repositories_for_workspace(&self, folder: &NormalizedPath) {
        let Some(mut state) = self.folders.write().remove(folder) else {
            return;
        };
        state.matcher.dispose();
        for repository in state.repositories.values() {
            repository.dispose();
            tracing::debug!("[RepositoryService] Repository {} has been disposed", repository.uri());
        }
        state.repositories.clear();
    }

    fn notify_repositories_set(&self, folder: &WorkspaceFolder) {
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .entries
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(folder);
        }
    }

    async fn handle_workspace_folder_state_change(&self, folder: &WorkspaceFolder) -> Result<()> {
        let files = self
            .walker
            .find_files_for_directory(DirectoryToSearch::new(folder.uri.clone()))
            .await?;
        tracing::info!(
            "[RepositoryService] Found {} files for workspace {}",
            files.len(),
            folder.uri
        );
        self.set_workspace_repositories(folder, &files).await;
        Ok(())
    }

    fn get_matching_repository(
        &self,
        file: &NormalizedPath,
        folder: &NormalizedPath,
    ) -> Option<Arc<Repository>> {
        let folders = self.folders.read();
        let state = folders.get(folder)?;
        let root = state.matcher.find_deepest(file)?;
        state.repositories.get(&root).cloned()
    }

    /// Decide what an event for `uri` means before looking at its change type
    fn route(&self, folder: &WorkspaceFolder, uri: &NormalizedPath) -> Route {
        if self.skip.should_skip(uri) {
            tracing::debug!("[RepositoryService] Skipping file {}", uri);
            return Route::Skip;
        }

        // Repositories are only created by snapshots
        let Some(repository) = self.get_matching_repository(uri, &folder.uri) else {
            tracing::debug!("[RepositoryService] No matching repository found for file {}", uri);
            return Route::Skip;
        };

        if repository.uri() == uri {
            tracing::debug!("[RepositoryService] Repository root {} changed", uri);
            return Route::Escalate;
        }

        if Repository::is_git_config_file(uri) || Repository::is_git_ignore_file(uri) {
            tracing::info!(
                "[RepositoryService] File {} is a git config or gitignore file, updating workspace files",
                uri
            );
            return Route::Escalate;
        }

        if Repository::is_in_git_folder(uri) {
            schedule_tracked_files_refresh(&repository);
        }

        Route::Apply(repository)
    }

    async fn handle_workspace_file_update(&self, event: &WorkspaceFileEvent) -> Outcome {
        let folder = &event.folder;
        let uri = &event.file_event.uri;
        let repository = match self.route(folder, uri) {
            Route::Skip => return Outcome::Applied,
            Route::Escalate => return Outcome::Escalate,
            Route::Apply(repository) => repository,
        };

        match event.file_event.change_type {
            FileChangeType::Created => match self.context.fs.lstat(uri.as_path()).await {
                Ok(stat) if stat.is_dir => {
                    tracing::debug!(
                        "[RepositoryService] Directory {} created in workspace {}",
                        uri,
                        folder.uri
                    );
                    self.add_files_for_directory(folder, uri).await
                }
                Ok(_) => {
                    set_file_and_directories(&repository, uri);
                    tracing::debug!(
                        "[RepositoryService] File {} added to repository {}",
                        uri,
                        repository.uri()
                    );
                    Outcome::Applied
                }
                Err(err) => {
                    tracing::debug!("[RepositoryService] Could not stat created path {}: {}", uri, err);
                    Outcome::Applied
                }
            },
            FileChangeType::Changed => {
                let is_dir = repository.has_directory(uri)
                    || matches!(self.context.fs.lstat(uri.as_path()).await, Ok(stat) if stat.is_dir);
                if is_dir {
                    tracing::debug!("[RepositoryService] Ignoring change to directory {}", uri);
                    return Outcome::Applied;
                }
                set_file_and_directories(&repository, uri);
                tracing::debug!(
                    "[RepositoryService] File {} updated in repository {}",
                    uri,
                    repository.uri()
                );
                Outcome::Applied
            }
            FileChangeType::Deleted => {
                // Watchers report deleted directories as one path
                if repository.has_directory(uri) {
                    tracing::debug!(
                        "[RepositoryService] Directory {} deleted in workspace {}",
                        uri,
                        folder.uri
                    );
                    delete_files_for_directory(&repository, uri)
                } else {
                    repository.remove_file(uri);
                    tracing::debug!(
                        "[RepositoryService] File {} removed from repository {}",
                        uri,
                        repository.uri()
                    );
                    Outcome::Applied
                }
            }
        }
    }

    /// Replay everything now under `dir` as created files, then register `dir`
    async fn add_files_for_directory(&self, folder: &WorkspaceFolder, dir: &NormalizedPath) -> Outcome {
        let files = match self
            .walker
            .find_files_for_directory(DirectoryToSearch::new(dir.clone()))
            .await
        {
            Ok(files) => files,
            Err(err) => {
                tracing::error!("[RepositoryService] Could not list directory {}: {}", dir, err);
                return Outcome::Applied;
            }
        };

        for file in &files {
            match self.route(folder, file) {
                Route::Skip => {}
                Route::Escalate => return Outcome::Escalate,
                Route::Apply(repository) => set_file_and_directories(&repository, file),
            }
        }

        if let Some(repository) = self.get_matching_repository(dir, &folder.uri) {
            repository.set_directory(dir);
        }
        Outcome::Applied
    }
}

async fn setup_and_add_files(repository: Arc<Repository>, files: Vec<NormalizedPath>) -> usize {
    match repository.setup_git_for_repository(&files).await {
        Ok(git_files) => {
            tracing::debug!(
                "[RepositoryService] Added {} gitignores and {} tracked files to repository {}",
                git_files.ignore_files.len(),
                git_files.tracked_files.len(),
                repository.uri()
            );
            if let Some(exclude) = &git_files.exclude_file {
                tracing::debug!("[RepositoryService] Added {} to repository {}", exclude, repository.uri());
            }
        }
        Err(err) => {
            tracing::warn!(
                "[RepositoryService] Error setting up git for repository {}: {}",
                repository.uri(),
                err
            );
            return 0;
        }
    }

    for file in &files {
        set_file_and_directories(&repository, file);
    }
    tracing::debug!(
        "[RepositoryService] Added {} files to repository {}",
        files.len(),
        repository.uri()
    );
    files.len()
}

/// Set `file` and every missing directory between it and the repository root
fn set_file_and_directories(repository: &Repository, file: &NormalizedPath) {
    let file = repository.set_file(file);
    let mut current = file.dir_uri();
    while current.starts_with(repository.uri()) && &current != repository.uri() {
        if !repository.has_directory(&current) {
            repository.set_directory(&current);
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => break,
        }
    }
}

fn delete_files_for_directory(repository: &Repository, dir: &NormalizedPath) -> Outcome {
    let removed = repository.remove_files_under_directory(dir);
    let git_related = removed.iter().any(|file| {
        Repository::is_git_config_file(&file.uri) || Repository::is_git_ignore_file(&file.uri)
    });
    if git_related {
        tracing::info!(
            "[RepositoryService] Git related files removed from repository {}, updating workspace files",
            repository.uri()
        );
        Outcome::Escalate
    } else {
        Outcome::Applied
    }
}

fn schedule_tracked_files_refresh(repository: &Arc<Repository>) {
    let repository = Arc::clone(repository);
    tokio::spawn(async move {
        match repository.refresh_tracked_files().await {
            Ok(_) | Err(RepoError::Disposed) => {}
            Err(err) => tracing::warn!(
                "[RepositoryService] Could not refresh tracked files for {}: {}",
                repository.uri(),
                err
            ),
        }
    });
}
