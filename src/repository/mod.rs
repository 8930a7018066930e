//! One git working tree and what is known about its files
//!
//! A [`Repository`] owns the file and directory index for one repository
//! root, the [`GitIgnoreManager`] compiled from its ignore files, and the
//! snapshot of tracked files reported by git. Ignore status is computed when
//! an entry is set and stored with it; entries are not re-evaluated when the
//! rules change, the service rebuilds them instead.

mod branch;

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use parking_lot::RwLock;
use serde::Serialize;

use crate::debounce::AsyncDebouncer;
use crate::error::{RepoError, Result};
use crate::fs::FsClient;
use crate::git::{GitIgnoreManager, GitPlumbing, RemoteInfo};
use crate::paths::{NormalizedPath, WorkspaceFolder};

/// Default quiet period before a tracked-file refresh runs
pub const DEFAULT_TRACKED_FILES_DEBOUNCE: Duration = Duration::from_millis(300);

/// Outcome of one tracked-file listing, shared by every joined caller
#[derive(Debug, Clone)]
struct TrackedFilesRefresh {
    count: usize,
    /// Paths that became tracked or stopped being tracked
    changed: Arc<Vec<NormalizedPath>>,
}

/// A file in a repository, with its ignore status as of the last `set_file`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryFile {
    pub uri: NormalizedPath,
    pub repository_uri: NormalizedPath,
    pub is_ignored: bool,
    pub workspace_folder: WorkspaceFolder,
}

impl RepositoryFile {
    pub fn dir_uri(&self) -> NormalizedPath {
        Repository::dir_uri(&self.uri)
    }
}

/// A directory in a repository, with its ignore status as of the last `set_directory`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryDirectory {
    pub uri: NormalizedPath,
    pub repository_uri: NormalizedPath,
    pub is_ignored: bool,
    pub workspace_folder: WorkspaceFolder,
}

/// Filters for file and directory lookups
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GetFileOptions {
    /// Hide entries inside `.git/`
    pub exclude_git_folder: bool,
    /// Hide ignored entries that git does not track
    pub exclude_ignored: bool,
}

/// Git metadata gathered for one repository
#[derive(Debug, Clone, Default)]
pub struct GitFiles {
    /// `.gitignore` path to its content
    pub ignore_files: HashMap<NormalizedPath, String>,
    pub exclude_file: Option<NormalizedPath>,
    pub tracked_files: HashSet<NormalizedPath>,
}

/// Collaborators a repository talks to
#[derive(Clone)]
pub struct GitContext {
    pub fs: Arc<dyn FsClient>,
    pub git: Arc<dyn GitPlumbing>,
    pub remote_info: Arc<dyn RemoteInfo>,
}

/// State for one git repository inside a workspace folder
pub struct Repository {
    workspace_folder: WorkspaceFolder,
    uri: NormalizedPath,
    config_file_uri: NormalizedPath,
    files: RwLock<HashMap<NormalizedPath, RepositoryFile>>,
    directories: RwLock<HashMap<NormalizedPath, RepositoryDirectory>>,
    ignore_manager: RwLock<Option<GitIgnoreManager>>,
    git_files: Arc<RwLock<GitFiles>>,
    context: GitContext,
    refresh_debouncer: AsyncDebouncer<Result<TrackedFilesRefresh>>,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("uri", &self.uri)
            .field("workspace_folder", &self.workspace_folder.name)
            .field("files", &self.files.read().len())
            .finish()
    }
}

impl Repository {
    pub fn new(
        config_file_uri: NormalizedPath,
        workspace_folder: WorkspaceFolder,
        context: GitContext,
    ) -> Self {
        Self::with_tracked_files_debounce(
            config_file_uri,
            workspace_folder,
            context,
            DEFAULT_TRACKED_FILES_DEBOUNCE,
        )
    }

    pub fn with_tracked_files_debounce(
        config_file_uri: NormalizedPath,
        workspace_folder: WorkspaceFolder,
        context: GitContext,
        debounce: Duration,
    ) -> Self {
        let uri = Self::get_repo_root_from_git_config(&config_file_uri);
        let git_files = Arc::new(RwLock::new(GitFiles::default()));

        let refresh_debouncer = {
            let uri = uri.clone();
            let git = Arc::clone(&context.git);
            let git_files = Arc::clone(&git_files);
            AsyncDebouncer::new(debounce, move || {
                let uri = uri.clone();
                let git = Arc::clone(&git);
                let git_files = Arc::clone(&git_files);
                async move {
                    let tracked = list_tracked_files(git.as_ref(), &uri).await?;
                    let count = tracked.len();
                    let previous = std::mem::replace(&mut git_files.write().tracked_files, tracked);
                    let changed: Vec<NormalizedPath> = {
                        let git_files = git_files.read();
                        previous
                            .symmetric_difference(&git_files.tracked_files)
                            .cloned()
                            .collect()
                    };
                    tracing::debug!("[Repository] Refreshed {} tracked files for {}", count, uri);
                    Ok(TrackedFilesRefresh {
                        count,
                        changed: Arc::new(changed),
                    })
                }
            })
        };

        Self {
            workspace_folder,
            uri,
            config_file_uri,
            files: RwLock::new(HashMap::new()),
            directories: RwLock::new(HashMap::new()),
            ignore_manager: RwLock::new(None),
            git_files,
            context,
            refresh_debouncer,
        }
    }

    /// Repository root directory
    pub fn uri(&self) -> &NormalizedPath {
        &self.uri
    }

    pub fn config_file_uri(&self) -> &NormalizedPath {
        &self.config_file_uri
    }

    pub fn workspace_folder(&self) -> &WorkspaceFolder {
        &self.workspace_folder
    }

    /// Whether git would ignore this file.
    ///
    /// Tracked files are never ignored, whatever the patterns say.
    pub fn is_file_ignored(&self, file: &NormalizedPath) -> bool {
        if self.git_files.read().tracked_files.contains(file) {
            return false;
        }
        self.ignore_manager
            .read()
            .as_ref()
            .map_or(false, |manager| manager.is_ignored(file))
    }

    /// Whether everything below this directory would be ignored
    pub fn is_directory_ignored(&self, dir: &NormalizedPath) -> bool {
        self.ignore_manager
            .read()
            .as_ref()
            .map_or(false, |manager| manager.is_ignored(&dir.join("**")))
    }

    pub fn set_file(&self, file: &NormalizedPath) -> RepositoryFile {
        let entry = RepositoryFile {
            uri: file.clone(),
            repository_uri: self.uri.clone(),
            is_ignored: self.is_file_ignored(file),
            workspace_folder: self.workspace_folder.clone(),
        };
        self.files.write().insert(file.clone(), entry.clone());
        entry
    }

    /// Register one directory. Callers set each ancestor they need.
    pub fn set_directory(&self, dir: &NormalizedPath) -> RepositoryDirectory {
        let entry = RepositoryDirectory {
            uri: dir.clone(),
            repository_uri: self.uri.clone(),
            is_ignored: self.is_directory_ignored(dir),
            workspace_folder: self.workspace_folder.clone(),
        };
        self.directories.write().insert(dir.clone(), entry.clone());
        entry
    }

    pub fn get_file(&self, file: &NormalizedPath, options: GetFileOptions) -> Option<RepositoryFile> {
        let entry = self.files.read().get(file).cloned()?;
        self.passes(&entry.uri, entry.is_ignored, options)
            .then_some(entry)
    }

    pub fn get_directory(
        &self,
        dir: &NormalizedPath,
        options: GetFileOptions,
    ) -> Option<RepositoryDirectory> {
        let entry = self.directories.read().get(dir).cloned()?;
        self.passes(&entry.uri, entry.is_ignored, options)
            .then_some(entry)
    }

    pub fn has_directory(&self, dir: &NormalizedPath) -> bool {
        self.directories.read().contains_key(dir)
    }

    pub fn remove_file(&self, file: &NormalizedPath) -> Option<RepositoryFile> {
        self.files.write().remove(file)
    }

    /// Drop every file and directory at or below `dir`; returns the removed files.
    pub fn remove_files_under_directory(&self, dir: &NormalizedPath) -> Vec<RepositoryFile> {
        let removed: Vec<RepositoryFile> = {
            let mut files = self.files.write();
            let doomed: Vec<NormalizedPath> = files
                .keys()
                .filter(|uri| uri.starts_with(dir))
                .cloned()
                .collect();
            doomed.iter().filter_map(|uri| files.remove(uri)).collect()
        };
        self.directories.write().retain(|uri, _| !uri.starts_with(dir));
        tracing::debug!(
            "[Repository] Removed {} files under {} from {}",
            removed.len(),
            dir,
            self.uri
        );
        removed
    }

    pub fn get_current_tree_files(&self, options: GetFileOptions) -> Vec<RepositoryFile> {
        let tracked = self.git_files.read();
        self.files
            .read()
            .values()
            .filter(|file| {
                filter_entry(&file.uri, file.is_ignored, options, &tracked.tracked_files)
            })
            .cloned()
            .collect()
    }

    /// Unfiltered lookup
    pub fn get_current_tree_file(&self, file: &NormalizedPath) -> Option<RepositoryFile> {
        self.files.read().get(file).cloned()
    }

    pub fn get_current_tracked_files(&self) -> Vec<NormalizedPath> {
        self.git_files.read().tracked_files.iter().cloned().collect()
    }

    pub fn file_count(&self) -> usize {
        self.files.read().len()
    }

    fn passes(&self, uri: &NormalizedPath, is_ignored: bool, options: GetFileOptions) -> bool {
        filter_entry(uri, is_ignored, options, &self.git_files.read().tracked_files)
    }

    /// Read ignore rules and tracked files for this repository from `files`.
    ///
    /// Ignore and exclude files that cannot be read are logged and skipped.
    /// A failing tracked-file listing fails the whole setup and leaves the
    /// previous state in place.
    pub async fn setup_git_for_repository(&self, files: &[NormalizedPath]) -> Result<GitFiles> {
        let started = std::time::Instant::now();
        let git_files = self.get_git_files(files).await?;

        let mut manager = GitIgnoreManager::new(self.uri.clone());
        for (ignore_file, content) in &git_files.ignore_files {
            manager.add_gitignore(ignore_file, content);
        }
        if let Some(exclude) = &git_files.exclude_file {
            match self.context.fs.read_to_string(exclude.as_path()).await {
                Ok(content) => manager.add_exclude_file(&content),
                Err(err) => tracing::warn!(
                    "[Repository] Could not read exclude file {}: {}",
                    exclude,
                    err
                ),
            }
        }

        *self.ignore_manager.write() = Some(manager);
        *self.git_files.write() = git_files.clone();

        tracing::debug!(
            "[Repository] Set up {} with {} ignore files and {} tracked files in {}ms",
            self.uri,
            git_files.ignore_files.len(),
            git_files.tracked_files.len(),
            started.elapsed().as_millis()
        );
        Ok(git_files)
    }

    async fn get_git_files(&self, files: &[NormalizedPath]) -> Result<GitFiles> {
        let mut ignore_paths = Vec::new();
        let mut exclude_file = None;
        for file in files {
            if Self::is_git_ignore_file(file) {
                ignore_paths.push(file.clone());
            } else if Self::is_git_exclude_file(file) {
                exclude_file = Some(file.clone());
            }
        }

        let fs = &self.context.fs;
        let reads = join_all(ignore_paths.iter().map(|path| async move {
            (path, fs.read_to_string(path.as_path()).await)
        }));
        let (contents, tracked) =
            tokio::join!(reads, list_tracked_files(self.context.git.as_ref(), &self.uri));

        let mut ignore_files = HashMap::new();
        for (path, content) in contents {
            match content {
                Ok(content) => {
                    ignore_files.insert(path.clone(), content);
                }
                Err(err) => {
                    tracing::warn!("[Repository] Could not read ignore file {}: {}", path, err)
                }
            }
        }

        Ok(GitFiles {
            ignore_files,
            exclude_file,
            tracked_files: tracked?,
        })
    }

    /// Re-read the tracked files from git.
    ///
    /// Calls within the debounce window share one listing and its result.
    /// Stored files whose tracked status changed get their ignore status
    /// recomputed.
    pub async fn refresh_tracked_files(&self) -> Result<usize> {
        let refresh = self
            .refresh_debouncer
            .call()
            .await
            .unwrap_or(Err(RepoError::Disposed))?;

        let stale: Vec<NormalizedPath> = {
            let files = self.files.read();
            refresh
                .changed
                .iter()
                .filter(|uri| files.contains_key(*uri))
                .cloned()
                .collect()
        };
        for file in &stale {
            self.set_file(file);
        }
        if !stale.is_empty() {
            tracing::debug!(
                "[Repository] Recomputed ignore status of {} files in {}",
                stale.len(),
                self.uri
            );
        }
        Ok(refresh.count)
    }

    pub fn dispose(&self) {
        self.refresh_debouncer.cancel();
        if let Some(manager) = self.ignore_manager.write().as_mut() {
            manager.dispose();
        }
        self.files.write().clear();
        self.directories.write().clear();
    }

    /// Directory containing `file`
    pub fn dir_uri(file: &NormalizedPath) -> NormalizedPath {
        file.parent().unwrap_or_else(|| file.clone())
    }

    /// `/repo/.git/config` -> `/repo`
    pub fn get_repo_root_from_git_config(config: &NormalizedPath) -> NormalizedPath {
        config
            .parent()
            .and_then(|git_dir| git_dir.parent())
            .unwrap_or_else(|| config.clone())
    }

    pub fn get_repo_git_config_file(root: &NormalizedPath) -> NormalizedPath {
        root.join(".git").join("config")
    }

    pub fn get_git_config_files(files: &[NormalizedPath]) -> Vec<NormalizedPath> {
        files
            .iter()
            .filter(|file| Self::is_git_config_file(file))
            .cloned()
            .collect()
    }

    pub fn is_git_config_file(file: &NormalizedPath) -> bool {
        file.file_name() == Some("config")
            && file
                .parent()
                .and_then(|dir| dir.file_name().map(|name| name == ".git"))
                .unwrap_or(false)
    }

    pub fn is_git_ignore_file(file: &NormalizedPath) -> bool {
        file.file_name() == Some(".gitignore")
    }

    pub fn is_git_exclude_file(file: &NormalizedPath) -> bool {
        file.as_path().ends_with(Path::new(".git/info/exclude"))
    }

    /// Whether `file` lives somewhere below a `.git` directory
    pub fn is_in_git_folder(file: &NormalizedPath) -> bool {
        file.parent().map_or(false, |dir| dir.has_component(".git"))
    }
}

fn filter_entry(
    uri: &NormalizedPath,
    is_ignored: bool,
    options: GetFileOptions,
    tracked: &HashSet<NormalizedPath>,
) -> bool {
    if options.exclude_git_folder && Repository::is_in_git_folder(uri) {
        return false;
    }
    if tracked.contains(uri) {
        return true;
    }
    !(options.exclude_ignored && is_ignored)
}

async fn list_tracked_files(
    git: &dyn GitPlumbing,
    root: &NormalizedPath,
) -> Result<HashSet<NormalizedPath>> {
    let files = git.list_files(root.as_path()).await?;
    Ok(files.iter().map(|relative| root.join(relative)).collect())
}
