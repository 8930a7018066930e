//! In-memory collaborators for unit tests

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::{RepoError, Result};
use crate::fs::{DirectoryToSearch, DirectoryWalker, FileStat, FsClient};
use crate::git::{GitPlumbing, GitRemote, RemoteInfo};
use crate::paths::NormalizedPath;
use crate::repository::GitContext;

fn not_found(path: &Path) -> RepoError {
    RepoError::io(
        path,
        std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
    )
}

/// A tiny in-memory disk shared by [`MemoryFs`] and [`MemoryWalker`]
#[derive(Debug, Default)]
pub struct MemoryFs {
    files: Mutex<BTreeMap<PathBuf, Vec<u8>>>,
    dirs: Mutex<HashSet<PathBuf>>,
    unreadable: Mutex<HashSet<PathBuf>>,
    reads: AtomicUsize,
}

impl MemoryFs {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_file(&self, path: &str, content: &str) {
        let path = PathBuf::from(path);
        let mut parent = path.parent();
        while let Some(dir) = parent {
            self.dirs.lock().insert(dir.to_path_buf());
            parent = dir.parent();
        }
        self.files.lock().insert(path, content.as_bytes().to_vec());
    }

    pub fn add_dir(&self, path: &str) {
        self.dirs.lock().insert(PathBuf::from(path));
    }

    pub fn remove(&self, path: &str) {
        let prefix = PathBuf::from(path);
        self.files.lock().retain(|p, _| !p.starts_with(&prefix));
        self.dirs.lock().retain(|p| !p.starts_with(&prefix));
    }

    /// Make reads of `path` fail with a permission error
    pub fn make_unreadable(&self, path: &str) {
        self.unreadable.lock().insert(PathBuf::from(path));
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn files_under(&self, dir: &Path) -> Vec<NormalizedPath> {
        self.files
            .lock()
            .keys()
            .filter(|p| p.starts_with(dir))
            .map(NormalizedPath::new)
            .collect()
    }
}

#[async_trait]
impl FsClient for MemoryFs {
    async fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.unreadable.lock().contains(path) {
            return Err(RepoError::io(
                path,
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            ));
        }
        self.files
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| not_found(path))
    }

    async fn lstat(&self, path: &Path) -> Result<FileStat> {
        if self.files.lock().contains_key(path) {
            return Ok(FileStat {
                is_dir: false,
                is_file: true,
                is_symlink: false,
            });
        }
        if self.dirs.lock().contains(path) {
            return Ok(FileStat {
                is_dir: true,
                is_file: false,
                is_symlink: false,
            });
        }
        Err(not_found(path))
    }
}

/// [`DirectoryWalker`] over a [`MemoryFs`]
pub struct MemoryWalker {
    fs: Arc<MemoryFs>,
    calls: AtomicUsize,
}

impl MemoryWalker {
    pub fn new(fs: Arc<MemoryFs>) -> Arc<Self> {
        Arc::new(Self {
            fs,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DirectoryWalker for MemoryWalker {
    async fn find_files_for_directory(
        &self,
        search: DirectoryToSearch,
    ) -> Result<Vec<NormalizedPath>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.fs.files_under(search.directory.as_path()))
    }
}

/// Scriptable [`GitPlumbing`]
#[derive(Debug, Default)]
pub struct FakeGit {
    tracked: Mutex<HashMap<PathBuf, Vec<String>>>,
    remotes: Mutex<Vec<GitRemote>>,
    branches: Mutex<Vec<String>>,
    current_branch: Mutex<Option<String>>,
    head: Mutex<Option<String>>,
    fail_list_files: Mutex<bool>,
    fail_branches: Mutex<bool>,
    list_files_calls: AtomicUsize,
    hold: Mutex<Option<Arc<Notify>>>,
    entered: Notify,
}

impl FakeGit {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_tracked(&self, repo: &str, files: &[&str]) {
        self.tracked.lock().insert(
            PathBuf::from(repo),
            files.iter().map(|f| f.to_string()).collect(),
        );
    }

    pub fn add_remote(&self, name: &str, url: &str) {
        self.remotes.lock().push(GitRemote {
            remote: name.to_string(),
            url: url.to_string(),
        });
    }

    pub fn set_branches(&self, branches: &[&str]) {
        *self.branches.lock() = branches.iter().map(|b| b.to_string()).collect();
    }

    pub fn set_current_branch(&self, branch: Option<&str>) {
        *self.current_branch.lock() = branch.map(str::to_string);
    }

    pub fn set_head(&self, head: Option<&str>) {
        *self.head.lock() = head.map(str::to_string);
    }

    pub fn fail_list_files(&self, fail: bool) {
        *self.fail_list_files.lock() = fail;
    }

    pub fn fail_branches(&self, fail: bool) {
        *self.fail_branches.lock() = fail;
    }

    pub fn list_files_calls(&self) -> usize {
        self.list_files_calls.load(Ordering::SeqCst)
    }

    /// Make `list_files` park until the returned handle is notified, once per call
    pub fn hold_list_files(&self) -> Arc<Notify> {
        let release = Arc::new(Notify::new());
        *self.hold.lock() = Some(Arc::clone(&release));
        release
    }

    /// Stop parking and let the parked call through
    pub fn release_list_files(&self) {
        if let Some(release) = self.hold.lock().take() {
            release.notify_one();
        }
    }

    /// Resolves once a `list_files` call has parked
    pub async fn list_files_entered(&self) {
        self.entered.notified().await;
    }
}

#[async_trait]
impl GitPlumbing for FakeGit {
    async fn list_files(&self, dir: &Path) -> Result<Vec<String>> {
        self.list_files_calls.fetch_add(1, Ordering::SeqCst);
        let hold = self.hold.lock().clone();
        if let Some(release) = hold {
            self.entered.notify_one();
            release.notified().await;
        }
        if *self.fail_list_files.lock() {
            return Err(RepoError::git("could not read index"));
        }
        Ok(self.tracked.lock().get(dir).cloned().unwrap_or_default())
    }

    async fn list_remotes(&self, _dir: &Path) -> Result<Vec<GitRemote>> {
        Ok(self.remotes.lock().clone())
    }

    async fn list_branches(&self, _dir: &Path) -> Result<Vec<String>> {
        if *self.fail_branches.lock() {
            return Err(RepoError::git("no refs"));
        }
        Ok(self.branches.lock().clone())
    }

    async fn current_branch(&self, _dir: &Path) -> Result<Option<String>> {
        Ok(self.current_branch.lock().clone())
    }

    async fn resolve_ref(&self, _dir: &Path, reference: &str) -> Result<String> {
        self.head
            .lock()
            .clone()
            .ok_or_else(|| RepoError::git(format!("unknown ref {}", reference)))
    }
}

/// Scriptable [`RemoteInfo`]
#[derive(Debug, Default)]
pub struct FakeRemoteInfo {
    head: Mutex<Option<String>>,
    fail: Mutex<bool>,
    requested: Mutex<Vec<String>>,
}

impl FakeRemoteInfo {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_head(&self, head: Option<&str>) {
        *self.head.lock() = head.map(str::to_string);
    }

    pub fn fail(&self, fail: bool) {
        *self.fail.lock() = fail;
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().clone()
    }
}

#[async_trait]
impl RemoteInfo for FakeRemoteInfo {
    async fn remote_head(&self, remote_url: &str) -> Result<Option<String>> {
        self.requested.lock().push(remote_url.to_string());
        if *self.fail.lock() {
            return Err(RepoError::git("authentication required"));
        }
        Ok(self.head.lock().clone())
    }
}

/// Fakes wired together the way the service wires real collaborators
pub struct Fixture {
    pub fs: Arc<MemoryFs>,
    pub walker: Arc<MemoryWalker>,
    pub git: Arc<FakeGit>,
    pub remote: Arc<FakeRemoteInfo>,
}

impl Fixture {
    pub fn new() -> Self {
        let fs = MemoryFs::new();
        Self {
            walker: MemoryWalker::new(Arc::clone(&fs)),
            fs,
            git: FakeGit::new(),
            remote: FakeRemoteInfo::new(),
        }
    }

    pub fn context(&self) -> GitContext {
        GitContext {
            fs: self.fs.clone(),
            git: self.git.clone(),
            remote_info: self.remote.clone(),
        }
    }
}
