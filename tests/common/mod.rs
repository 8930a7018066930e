//! Common test utilities and fixtures for repo-index integration tests
//!
//! This module provides:
//! - `TestRepo` builder for laying out workspace folders with repositories
//! - `StaticGit`, a `GitPlumbing` that reports a fixed tracked-file list
//! - `service_for` to build a `RepositoryService` over the real local disk

#![allow(dead_code)]

pub mod test_repo;

pub use test_repo::TestRepo;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use repo_index::git::GitRemote;
use repo_index::{
    GitContext, GitPlumbing, LocalDirectoryWalker, LocalFs, RemoteInfo, RepoError,
    RepositoryService, Result, ServiceConfig,
};

/// Tracked files per repository root, relative and `/`-separated
#[derive(Default)]
pub struct StaticGit {
    tracked: Mutex<HashMap<PathBuf, Vec<String>>>,
}

impl StaticGit {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_tracked(&self, repo: &Path, files: &[&str]) {
        self.tracked.lock().insert(
            repo.to_path_buf(),
            files.iter().map(|f| f.to_string()).collect(),
        );
    }
}

#[async_trait]
impl GitPlumbing for StaticGit {
    async fn list_files(&self, dir: &Path) -> Result<Vec<String>> {
        Ok(self.tracked.lock().get(dir).cloned().unwrap_or_default())
    }

    async fn list_remotes(&self, _dir: &Path) -> Result<Vec<GitRemote>> {
        Ok(Vec::new())
    }

    async fn list_branches(&self, _dir: &Path) -> Result<Vec<String>> {
        Ok(vec!["main".to_string()])
    }

    async fn current_branch(&self, _dir: &Path) -> Result<Option<String>> {
        Ok(Some("main".to_string()))
    }

    async fn resolve_ref(&self, _dir: &Path, reference: &str) -> Result<String> {
        Err(RepoError::git(format!("unknown ref {}", reference)))
    }
}

pub struct NoRemote;

#[async_trait]
impl RemoteInfo for NoRemote {
    async fn remote_head(&self, _remote_url: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Service over the real disk with `git` answered by `git`
pub fn service_for(git: Arc<StaticGit>) -> RepositoryService {
    let context = GitContext {
        fs: Arc::new(LocalFs::new()),
        git,
        remote_info: Arc::new(NoRemote),
    };
    RepositoryService::new(
        context,
        Arc::new(LocalDirectoryWalker::new()),
        ServiceConfig::default(),
    )
}
