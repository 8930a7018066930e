//! Branch detection for a repository
//!
//! `get_main_branch` never fails. Strategies are tried in order and each one
//! swallows its own error:
//! 1. the local remote-HEAD ref file `.git/refs/remotes/<remote>/HEAD`
//! 2. the remote's symbolic HEAD via [`RemoteInfo`](crate::git::RemoteInfo)
//! 3. a well-known name among the local branches
//! 4. `"main"`

use crate::error::Result;
use crate::git::GitRemote;

use super::Repository;

/// Local branch names that usually denote the main line, highest priority first
const MAIN_BRANCH_NAMES: &[&str] = &["main", "master", "trunk", "development"];

impl Repository {
    /// Name of the repository's main branch
    pub async fn get_main_branch(&self) -> String {
        if let Some(remote) = self.preferred_remote().await {
            tracing::debug!(
                "[Repository] Detected remote \"{}\", for repository \"{}\"",
                remote.remote,
                self.uri
            );

            if let Some(branch) = self.main_branch_from_ref(&remote.remote).await {
                tracing::debug!(
                    "[Repository] Got main branch \"{}\" from local ref, for repository \"{}\"",
                    branch,
                    self.uri
                );
                return branch;
            }

            if let Some(branch) = self.main_branch_from_remote(&remote.url).await {
                tracing::debug!(
                    "[Repository] Got main branch \"{}\" from remote, for repository \"{}\"",
                    branch,
                    self.uri
                );
                return branch;
            }
        }

        if let Some(branch) = self.main_branch_from_local_branches().await {
            tracing::debug!(
                "[Repository] Got main branch \"{}\" from local branches, for repository \"{}\"",
                branch,
                self.uri
            );
            return branch;
        }

        tracing::error!(
            "[Repository] Could not detect main branch for repository \"{}\". Defaulting to \"main\", but this may be incorrect",
            self.uri
        );
        "main".to_string()
    }

    /// Checked-out branch, or the main branch when HEAD is detached
    pub async fn get_current_branch(&self) -> String {
        match self.context.git.current_branch(self.uri.as_path()).await {
            Ok(Some(branch)) => branch,
            Ok(None) => self.get_main_branch().await,
            Err(err) => {
                tracing::debug!(
                    "[Repository] Could not read current branch for \"{}\": {}",
                    self.uri,
                    err
                );
                self.get_main_branch().await
            }
        }
    }

    /// What `HEAD` resolves to
    pub async fn get_head_ref(&self) -> Result<String> {
        self.context.git.resolve_ref(self.uri.as_path(), "HEAD").await
    }

    pub async fn list_branches(&self) -> Result<Vec<String>> {
        self.context.git.list_branches(self.uri.as_path()).await
    }

    /// Current commit (or branch) name, falling back to the main branch
    pub async fn get_current_commit(&self) -> String {
        match self.get_head_ref().await {
            Ok(head) => head
                .strip_prefix("refs/heads/")
                .map(str::to_string)
                .unwrap_or(head),
            Err(_) => self.get_main_branch().await,
        }
    }

    /// `origin` if configured, otherwise the first remote
    async fn preferred_remote(&self) -> Option<GitRemote> {
        let remotes = match self.context.git.list_remotes(self.uri.as_path()).await {
            Ok(remotes) => remotes,
            Err(err) => {
                tracing::debug!("[Repository] Could not list remotes for \"{}\": {}", self.uri, err);
                return None;
            }
        };
        let origin = remotes.iter().position(|r| r.remote == "origin").unwrap_or(0);
        remotes.into_iter().nth(origin)
    }

    async fn main_branch_from_ref(&self, remote: &str) -> Option<String> {
        let ref_file = self
            .uri
            .join(".git/refs/remotes")
            .join(remote)
            .join("HEAD");
        match self.context.fs.read_to_string(ref_file.as_path()).await {
            Ok(content) => {
                let content = content.trim();
                let prefix = format!("ref: refs/remotes/{}/", remote);
                let branch = content.strip_prefix(&prefix).unwrap_or(content);
                (!branch.is_empty()).then(|| branch.to_string())
            }
            Err(_) => {
                tracing::debug!(
                    "[Repository] Could not find main branch name in \"{}\", for repository \"{}\"",
                    ref_file,
                    self.uri
                );
                None
            }
        }
    }

    async fn main_branch_from_remote(&self, remote_url: &str) -> Option<String> {
        match self.context.remote_info.remote_head(remote_url).await {
            Ok(head) => head.map(|head| {
                head.strip_prefix("refs/heads/")
                    .map(str::to_string)
                    .unwrap_or(head)
            }),
            Err(err) => {
                // Expected for private repositories
                tracing::debug!(
                    "[Repository] Could not get remote repository info for \"{}\": {}",
                    self.uri,
                    err
                );
                None
            }
        }
    }

    async fn main_branch_from_local_branches(&self) -> Option<String> {
        let branches = match self.list_branches().await {
            Ok(branches) => branches,
            Err(err) => {
                tracing::debug!("[Repository] Could not list branches for \"{}\": {}", self.uri, err);
                return None;
            }
        };
        MAIN_BRANCH_NAMES
            .iter()
            .find(|name| branches.iter().any(|b| b == *name))
            .map(|name| name.to_string())
    }
}
