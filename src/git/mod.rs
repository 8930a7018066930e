//! Git plumbing and ignore handling
//!
//! Ignore matching is done in-process by [`GitIgnoreManager`]. Everything that
//! needs git's object model (tracked files, remotes, branches, refs) goes
//! through the opaque [`GitPlumbing`] collaborator; the default
//! [`CommandGitPlumbing`] uses subprocess calls to git for maximum
//! compatibility.

pub mod gitignore;
pub mod remote;

pub use gitignore::GitIgnoreManager;
pub use remote::{convert_to_http_url, CommandRemoteInfo, RemoteInfo};

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{RepoError, Result};

/// A configured remote, as listed by `git remote -v`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitRemote {
    pub remote: String,
    pub url: String,
}

/// Minimal git plumbing the repository layer consumes.
///
/// All paths are working-tree roots. Implementations must not cache: every
/// call reflects the current on-disk state.
#[async_trait]
pub trait GitPlumbing: Send + Sync {
    /// Paths of files in the index, relative to `dir`, `/`-separated
    async fn list_files(&self, dir: &Path) -> Result<Vec<String>>;

    async fn list_remotes(&self, dir: &Path) -> Result<Vec<GitRemote>>;

    /// Short names of local branches
    async fn list_branches(&self, dir: &Path) -> Result<Vec<String>>;

    /// Short name of the checked-out branch, `None` when HEAD is detached
    async fn current_branch(&self, dir: &Path) -> Result<Option<String>>;

    async fn resolve_ref(&self, dir: &Path, reference: &str) -> Result<String>;
}

/// [`GitPlumbing`] backed by the `git` binary
#[derive(Debug, Clone, Default)]
pub struct CommandGitPlumbing;

impl CommandGitPlumbing {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl GitPlumbing for CommandGitPlumbing {
    async fn list_files(&self, dir: &Path) -> Result<Vec<String>> {
        let output = git_output(&["ls-files", "-z", "--cached"], Some(dir)).await?;
        Ok(output
            .split('\0')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn list_remotes(&self, dir: &Path) -> Result<Vec<GitRemote>> {
        let output = git_command(&["remote", "-v"], Some(dir)).await?;
        Ok(parse_remotes(&output))
    }

    async fn list_branches(&self, dir: &Path) -> Result<Vec<String>> {
        let output = git_command(
            &["for-each-ref", "--format=%(refname:short)", "refs/heads/"],
            Some(dir),
        )
        .await?;
        Ok(output
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn current_branch(&self, dir: &Path) -> Result<Option<String>> {
        Ok(git_command_optional(&["symbolic-ref", "--quiet", "--short", "HEAD"], Some(dir))
            .await
            .filter(|b| !b.is_empty()))
    }

    async fn resolve_ref(&self, dir: &Path, reference: &str) -> Result<String> {
        git_command(&["rev-parse", "--verify", reference], Some(dir)).await
    }
}

/// Parse `git remote -v` output, keeping one entry per remote (fetch URL)
fn parse_remotes(output: &str) -> Vec<GitRemote> {
    let mut remotes: Vec<GitRemote> = Vec::new();
    for line in output.lines() {
        let mut parts = line.split_whitespace();
        let (Some(name), Some(url)) = (parts.next(), parts.next()) else {
            continue;
        };
        if remotes.iter().any(|r| r.remote == name) {
            continue;
        }
        remotes.push(GitRemote {
            remote: name.to_string(),
            url: url.to_string(),
        });
    }
    remotes
}

fn git_process(args: &[&str], cwd: Option<&Path>) -> Command {
    let mut cmd = Command::new("git");
    cmd.args(args)
        // Never block on a credential prompt
        .env("GIT_TERMINAL_PROMPT", "0")
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    cmd
}

/// Run a git command and return stdout untouched
pub async fn git_output(args: &[&str], cwd: Option<&Path>) -> Result<String> {
    let output = git_process(args, cwd)
        .output()
        .await
        .map_err(|e| RepoError::git(format!("Failed to execute git: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(RepoError::git(format!(
            "git {} failed: {}",
            args.join(" "),
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Run a git command and return stdout as a trimmed string
pub async fn git_command(args: &[&str], cwd: Option<&Path>) -> Result<String> {
    git_output(args, cwd).await.map(|s| s.trim().to_string())
}

/// Run a git command, returning None if it fails (for optional queries)
pub async fn git_command_optional(args: &[&str], cwd: Option<&Path>) -> Option<String> {
    git_command(args, cwd).await.ok()
}
