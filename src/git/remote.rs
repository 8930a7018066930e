//! Remote repository info (default branch of a remote)
//!
//! Only public / unauthenticated remotes are supported: the lookup never
//! prompts for credentials, and callers are expected to treat failure as the
//! normal case for private repositories.

use async_trait::async_trait;

use crate::error::{RepoError, Result};

use super::git_command;

/// Asks a remote which branch its `HEAD` points at
#[async_trait]
pub trait RemoteInfo: Send + Sync {
    /// Symbolic HEAD of the remote, e.g. `refs/heads/main`
    async fn remote_head(&self, remote_url: &str) -> Result<Option<String>>;
}

/// [`RemoteInfo`] using `git ls-remote --symref`
#[derive(Debug, Clone, Default)]
pub struct CommandRemoteInfo;

impl CommandRemoteInfo {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RemoteInfo for CommandRemoteInfo {
    async fn remote_head(&self, remote_url: &str) -> Result<Option<String>> {
        tracing::debug!("Getting default branch from remote \"{}\"", remote_url);
        let url = convert_to_http_url(remote_url);
        tracing::debug!("Repository remote URL as HTTP URL: \"{}\"", url);

        let output = git_command(&["ls-remote", "--symref", &url, "HEAD"], None)
            .await
            .map_err(|e| RepoError::git(format!("remote info for {}: {}", url, e)))?;
        Ok(parse_symref_head(&output))
    }
}

/// Extract `refs/heads/<name>` from `git ls-remote --symref <url> HEAD` output
fn parse_symref_head(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let rest = line.strip_prefix("ref:")?;
        let (reference, target) = rest.trim().split_once(char::is_whitespace)?;
        (target.trim() == "HEAD").then(|| reference.to_string())
    })
}

/// Convert SSH, `git://` and `ssh://` remote forms to an HTTPS URL.
///
/// Anything already HTTP(S) or unrecognized is returned unchanged.
pub fn convert_to_http_url(remote_url: &str) -> String {
    // git@github.com:user/repo.git
    if let Some(rest) = remote_url.strip_prefix("git@") {
        if let Some((domain, path)) = rest.split_once(':') {
            return format!("https://{}/{}", domain, path);
        }
    }

    if let Some(rest) = remote_url.strip_prefix("git://") {
        return format!("https://{}", rest);
    }

    // ssh://git@github.com/user/repo.git
    if let Some(rest) = remote_url.strip_prefix("ssh://") {
        let rest = rest.strip_prefix("git@").unwrap_or(rest);
        return format!("https://{}", rest);
    }

    remote_url.to_string()
}
