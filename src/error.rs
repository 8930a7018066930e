//! Error types and exit codes for repo-index

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use thiserror::Error;

/// Main error type for repo-index operations
///
/// The type is `Clone` so a single failed debounced call can be handed to
/// every caller that joined it; I/O sources are shared behind an `Arc`.
#[derive(Error, Debug, Clone)]
pub enum RepoError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    #[error("Git error: {message}")]
    GitError { message: String },

    #[error("Not a git repository: {path}")]
    NotGitRepo { path: PathBuf },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Watcher error: {message}")]
    Watcher { message: String },

    #[error("Repository service has been disposed")]
    Disposed,
}

impl RepoError {
    /// Wrap an I/O error together with the path it happened on
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source: Arc::new(source),
        }
    }

    pub fn git(message: impl Into<String>) -> Self {
        Self::GitError {
            message: message.into(),
        }
    }

    /// Whether the error means "the thing is not there"
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }

    /// Convert error to an exit code for the binary:
    /// - 1: IO error
    /// - 2: Configuration error
    /// - 5: Git error
    /// - 6: Watcher error
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Io { .. } => ExitCode::from(1),
            Self::Config { .. } => ExitCode::from(2),
            Self::GitError { .. } | Self::NotGitRepo { .. } => ExitCode::from(5),
            Self::Watcher { .. } => ExitCode::from(6),
            Self::Disposed => ExitCode::from(1),
        }
    }
}

impl From<std::io::Error> for RepoError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::new(),
            source: Arc::new(source),
        }
    }
}

impl From<notify::Error> for RepoError {
    fn from(err: notify::Error) -> Self {
        Self::Watcher {
            message: err.to_string(),
        }
    }
}

/// Result type alias for repo-index operations
pub type Result<T> = std::result::Result<T, RepoError>;
