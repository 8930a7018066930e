//! repo-index: incremental git repository and `.gitignore` tracking
//!
//! This library keeps, for each workspace folder, the set of git repositories
//! inside it and which of their files are tracked, untracked or ignored. Ignore
//! decisions follow git's cascading `.gitignore` and `.git/info/exclude`
//! semantics and are computed in-process; git itself is only asked for the
//! tracked-file list and branch information.
//!
//! # Example
//!
//! ```ignore
//! use repo_index::{GetFileOptions, RepositoryService, ServiceConfig, WorkspaceFolder};
//!
//! let service = RepositoryService::with_local_collaborators(ServiceConfig::default());
//! let folder = WorkspaceFolder::new("/home/me/project");
//! service.scan_workspace_folder(&folder).await?;
//!
//! let options = GetFileOptions { exclude_ignored: true, exclude_git_folder: true };
//! for file in service.get_current_files_for_workspace(&folder.uri, options) {
//!     println!("{}", file.uri);
//! }
//! ```

pub mod cli;
pub mod config;
pub mod debounce;
pub mod dir_matcher;
pub mod error;
pub mod fs;
pub mod git;
pub mod paths;
pub mod repository;
pub mod service;
pub mod watcher;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use config::{ServiceConfig, WatcherConfig};
pub use dir_matcher::FastDirectoryMatcher;
pub use error::{RepoError, Result};
pub use fs::{DirectoryWalker, FsClient, LocalDirectoryWalker, LocalFs};
pub use git::{CommandGitPlumbing, GitIgnoreManager, GitPlumbing, RemoteInfo};
pub use paths::{NormalizedPath, WorkspaceFolder};
pub use repository::{GetFileOptions, GitContext, GitFiles, Repository, RepositoryFile};
pub use service::{
    FileChangeType, FileEvent, FileSystemEvent, RepositoryService, Subscription,
    WorkspaceFileEvent, WorkspaceFilesEvent,
};
pub use watcher::{WatcherHandle, WorkspaceWatcher};
