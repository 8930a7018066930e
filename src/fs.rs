//! Filesystem collaborators
//!
//! The repository layer only needs two things from the filesystem: read a
//! file and classify a path ([`FsClient`]), and enumerate everything below a
//! directory ([`DirectoryWalker`]). Both are traits so tests and embedders
//! can substitute their own view of the disk.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ignore::WalkBuilder;

use crate::error::{RepoError, Result};
use crate::paths::NormalizedPath;

/// What `lstat` reports about a path (symlinks are not followed)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub is_dir: bool,
    pub is_file: bool,
    pub is_symlink: bool,
}

#[async_trait]
pub trait FsClient: Send + Sync {
    async fn read_file(&self, path: &Path) -> Result<Vec<u8>>;

    async fn lstat(&self, path: &Path) -> Result<FileStat>;

    /// Read a file as UTF-8, replacing invalid sequences
    async fn read_to_string(&self, path: &Path) -> Result<String> {
        let bytes = self.read_file(path).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// [`FsClient`] over `tokio::fs`
#[derive(Debug, Clone, Default)]
pub struct LocalFs;

impl LocalFs {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FsClient for LocalFs {
    async fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        tokio::fs::read(path)
            .await
            .map_err(|e| RepoError::io(path, e))
    }

    async fn lstat(&self, path: &Path) -> Result<FileStat> {
        let metadata = tokio::fs::symlink_metadata(path)
            .await
            .map_err(|e| RepoError::io(path, e))?;
        let file_type = metadata.file_type();
        Ok(FileStat {
            is_dir: file_type.is_dir(),
            is_file: file_type.is_file(),
            is_symlink: file_type.is_symlink(),
        })
    }
}

/// Optional filters applied while enumerating
#[derive(Debug, Clone, Default)]
pub struct FileFilters {
    /// Keep only files whose path ends with one of these suffixes
    pub file_ends_with: Vec<String>,
}

impl FileFilters {
    fn accepts(&self, path: &Path) -> bool {
        if self.file_ends_with.is_empty() {
            return true;
        }
        let path = path.to_string_lossy();
        self.file_ends_with.iter().any(|end| path.ends_with(end.as_str()))
    }
}

/// Request for [`DirectoryWalker::find_files_for_directory`]
#[derive(Debug, Clone)]
pub struct DirectoryToSearch {
    pub directory: NormalizedPath,
    pub filters: Option<FileFilters>,
}

impl DirectoryToSearch {
    pub fn new(directory: NormalizedPath) -> Self {
        Self {
            directory,
            filters: None,
        }
    }
}

#[async_trait]
pub trait DirectoryWalker: Send + Sync {
    /// Every file (not directory) currently under the requested directory
    async fn find_files_for_directory(&self, search: DirectoryToSearch)
        -> Result<Vec<NormalizedPath>>;
}

/// [`DirectoryWalker`] over the local disk.
///
/// Nothing is filtered by ignore rules, hidden-ness or `.git`: the repository
/// layer needs `.git/config`, `.gitignore` and ignored files to see the whole
/// picture.
#[derive(Debug, Clone, Default)]
pub struct LocalDirectoryWalker;

impl LocalDirectoryWalker {
    pub fn new() -> Self {
        Self
    }

    fn walk(root: &Path, filters: Option<&FileFilters>) -> Vec<NormalizedPath> {
        let walker = WalkBuilder::new(root)
            .standard_filters(false)
            .follow_links(false)
            .build();

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::debug!("DirectoryWalker: skipping entry under {}: {}", root.display(), err);
                    continue;
                }
            };
            let is_file = entry.file_type().map(|t| !t.is_dir()).unwrap_or(false);
            if !is_file {
                continue;
            }
            if filters.map_or(true, |f| f.accepts(entry.path())) {
                files.push(NormalizedPath::new(entry.path()));
            }
        }
        files
    }
}

#[async_trait]
impl DirectoryWalker for LocalDirectoryWalker {
    async fn find_files_for_directory(
        &self,
        search: DirectoryToSearch,
    ) -> Result<Vec<NormalizedPath>> {
        let started = std::time::Instant::now();
        let root: PathBuf = search.directory.as_path().to_path_buf();
        let filters = search.filters;
        let files = tokio::task::spawn_blocking(move || Self::walk(&root, filters.as_ref()))
            .await
            .map_err(|e| RepoError::io(search.directory.as_path(), std::io::Error::other(e)))?;
        tracing::debug!(
            "DirectoryWalker: found {} paths, took {}ms",
            files.len(),
            started.elapsed().as_millis()
        );
        Ok(files)
    }
}
