//! TestRepo builder for workspace folders on disk

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use repo_index::{NormalizedPath, WorkspaceFolder};

/// A temporary workspace folder
pub struct TestRepo {
    dir: TempDir,
    root: PathBuf,
}

impl TestRepo {
    /// Create a new empty workspace folder
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        // The service compares paths lexically, so resolve /tmp symlinks up front
        let root = fs::canonicalize(dir.path()).expect("Failed to canonicalize temp dir");
        Self { dir, root }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn join(&self, relative_path: &str) -> PathBuf {
        self.root.join(relative_path)
    }

    pub fn uri(&self, relative_path: &str) -> NormalizedPath {
        NormalizedPath::new(self.join(relative_path))
    }

    pub fn folder(&self) -> WorkspaceFolder {
        WorkspaceFolder::new(NormalizedPath::new(&self.root))
    }

    /// Add a file with the given content
    pub fn add_file(&self, relative_path: &str, content: &str) -> &Self {
        let full_path = self.join(relative_path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        fs::write(&full_path, content).expect("Failed to write file");
        self
    }

    pub fn remove(&self, relative_path: &str) -> &Self {
        let full_path = self.join(relative_path);
        if full_path.is_dir() {
            fs::remove_dir_all(&full_path).expect("Failed to remove dir");
        } else {
            fs::remove_file(&full_path).expect("Failed to remove file");
        }
        self
    }

    /// Lay out the `.git/` files the service recognises a repository by.
    ///
    /// `relative_root` is `""` for the workspace folder itself.
    pub fn init_repo(&self, relative_root: &str) -> &Self {
        let git_dir = if relative_root.is_empty() {
            ".git".to_string()
        } else {
            format!("{}/.git", relative_root)
        };
        self.add_file(
            &format!("{}/config", git_dir),
            "[core]\n\trepositoryformatversion = 0\n\tbare = false\n",
        )
        .add_file(&format!("{}/HEAD", git_dir), "ref: refs/heads/main\n")
        .add_file(&format!("{}/info/exclude", git_dir), "")
    }

    pub fn set_exclude(&self, relative_root: &str, content: &str) -> &Self {
        let path = if relative_root.is_empty() {
            ".git/info/exclude".to_string()
        } else {
            format!("{}/.git/info/exclude", relative_root)
        };
        self.add_file(&path, content)
    }
}

impl Default for TestRepo {
    fn default() -> Self {
        Self::new()
    }
}
