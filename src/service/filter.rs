//! Denylist for incremental events
//!
//! Paths inside any directory named by a skip pattern are dropped before they
//! reach a repository. Patterns are directory names or short relative paths
//! (`node_modules`, `.git/objects`) matched at any depth, which compiles to
//! one `**/<pattern>/**` gitignore line each.

use std::path::{Component, PathBuf};

use crate::git::gitignore::IgnoreRuleset;
use crate::paths::NormalizedPath;

/// Directories whose contents never matter for repository state
pub const DEFAULT_SKIP_PATTERNS: &[&str] = &[
    ".git/lfs",
    ".git/logs",
    ".git/objects",
    "node_modules",
    "dist",
    ".bundle",
    ".idea",
    ".vscode",
    "__pycache__",
    ".mypy_cache",
    ".pytest_cache",
    ".tox",
    ".venv",
];

#[derive(Debug, Clone)]
pub struct SkipFilter {
    rules: IgnoreRuleset,
}

impl SkipFilter {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        let content: String = patterns
            .iter()
            .map(|p| p.as_ref().trim_matches('/'))
            .filter(|p| !p.is_empty())
            .map(|p| format!("**/{}/**\n", p))
            .collect();
        Self {
            rules: IgnoreRuleset::compile(&PathBuf::from("/"), &content),
        }
    }

    /// Whether events for `path` should be dropped
    pub fn should_skip(&self, path: &NormalizedPath) -> bool {
        let relative: PathBuf = path
            .as_path()
            .components()
            .filter(|c| matches!(c, Component::Normal(_)))
            .collect();
        self.rules.test(&relative, false).ignored
    }
}

impl Default for SkipFilter {
    fn default() -> Self {
        Self::new(DEFAULT_SKIP_PATTERNS)
    }
}
