//! Cascading `.gitignore` / exclude-file resolution
//!
//! Each `.gitignore` is compiled once into a ruleset and registered as an
//! ignore scope for its directory. Resolution walks the scopes containing a
//! path from the repository root down to the deepest one, so a more specific
//! `.gitignore` can re-include (`!pattern`) something an outer one ignored.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::Match;

use crate::dir_matcher::FastDirectoryMatcher;
use crate::paths::NormalizedPath;

/// Outcome of testing one path against one ruleset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuleVerdict {
    /// The last matching rule was an ignore rule
    pub ignored: bool,
    /// The last matching rule was a negated (`!`) rule
    pub unignored: bool,
}

impl RuleVerdict {
    /// Fold this scope's verdict into the verdict inherited from outer scopes.
    ///
    /// An inherited "ignored" survives unless this scope explicitly
    /// re-includes the path; otherwise this scope decides on its own.
    pub fn combine(self, inherited_ignored: bool) -> bool {
        if inherited_ignored {
            !self.unignored
        } else {
            self.ignored
        }
    }
}

/// One compiled `.gitignore` (or exclude file)
#[derive(Debug, Clone)]
pub struct IgnoreRuleset {
    rules: Gitignore,
}

impl IgnoreRuleset {
    /// Compile `content` with `root` as the anchor for `/`-prefixed patterns.
    ///
    /// Invalid lines are skipped rather than failing the whole file.
    pub fn compile(root: &Path, content: &str) -> Self {
        let mut builder = GitignoreBuilder::new(root);
        for line in content.lines() {
            if let Err(err) = builder.add_line(None, line) {
                tracing::debug!(
                    "[GitIgnoreManager] Skipping invalid pattern {:?} under {}: {}",
                    line,
                    root.display(),
                    err
                );
            }
        }
        let rules = builder.build().unwrap_or_else(|err| {
            tracing::warn!(
                "[GitIgnoreManager] Could not compile ignore rules under {}: {}",
                root.display(),
                err
            );
            Gitignore::empty()
        });
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Test a path relative to this ruleset's root.
    ///
    /// Parent directories are checked first: once a parent directory is
    /// ignored nothing below it can be re-included by this ruleset.
    pub fn test(&self, relative: &Path, is_dir: bool) -> RuleVerdict {
        if self.rules.is_empty() {
            return RuleVerdict::default();
        }
        let components: Vec<Component<'_>> = relative.components().collect();
        if components.is_empty() {
            return RuleVerdict::default();
        }

        let mut prefix = PathBuf::new();
        for component in &components[..components.len() - 1] {
            prefix.push(component.as_os_str());
            if self.rules.matched(&prefix, true).is_ignore() {
                return RuleVerdict {
                    ignored: true,
                    unignored: false,
                };
            }
        }

        match self.rules.matched(relative, is_dir) {
            Match::Ignore(_) => RuleVerdict {
                ignored: true,
                unignored: false,
            },
            Match::Whitelist(_) => RuleVerdict {
                ignored: false,
                unignored: true,
            },
            Match::None => RuleVerdict::default(),
        }
    }
}

/// Git-compatible ignore resolution for one working tree.
///
/// The manager is stateful: it only knows about the `.gitignore` files that
/// have been added. Build a fresh one whenever the set of ignore files changes.
#[derive(Debug)]
pub struct GitIgnoreManager {
    root: NormalizedPath,
    matcher: FastDirectoryMatcher,
    scopes: HashMap<NormalizedPath, IgnoreRuleset>,
    exclude: Option<IgnoreRuleset>,
}

impl GitIgnoreManager {
    pub fn new(root: NormalizedPath) -> Self {
        Self {
            root,
            matcher: FastDirectoryMatcher::new(),
            scopes: HashMap::new(),
            exclude: None,
        }
    }

    pub fn root(&self) -> &NormalizedPath {
        &self.root
    }

    /// Register the repository-wide exclude file (`.git/info/exclude`).
    pub fn add_exclude_file(&mut self, content: &str) {
        self.exclude = Some(IgnoreRuleset::compile(self.root.as_path(), content));
    }

    /// Register a `.gitignore`; its directory becomes an ignore scope.
    pub fn add_gitignore(&mut self, gitignore: &NormalizedPath, content: &str) {
        let Some(scope) = gitignore.parent() else {
            return;
        };
        let ruleset = IgnoreRuleset::compile(scope.as_path(), content);
        self.matcher.add_file_to_match(gitignore);
        self.scopes.insert(scope, ruleset);
    }

    /// Number of registered `.gitignore` scopes
    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    /// Whether git would ignore `path`.
    ///
    /// A `.git` entry is always ignored and the repository root never is.
    /// Otherwise the exclude file seeds the verdict and every ignore scope
    /// containing the path refines it, outermost first.
    pub fn is_ignored(&self, path: &NormalizedPath) -> bool {
        if path.file_name() == Some(".git") {
            return true;
        }
        if path == &self.root {
            return false;
        }

        let mut ignored = match (&self.exclude, path.relative_to(&self.root)) {
            (Some(exclude), Some(relative)) => exclude.test(&relative, false).ignored,
            _ => false,
        };

        for scope in self.matcher.find_matching_directories(path) {
            let Some(ruleset) = self.scopes.get(&scope) else {
                continue;
            };
            let Some(relative) = path.relative_to(&scope) else {
                continue;
            };
            if relative.as_os_str().is_empty() {
                continue;
            }
            ignored = ruleset.test(&relative, false).combine(ignored);
        }

        ignored
    }

    pub fn dispose(&mut self) {
        self.matcher.dispose();
        self.scopes.clear();
        self.exclude = None;
    }
}
