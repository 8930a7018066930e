//! Path-segment trie for ancestor-directory lookup
//!
//! [`FastDirectoryMatcher`] answers "which registered directories contain
//! this path" in O(path depth), independent of how many directories are
//! registered. It backs both the ignore-scope lookup in
//! [`GitIgnoreManager`](crate::git::GitIgnoreManager) and the repository-root
//! lookup in [`RepositoryService`](crate::service::RepositoryService).

use std::collections::HashMap;
use std::ffi::OsString;

use crate::paths::NormalizedPath;

#[derive(Debug, Default)]
struct TrieNode {
    children: HashMap<OsString, TrieNode>,
    dir_to_match: Option<NormalizedPath>,
}

/// Trie of registered directories keyed by path segment.
///
/// There is no partial removal; [`dispose`](Self::dispose) resets everything.
#[derive(Debug, Default)]
pub struct FastDirectoryMatcher {
    root: TrieNode,
    len: usize,
}

impl FastDirectoryMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the directory containing `file` (used for `.gitignore` files,
    /// whose parent directory becomes an ignore scope).
    pub fn add_file_to_match(&mut self, file: &NormalizedPath) {
        if let Some(dir) = file.parent() {
            self.add_path(dir);
        }
    }

    /// Register `dir` itself (used for repository roots).
    pub fn add_directory_to_match(&mut self, dir: &NormalizedPath) {
        self.add_path(dir.clone());
    }

    fn add_path(&mut self, dir: NormalizedPath) {
        let mut node = &mut self.root;
        for segment in dir.segments() {
            node = node.children.entry(segment.to_os_string()).or_default();
        }
        if node.dir_to_match.is_none() {
            self.len += 1;
        }
        node.dir_to_match = Some(dir);
    }

    /// Every registered ancestor of `path` (including `path` itself when it is
    /// registered), ordered from least to most specific.
    ///
    /// The walk stops at the first segment with no trie node, so a path
    /// outside every registered tree yields an empty list.
    pub fn find_matching_directories(&self, path: &NormalizedPath) -> Vec<NormalizedPath> {
        let mut matches = Vec::new();
        let mut node = &self.root;
        for segment in path.segments() {
            match node.children.get(segment) {
                Some(child) => node = child,
                None => break,
            }
            if let Some(dir) = &node.dir_to_match {
                matches.push(dir.clone());
            }
        }
        matches
    }

    /// The most specific registered ancestor of `path`
    pub fn find_deepest(&self, path: &NormalizedPath) -> Option<NormalizedPath> {
        self.find_matching_directories(path).pop()
    }

    /// Number of registered directories
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Drop every registered directory.
    pub fn dispose(&mut self) {
        self.root = TrieNode::default();
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> NormalizedPath {
        NormalizedPath::new(s)
    }

    fn matcher_with_gitignores() -> FastDirectoryMatcher {
        let mut matcher = FastDirectoryMatcher::new();
        for gitignore in [
            "/home/user/project/.gitignore",
            "/home/user/project/src/.gitignore",
            "/home/user/project/src/components/.gitignore",
            "/home/user/project/src/utils/.gitignore",
            "/home/user/project/tests/unit/.gitignore",
            "/home/user/project/docs/.gitignore",
            "/home/user/project/docs/api/.gitignore",
            "/home/user/project/third-party/lib1/.gitignore",
        ] {
            matcher.add_file_to_match(&p(gitignore));
        }
        matcher
    }

    #[test]
    fn test_root_match_for_file_in_project_root() {
        let matcher = matcher_with_gitignores();
        assert_eq!(
            matcher.find_matching_directories(&p("/home/user/project/somefile.txt")),
            vec![p("/home/user/project")]
        );
    }

    #[test]
    fn test_nested_matches_ordered_shallow_to_deep() {
        let matcher = matcher_with_gitignores();
        assert_eq!(
            matcher.find_matching_directories(&p("/home/user/project/docs/api/some_file.ts")),
            vec![
                p("/home/user/project"),
                p("/home/user/project/docs"),
                p("/home/user/project/docs/api"),
            ]
        );
    }

    #[test]
    fn test_unregistered_intermediate_directory_is_skipped() {
        let matcher = matcher_with_gitignores();
        // `tests` itself has no .gitignore, only `tests/unit` does
        assert_eq!(
            matcher.find_matching_directories(&p("/home/user/project/tests/unit/a_test.rs")),
            vec![p("/home/user/project"), p("/home/user/project/tests/unit")]
        );
        assert_eq!(
            matcher.find_matching_directories(&p("/home/user/project/third-party/x.js")),
            vec![p("/home/user/project")]
        );
    }

    #[test]
    fn test_path_outside_registered_trees_is_empty() {
        let matcher = matcher_with_gitignores();
        assert!(matcher
            .find_matching_directories(&p("/home/user/other-project/file.txt"))
            .is_empty());
    }

    #[test]
    fn test_directory_query_includes_itself() {
        let matcher = matcher_with_gitignores();
        assert_eq!(
            matcher.find_matching_directories(&p("/home/user/project")),
            vec![p("/home/user/project")]
        );
    }

    #[test]
    fn test_matches_form_prefix_chain() {
        let matcher = matcher_with_gitignores();
        let target = p("/home/user/project/src/components/Button/index.tsx");
        let matches = matcher.find_matching_directories(&target);
        assert_eq!(matches.len(), 3);
        for window in matches.windows(2) {
            assert!(window[1].starts_with(&window[0]));
            assert_ne!(window[0], window[1]);
        }
        assert!(matches.iter().all(|m| target.starts_with(m)));
    }

    #[test]
    fn test_directories_for_nested_repositories() {
        let mut matcher = FastDirectoryMatcher::new();
        matcher.add_directory_to_match(&p("/a"));
        matcher.add_directory_to_match(&p("/a/b"));
        assert_eq!(matcher.find_deepest(&p("/a/b/c/file")), Some(p("/a/b")));
        assert_eq!(matcher.find_deepest(&p("/a/c/file")), Some(p("/a")));
        assert_eq!(matcher.find_deepest(&p("/z/file")), None);
        assert_eq!(matcher.len(), 2);
    }

    #[test]
    fn test_sibling_prefix_is_not_a_match() {
        let mut matcher = FastDirectoryMatcher::new();
        matcher.add_directory_to_match(&p("/work/repo"));
        assert!(matcher
            .find_matching_directories(&p("/work/repo-two/file"))
            .is_empty());
    }

    #[test]
    fn test_dispose_clears_everything() {
        let mut matcher = matcher_with_gitignores();
        assert!(!matcher.is_empty());
        matcher.dispose();
        assert!(matcher.is_empty());
        assert!(matcher
            .find_matching_directories(&p("/home/user/project/somefile.txt"))
            .is_empty());
    }
}
