//! Normalized path keys for repository state
//!
//! Every map in this crate is keyed by [`NormalizedPath`] so that the same
//! location always produces the same key, no matter whether it arrived as a
//! `file://` URI, a path with a trailing separator, or a path containing `.`
//! and `..` segments.

use std::ffi::OsStr;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A lexically normalized filesystem path with value equality.
///
/// Normalization never touches the filesystem: `.` segments are dropped,
/// `..` segments pop their parent, repeated and trailing separators vanish.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "PathBuf", into = "PathBuf")]
pub struct NormalizedPath(PathBuf);

impl NormalizedPath {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self(normalize_lexically(path.as_ref()))
    }

    /// Parse either a `file://` URI or a plain path.
    ///
    /// URI forms are percent-decoded; anything without a `file://` scheme is
    /// taken as a path verbatim.
    pub fn from_uri(uri: &str) -> Self {
        match uri.strip_prefix("file://") {
            Some(rest) => {
                let decoded = percent_decode(rest);
                // file:///C:/foo on Windows
                #[cfg(windows)]
                let decoded = match decoded.strip_prefix('/') {
                    Some(stripped) if stripped.as_bytes().get(1) == Some(&b':') => {
                        stripped.to_string()
                    }
                    _ => decoded,
                };
                Self::new(decoded)
            }
            None => Self::new(uri),
        }
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn join(&self, relative: impl AsRef<Path>) -> Self {
        Self::new(self.0.join(relative))
    }

    pub fn parent(&self) -> Option<Self> {
        self.0.parent().map(|p| Self(p.to_path_buf()))
    }

    pub fn file_name(&self) -> Option<&str> {
        self.0.file_name().and_then(OsStr::to_str)
    }

    /// Path segments used as trie keys (root and prefix included)
    pub fn segments(&self) -> impl Iterator<Item = &OsStr> {
        self.0.components().map(Component::as_os_str)
    }

    /// Component-wise prefix test; `/a/src` does not contain `/a/src2`.
    pub fn starts_with(&self, base: &NormalizedPath) -> bool {
        self.0.starts_with(&base.0)
    }

    /// Relative path from `base` to `self`, if `self` lives under `base`.
    ///
    /// Returns an empty path when both are equal.
    pub fn relative_to(&self, base: &NormalizedPath) -> Option<PathBuf> {
        self.0.strip_prefix(&base.0).ok().map(Path::to_path_buf)
    }

    /// Whether any component of this path equals `name`
    pub fn has_component(&self, name: &str) -> bool {
        self.0
            .components()
            .any(|c| matches!(c, Component::Normal(n) if n == OsStr::new(name)))
    }
}

/// A root folder the service tracks repositories in
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkspaceFolder {
    pub uri: NormalizedPath,
    pub name: String,
}

impl WorkspaceFolder {
    /// Folder named after its last path segment
    pub fn new(uri: impl Into<NormalizedPath>) -> Self {
        let uri = uri.into();
        let name = uri.file_name().unwrap_or_default().to_string();
        Self { uri, name }
    }
}

impl fmt::Display for NormalizedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl AsRef<Path> for NormalizedPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl From<PathBuf> for NormalizedPath {
    fn from(path: PathBuf) -> Self {
        Self::new(path)
    }
}

impl From<&Path> for NormalizedPath {
    fn from(path: &Path) -> Self {
        Self::new(path)
    }
}

impl From<&str> for NormalizedPath {
    fn from(s: &str) -> Self {
        Self::from_uri(s)
    }
}

impl From<NormalizedPath> for PathBuf {
    fn from(path: NormalizedPath) -> Self {
        path.0
    }
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(out.components().next_back(), Some(Component::Normal(_)))
                    && out.pop();
                if !popped && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}
