//! Relative path handling shared by both sides of a sync pair

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A path relative to a backend root, normalized to forward slashes.
///
/// The empty path denotes the root itself. Paths never start or end with a
/// slash and never contain `.` or `..` components, so the same `RelPath`
/// names the same entry on both sides regardless of platform.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RelPath {
    inner: String,
}

impl RelPath {
    /// Parse and normalize a relative path.
    ///
    /// Backslashes become forward slashes, empty and `.` components are
    /// dropped. Absolute paths and `..` components are rejected.
    pub fn new(path: impl AsRef<str>) -> Result<Self> {
        let raw = path.as_ref();
        let normalized = raw.replace('\\', "/");

        if normalized.starts_with('/') {
            return Err(Error::InvalidPath {
                path: raw.to_string(),
                reason: "path must be relative".to_string(),
            });
        }

        let mut parts = Vec::new();
        for component in normalized.split('/') {
            match component {
                "" | "." => continue,
                ".." => {
                    return Err(Error::InvalidPath {
                        path: raw.to_string(),
                        reason: "parent components are not allowed".to_string(),
                    });
                }
                other => parts.push(other),
            }
        }

        Ok(Self {
            inner: parts.join("/"),
        })
    }

    /// The root of a backend.
    pub fn root() -> Self {
        Self {
            inner: String::new(),
        }
    }

    /// Whether this path is the backend root.
    pub fn is_root(&self) -> bool {
        self.inner.is_empty()
    }

    /// Get the internal normalized string representation.
    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// Join a single file name onto this path.
    pub fn join(&self, name: &str) -> Self {
        let name = name.trim_matches('/');
        if self.inner.is_empty() {
            Self {
                inner: name.to_string(),
            }
        } else {
            Self {
                inner: format!("{}/{}", self.inner, name),
            }
        }
    }

    /// Get the parent directory, `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.inner.is_empty() {
            return None;
        }
        match self.inner.rfind('/') {
            Some(idx) => Some(Self {
                inner: self.inner[..idx].to_string(),
            }),
            None => Some(Self::root()),
        }
    }

    /// Get the final component.
    pub fn file_name(&self) -> Option<&str> {
        if self.inner.is_empty() {
            None
        } else {
            self.inner.rsplit('/').next()
        }
    }

    /// Number of components; the root has depth 0.
    pub fn depth(&self) -> usize {
        if self.inner.is_empty() {
            0
        } else {
            self.inner.matches('/').count() + 1
        }
    }

    /// All proper ancestors, nearest first, excluding the root.
    pub fn ancestors(&self) -> Vec<Self> {
        let mut result = Vec::new();
        let mut current = self.parent();
        while let Some(dir) = current {
            if dir.is_root() {
                break;
            }
            current = dir.parent();
            result.push(dir);
        }
        result
    }

    /// Whether this path lies strictly below `dir`.
    pub fn is_inside(&self, dir: &RelPath) -> bool {
        if dir.is_root() {
            return !self.is_root();
        }
        self.inner.len() > dir.inner.len()
            && self.inner.starts_with(&dir.inner)
            && self.inner.as_bytes()[dir.inner.len()] == b'/'
    }

    /// Append a suffix to the final component (`a/b.txt` -> `a/b.txt.sfx`).
    pub fn with_suffix(&self, suffix: &str) -> Self {
        Self {
            inner: format!("{}{}", self.inner, suffix),
        }
    }

    /// Resolve against a native root directory.
    pub fn to_native(&self, root: &Path) -> PathBuf {
        if self.inner.is_empty() {
            return root.to_path_buf();
        }
        self.inner
            .split('/')
            .fold(root.to_path_buf(), |acc, part| acc.join(part))
    }
}

impl fmt::Display for RelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.inner.is_empty() {
            write!(f, ".")
        } else {
            write!(f, "{}", self.inner)
        }
    }
}

impl TryFrom<String> for RelPath {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<&str> for RelPath {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl From<RelPath> for String {
    fn from(p: RelPath) -> Self {
        p.inner
    }
}

impl AsRef<str> for RelPath {
    fn as_ref(&self) -> &str {
        &self.inner
    }
}
