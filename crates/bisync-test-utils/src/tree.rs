//! [`TestTree`] builder for sync test scenarios.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tempfile::TempDir;

/// Modification time stamped by [`TestTree::write`] unless a test asks
/// for another one. Fixed so that two trees written in the same test
/// compare equal.
pub const BASE_MTIME_SECS: u64 = 1_700_000_000;

/// A temporary directory tree with helpers for setup and assertion.
///
/// # Example
///
/// ```rust,no_run
/// use bisync_test_utils::TestTree;
///
/// let tree = TestTree::new();
/// tree.write("docs/a.txt", "alpha");
/// tree.write_at("docs/b.txt", "bravo", 60);
/// tree.assert_file_contains("docs/a.txt", "alpha");
/// assert_eq!(tree.files(), vec!["docs/a.txt", "docs/b.txt"]);
/// ```
pub struct TestTree {
    temp_dir: TempDir,
}

impl Default for TestTree {
    fn default() -> Self {
        Self::new()
    }
}

impl TestTree {
    /// Create an empty temporary directory.
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().unwrap(),
        }
    }

    /// Root path of the tree.
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Native path of `rel` inside the tree.
    pub fn path(&self, rel: &str) -> PathBuf {
        self.root().join(rel)
    }

    /// Write a file stamped with [`BASE_MTIME_SECS`].
    pub fn write(&self, rel: &str, content: &str) {
        self.write_at(rel, content, 0);
    }

    /// Write a file stamped `offset_secs` after [`BASE_MTIME_SECS`].
    ///
    /// Larger offsets make the file newer, which is what the `newer` and
    /// `older` conflict policies look at.
    pub fn write_at(&self, rel: &str, content: &str, offset_secs: u64) {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content)
            .unwrap_or_else(|e| panic!("TestTree::write_at: cannot write {}: {}", rel, e));
        let mtime = SystemTime::UNIX_EPOCH + Duration::from_secs(BASE_MTIME_SECS + offset_secs);
        fs::File::options()
            .write(true)
            .open(&path)
            .and_then(|f| f.set_modified(mtime))
            .unwrap_or_else(|e| panic!("TestTree::write_at: cannot stamp {}: {}", rel, e));
    }

    /// Create a directory and its parents.
    pub fn mkdir(&self, rel: &str) {
        fs::create_dir_all(self.path(rel)).unwrap();
    }

    /// Remove a file or a whole directory.
    pub fn remove(&self, rel: &str) {
        let path = self.path(rel);
        if path.is_dir() {
            fs::remove_dir_all(&path).unwrap();
        } else {
            fs::remove_file(&path)
                .unwrap_or_else(|e| panic!("TestTree::remove: cannot remove {}: {}", rel, e));
        }
    }

    /// Read a file as UTF-8.
    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.path(rel))
            .unwrap_or_else(|e| panic!("TestTree::read: cannot read {}: {}", rel, e))
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.path(rel).exists()
    }

    /// Relative paths of every file in the tree, sorted, `/`-separated.
    pub fn files(&self) -> Vec<String> {
        let mut out = Vec::new();
        collect(self.root(), self.root(), &mut out, false);
        out.sort();
        out
    }

    /// Relative paths of every directory in the tree, sorted.
    pub fn dirs(&self) -> Vec<String> {
        let mut out = Vec::new();
        collect(self.root(), self.root(), &mut out, true);
        out.sort();
        out
    }

    /// Assert that a file exists.
    pub fn assert_file_exists(&self, rel: &str) {
        assert!(
            self.path(rel).is_file(),
            "Expected file to exist: {} (files present: {:?})",
            rel,
            self.files()
        );
    }

    /// Assert that nothing exists at `rel`.
    pub fn assert_file_not_exists(&self, rel: &str) {
        assert!(
            !self.path(rel).exists(),
            "Expected file to NOT exist: {}",
            rel
        );
    }

    /// Assert that a file exists and holds exactly `expected`.
    pub fn assert_file_contains(&self, rel: &str, expected: &str) {
        self.assert_file_exists(rel);
        let content = self.read(rel);
        assert_eq!(
            content, expected,
            "File {} has unexpected content",
            rel
        );
    }

    /// Assert that two trees hold the same files with the same content.
    pub fn assert_same_files(&self, other: &TestTree) {
        let ours = self.files();
        assert_eq!(ours, other.files(), "Trees list different files");
        for rel in &ours {
            assert_eq!(self.read(rel), other.read(rel), "Trees differ at {}", rel);
        }
    }
}

fn collect(root: &Path, dir: &Path, out: &mut Vec<String>, dirs: bool) {
    for entry in fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        let rel = path
            .strip_prefix(root)
            .unwrap()
            .to_string_lossy()
            .replace('\\', "/");
        if path.is_dir() {
            if dirs {
                out.push(rel);
            }
            collect(root, &path, out, dirs);
        } else if !dirs {
            out.push(rel);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_with_fixed_mtime() {
        let tree = TestTree::new();
        tree.write("a/b.txt", "x");
        let modified = fs::metadata(tree.path("a/b.txt")).unwrap().modified().unwrap();
        assert_eq!(
            modified,
            SystemTime::UNIX_EPOCH + Duration::from_secs(BASE_MTIME_SECS)
        );
        assert_eq!(tree.files(), vec!["a/b.txt"]);
        assert_eq!(tree.dirs(), vec!["a"]);
    }
}
