//! Local filesystem backend

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;
use tracing::debug;

use super::{Backend, DirEntry, EntryKind};
use crate::io::{self, PARTIAL_SUFFIX};
use crate::{Error, RelPath, Result, checksum};

/// Backend over a plain directory.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    /// Create a backend rooted at `root`.
    ///
    /// The root is canonicalized when it exists so that two spellings of
    /// the same directory key to the same persisted state. A missing root
    /// is accepted here and surfaces as a listing error later.
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        let root = dunce::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
        Self { root }
    }

    /// The native root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn native(&self, path: &RelPath) -> PathBuf {
        path.to_native(&self.root)
    }
}

fn to_utc(time: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(time)
}

#[async_trait]
impl Backend for LocalBackend {
    fn location(&self) -> String {
        self.root.to_string_lossy().to_string()
    }

    async fn list_dir(&self, dir: &RelPath) -> Result<Vec<DirEntry>> {
        let native_dir = self.native(dir);
        let mut reader = fs::read_dir(&native_dir)
            .await
            .map_err(|e| Error::io(&native_dir, e))?;

        let mut entries = Vec::new();
        while let Some(item) = reader
            .next_entry()
            .await
            .map_err(|e| Error::io(&native_dir, e))?
        {
            let name = item.file_name().to_string_lossy().to_string();
            if name.ends_with(PARTIAL_SUFFIX) {
                continue;
            }

            let item_path = item.path();
            let meta = fs::symlink_metadata(&item_path)
                .await
                .map_err(|e| Error::io(&item_path, e))?;
            let file_type = meta.file_type();
            let kind = if file_type.is_symlink() {
                EntryKind::Symlink
            } else if file_type.is_dir() {
                EntryKind::Dir
            } else {
                EntryKind::File
            };
            let modified = meta
                .modified()
                .map(to_utc)
                .map_err(|e| Error::io(&item_path, e))?;

            entries.push(DirEntry {
                path: dir.join(&name),
                kind,
                size: if kind == EntryKind::File { meta.len() } else { 0 },
                modified,
            });
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    async fn hash(&self, path: &RelPath) -> Result<String> {
        let native = self.native(path);
        tokio::task::spawn_blocking(move || {
            checksum::compute_file_checksum(&native).map_err(|e| Error::io(&native, e))
        })
        .await?
    }

    async fn read(&self, path: &RelPath) -> Result<Vec<u8>> {
        let native = self.native(path);
        fs::read(&native).await.map_err(|e| Error::io(&native, e))
    }

    async fn write(&self, path: &RelPath, data: Vec<u8>, modified: DateTime<Utc>) -> Result<()> {
        let native = self.native(path);
        debug!(path = %native.display(), bytes = data.len(), "Writing file");
        let stamp = SystemTime::from(modified);
        tokio::task::spawn_blocking(move || io::write_atomic(&native, &data, Some(stamp))).await?
    }

    async fn delete(&self, path: &RelPath) -> Result<()> {
        let native = self.native(path);
        fs::remove_file(&native)
            .await
            .map_err(|e| Error::io(&native, e))
    }

    async fn rename(&self, from: &RelPath, to: &RelPath) -> Result<()> {
        let source = self.native(from);
        let target = self.native(to);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io(parent, e))?;
        }
        fs::rename(&source, &target)
            .await
            .map_err(|e| Error::io(&source, e))
    }

    async fn mkdir(&self, path: &RelPath) -> Result<()> {
        let native = self.native(path);
        fs::create_dir_all(&native)
            .await
            .map_err(|e| Error::io(&native, e))
    }

    async fn rmdir(&self, path: &RelPath) -> Result<bool> {
        let native = self.native(path);
        let mut reader = fs::read_dir(&native)
            .await
            .map_err(|e| Error::io(&native, e))?;
        if reader
            .next_entry()
            .await
            .map_err(|e| Error::io(&native, e))?
            .is_some()
        {
            return Ok(false);
        }
        fs::remove_dir(&native)
            .await
            .map_err(|e| Error::io(&native, e))?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn rel(p: &str) -> RelPath {
        RelPath::new(p).unwrap()
    }

    #[tokio::test]
    async fn list_dir_reports_kinds_and_skips_partials() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.txt"), "hello").unwrap();
        std::fs::create_dir(temp.path().join("sub")).unwrap();
        std::fs::write(temp.path().join(".a.txt.1.bisync-partial"), "x").unwrap();

        let backend = LocalBackend::new(temp.path());
        let entries = backend.list_dir(&RelPath::root()).await.unwrap();

        let summary: Vec<_> = entries
            .iter()
            .map(|e| (e.path.to_string(), e.kind, e.size))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("a.txt".to_string(), EntryKind::File, 5),
                ("sub".to_string(), EntryKind::Dir, 0),
            ]
        );
    }

    #[tokio::test]
    async fn write_preserves_modification_time() {
        let temp = TempDir::new().unwrap();
        let backend = LocalBackend::new(temp.path());
        let when = DateTime::parse_from_rfc3339("2021-03-04T05:06:07Z")
            .unwrap()
            .with_timezone(&Utc);

        backend
            .write(&rel("deep/dir/f.txt"), b"data".to_vec(), when)
            .await
            .unwrap();

        let entries = backend.list_dir(&rel("deep/dir")).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].modified, when);
        assert_eq!(backend.read(&rel("deep/dir/f.txt")).await.unwrap(), b"data");
    }

    #[tokio::test]
    async fn rmdir_leaves_non_empty_directory() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("d/inner")).unwrap();
        let backend = LocalBackend::new(temp.path());

        assert!(!backend.rmdir(&rel("d")).await.unwrap());
        assert!(backend.rmdir(&rel("d/inner")).await.unwrap());
        assert!(backend.rmdir(&rel("d")).await.unwrap());
        assert!(!temp.path().join("d").exists());
    }

    #[tokio::test]
    async fn delete_missing_file_is_not_found() {
        let temp = TempDir::new().unwrap();
        let backend = LocalBackend::new(temp.path());
        let err = backend.delete(&rel("ghost.txt")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn listing_missing_root_fails() {
        let temp = TempDir::new().unwrap();
        let backend = LocalBackend::new(temp.path().join("absent"));
        assert!(backend.list_dir(&RelPath::root()).await.is_err());
    }
}
