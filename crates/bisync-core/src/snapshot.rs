//! Listing snapshots of one side of a sync pair
//!
//! A [`Snapshot`] is the normalized, path-ordered view of a storage tree at
//! one point in time. The [`SnapshotBuilder`] walks a [`Backend`]
//! breadth-first, applying filters and computing checksums with bounded
//! concurrency.

use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};

use bisync_fs::{Backend, DirEntry, EntryKind, RelPath};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::delta::Side;
use crate::filter::FilterSet;
use crate::options::Options;
use crate::{Error, Result};

/// One observed file or directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub path: RelPath,
    pub kind: EntryKind,
    pub size: u64,
    pub modified: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    /// Directory with no children at listing time
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_empty_dir: bool,
}

impl Entry {
    /// A file entry without checksum.
    pub fn file(path: RelPath, size: u64, modified: DateTime<Utc>) -> Self {
        Self {
            path,
            kind: EntryKind::File,
            size,
            modified,
            checksum: None,
            is_empty_dir: false,
        }
    }

    pub fn dir(path: RelPath, modified: DateTime<Utc>) -> Self {
        Self {
            path,
            kind: EntryKind::Dir,
            size: 0,
            modified,
            checksum: None,
            is_empty_dir: false,
        }
    }

    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }

    /// Same entry under another path.
    pub fn moved_to(&self, path: RelPath) -> Self {
        Self {
            path,
            ..self.clone()
        }
    }

    fn from_dir_entry(entry: DirEntry) -> Self {
        Self {
            path: entry.path,
            kind: entry.kind,
            size: entry.size,
            modified: entry.modified,
            checksum: None,
            is_empty_dir: false,
        }
    }
}

/// Path-ordered set of entries for one side
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    entries: BTreeMap<RelPath, Entry>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a list of entries, rejecting duplicate paths.
    pub fn from_entries(entries: impl IntoIterator<Item = Entry>) -> std::result::Result<Self, RelPath> {
        let mut snapshot = Self::new();
        for entry in entries {
            let path = entry.path.clone();
            if snapshot.entries.insert(path.clone(), entry).is_some() {
                return Err(path);
            }
        }
        Ok(snapshot)
    }

    pub fn get(&self, path: &RelPath) -> Option<&Entry> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &RelPath) -> bool {
        self.entries.contains_key(path)
    }

    /// Insert or replace the entry at its path.
    pub fn insert(&mut self, entry: Entry) -> Option<Entry> {
        self.entries.insert(entry.path.clone(), entry)
    }

    pub fn remove(&mut self, path: &RelPath) -> Option<Entry> {
        self.entries.remove(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &RelPath> {
        self.entries.keys()
    }

    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values()
    }

    /// Entries strictly below `dir`, in path order.
    pub fn descendants<'s>(&'s self, dir: &'s RelPath) -> impl Iterator<Item = &'s Entry> + 's {
        // Every `dir/...` key sorts between `dir` and `dir0`
        let upper = if dir.is_root() { Unbounded } else { Excluded(dir.with_suffix("0")) };
        self.entries
            .range((Excluded(dir.clone()), upper))
            .map(|(_, entry)| entry)
            .filter(move |entry| entry.path.is_inside(dir))
    }
}

/// Builds snapshots from a backend.
pub struct SnapshotBuilder<'a> {
    options: &'a Options,
    filters: &'a FilterSet,
}

impl<'a> SnapshotBuilder<'a> {
    pub fn new(options: &'a Options, filters: &'a FilterSet) -> Self {
        Self { options, filters }
    }

    /// List the whole tree behind `backend`.
    ///
    /// Directory levels are listed concurrently up to `checkers` at a time.
    /// Any listing or checksum failure aborts with [`Error::Listing`].
    pub async fn build(&self, side: Side, backend: &dyn Backend) -> Result<Snapshot> {
        let checkers = self.options.checkers.max(1);
        let mut snapshot = Snapshot::new();
        let mut files = Vec::new();
        let mut level = vec![RelPath::root()];

        while !level.is_empty() {
            let listings: Vec<(RelPath, Vec<DirEntry>)> = stream::iter(level.drain(..))
                .map(|dir| async move {
                    let children = backend.list_dir(&dir).await?;
                    Ok::<_, bisync_fs::Error>((dir, children))
                })
                .buffer_unordered(checkers)
                .try_collect()
                .await
                .map_err(|source| Error::Listing { side, source })?;

            for (dir, children) in listings {
                if children.is_empty()
                    && let Some(entry) = snapshot.entries.get_mut(&dir)
                {
                    entry.is_empty_dir = true;
                }

                for child in children {
                    match child.kind {
                        EntryKind::Symlink => {
                            warn!(side = %side, path = %child.path, "Skipping symlink");
                        }
                        EntryKind::Dir => {
                            if !self.filters.is_dir_included(&child.path) {
                                debug!(side = %side, path = %child.path, "Directory excluded by filters");
                                continue;
                            }
                            level.push(child.path.clone());
                            if self.options.create_empty_src_dirs {
                                snapshot.insert(Entry::from_dir_entry(child));
                            }
                        }
                        EntryKind::File => {
                            if self.filters.is_file_included(&child.path) {
                                files.push(Entry::from_dir_entry(child));
                            }
                        }
                    }
                }
            }
        }

        let files = if self.options.uses_checksums() {
            stream::iter(files)
                .map(|mut entry| async move {
                    entry.checksum = Some(backend.hash(&entry.path).await?);
                    Ok::<_, bisync_fs::Error>(entry)
                })
                .buffer_unordered(checkers)
                .try_collect::<Vec<_>>()
                .await
                .map_err(|source| Error::Listing { side, source })?
        } else {
            files
        };

        for entry in files {
            snapshot.insert(entry);
        }

        info!(
            side = %side,
            location = %backend.location(),
            entries = snapshot.len(),
            "Listed"
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bisync_fs::LocalBackend;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn rel(p: &str) -> RelPath {
        RelPath::new(p).unwrap()
    }

    fn tree() -> TempDir {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("docs/old")).unwrap();
        std::fs::create_dir_all(temp.path().join("empty")).unwrap();
        std::fs::write(temp.path().join("a.txt"), "alpha").unwrap();
        std::fs::write(temp.path().join("docs/b.md"), "bravo").unwrap();
        std::fs::write(temp.path().join("docs/old/c.log"), "charlie").unwrap();
        temp
    }

    #[tokio::test]
    async fn build_lists_files_with_checksums() {
        let temp = tree();
        let backend = LocalBackend::new(temp.path());
        let options = Options::default();
        let filters = FilterSet::default();

        let snapshot = SnapshotBuilder::new(&options, &filters)
            .build(Side::Path1, &backend)
            .await
            .unwrap();

        let paths: Vec<_> = snapshot.paths().map(|p| p.to_string()).collect();
        assert_eq!(paths, vec!["a.txt", "docs/b.md", "docs/old/c.log"]);
        let a = snapshot.get(&rel("a.txt")).unwrap();
        assert_eq!(a.size, 5);
        assert!(a.checksum.as_deref().unwrap().starts_with("sha256:"));
    }

    #[tokio::test]
    async fn build_includes_dirs_when_enabled() {
        let temp = tree();
        let backend = LocalBackend::new(temp.path());
        let options = Options {
            create_empty_src_dirs: true,
            ignore_listing_checksum: true,
            ..Options::default()
        };
        let filters = FilterSet::default();

        let snapshot = SnapshotBuilder::new(&options, &filters)
            .build(Side::Path2, &backend)
            .await
            .unwrap();

        let empty = snapshot.get(&rel("empty")).unwrap();
        assert!(empty.is_dir());
        assert!(empty.is_empty_dir);
        assert!(!snapshot.get(&rel("docs")).unwrap().is_empty_dir);
        assert!(snapshot.get(&rel("a.txt")).unwrap().checksum.is_none());
    }

    #[tokio::test]
    async fn build_applies_filters() {
        let temp = tree();
        let backend = LocalBackend::new(temp.path());
        let options = Options::default();
        let filters = FilterSet::parse("- *.md\n- /docs/old/\n").unwrap();

        let snapshot = SnapshotBuilder::new(&options, &filters)
            .build(Side::Path1, &backend)
            .await
            .unwrap();

        let paths: Vec<_> = snapshot.paths().map(|p| p.to_string()).collect();
        assert_eq!(paths, vec!["a.txt"]);
    }

    #[tokio::test]
    async fn build_fails_for_missing_root() {
        let temp = TempDir::new().unwrap();
        let backend = LocalBackend::new(temp.path().join("gone"));
        let options = Options::default();
        let filters = FilterSet::default();

        let err = SnapshotBuilder::new(&options, &filters)
            .build(Side::Path2, &backend)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Listing { side: Side::Path2, .. }));
    }

    #[test]
    fn from_entries_rejects_duplicates() {
        let now = Utc::now();
        let dup = Snapshot::from_entries(vec![
            Entry::file(rel("x"), 1, now),
            Entry::file(rel("x"), 2, now),
        ]);
        assert_eq!(dup.unwrap_err(), rel("x"));
    }

    #[test]
    fn descendants_skip_siblings_sharing_a_prefix() {
        let now = Utc::now();
        let snapshot = Snapshot::from_entries(vec![
            Entry::dir(rel("a"), now),
            Entry::file(rel("a-b.txt"), 1, now),
            Entry::file(rel("a.txt"), 1, now),
            Entry::file(rel("a/b.txt"), 1, now),
            Entry::file(rel("a/c/d.txt"), 1, now),
            Entry::file(rel("ab/e.txt"), 1, now),
            Entry::dir(rel("c"), now),
        ])
        .unwrap();
        let dir = rel("a");
        let below: Vec<&str> = snapshot.descendants(&dir).map(|e| e.path.as_str()).collect();
        assert_eq!(below, vec!["a/b.txt", "a/c/d.txt"]);
        assert_eq!(snapshot.descendants(&rel("c")).count(), 0);
        assert_eq!(snapshot.descendants(&RelPath::root()).count(), 7);
    }
}
