//! Storage backend abstraction
//!
//! The reconciliation engine never touches storage directly. It lists,
//! hashes, copies and removes entries through the [`Backend`] trait, so a
//! sync pair can mix local directories with any other store that can
//! implement these primitives.

mod local;

pub use local::LocalBackend;
pub use crate::io::PARTIAL_SUFFIX;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{RelPath, Result};

/// Kind of a listed entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Dir => write!(f, "dir"),
            Self::Symlink => write!(f, "symlink"),
        }
    }
}

/// One entry returned by a single-level directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Path relative to the backend root
    pub path: RelPath,
    pub kind: EntryKind,
    /// Size in bytes (0 for directories)
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// Storage primitives required by the reconciliation engine.
///
/// Implementations carry their own timeout and retry semantics; the engine
/// treats any error returned here as terminal for that operation.
#[async_trait]
pub trait Backend: Send + Sync + fmt::Debug {
    /// Human-readable location, also used to key persisted state.
    fn location(&self) -> String;

    /// List the immediate children of `dir`.
    async fn list_dir(&self, dir: &RelPath) -> Result<Vec<DirEntry>>;

    /// Content checksum in the canonical `sha256:<hex>` form.
    async fn hash(&self, path: &RelPath) -> Result<String>;

    /// Read a whole file.
    async fn read(&self, path: &RelPath) -> Result<Vec<u8>>;

    /// Replace `path` with `data`, creating parents as needed and stamping
    /// `modified`. Readers must never observe a partially written file.
    async fn write(&self, path: &RelPath, data: Vec<u8>, modified: DateTime<Utc>) -> Result<()>;

    /// Remove a file.
    async fn delete(&self, path: &RelPath) -> Result<()>;

    /// Move a file within this backend, creating parents as needed.
    async fn rename(&self, from: &RelPath, to: &RelPath) -> Result<()>;

    /// Create a directory and any missing parents.
    async fn mkdir(&self, path: &RelPath) -> Result<()>;

    /// Remove a directory if it is empty. Returns `false` when it still has
    /// children and was left in place.
    async fn rmdir(&self, path: &RelPath) -> Result<bool>;
}
