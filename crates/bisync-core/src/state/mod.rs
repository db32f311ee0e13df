//! Persistent state of a sync pair
//!
//! Everything lives in one work directory, keyed by the pair:
//!
//! ```text
//! <key>.path1.json        baseline listing of path1
//! <key>.path2.json        baseline listing of path2
//! <key>.state.toml        status, resync marker, filters checksum
//! <key>.lck               run lock
//! <key>.journal.jsonl     plan and step outcomes of the current run
//! <key>.path1.prev.json   previous baselines (kept with no_cleanup)
//! ```
//!
//! Every file is replaced with write-to-temp-then-rename. The meta file is
//! written last, so a crash between files leaves the old meta in place.

mod journal;
mod lock;

pub use journal::{Journal, JournalContents, JournalRecord};
pub use lock::{LockInfo, RunLock};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bisync_fs::io::write_atomic;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::delta::Side;
use crate::plan::Plan;
use crate::snapshot::{Entry, Snapshot};
use crate::{Error, Result};

/// On-disk format version of listings and meta
pub const STATE_VERSION: u32 = 1;

const MAX_KEY_LEN: usize = 120;

/// Whether the last run finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    #[default]
    Clean,
    /// A run started executing and did not finish
    Dirty,
}

/// Contents of `<key>.state.toml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateMeta {
    pub version: u32,
    pub status: RunStatus,
    #[serde(default)]
    pub needs_resync: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters_checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_success: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_id: Option<String>,
    pub path1: String,
    pub path2: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ListingFile {
    version: u32,
    entries: Vec<Entry>,
}

/// Everything `load` found on disk
#[derive(Debug, Clone, Default)]
pub struct LoadedState {
    pub prior1: Option<Snapshot>,
    pub prior2: Option<Snapshot>,
    pub meta: Option<StateMeta>,
    /// Another run holds the lock right now; a lock taken through this
    /// store does not count
    pub lock_held: bool,
}

impl LoadedState {
    /// Both baseline listings are present.
    pub fn baseline(&self) -> Option<(&Snapshot, &Snapshot)> {
        match (&self.prior1, &self.prior2) {
            (Some(a), Some(b)) => Some((a, b)),
            _ => None,
        }
    }

    /// The previous run was interrupted while executing.
    pub fn needs_recovery(&self) -> bool {
        self.meta.as_ref().is_some_and(|m| m.status == RunStatus::Dirty)
    }

    pub fn needs_resync(&self) -> bool {
        self.meta.as_ref().is_some_and(|m| m.needs_resync)
    }

    pub fn filters_checksum(&self) -> Option<&str> {
        self.meta.as_ref().and_then(|m| m.filters_checksum.as_deref())
    }
}

/// State files of one sync pair
#[derive(Debug, Clone)]
pub struct StateStore {
    workdir: PathBuf,
    key: String,
    path1: String,
    path2: String,
    /// Set while a lock taken through this store is alive
    holding: Arc<AtomicBool>,
}

impl StateStore {
    /// Open the store for a pair; `workdir` defaults to the user cache dir.
    pub fn new(workdir: Option<&Path>, path1: &str, path2: &str) -> Result<Self> {
        let workdir = match workdir {
            Some(dir) => dir.to_path_buf(),
            None => dirs::cache_dir()
                .map(|d| d.join("bisync"))
                .ok_or_else(|| Error::config("no user cache directory available; set workdir"))?,
        };

        Ok(Self {
            key: Self::pair_key(path1, path2),
            workdir,
            path1: path1.to_string(),
            path2: path2.to_string(),
            holding: Arc::new(AtomicBool::new(false)),
        })
    }

    /// File-name-safe key for a pair of locations.
    ///
    /// # Example
    ///
    /// ```
    /// use bisync_core::state::StateStore;
    ///
    /// assert_eq!(StateStore::pair_key("/data/a", "/mnt/b"), "_data_a.._mnt_b");
    /// ```
    pub fn pair_key(path1: &str, path2: &str) -> String {
        let sanitize = |s: &str| -> String {
            s.chars()
                .map(|c| {
                    if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                        c
                    } else {
                        '_'
                    }
                })
                .collect()
        };
        let key = format!("{}..{}", sanitize(path1), sanitize(path2));
        if key.len() <= MAX_KEY_LEN {
            return key;
        }

        let digest = Sha256::digest(format!("{}\n{}", path1, path2).as_bytes());
        digest.iter().take(16).map(|b| format!("{:02x}", b)).collect()
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    fn file(&self, suffix: &str) -> PathBuf {
        self.workdir.join(format!("{}.{}", self.key, suffix))
    }

    pub fn listing_path(&self, side: Side) -> PathBuf {
        self.file(&format!("{}.json", side))
    }

    pub fn previous_listing_path(&self, side: Side) -> PathBuf {
        self.file(&format!("{}.prev.json", side))
    }

    pub fn meta_path(&self) -> PathBuf {
        self.file("state.toml")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.file("lck")
    }

    pub fn journal_path(&self) -> PathBuf {
        self.file("journal.jsonl")
    }

    fn corrupt(path: &Path, message: impl Into<String>) -> Error {
        Error::StateCorrupt {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    fn read_listing(&self, side: Side) -> Result<Option<Snapshot>> {
        let path = self.listing_path(side);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let listing: ListingFile =
            serde_json::from_str(&content).map_err(|e| Self::corrupt(&path, e.to_string()))?;
        if listing.version > STATE_VERSION {
            return Err(Self::corrupt(
                &path,
                format!("unsupported listing version {}", listing.version),
            ));
        }
        Snapshot::from_entries(listing.entries)
            .map(Some)
            .map_err(|dup| Self::corrupt(&path, format!("duplicate path {}", dup)))
    }

    fn read_meta(&self) -> Result<Option<StateMeta>> {
        let path = self.meta_path();
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let meta: StateMeta =
            toml::from_str(&content).map_err(|e| Self::corrupt(&path, e.to_string()))?;
        if meta.version > STATE_VERSION {
            return Err(Self::corrupt(
                &path,
                format!("unsupported state version {}", meta.version),
            ));
        }
        Ok(Some(meta))
    }

    fn write_meta(&self, meta: &StateMeta) -> Result<()> {
        write_atomic(&self.meta_path(), toml::to_string_pretty(meta)?.as_bytes(), None)?;
        Ok(())
    }

    fn blank_meta(&self) -> StateMeta {
        StateMeta {
            version: STATE_VERSION,
            status: RunStatus::Clean,
            needs_resync: false,
            filters_checksum: None,
            last_success: None,
            last_run_id: None,
            path1: self.path1.clone(),
            path2: self.path2.clone(),
        }
    }

    fn update_meta(&self, change: impl FnOnce(&mut StateMeta)) -> Result<()> {
        let mut meta = self.read_meta()?.unwrap_or_else(|| self.blank_meta());
        change(&mut meta);
        self.write_meta(&meta)
    }

    /// Load baselines and meta.
    pub fn load(&self) -> Result<LoadedState> {
        let meta = self.read_meta()?;
        let prior1 = self.read_listing(Side::Path1)?;
        let prior2 = self.read_listing(Side::Path2)?;

        if prior1.is_some() != prior2.is_some() {
            let missing = if prior1.is_none() { Side::Path1 } else { Side::Path2 };
            return Err(Self::corrupt(
                &self.listing_path(missing),
                format!("baseline listing for {} is missing", missing),
            ));
        }
        if prior1.is_some() && meta.is_none() {
            return Err(Self::corrupt(&self.meta_path(), "baseline listings exist without a state file"));
        }

        let lock_held = !self.holding.load(Ordering::SeqCst) && RunLock::is_held(&self.lock_path());
        debug!(key = %self.key, baseline = prior1.is_some(), lock_held, "State loaded");
        Ok(LoadedState {
            prior1,
            prior2,
            meta,
            lock_held,
        })
    }

    /// Replace both baselines and mark the pair clean.
    pub fn save(
        &self,
        new1: &Snapshot,
        new2: &Snapshot,
        filters_checksum: Option<&str>,
        run_id: &str,
        keep_previous: bool,
    ) -> Result<()> {
        std::fs::create_dir_all(&self.workdir)?;

        for (side, snapshot) in [(Side::Path1, new1), (Side::Path2, new2)] {
            let path = self.listing_path(side);
            if keep_previous && path.exists() {
                std::fs::copy(&path, self.previous_listing_path(side))?;
            }
            let listing = ListingFile {
                version: STATE_VERSION,
                entries: snapshot.entries().cloned().collect(),
            };
            write_atomic(&path, serde_json::to_string_pretty(&listing)?.as_bytes(), None)?;
        }

        self.update_meta(|meta| {
            meta.version = STATE_VERSION;
            meta.status = RunStatus::Clean;
            meta.needs_resync = false;
            meta.filters_checksum = filters_checksum.map(str::to_string);
            meta.last_success = Some(Utc::now());
            meta.last_run_id = Some(run_id.to_string());
        })?;

        info!(key = %self.key, path1 = new1.len(), path2 = new2.len(), "Baseline saved");
        Ok(())
    }

    /// Take the pair's run lock.
    pub fn acquire_lock(&self) -> Result<RunLock> {
        let lock = RunLock::acquire(&self.lock_path())?;
        self.holding.store(true, Ordering::SeqCst);
        Ok(lock.clearing_on_release(self.holding.clone()))
    }

    /// Record that `run_id` has started modifying the trees.
    pub fn mark_dirty(&self, run_id: &str) -> Result<()> {
        std::fs::create_dir_all(&self.workdir)?;
        self.update_meta(|meta| {
            meta.status = RunStatus::Dirty;
            meta.last_run_id = Some(run_id.to_string());
        })
    }

    /// Record that no run is mid-flight, without touching the baselines.
    pub fn mark_clean(&self) -> Result<()> {
        self.update_meta(|meta| meta.status = RunStatus::Clean)
    }

    /// Require a resync before the next normal run.
    pub fn mark_resync(&self) -> Result<()> {
        std::fs::create_dir_all(&self.workdir)?;
        self.update_meta(|meta| meta.needs_resync = true)
    }

    pub fn clear_resync(&self) -> Result<()> {
        self.update_meta(|meta| meta.needs_resync = false)
    }

    /// Start the journal for a plan about to be executed.
    pub fn begin_journal(&self, run_id: &str, plan: &Plan) -> Result<Journal> {
        std::fs::create_dir_all(&self.workdir)?;
        Journal::create(&self.journal_path(), run_id, plan)
    }

    pub fn load_journal(&self) -> Result<Option<JournalContents>> {
        journal::read(&self.journal_path())
    }

    pub fn clear_journal(&self) -> Result<()> {
        match std::fs::remove_file(self.journal_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
