//! Typed run configuration
//!
//! `Options` is built once by a front end (CLI flags, a `bisync.toml` file
//! or remote-control parameters), validated in a single pass and then
//! passed by reference into every component.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::{Error, Result};

/// Default name of the access-check marker file
pub const DEFAULT_CHECK_FILENAME: &str = "BISYNC_TEST";

/// Default conflict rename tag
pub const DEFAULT_CONFLICT_SUFFIX: &str = "conflict";

/// Policy used to pick a winner between two versions of a path.
///
/// Used both for conflicts during a normal run and for differing files
/// during a resync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// No winner: keep both versions under conflict names
    #[default]
    None,
    Path1,
    Path2,
    /// Later modification time wins
    Newer,
    Older,
    /// Larger size wins
    Larger,
    Smaller,
}

impl ConflictPolicy {
    pub const ALL: [&'static str; 7] =
        ["none", "path1", "path2", "newer", "older", "larger", "smaller"];
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Path1 => "path1",
            Self::Path2 => "path2",
            Self::Newer => "newer",
            Self::Older => "older",
            Self::Larger => "larger",
            Self::Smaller => "smaller",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "" => Ok(Self::None),
            "path1" => Ok(Self::Path1),
            "path2" => Ok(Self::Path2),
            "newer" => Ok(Self::Newer),
            "older" => Ok(Self::Older),
            "larger" => Ok(Self::Larger),
            "smaller" => Ok(Self::Smaller),
            other => Err(format!(
                "invalid policy {:?} (expected one of: {})",
                other,
                Self::ALL.join(", ")
            )),
        }
    }
}

/// What happens to the losing version when a conflict has a winner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictLoser {
    /// Rename the loser with a numbered conflict suffix and keep it on both sides
    #[default]
    Num,
    /// Overwrite the loser with the winner
    Delete,
}

impl FromStr for ConflictLoser {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "num" => Ok(Self::Num),
            "delete" => Ok(Self::Delete),
            other => Err(format!("invalid conflict loser {:?} (expected num or delete)", other)),
        }
    }
}

/// Post-run listing verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckSync {
    #[default]
    True,
    False,
    /// Only compare the stored baselines, do not sync
    Only,
}

impl FromStr for CheckSync {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "true" | "" => Ok(Self::True),
            "false" => Ok(Self::False),
            "only" => Ok(Self::Only),
            other => Err(format!("invalid checkSync {:?} (expected true, false or only)", other)),
        }
    }
}

impl<'de> Deserialize<'de> for CheckSync {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Bool(bool),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Bool(true) => Ok(Self::True),
            Raw::Bool(false) => Ok(Self::False),
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

fn default_max_delete() -> i64 {
    50
}

fn default_check_filename() -> String {
    DEFAULT_CHECK_FILENAME.to_string()
}

fn default_conflict_suffix() -> String {
    DEFAULT_CONFLICT_SUFFIX.to_string()
}

fn default_modify_window_ms() -> u64 {
    1
}

fn default_transfers() -> usize {
    4
}

fn default_checkers() -> usize {
    8
}

/// Options recognized by a reconciliation run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Options {
    /// Plan but do not execute
    pub dry_run: bool,
    /// Abort if more than this percentage of paths would be deleted
    #[serde(default = "default_max_delete")]
    pub max_delete: i64,
    /// Rebuild the baseline from the current trees
    pub resync: bool,
    /// Winner policy for differing files during resync
    pub resync_mode: ConflictPolicy,
    /// Require the marker file on both sides
    pub check_access: bool,
    #[serde(default = "default_check_filename")]
    pub check_filename: String,
    /// Bypass the delete threshold
    pub force: bool,
    pub create_empty_src_dirs: bool,
    pub remove_empty_dirs: bool,
    /// Keep the journal and previous listings after the run
    pub no_cleanup: bool,
    /// Compare by size and modification time only
    pub ignore_listing_checksum: bool,
    /// Continue past per-file errors
    pub resilient: bool,
    /// Finish an interrupted run
    pub recover: bool,
    pub filters_file: Option<PathBuf>,
    pub workdir: Option<PathBuf>,
    pub backup_dir1: Option<String>,
    pub backup_dir2: Option<String>,
    pub conflict_resolve: ConflictPolicy,
    pub conflict_loser: ConflictLoser,
    #[serde(default = "default_conflict_suffix")]
    pub conflict_suffix: String,
    pub check_sync: CheckSync,
    /// Modification times closer than this are considered equal
    #[serde(default = "default_modify_window_ms")]
    pub modify_window_ms: u64,
    /// Concurrent copy/delete operations
    #[serde(default = "default_transfers")]
    pub transfers: usize,
    /// Concurrent listing/checksum operations
    #[serde(default = "default_checkers")]
    pub checkers: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            dry_run: false,
            max_delete: default_max_delete(),
            resync: false,
            resync_mode: ConflictPolicy::None,
            check_access: false,
            check_filename: default_check_filename(),
            force: false,
            create_empty_src_dirs: false,
            remove_empty_dirs: false,
            no_cleanup: false,
            ignore_listing_checksum: false,
            resilient: false,
            recover: false,
            filters_file: None,
            workdir: None,
            backup_dir1: None,
            backup_dir2: None,
            conflict_resolve: ConflictPolicy::None,
            conflict_loser: ConflictLoser::Num,
            conflict_suffix: default_conflict_suffix(),
            check_sync: CheckSync::True,
            modify_window_ms: default_modify_window_ms(),
            transfers: default_transfers(),
            checkers: default_checkers(),
        }
    }
}

impl Options {
    /// Load options from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = bisync_fs::io::read_text(path)?;
        Self::parse(&content)
    }

    /// Parse options from TOML content; unspecified keys take defaults.
    ///
    /// # Example
    ///
    /// ```
    /// use bisync_core::options::{ConflictPolicy, Options};
    ///
    /// let opts = Options::parse(r#"
    /// max_delete = 25
    /// conflict_resolve = "newer"
    /// "#).unwrap();
    ///
    /// assert_eq!(opts.max_delete, 25);
    /// assert_eq!(opts.conflict_resolve, ConflictPolicy::Newer);
    /// ```
    pub fn parse(content: &str) -> Result<Self> {
        let options: Options = toml::from_str(content)?;
        Ok(options)
    }

    /// Check every option and report all problems at once.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if !(0..=100).contains(&self.max_delete) {
            problems.push(format!(
                "maxDelete must be a percentage between 0 and 100, got {}",
                self.max_delete
            ));
        }
        if self.check_filename.trim().is_empty() {
            problems.push("checkFilename must not be empty".to_string());
        } else if self.check_filename.contains(['/', '\\']) {
            problems.push(format!(
                "checkFilename must be a bare file name, got {:?}",
                self.check_filename
            ));
        }
        if let Err(problem) = conflict_suffixes(&self.conflict_suffix) {
            problems.push(problem);
        }
        if self.transfers == 0 {
            problems.push("transfers must be at least 1".to_string());
        }
        if self.checkers == 0 {
            problems.push("checkers must be at least 1".to_string());
        }
        if self.resync && self.recover {
            problems.push("resync and recover cannot be combined".to_string());
        }
        if self.resync && self.check_sync == CheckSync::Only {
            problems.push("checkSync=only cannot be combined with resync".to_string());
        }
        for (name, dir) in [("backupDir1", &self.backup_dir1), ("backupDir2", &self.backup_dir2)] {
            if let Some(dir) = dir
                && dir.trim().is_empty()
            {
                problems.push(format!("{} must not be an empty string", name));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::Config { problems })
        }
    }

    /// The two conflict rename tags, one per side.
    pub fn conflict_suffixes(&self) -> (String, String) {
        conflict_suffixes(&self.conflict_suffix).unwrap_or_else(|_| {
            (
                format!("{}1", DEFAULT_CONFLICT_SUFFIX),
                format!("{}2", DEFAULT_CONFLICT_SUFFIX),
            )
        })
    }

    /// Modification-time tolerance.
    pub fn modify_window(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.modify_window_ms as i64)
    }

    /// Whether listings carry content checksums.
    pub fn uses_checksums(&self) -> bool {
        !self.ignore_listing_checksum
    }
}

/// Split a suffix option into per-side tags.
///
/// `"conflict"` becomes `("conflict1", "conflict2")`; `"a,b"` is used as is.
fn conflict_suffixes(raw: &str) -> std::result::Result<(String, String), String> {
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    let valid = |s: &str| !s.is_empty() && !s.contains(['/', '\\']);
    match parts.as_slice() {
        [single] if valid(single) => Ok((format!("{}1", single), format!("{}2", single))),
        [first, second] if valid(first) && valid(second) && first != second => {
            Ok((first.to_string(), second.to_string()))
        }
        _ => Err(format!(
            "conflictSuffix must be one tag or two distinct comma-separated tags, got {:?}",
            raw
        )),
    }
}
