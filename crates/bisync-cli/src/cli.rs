//! CLI argument parsing using clap derive

use std::path::PathBuf;

use bisync_core::{CheckSync, ConflictLoser, ConflictPolicy, Options};
use clap::{ArgAction, Parser};

use crate::error::Result;

/// Bidirectional sync between two directory trees
///
/// The first run of a pair needs --resync to record a baseline. Later runs
/// propagate creations, edits and deletions made on either side since the
/// previous run.
///
/// Examples:
///   bisync ~/notes /mnt/backup/notes --resync
///   bisync ~/notes /mnt/backup/notes --conflict-resolve newer
///   bisync ~/notes /mnt/backup/notes --dry-run --json
#[derive(Parser, Debug)]
#[command(name = "bisync")]
#[command(author, version, about, long_about)]
pub struct Cli {
    /// First tree of the pair
    pub path1: String,

    /// Second tree of the pair
    pub path2: String,

    /// Read options from a TOML file; flags given here take precedence
    #[arg(long, value_name = "FILE", env = "BISYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Plan and report, but change nothing
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Rebuild the baseline from the current trees
    #[arg(long)]
    pub resync: bool,

    /// Which version wins a differing file during --resync
    #[arg(long, value_name = "POLICY")]
    pub resync_mode: Option<ConflictPolicy>,

    /// Abort when more than this percentage of paths would be deleted
    #[arg(long, value_name = "PERCENT")]
    pub max_delete: Option<i64>,

    /// Proceed even when the delete threshold is exceeded
    #[arg(long)]
    pub force: bool,

    /// Require the access marker file on both sides
    #[arg(long)]
    pub check_access: bool,

    /// Name of the access marker file
    #[arg(long, value_name = "NAME")]
    pub check_filename: Option<String>,

    /// Propagate empty directories
    #[arg(long)]
    pub create_empty_src_dirs: bool,

    /// Remove directories left empty by deletions
    #[arg(long)]
    pub remove_empty_dirs: bool,

    /// Keep the journal and previous listings in the work directory
    #[arg(long)]
    pub no_cleanup: bool,

    /// Compare files by size and modification time only
    #[arg(long)]
    pub ignore_listing_checksum: bool,

    /// Keep going past failed operations
    #[arg(long)]
    pub resilient: bool,

    /// Finish the operations of an interrupted run
    #[arg(long)]
    pub recover: bool,

    /// Include/exclude rules file
    #[arg(long, value_name = "FILE")]
    pub filters_file: Option<PathBuf>,

    /// Directory holding listings, locks and journals
    #[arg(long, value_name = "DIR")]
    pub workdir: Option<PathBuf>,

    /// Move files deleted from path1 here instead of discarding them
    #[arg(long, value_name = "DIR")]
    pub backup_dir1: Option<String>,

    /// Move files deleted from path2 here instead of discarding them
    #[arg(long, value_name = "DIR")]
    pub backup_dir2: Option<String>,

    /// Winner of a conflicting edit: none, path1, path2, newer, older, larger, smaller
    #[arg(long, value_name = "POLICY")]
    pub conflict_resolve: Option<ConflictPolicy>,

    /// What happens to the losing version: num or delete
    #[arg(long, value_name = "MODE")]
    pub conflict_loser: Option<ConflictLoser>,

    /// Tag for renamed conflict copies, or two tags separated by a comma
    #[arg(long, value_name = "TAG")]
    pub conflict_suffix: Option<String>,

    /// Verify listings after the run: true, false or only
    #[arg(long, value_name = "MODE")]
    pub check_sync: Option<CheckSync>,

    /// Modification times closer than this many milliseconds are equal
    #[arg(long, value_name = "MS")]
    pub modify_window: Option<u64>,

    /// Concurrent copy and delete operations
    #[arg(long, value_name = "N")]
    pub transfers: Option<usize>,

    /// Concurrent listing and checksum operations
    #[arg(long, value_name = "N")]
    pub checkers: Option<usize>,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Options from `--config` (or defaults) with flags applied on top.
    pub fn options(&self) -> Result<Options> {
        let mut options = match &self.config {
            Some(path) => Options::load(path)?,
            None => Options::default(),
        };
        self.apply(&mut options);
        Ok(options)
    }

    fn apply(&self, o: &mut Options) {
        o.dry_run |= self.dry_run;
        o.resync |= self.resync;
        o.force |= self.force;
        o.check_access |= self.check_access;
        o.create_empty_src_dirs |= self.create_empty_src_dirs;
        o.remove_empty_dirs |= self.remove_empty_dirs;
        o.no_cleanup |= self.no_cleanup;
        o.ignore_listing_checksum |= self.ignore_listing_checksum;
        o.resilient |= self.resilient;
        o.recover |= self.recover;

        if let Some(mode) = self.resync_mode {
            o.resync_mode = mode;
        }
        if let Some(n) = self.max_delete {
            o.max_delete = n;
        }
        if let Some(name) = &self.check_filename {
            o.check_filename = name.clone();
        }
        if let Some(path) = &self.filters_file {
            o.filters_file = Some(path.clone());
        }
        if let Some(dir) = &self.workdir {
            o.workdir = Some(dir.clone());
        }
        if let Some(dir) = &self.backup_dir1 {
            o.backup_dir1 = Some(dir.clone());
        }
        if let Some(dir) = &self.backup_dir2 {
            o.backup_dir2 = Some(dir.clone());
        }
        if let Some(policy) = self.conflict_resolve {
            o.conflict_resolve = policy;
        }
        if let Some(loser) = self.conflict_loser {
            o.conflict_loser = loser;
        }
        if let Some(suffix) = &self.conflict_suffix {
            o.conflict_suffix = suffix.clone();
        }
        if let Some(check) = self.check_sync {
            o.check_sync = check;
        }
        if let Some(ms) = self.modify_window {
            o.modify_window_ms = ms;
        }
        if let Some(n) = self.transfers {
            o.transfers = n;
        }
        if let Some(n) = self.checkers {
            o.checkers = n;
        }
    }
}
