//! Conflict resolution policies
//!
//! A conflict is a path changed independently on both sides. The resolver
//! picks a winning side by policy or leaves the conflict unresolved, in
//! which case both versions are kept under renamed paths. Neither outcome
//! discards a changed file unless the operator asked for it with
//! `conflict_loser = "delete"`.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use bisync_fs::RelPath;
use serde::Serialize;
use tracing::{info, warn};

use crate::delta::{self, Classification, Side};
use crate::options::{ConflictPolicy, Options};
use crate::snapshot::{Entry, Snapshot};

/// Outcome for one conflicting path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "side", rename_all = "snake_case")]
pub enum Resolution {
    /// This side's version replaces the other's
    Winner(Side),
    /// Both versions kept under conflict names
    Unresolved,
}

/// Apply a winner policy to two versions.
///
/// Returns `None` for [`ConflictPolicy::None`] and for ties.
pub fn pick_winner(policy: ConflictPolicy, e1: &Entry, e2: &Entry) -> Option<Side> {
    let by = |ordering: Ordering, prefer_greater: bool| match (ordering, prefer_greater) {
        (Ordering::Equal, _) => None,
        (Ordering::Greater, true) | (Ordering::Less, false) => Some(Side::Path1),
        _ => Some(Side::Path2),
    };

    match policy {
        ConflictPolicy::None => None,
        ConflictPolicy::Path1 => Some(Side::Path1),
        ConflictPolicy::Path2 => Some(Side::Path2),
        ConflictPolicy::Newer => by(e1.modified.cmp(&e2.modified), true),
        ConflictPolicy::Older => by(e1.modified.cmp(&e2.modified), false),
        ConflictPolicy::Larger => by(e1.size.cmp(&e2.size), true),
        ConflictPolicy::Smaller => by(e1.size.cmp(&e2.size), false),
    }
}

/// Resolves conflicts with the configured policy.
pub struct ConflictResolver<'a> {
    options: &'a Options,
}

impl<'a> ConflictResolver<'a> {
    pub fn new(options: &'a Options) -> Self {
        Self { options }
    }

    /// Resolve a single conflict between the current versions of `path`.
    pub fn resolve(&self, path: &RelPath, cur1: Option<&Entry>, cur2: Option<&Entry>) -> Resolution {
        let policy = self.options.conflict_resolve;
        let resolution = match (cur1, cur2) {
            (Some(_), None) => Resolution::Winner(Side::Path1),
            (None, Some(_)) => Resolution::Winner(Side::Path2),
            (None, None) => Resolution::Unresolved,
            (Some(a), Some(b)) if a.kind != b.kind => Resolution::Unresolved,
            (Some(a), Some(b)) => match pick_winner(policy, a, b) {
                Some(side) => Resolution::Winner(side),
                None => Resolution::Unresolved,
            },
        };

        match resolution {
            Resolution::Winner(side) => {
                info!(path = %path, policy = %policy, winner = %side, "Conflict resolved");
            }
            Resolution::Unresolved => {
                warn!(path = %path, policy = %policy, "Conflict unresolved, keeping both versions");
            }
        }
        resolution
    }

    /// Resolve every conflict of a classification.
    pub fn resolve_all(
        &self,
        classification: &Classification,
        cur1: &Snapshot,
        cur2: &Snapshot,
    ) -> BTreeMap<RelPath, Resolution> {
        classification
            .conflicts()
            .map(|path| {
                let resolution = if let Some(file_side) = delta::tree_clash(path, cur1, cur2) {
                    warn!(path = %path, file_side = %file_side, "File faces a directory, moving the file aside");
                    Resolution::Unresolved
                } else {
                    self.resolve(path, cur1.get(path), cur2.get(path))
                };
                (path.clone(), resolution)
            })
            .collect()
    }
}

/// Allocates conflict names that collide with nothing on either side.
#[derive(Debug)]
pub struct ConflictNamer {
    tags: (String, String),
    used: BTreeSet<RelPath>,
}

impl ConflictNamer {
    pub fn new(options: &Options) -> Self {
        Self {
            tags: options.conflict_suffixes(),
            used: BTreeSet::new(),
        }
    }

    /// Conflict name for `side`'s version of `path`.
    ///
    /// `X` becomes `X.conflict1`; if that is taken on either side or was
    /// already handed out, `X.conflict1_2`, `X.conflict1_3` and so on.
    pub fn name(&mut self, path: &RelPath, side: Side, cur1: &Snapshot, cur2: &Snapshot) -> RelPath {
        let tag = match side {
            Side::Path1 => &self.tags.0,
            Side::Path2 => &self.tags.1,
        };
        let base = format!(".{}", tag);
        let taken = |p: &RelPath| cur1.contains(p) || cur2.contains(p);

        let mut candidate = path.with_suffix(&base);
        let mut n = 2;
        while taken(&candidate) || self.used.contains(&candidate) {
            candidate = path.with_suffix(&format!("{}_{}", base, n));
            n += 1;
        }
        self.used.insert(candidate.clone());
        candidate
    }
}
