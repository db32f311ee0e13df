//! Three-way change detection
//!
//! Each path in the union of both baselines and both current listings gets
//! one [`Action`], derived from what each side did since the baseline:
//!
//! | side1 \ side2 | Missing    | New        | Same       | Changed    | Deleted    |
//! |---------------|------------|------------|------------|------------|------------|
//! | Missing       | -          | Created(2) | Created(2) | Created(2) | -          |
//! | New           | Created(1) | eq?        | eq?        | eq?        | Created(1) |
//! | Same          | Created(1) | eq?        | Unchanged  | Modified(2)| Deleted(2) |
//! | Changed       | Created(1) | eq?        | Modified(1)| eq?        | Modified(1)|
//! | Deleted       | -          | Created(2) | Deleted(1) | Modified(2)| Unchanged  |
//!
//! `eq?` is `Unchanged` when both current versions compare equal and
//! `Conflict` otherwise. A change always beats a deletion.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use bisync_fs::RelPath;
use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::options::Options;
use crate::snapshot::{Entry, Snapshot};

/// One of the two synchronized trees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Path1,
    Path2,
}

impl Side {
    pub fn other(self) -> Self {
        match self {
            Self::Path1 => Self::Path2,
            Self::Path2 => Self::Path1,
        }
    }

    /// Zero-based index for per-side arrays.
    pub fn index(self) -> usize {
        match self {
            Self::Path1 => 0,
            Self::Path2 => 1,
        }
    }

    pub const BOTH: [Side; 2] = [Side::Path1, Side::Path2];
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path1 => write!(f, "path1"),
            Self::Path2 => write!(f, "path2"),
        }
    }
}

/// Entry equality used for change detection
#[derive(Debug, Clone, Copy)]
pub struct Comparator {
    use_checksums: bool,
    modify_window: Duration,
}

impl Comparator {
    pub fn new(use_checksums: bool, modify_window: Duration) -> Self {
        Self {
            use_checksums,
            modify_window,
        }
    }

    pub fn from_options(options: &Options) -> Self {
        Self::new(options.uses_checksums(), options.modify_window())
    }

    /// Whether two entries describe the same content.
    ///
    /// Directories are equal to directories. Files compare by size, then by
    /// checksum when both carry one, else by modification time within the
    /// window.
    pub fn equal(&self, a: &Entry, b: &Entry) -> bool {
        if a.kind != b.kind {
            return false;
        }
        if a.is_dir() {
            return true;
        }
        if a.size != b.size {
            return false;
        }
        if self.use_checksums
            && let (Some(x), Some(y)) = (&a.checksum, &b.checksum)
        {
            return x == y;
        }
        (a.modified - b.modified).abs() <= self.modify_window
    }
}

impl Default for Comparator {
    fn default() -> Self {
        Self::new(true, Duration::milliseconds(1))
    }
}

/// What one side did to a path since the baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// Absent before and now
    Missing,
    /// Absent before, present now
    New,
    Same,
    Changed,
    /// Present before, absent now
    Deleted,
}

impl Observation {
    pub fn observe(prior: Option<&Entry>, current: Option<&Entry>, cmp: &Comparator) -> Self {
        match (prior, current) {
            (None, None) => Self::Missing,
            (None, Some(_)) => Self::New,
            (Some(_), None) => Self::Deleted,
            (Some(p), Some(c)) if cmp.equal(p, c) => Self::Same,
            (Some(_), Some(_)) => Self::Changed,
        }
    }
}

/// Classification of a single path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "side", rename_all = "snake_case")]
pub enum Action {
    Unchanged,
    /// New on this side only
    Created(Side),
    /// Changed on this side only
    Modified(Side),
    /// Removed on this side; the removal propagates to the other side
    Deleted(Side),
    /// Changed independently on both sides
    Conflict,
}

impl Action {
    /// Side whose version should be propagated, if any.
    pub fn source(&self) -> Option<Side> {
        match self {
            Self::Created(side) | Self::Modified(side) => Some(*side),
            _ => None,
        }
    }

    pub fn is_deletion(&self) -> bool {
        matches!(self, Self::Deleted(_))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unchanged => write!(f, "unchanged"),
            Self::Created(side) => write!(f, "new on {}", side),
            Self::Modified(side) => write!(f, "changed on {}", side),
            Self::Deleted(side) => write!(f, "deleted on {}", side),
            Self::Conflict => write!(f, "conflict"),
        }
    }
}

/// Decide the action for one path from the two side observations.
///
/// Returns `None` for paths that need no tracking at all.
pub fn decide(obs1: Observation, obs2: Observation, currents_equal: bool) -> Option<Action> {
    use Observation::*;
    use Side::*;

    let action = match (obs1, obs2) {
        (Missing, Missing) | (Missing, Deleted) | (Deleted, Missing) => return None,
        (Missing, _) => Action::Created(Path2),
        (_, Missing) => Action::Created(Path1),
        (Same, Same) | (Deleted, Deleted) => Action::Unchanged,
        (Same, Changed) | (Deleted, Changed) => Action::Modified(Path2),
        (Changed, Same) | (Changed, Deleted) => Action::Modified(Path1),
        (Same, Deleted) => Action::Deleted(Path2),
        (Deleted, Same) => Action::Deleted(Path1),
        (New, Deleted) => Action::Created(Path1),
        (Deleted, New) => Action::Created(Path2),
        (New | Same | Changed, New | Same | Changed) => {
            if currents_equal {
                Action::Unchanged
            } else {
                Action::Conflict
            }
        }
    };
    Some(action)
}

/// Per-action totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActionCounts {
    pub unchanged: usize,
    pub created: usize,
    pub modified: usize,
    pub deleted: usize,
    pub conflicts: usize,
}

/// Result of classifying every path of a pair
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub actions: BTreeMap<RelPath, Action>,
}

impl Classification {
    /// Number of paths whose action is a deletion.
    pub fn deletions(&self) -> usize {
        self.actions.values().filter(|a| a.is_deletion()).count()
    }

    /// Number of classified paths.
    pub fn total(&self) -> usize {
        self.actions.len()
    }

    /// Paths that need work, in path order.
    pub fn changes(&self) -> impl Iterator<Item = (&RelPath, &Action)> {
        self.actions.iter().filter(|(_, a)| **a != Action::Unchanged)
    }

    pub fn conflicts(&self) -> impl Iterator<Item = &RelPath> {
        self.actions
            .iter()
            .filter(|(_, a)| **a == Action::Conflict)
            .map(|(p, _)| p)
    }

    pub fn counts(&self) -> ActionCounts {
        let mut counts = ActionCounts::default();
        for action in self.actions.values() {
            match action {
                Action::Unchanged => counts.unchanged += 1,
                Action::Created(_) => counts.created += 1,
                Action::Modified(_) => counts.modified += 1,
                Action::Deleted(_) => counts.deleted += 1,
                Action::Conflict => counts.conflicts += 1,
            }
        }
        counts
    }
}

/// Classify the union of paths across baselines and current listings.
pub fn classify(
    prior1: &Snapshot,
    prior2: &Snapshot,
    cur1: &Snapshot,
    cur2: &Snapshot,
    cmp: &Comparator,
) -> Classification {
    let paths: BTreeSet<&RelPath> = prior1
        .paths()
        .chain(prior2.paths())
        .chain(cur1.paths())
        .chain(cur2.paths())
        .collect();

    let mut actions = BTreeMap::new();
    for path in paths {
        let (c1, c2) = (cur1.get(path), cur2.get(path));
        let obs1 = Observation::observe(prior1.get(path), c1, cmp);
        let obs2 = Observation::observe(prior2.get(path), c2, cmp);
        let currents_equal = match (c1, c2) {
            (Some(a), Some(b)) => cmp.equal(a, b),
            _ => false,
        };

        let Some(mut action) = decide(obs1, obs2, currents_equal) else {
            continue;
        };

        // A one-sided change cannot overwrite an entry of another kind
        if let (Action::Modified(_), Some(a), Some(b)) = (action, c1, c2)
            && a.kind != b.kind
        {
            action = Action::Conflict;
        }

        actions.insert(path.clone(), action);
    }

    settle_tree_clashes(&mut actions, cur1, cur2);
    Classification { actions }
}

/// Side holding a file at `path` while the other side holds entries below
/// it but nothing at `path` itself.
///
/// This only happens when directories are not listed: the directory shows
/// up through its contents alone.
pub fn tree_clash(path: &RelPath, cur1: &Snapshot, cur2: &Snapshot) -> Option<Side> {
    let listings = [cur1, cur2];
    Side::BOTH.into_iter().find(|side| {
        let (here, there) = (listings[side.index()], listings[side.other().index()]);
        here.get(path).is_some_and(|e| !e.is_dir())
            && !there.contains(path)
            && there.descendants(path).next().is_some()
    })
}

/// Turn file-versus-tree clashes into conflicts unless one side simply
/// replaced the other's kind: a file swapped for a directory, or a
/// directory whose contents were all deleted and replaced by a file.
fn settle_tree_clashes(actions: &mut BTreeMap<RelPath, Action>, cur1: &Snapshot, cur2: &Snapshot) {
    let listings = [cur1, cur2];
    let clashes: Vec<(RelPath, Side)> = actions
        .keys()
        .filter_map(|path| tree_clash(path, cur1, cur2).map(|side| (path.clone(), side)))
        .collect();

    for (path, file_side) in clashes {
        let tree_side = file_side.other();
        let action = actions.get(&path).copied();
        let file_replaced_by_tree = action == Some(Action::Deleted(tree_side));
        let tree_replaced_by_file = action == Some(Action::Created(file_side))
            && listings[tree_side.index()]
                .descendants(&path)
                .all(|e| actions.get(&e.path) == Some(&Action::Deleted(file_side)));

        if !file_replaced_by_tree && !tree_replaced_by_file {
            tracing::debug!(path = %path, file_side = %file_side, "File faces a directory");
            actions.insert(path, Action::Conflict);
        }
    }
}
