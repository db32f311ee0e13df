//! Concrete operations derived from classified actions
//!
//! The [`Planner`] turns per-path actions and conflict resolutions into an
//! ordered [`Plan`]. Steps carry the fingerprint of the entry they act on,
//! which lets recovery tell a pending step from a stale one, and lets the
//! run derive the post-sync listings without re-reading either side.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::Bound::Excluded;

use bisync_fs::RelPath;
use serde::{Deserialize, Serialize};

use crate::conflict::{ConflictNamer, Resolution, pick_winner};
use crate::delta::{self, Action, Classification, Comparator, Side};
use crate::options::{ConflictLoser, ConflictPolicy, Options};
use crate::snapshot::{Entry, Snapshot};

/// One storage operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Copy `path` from side `from` to the same path on the other side
    Copy { from: Side, path: RelPath },
    Delete { side: Side, path: RelPath },
    Rename { side: Side, from: RelPath, to: RelPath },
    Mkdir { side: Side, path: RelPath },
    Rmdir { side: Side, path: RelPath },
}

impl Operation {
    /// Execution phase; lower phases run first.
    ///
    /// A delete or rmdir that clears the way for a copy or mkdir on the
    /// same path chain runs ahead of the writes instead of after them.
    pub fn phase(&self, clears_way: bool) -> u8 {
        match (self, clears_way) {
            (Self::Rename { .. }, _) => 0,
            (Self::Delete { .. }, true) => 1,
            (Self::Rmdir { .. }, true) => 2,
            (Self::Mkdir { .. }, _) => 3,
            (Self::Copy { .. }, _) => 4,
            (Self::Delete { .. }, false) => 5,
            (Self::Rmdir { .. }, false) => 6,
        }
    }

    fn is_removal(&self) -> bool {
        matches!(self, Self::Delete { .. } | Self::Rmdir { .. })
    }

    /// Side that is modified by this operation.
    pub fn target(&self) -> Side {
        match self {
            Self::Copy { from, .. } => from.other(),
            Self::Delete { side, .. }
            | Self::Rename { side, .. }
            | Self::Mkdir { side, .. }
            | Self::Rmdir { side, .. } => *side,
        }
    }

    /// Primary path the operation acts on.
    pub fn path(&self) -> &RelPath {
        match self {
            Self::Copy { path, .. }
            | Self::Delete { path, .. }
            | Self::Mkdir { path, .. }
            | Self::Rmdir { path, .. } => path,
            Self::Rename { from, .. } => from,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Copy { from, path } => write!(f, "copy {} {} -> {}", path, from, from.other()),
            Self::Delete { side, path } => write!(f, "delete {} on {}", path, side),
            Self::Rename { side, from, to } => write!(f, "rename {} -> {} on {}", from, to, side),
            Self::Mkdir { side, path } => write!(f, "mkdir {} on {}", path, side),
            Self::Rmdir { side, path } => write!(f, "rmdir {} on {}", path, side),
        }
    }
}

/// An operation plus the entry it was planned against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub op: Operation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Entry>,
}

/// Ordered list of steps
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub steps: Vec<Step>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: Operation, source: Option<Entry>) {
        self.steps.push(Step { op, source });
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.steps.iter().map(|s| &s.op)
    }

    /// Put steps in execution order: renames, removals that clear a path,
    /// mkdirs (shallow first), copies, deletes, rmdirs (deepest first).
    /// Path order within a phase.
    pub fn sort(&mut self) {
        let phases = self.step_phases();
        let mut keyed: Vec<(u8, Step)> = phases.into_iter().zip(self.steps.drain(..)).collect();
        keyed.sort_by(|(pa, a), (pb, b)| {
            let depth = |s: &Step| -> isize {
                let depth = s.op.path().depth() as isize;
                match s.op {
                    Operation::Mkdir { .. } => depth,
                    Operation::Rmdir { .. } => -depth,
                    _ => 0,
                }
            };
            (pa, depth(a))
                .cmp(&(pb, depth(b)))
                .then_with(|| a.op.path().cmp(b.op.path()))
                .then_with(|| a.op.target().cmp(&b.op.target()))
        });
        self.steps = keyed.into_iter().map(|(_, step)| step).collect();
    }

    /// Phase of every step, in step order.
    fn step_phases(&self) -> Vec<u8> {
        let mut written: [BTreeSet<RelPath>; 2] = Default::default();
        for step in &self.steps {
            if matches!(step.op, Operation::Copy { .. } | Operation::Mkdir { .. }) {
                written[step.op.target().index()].insert(step.op.path().clone());
            }
        }

        self.steps
            .iter()
            .map(|step| {
                let clears_way = step.op.is_removal()
                    && on_written_chain(&written[step.op.target().index()], step.op.path());
                step.op.phase(clears_way)
            })
            .collect()
    }

    /// Index ranges of consecutive steps sharing a phase.
    pub fn phases(&self) -> Vec<std::ops::Range<usize>> {
        let phases = self.step_phases();
        let mut ranges = Vec::new();
        let mut start = 0;
        for i in 1..=phases.len() {
            if i == phases.len() || phases[i] != phases[start] {
                if start < i {
                    ranges.push(start..i);
                }
                start = i;
            }
        }
        ranges
    }

    pub fn copies(&self) -> usize {
        self.count(|op| matches!(op, Operation::Copy { .. }))
    }

    pub fn deletes(&self) -> usize {
        self.count(|op| matches!(op, Operation::Delete { .. } | Operation::Rmdir { .. }))
    }

    pub fn renames(&self) -> usize {
        self.count(|op| matches!(op, Operation::Rename { .. }))
    }

    fn count(&self, pred: impl Fn(&Operation) -> bool) -> usize {
        self.steps.iter().filter(|s| pred(&s.op)).count()
    }

    /// Listings both sides will have once every step has been applied.
    ///
    /// `pruned` lists directories removed as a side effect of
    /// `remove_empty_dirs`, `kept` the directories an rmdir step found not
    /// empty and left in place.
    pub fn project(
        &self,
        cur1: &Snapshot,
        cur2: &Snapshot,
        pruned: &[(Side, RelPath)],
        kept: &[(Side, RelPath)],
    ) -> [Snapshot; 2] {
        let mut sides = [cur1.clone(), cur2.clone()];
        for step in &self.steps {
            apply_step(&mut sides, step);
        }

        let listed = [cur1, cur2];
        for (side, dir) in kept {
            if let Some(entry) = listed[side.index()].get(dir) {
                sides[side.index()].insert(Entry {
                    is_empty_dir: false,
                    ..entry.clone()
                });
            }
        }
        for (side, dir) in pruned {
            sides[side.index()].remove(dir);
        }
        sides
    }
}

/// Whether `path`, one of its ancestors, or anything below it is written.
fn on_written_chain(written: &BTreeSet<RelPath>, path: &RelPath) -> bool {
    if written.contains(path) || path.ancestors().iter().any(|dir| written.contains(dir)) {
        return true;
    }
    written
        .range((Excluded(path.clone()), Excluded(path.with_suffix("0"))))
        .any(|p| p.is_inside(path))
}

/// Apply the listing-level effect of one step.
pub(crate) fn apply_step(sides: &mut [Snapshot; 2], step: &Step) {
    match &step.op {
        Operation::Copy { from, path } => {
            let entry = sides[from.index()]
                .get(path)
                .cloned()
                .or_else(|| step.source.clone());
            if let Some(entry) = entry {
                sides[from.other().index()].insert(entry.moved_to(path.clone()));
            }
        }
        Operation::Delete { side, path } | Operation::Rmdir { side, path } => {
            sides[side.index()].remove(path);
        }
        Operation::Rename { side, from, to } => {
            let entry = sides[side.index()]
                .remove(from)
                .or_else(|| step.source.clone());
            if let Some(entry) = entry {
                sides[side.index()].insert(entry.moved_to(to.clone()));
            }
        }
        Operation::Mkdir { side, path } => {
            let entry = step
                .source
                .clone()
                .unwrap_or_else(|| Entry::dir(path.clone(), chrono::Utc::now()));
            sides[side.index()].insert(entry.moved_to(path.clone()));
        }
    }
}

/// Builds plans from classified actions.
pub struct Planner<'a> {
    options: &'a Options,
    cur1: &'a Snapshot,
    cur2: &'a Snapshot,
}

impl<'a> Planner<'a> {
    pub fn new(options: &'a Options, cur1: &'a Snapshot, cur2: &'a Snapshot) -> Self {
        Self { options, cur1, cur2 }
    }

    fn current(&self, side: Side) -> &'a Snapshot {
        match side {
            Side::Path1 => self.cur1,
            Side::Path2 => self.cur2,
        }
    }

    /// Plan a normal run.
    pub fn plan(
        &self,
        classification: &Classification,
        resolutions: &BTreeMap<RelPath, Resolution>,
    ) -> Plan {
        let mut plan = Plan::new();
        let mut namer = ConflictNamer::new(self.options);

        for (path, action) in classification.changes() {
            match *action {
                Action::Unchanged => {}
                Action::Created(side) | Action::Modified(side) => self.propagate(&mut plan, side, path),
                Action::Deleted(side) => self.remove(&mut plan, side.other(), path),
                Action::Conflict => {
                    let resolution = resolutions
                        .get(path)
                        .copied()
                        .unwrap_or(Resolution::Unresolved);
                    self.plan_conflict(&mut plan, &mut namer, path, resolution);
                }
            }
        }

        self.clear_trees(&mut plan);
        plan.sort();
        plan
    }

    /// Plan rmdirs for the directories a copied file replaces.
    ///
    /// Deletes of the files inside are planned by their own actions; when
    /// directories are not listed nothing else removes the directories.
    fn clear_trees(&self, plan: &mut Plan) {
        let planned: BTreeSet<(Side, RelPath)> = plan
            .steps
            .iter()
            .filter(|s| matches!(s.op, Operation::Rmdir { .. }))
            .map(|s| (s.op.target(), s.op.path().clone()))
            .collect();

        let mut dirs: BTreeSet<(Side, RelPath)> = BTreeSet::new();
        for step in &plan.steps {
            let Operation::Copy { from, path } = &step.op else {
                continue;
            };
            let side = from.other();
            for entry in self.current(side).descendants(path) {
                dirs.extend(
                    entry
                        .path
                        .ancestors()
                        .into_iter()
                        .filter(|dir| dir == path || dir.is_inside(path))
                        .map(|dir| (side, dir)),
                );
            }
        }

        for (side, dir) in dirs.difference(&planned) {
            plan.push(
                Operation::Rmdir {
                    side: *side,
                    path: dir.clone(),
                },
                self.current(*side).get(dir).cloned(),
            );
        }
    }

    /// Make the other side match `from`'s version of `path`.
    fn propagate(&self, plan: &mut Plan, from: Side, path: &RelPath) {
        let Some(entry) = self.current(from).get(path) else {
            return;
        };
        if entry.is_dir() {
            if !self.current(from.other()).get(path).is_some_and(Entry::is_dir) {
                plan.push(
                    Operation::Mkdir {
                        side: from.other(),
                        path: path.clone(),
                    },
                    Some(entry.clone()),
                );
            }
        } else {
            plan.push(
                Operation::Copy {
                    from,
                    path: path.clone(),
                },
                Some(entry.clone()),
            );
        }
    }

    /// Remove `path` from `side` if it is there.
    fn remove(&self, plan: &mut Plan, side: Side, path: &RelPath) {
        let Some(entry) = self.current(side).get(path) else {
            return;
        };
        let op = if entry.is_dir() {
            Operation::Rmdir {
                side,
                path: path.clone(),
            }
        } else {
            Operation::Delete {
                side,
                path: path.clone(),
            }
        };
        plan.push(op, Some(entry.clone()));
    }

    /// Move `side`'s version of `path` to a conflict name and copy it across.
    fn keep_aside(&self, plan: &mut Plan, namer: &mut ConflictNamer, side: Side, path: &RelPath) {
        let Some(entry) = self.current(side).get(path) else {
            return;
        };
        let renamed = namer.name(path, side, self.cur1, self.cur2);
        plan.push(
            Operation::Rename {
                side,
                from: path.clone(),
                to: renamed.clone(),
            },
            Some(entry.clone()),
        );
        plan.push(
            Operation::Copy {
                from: side,
                path: renamed.clone(),
            },
            Some(entry.moved_to(renamed)),
        );
    }

    fn plan_conflict(
        &self,
        plan: &mut Plan,
        namer: &mut ConflictNamer,
        path: &RelPath,
        resolution: Resolution,
    ) {
        // A file facing a tree moves aside; the tree's files are planned on
        // their own
        if let Some(file_side) = delta::tree_clash(path, self.cur1, self.cur2) {
            self.keep_aside(plan, namer, file_side, path);
            return;
        }

        let e1 = self.cur1.get(path);
        let e2 = self.cur2.get(path);

        // A file facing a directory moves aside; the directory stays in place
        if let (Some(a), Some(b)) = (e1, e2)
            && a.kind != b.kind
        {
            let (file_side, dir) = if a.is_dir() { (Side::Path2, a) } else { (Side::Path1, b) };
            self.keep_aside(plan, namer, file_side, path);
            plan.push(
                Operation::Mkdir {
                    side: file_side,
                    path: path.clone(),
                },
                Some(dir.clone()),
            );
            return;
        }

        match resolution {
            Resolution::Unresolved => {
                for side in Side::BOTH {
                    self.keep_aside(plan, namer, side, path);
                }
            }
            Resolution::Winner(winner) => {
                let loser = winner.other();
                if self.options.conflict_loser == ConflictLoser::Num {
                    self.keep_aside(plan, namer, loser, path);
                }
                self.propagate(plan, winner, path);
            }
        }
    }

    /// Plan a resync: combine both current listings per `resync_mode`.
    ///
    /// Returns the plan and the per-path action it implements.
    pub fn plan_resync(&self, cmp: &Comparator) -> (Plan, BTreeMap<RelPath, Action>) {
        let mut plan = Plan::new();
        let mut namer = ConflictNamer::new(self.options);
        let mut actions = BTreeMap::new();
        let mode = self.options.resync_mode;

        let paths: BTreeSet<&RelPath> = self.cur1.paths().chain(self.cur2.paths()).collect();
        for path in paths {
            // Mirroring one side replaces the other's file or tree outright
            if !matches!(mode, ConflictPolicy::Path1 | ConflictPolicy::Path2)
                && let Some(file_side) = delta::tree_clash(path, self.cur1, self.cur2)
            {
                self.keep_aside(&mut plan, &mut namer, file_side, path);
                actions.insert(path.clone(), Action::Conflict);
                continue;
            }

            let (e1, e2) = (self.cur1.get(path), self.cur2.get(path));
            let action = match (mode, e1, e2) {
                (_, Some(a), Some(b)) if cmp.equal(a, b) => Action::Unchanged,
                (ConflictPolicy::Path1, None, Some(_)) => {
                    self.remove(&mut plan, Side::Path2, path);
                    Action::Deleted(Side::Path1)
                }
                (ConflictPolicy::Path2, Some(_), None) => {
                    self.remove(&mut plan, Side::Path1, path);
                    Action::Deleted(Side::Path2)
                }
                (_, Some(_), None) => {
                    self.propagate(&mut plan, Side::Path1, path);
                    Action::Created(Side::Path1)
                }
                (_, None, Some(_)) => {
                    self.propagate(&mut plan, Side::Path2, path);
                    Action::Created(Side::Path2)
                }
                (_, Some(a), Some(b)) => {
                    let winner = match mode {
                        ConflictPolicy::None => Side::Path1,
                        policy => pick_winner(policy, a, b).unwrap_or(Side::Path1),
                    };
                    self.propagate(&mut plan, winner, path);
                    Action::Modified(winner)
                }
                (_, None, None) => continue,
            };
            actions.insert(path.clone(), action);
        }

        self.clear_trees(&mut plan);
        plan.sort();
        (plan, actions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use pretty_assertions::assert_eq;

    fn rel(p: &str) -> RelPath {
        RelPath::new(p).unwrap()
    }

    fn file(path: &str, content: &str, secs: i64) -> Entry {
        Entry::file(
            rel(path),
            content.len() as u64,
            DateTime::<Utc>::from_timestamp(secs, 0).unwrap(),
        )
        .with_checksum(bisync_fs::checksum::compute_content_checksum(content.as_bytes()))
    }

    fn snap(entries: Vec<Entry>) -> Snapshot {
        Snapshot::from_entries(entries).unwrap()
    }

    fn ops(plan: &Plan) -> Vec<String> {
        plan.operations().map(|op| op.to_string()).collect()
    }

    fn conflict_on(path: &str) -> Classification {
        Classification {
            actions: [(rel(path), Action::Conflict)].into_iter().collect(),
        }
    }

    #[test]
    fn unresolved_conflict_keeps_both_versions() {
        let options = Options::default();
        let cur1 = snap(vec![file("doc.txt", "one", 10)]);
        let cur2 = snap(vec![file("doc.txt", "two!", 20)]);
        let resolutions = [(rel("doc.txt"), Resolution::Unresolved)].into_iter().collect();

        let plan = Planner::new(&options, &cur1, &cur2).plan(&conflict_on("doc.txt"), &resolutions);

        assert_eq!(
            ops(&plan),
            vec![
                "rename doc.txt -> doc.txt.conflict1 on path1",
                "rename doc.txt -> doc.txt.conflict2 on path2",
                "copy doc.txt.conflict1 path1 -> path2",
                "copy doc.txt.conflict2 path2 -> path1",
            ]
        );

        let [new1, new2] = plan.project(&cur1, &cur2, &[], &[]);
        assert!(!new1.contains(&rel("doc.txt")));
        assert!(!new2.contains(&rel("doc.txt")));
        assert_eq!(new1.paths().collect::<Vec<_>>(), new2.paths().collect::<Vec<_>>());
    }

    #[test]
    fn winner_with_numbered_loser() {
        let options = Options::default();
        let cur1 = snap(vec![file("doc.txt", "one", 10)]);
        let cur2 = snap(vec![file("doc.txt", "two!", 20)]);
        let resolutions = [(rel("doc.txt"), Resolution::Winner(Side::Path2))]
            .into_iter()
            .collect();

        let plan = Planner::new(&options, &cur1, &cur2).plan(&conflict_on("doc.txt"), &resolutions);

        assert_eq!(
            ops(&plan),
            vec![
                "rename doc.txt -> doc.txt.conflict1 on path1",
                "copy doc.txt path2 -> path1",
                "copy doc.txt.conflict1 path1 -> path2",
            ]
        );
    }

    #[test]
    fn winner_with_deleted_loser() {
        let options = Options {
            conflict_loser: ConflictLoser::Delete,
            ..Options::default()
        };
        let cur1 = snap(vec![file("doc.txt", "one", 10)]);
        let cur2 = snap(vec![file("doc.txt", "two!", 20)]);
        let resolutions = [(rel("doc.txt"), Resolution::Winner(Side::Path1))]
            .into_iter()
            .collect();

        let plan = Planner::new(&options, &cur1, &cur2).plan(&conflict_on("doc.txt"), &resolutions);
        assert_eq!(ops(&plan), vec!["copy doc.txt path1 -> path2"]);
    }

    #[test]
    fn plan_orders_phases() {
        let options = Options::default();
        let cur1 = snap(vec![
            file("a/new.txt", "n", 1),
            Entry::dir(rel("a"), DateTime::<Utc>::from_timestamp(1, 0).unwrap()),
        ]);
        let cur2 = snap(vec![file("z/old.txt", "o", 1)]);
        let classification = Classification {
            actions: [
                (rel("a"), Action::Created(Side::Path1)),
                (rel("a/new.txt"), Action::Created(Side::Path1)),
                (rel("z/old.txt"), Action::Deleted(Side::Path1)),
            ]
            .into_iter()
            .collect(),
        };

        let plan = Planner::new(&options, &cur1, &cur2).plan(&classification, &BTreeMap::new());
        assert_eq!(
            ops(&plan),
            vec![
                "mkdir a on path2",
                "copy a/new.txt path1 -> path2",
                "delete z/old.txt on path2",
            ]
        );
        assert_eq!(plan.phases(), vec![0..1, 1..2, 2..3]);
    }

    #[test]
    fn file_replaced_by_tree_is_deleted_before_the_copy() {
        let options = Options::default();
        let cur1 = snap(vec![file("x", "old file", 1)]);
        let cur2 = snap(vec![file("x/child.txt", "c", 2)]);
        let classification = Classification {
            actions: [
                (rel("x"), Action::Deleted(Side::Path2)),
                (rel("x/child.txt"), Action::Created(Side::Path2)),
            ]
            .into_iter()
            .collect(),
        };

        let plan = Planner::new(&options, &cur1, &cur2).plan(&classification, &BTreeMap::new());
        assert_eq!(ops(&plan), vec!["delete x on path1", "copy x/child.txt path2 -> path1"]);
        assert_eq!(plan.phases(), vec![0..1, 1..2]);
    }

    #[test]
    fn tree_replaced_by_file_is_cleared_before_the_copy() {
        let options = Options::default();
        let cur1 = snap(vec![file("x", "new file", 2)]);
        let cur2 = snap(vec![file("x/a.txt", "a", 1), file("x/sub/b.txt", "b", 1), file("y", "y", 1)]);
        let classification = Classification {
            actions: [
                (rel("x"), Action::Created(Side::Path1)),
                (rel("x/a.txt"), Action::Deleted(Side::Path1)),
                (rel("x/sub/b.txt"), Action::Deleted(Side::Path1)),
                (rel("y"), Action::Deleted(Side::Path1)),
            ]
            .into_iter()
            .collect(),
        };

        let plan = Planner::new(&options, &cur1, &cur2).plan(&classification, &BTreeMap::new());
        assert_eq!(
            ops(&plan),
            vec![
                "delete x/a.txt on path2",
                "delete x/sub/b.txt on path2",
                "rmdir x/sub on path2",
                "rmdir x on path2",
                "copy x path1 -> path2",
                "delete y on path2",
            ]
        );

        let [new1, new2] = plan.project(&cur1, &cur2, &[], &[]);
        assert_eq!(new1, new2);
    }

    #[test]
    fn file_facing_new_tree_content_moves_aside() {
        let options = Options::default();
        let cur1 = snap(vec![file("x", "file", 2)]);
        let cur2 = snap(vec![file("x/new.txt", "n", 2)]);
        let classification = Classification {
            actions: [
                (rel("x"), Action::Conflict),
                (rel("x/new.txt"), Action::Created(Side::Path2)),
            ]
            .into_iter()
            .collect(),
        };
        let resolutions = [(rel("x"), Resolution::Unresolved)].into_iter().collect();

        let plan = Planner::new(&options, &cur1, &cur2).plan(&classification, &resolutions);
        assert_eq!(
            ops(&plan),
            vec![
                "rename x -> x.conflict1 on path1",
                "copy x.conflict1 path1 -> path2",
                "copy x/new.txt path2 -> path1",
            ]
        );
    }

    #[test]
    fn resync_union_moves_file_facing_tree_aside() {
        let options = Options::default();
        let cur1 = snap(vec![file("x", "file", 1)]);
        let cur2 = snap(vec![file("x/in.txt", "i", 1)]);

        let (plan, actions) = Planner::new(&options, &cur1, &cur2).plan_resync(&Comparator::default());
        assert_eq!(
            ops(&plan),
            vec![
                "rename x -> x.conflict1 on path1",
                "copy x.conflict1 path1 -> path2",
                "copy x/in.txt path2 -> path1",
            ]
        );
        assert_eq!(actions[&rel("x")], Action::Conflict);
    }

    #[test]
    fn resync_path1_replaces_tree_with_file() {
        let options = Options {
            resync_mode: ConflictPolicy::Path1,
            ..Options::default()
        };
        let cur1 = snap(vec![file("x", "file", 1)]);
        let cur2 = snap(vec![file("x/in.txt", "i", 1)]);

        let (plan, _) = Planner::new(&options, &cur1, &cur2).plan_resync(&Comparator::default());
        assert_eq!(
            ops(&plan),
            vec!["delete x/in.txt on path2", "rmdir x on path2", "copy x path1 -> path2"]
        );
    }

    #[test]
    fn project_keeps_directories_left_in_place() {
        let now = DateTime::<Utc>::from_timestamp(1, 0).unwrap();
        let cur1 = snap(vec![Entry::dir(rel("d"), now), file("d/late", "l", 1)]);
        let mut plan = Plan::new();
        plan.push(
            Operation::Rmdir {
                side: Side::Path1,
                path: rel("d"),
            },
            None,
        );

        let [removed, _] = plan.project(&cur1, &Snapshot::new(), &[], &[]);
        assert!(!removed.contains(&rel("d")));

        let [kept, _] = plan.project(&cur1, &Snapshot::new(), &[], &[(Side::Path1, rel("d"))]);
        assert!(kept.get(&rel("d")).is_some_and(Entry::is_dir));
    }

    #[test]
    fn resync_path1_mirrors() {
        let options = Options {
            resync_mode: ConflictPolicy::Path1,
            ..Options::default()
        };
        let cur1 = snap(vec![file("same", "s", 1), file("diff", "one", 1), file("only1", "x", 1)]);
        let cur2 = snap(vec![file("same", "s", 1), file("diff", "two!", 9), file("only2", "y", 1)]);

        let (plan, actions) = Planner::new(&options, &cur1, &cur2).plan_resync(&Comparator::default());

        assert_eq!(
            ops(&plan),
            vec![
                "copy diff path1 -> path2",
                "copy only1 path1 -> path2",
                "delete only2 on path2",
            ]
        );
        assert_eq!(actions[&rel("same")], Action::Unchanged);

        let [new1, new2] = plan.project(&cur1, &cur2, &[], &[]);
        assert_eq!(new1, cur1);
        assert_eq!(new2, cur1);
    }

    #[test]
    fn resync_none_is_union_with_path1_winning() {
        let options = Options::default();
        let cur1 = snap(vec![file("diff", "one", 1), file("only1", "x", 1)]);
        let cur2 = snap(vec![file("diff", "two!", 9), file("only2", "y", 1)]);

        let (plan, _) = Planner::new(&options, &cur1, &cur2).plan_resync(&Comparator::default());
        assert_eq!(
            ops(&plan),
            vec![
                "copy diff path1 -> path2",
                "copy only1 path1 -> path2",
                "copy only2 path2 -> path1",
            ]
        );
    }

    #[test]
    fn resync_newer_picks_per_file() {
        let options = Options {
            resync_mode: ConflictPolicy::Newer,
            ..Options::default()
        };
        let cur1 = snap(vec![file("a", "one", 1), file("b", "one", 9)]);
        let cur2 = snap(vec![file("a", "two!", 9), file("b", "two!", 1)]);

        let (plan, _) = Planner::new(&options, &cur1, &cur2).plan_resync(&Comparator::default());
        assert_eq!(ops(&plan), vec!["copy a path2 -> path1", "copy b path1 -> path2"]);
    }

    #[test]
    fn project_applies_pruned_dirs() {
        let now = DateTime::<Utc>::from_timestamp(1, 0).unwrap();
        let cur1 = snap(vec![Entry::dir(rel("d"), now), file("d/x", "x", 1)]);
        let cur2 = snap(vec![Entry::dir(rel("d"), now)]);
        let mut plan = Plan::new();
        plan.push(
            Operation::Delete {
                side: Side::Path1,
                path: rel("d/x"),
            },
            None,
        );

        let [new1, new2] = plan.project(&cur1, &cur2, &[(Side::Path1, rel("d"))], &[]);
        assert!(new1.is_empty());
        assert!(new2.contains(&rel("d")));
    }
}
