//! Recovery of an interrupted run
//!
//! The journal of the interrupted run holds its plan and the outcome of
//! each step that finished. Steps without a recorded success are checked
//! against fresh listings: a step whose effect is already visible counts
//! as completed, a step whose source still matches its planned
//! fingerprint is replayed, and anything else is stale and skipped.

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::delta::Comparator;
use crate::plan::{Operation, Plan, Step, apply_step};
use crate::report::RecoverySummary;
use crate::snapshot::{Entry, Snapshot};
use crate::state::JournalContents;

/// Verdict for every step of an interrupted plan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryAssessment {
    pub run_id: String,
    pub plan: Plan,
    pub completed: BTreeSet<usize>,
    pub pending: BTreeSet<usize>,
    pub stale: BTreeSet<usize>,
}

impl RecoveryAssessment {
    pub fn summary(&self, replayed: usize) -> RecoverySummary {
        RecoverySummary {
            interrupted_run: Some(self.run_id.clone()),
            completed: self.completed.len(),
            replayed,
            stale: self.stale.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Completed,
    Pending,
    Stale,
}

fn matches(cmp: &Comparator, current: Option<&Entry>, planned: Option<&Entry>) -> bool {
    match (current, planned) {
        (Some(c), Some(p)) => cmp.equal(c, p),
        (Some(_), None) => true,
        (None, _) => false,
    }
}

fn judge(step: &Step, sides: &[Snapshot; 2], cmp: &Comparator) -> Verdict {
    let planned = step.source.as_ref();
    match &step.op {
        Operation::Copy { from, path } => {
            let target = sides[from.other().index()].get(path);
            let source = sides[from.index()].get(path);
            if let (Some(t), Some(p)) = (target, planned)
                && cmp.equal(t, p)
            {
                Verdict::Completed
            } else if matches(cmp, source, planned) {
                Verdict::Pending
            } else {
                Verdict::Stale
            }
        }
        Operation::Delete { side, path } => match sides[side.index()].get(path) {
            None => Verdict::Completed,
            Some(current) if matches(cmp, Some(current), planned) => Verdict::Pending,
            Some(_) => Verdict::Stale,
        },
        Operation::Rename { side, from, to } => {
            let listing = &sides[side.index()];
            match (listing.get(from), listing.get(to)) {
                (None, Some(_)) => Verdict::Completed,
                (Some(current), None) if matches(cmp, Some(current), planned) => Verdict::Pending,
                _ => Verdict::Stale,
            }
        }
        Operation::Mkdir { side, path } => match sides[side.index()].get(path) {
            Some(entry) if entry.is_dir() => Verdict::Completed,
            Some(_) => Verdict::Stale,
            None => Verdict::Pending,
        },
        // Directories may be unlisted, and removing a missing one is a no-op
        Operation::Rmdir { side, path } => match sides[side.index()].get(path) {
            Some(entry) if !entry.is_dir() => Verdict::Stale,
            _ => Verdict::Pending,
        },
    }
}

/// Decide which steps of the interrupted plan still need to run.
///
/// Steps are judged in plan order against listings that already reflect
/// the steps judged before them, so a copy of a file renamed by an earlier
/// pending step is itself pending.
pub fn assess(
    journal: &JournalContents,
    cur1: &Snapshot,
    cur2: &Snapshot,
    cmp: &Comparator,
) -> RecoveryAssessment {
    let plan = Plan {
        steps: journal.steps.clone(),
    };
    let mut assessment = RecoveryAssessment {
        run_id: journal.run_id.clone(),
        ..RecoveryAssessment::default()
    };
    let mut sides = [cur1.clone(), cur2.clone()];

    for (index, step) in plan.steps.iter().enumerate() {
        let verdict = if journal.done.contains(&index) {
            Verdict::Completed
        } else {
            judge(step, &sides, cmp)
        };

        match verdict {
            Verdict::Completed => {
                assessment.completed.insert(index);
            }
            Verdict::Pending => {
                debug!(op = %step.op, "Step will be replayed");
                apply_step(&mut sides, step);
                assessment.pending.insert(index);
            }
            Verdict::Stale => {
                warn!(op = %step.op, "Skipping stale step, its source changed since planning");
                assessment.stale.insert(index);
            }
        }
    }

    info!(
        run_id = %assessment.run_id,
        completed = assessment.completed.len(),
        pending = assessment.pending.len(),
        stale = assessment.stale.len(),
        "Assessed interrupted run"
    );
    assessment.plan = plan;
    assessment
}
