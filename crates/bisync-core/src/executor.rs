//! Applies a plan to both sides
//!
//! Steps run phase by phase; steps inside one phase run concurrently up to
//! `transfers` at a time. Every outcome goes to the journal as soon as it
//! is known so an interrupted run can be recovered.

use std::collections::BTreeSet;

use bisync_fs::{Backend, RelPath};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::delta::Side;
use crate::options::Options;
use crate::plan::{Operation, Plan, Step};
use crate::report::OperationFailure;
use crate::state::Journal;

/// Outcome of executing a plan
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    /// Indices of steps that completed
    pub completed: BTreeSet<usize>,
    pub failures: Vec<OperationFailure>,
    /// Empty directories removed after deletes
    pub pruned: Vec<(Side, RelPath)>,
    /// Directories an rmdir step found not empty and left in place
    pub kept_dirs: Vec<(Side, RelPath)>,
    /// Stopped by the cancellation token
    pub cancelled: bool,
    /// Stopped after a failure with resilient mode off
    pub halted: bool,
}

impl ExecutionReport {
    /// Every selected step completed.
    pub fn is_complete(&self, selected: usize) -> bool {
        self.failures.is_empty() && !self.cancelled && !self.halted && self.completed.len() == selected
    }
}

/// What a successful step did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Applied {
    Done,
    DirKept,
}

/// Executes plans against a pair of backends.
pub struct Executor<'a> {
    sides: [&'a dyn Backend; 2],
    backups: [Option<&'a dyn Backend>; 2],
    options: &'a Options,
    journal: Option<&'a Journal>,
    cancel: CancellationToken,
}

impl<'a> Executor<'a> {
    pub fn new(
        path1: &'a dyn Backend,
        path2: &'a dyn Backend,
        options: &'a Options,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            sides: [path1, path2],
            backups: [None, None],
            options,
            journal: None,
            cancel,
        }
    }

    /// Move deleted files into these backends instead of discarding them.
    pub fn with_backups(mut self, backup1: Option<&'a dyn Backend>, backup2: Option<&'a dyn Backend>) -> Self {
        self.backups = [backup1, backup2];
        self
    }

    pub fn with_journal(mut self, journal: &'a Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    fn side(&self, side: Side) -> &'a dyn Backend {
        self.sides[side.index()]
    }

    /// Execute every step of `plan`.
    pub async fn execute(&self, plan: &Plan) -> ExecutionReport {
        let all: BTreeSet<usize> = (0..plan.len()).collect();
        self.execute_selected(plan, &all).await
    }

    /// Execute only the steps whose index is in `selected`, keeping phase
    /// order.
    pub async fn execute_selected(&self, plan: &Plan, selected: &BTreeSet<usize>) -> ExecutionReport {
        let mut report = ExecutionReport::default();
        let halt = self.cancel.child_token();
        let transfers = self.options.transfers.max(1);

        for phase in plan.phases() {
            if halt.is_cancelled() {
                break;
            }
            let indices: Vec<usize> = phase.filter(|i| selected.contains(i)).collect();

            let outcomes: Vec<(usize, Option<Result<Applied, String>>)> = stream::iter(indices)
                .map(|index| {
                    let halt = &halt;
                    async move {
                        if halt.is_cancelled() {
                            return (index, None);
                        }
                        let step = &plan.steps[index];
                        let outcome = self.apply(step).await.map_err(|e| e.to_string());
                        self.journal_outcome(index, &outcome);
                        if let Err(message) = &outcome {
                            error!(op = %step.op, error = %message, "Operation failed");
                            if !self.options.resilient {
                                halt.cancel();
                            }
                        }
                        (index, Some(outcome))
                    }
                })
                .buffer_unordered(transfers)
                .collect()
                .await;

            for (index, outcome) in outcomes {
                match outcome {
                    Some(Ok(applied)) => {
                        if applied == Applied::DirKept {
                            let op = &plan.steps[index].op;
                            report.kept_dirs.push((op.target(), op.path().clone()));
                        }
                        report.completed.insert(index);
                    }
                    Some(Err(message)) => report.failures.push(OperationFailure {
                        op: plan.steps[index].op.clone(),
                        message,
                    }),
                    None => {}
                }
            }
        }

        report.cancelled = self.cancel.is_cancelled();
        report.halted = !self.options.resilient && !report.failures.is_empty();

        if self.options.remove_empty_dirs && !report.cancelled && !report.halted {
            report.pruned = self.prune_empty_dirs(plan, &report.completed).await;
        }

        if report.cancelled {
            warn!(completed = report.completed.len(), "Execution cancelled");
        } else {
            info!(
                completed = report.completed.len(),
                failed = report.failures.len(),
                "Execution finished"
            );
        }
        report
    }

    fn journal_outcome(&self, index: usize, outcome: &Result<Applied, String>) {
        let Some(journal) = self.journal else {
            return;
        };
        let written = match outcome {
            Ok(_) => journal.record_done(index),
            Err(message) => journal.record_failed(index, message),
        };
        if let Err(e) = written {
            warn!(index, error = %e, "Failed to write journal record");
        }
    }

    async fn apply(&self, step: &Step) -> bisync_fs::Result<Applied> {
        debug!(op = %step.op, "Applying");
        match &step.op {
            Operation::Copy { from, path } => {
                let data = self.side(*from).read(path).await?;
                let modified = step.source.as_ref().map_or_else(Utc::now, |e| e.modified);
                self.side(from.other()).write(path, data, modified).await?;
            }
            Operation::Delete { side, path } => self.delete(step, *side, path).await?,
            Operation::Rename { side, from, to } => self.side(*side).rename(from, to).await?,
            Operation::Mkdir { side, path } => self.side(*side).mkdir(path).await?,
            Operation::Rmdir { side, path } => match self.side(*side).rmdir(path).await {
                Ok(false) => {
                    debug!(path = %path, side = %side, "Directory not empty, left in place");
                    return Ok(Applied::DirKept);
                }
                Ok(true) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            },
        }
        Ok(Applied::Done)
    }

    async fn delete(&self, step: &Step, side: Side, path: &RelPath) -> bisync_fs::Result<()> {
        let backend = self.side(side);
        if let Some(backup) = self.backups[side.index()] {
            let modified = step.source.as_ref().map_or_else(Utc::now, |e| e.modified);
            match backend.read(path).await {
                Ok(data) => {
                    backup.write(path, data, modified).await?;
                    debug!(path = %path, backup = %backup.location(), "Backed up before delete");
                }
                Err(e) if e.is_not_found() => return Ok(()),
                Err(e) => return Err(e),
            }
        }
        match backend.delete(path).await {
            Err(e) if e.is_not_found() => Ok(()),
            other => other,
        }
    }

    /// Remove directories emptied by completed deletes and renames.
    async fn prune_empty_dirs(&self, plan: &Plan, completed: &BTreeSet<usize>) -> Vec<(Side, RelPath)> {
        let mut candidates: BTreeSet<(usize, Side, RelPath)> = BTreeSet::new();
        for index in completed {
            let (side, path) = match &plan.steps[*index].op {
                Operation::Delete { side, path } | Operation::Rmdir { side, path } => (*side, path),
                Operation::Rename { side, from, .. } => (*side, from),
                _ => continue,
            };
            for dir in path.ancestors() {
                candidates.insert((usize::MAX - dir.depth(), side, dir));
            }
        }

        // A directory replaced by a copied file is no longer a directory
        let replaced: BTreeSet<(Side, &RelPath)> = completed
            .iter()
            .filter_map(|index| match &plan.steps[*index].op {
                Operation::Copy { from, path } => Some((from.other(), path)),
                _ => None,
            })
            .collect();

        let mut pruned = Vec::new();
        for (_, side, dir) in candidates {
            if replaced.contains(&(side, &dir)) {
                continue;
            }
            match self.side(side).rmdir(&dir).await {
                Ok(true) => {
                    debug!(path = %dir, side = %side, "Removed empty directory");
                    pruned.push((side, dir));
                }
                Ok(false) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => warn!(path = %dir, side = %side, error = %e, "Failed to remove empty directory"),
            }
        }
        pruned
    }
}
