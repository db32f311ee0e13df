//! Run results
//!
//! [`RunReport`] is what a run hands back to its caller: the classified
//! actions, the plan, per-operation failures and the human-readable lines
//! the run printed.

use bisync_fs::RelPath;
use serde::Serialize;
use tracing::info;

use crate::conflict::Resolution;
use crate::delta::Action;
use crate::plan::{Operation, Plan};

/// Entry point a run took
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Normal,
    Resync,
    Recover,
    CheckOnly,
    DryRun,
}

/// Classified action for one path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathAction {
    pub path: RelPath,
    pub action: Action,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
}

/// A single operation that did not complete
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationFailure {
    pub op: Operation,
    pub message: String,
}

impl std::fmt::Display for OperationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.op, self.message)
    }
}

/// What recovery found in the interrupted run's journal
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoverySummary {
    pub interrupted_run: Option<String>,
    /// Steps already applied, not redone
    pub completed: usize,
    /// Steps replayed because their source was unchanged
    pub replayed: usize,
    /// Steps skipped because their source changed since planning
    pub stale: usize,
}

/// Result of one reconciliation run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub success: bool,
    pub mode: RunMode,
    pub dry_run: bool,
    pub actions: Vec<PathAction>,
    pub plan: Vec<Operation>,
    pub copies: usize,
    pub deletes: usize,
    pub renames: usize,
    pub conflicts: usize,
    pub failures: Vec<OperationFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery: Option<RecoverySummary>,
    /// Reason a resilient run stopped early
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
    pub output: Vec<String>,
}

impl RunReport {
    pub fn new(run_id: impl Into<String>, mode: RunMode, dry_run: bool) -> Self {
        Self {
            run_id: run_id.into(),
            success: false,
            mode,
            dry_run,
            actions: Vec::new(),
            plan: Vec::new(),
            copies: 0,
            deletes: 0,
            renames: 0,
            conflicts: 0,
            failures: Vec::new(),
            recovery: None,
            aborted: None,
            output: Vec::new(),
        }
    }

    /// Record a line of operator output and log it.
    pub fn note(&mut self, line: impl Into<String>) {
        let line = line.into();
        info!("{}", line);
        self.output.push(line);
    }

    /// Copy plan contents and counters into the report.
    pub fn record_plan(&mut self, plan: &Plan) {
        self.plan = plan.operations().cloned().collect();
        self.copies = plan.copies();
        self.deletes = plan.deletes();
        self.renames = plan.renames();
    }

    /// Paths whose action is not `Unchanged`.
    pub fn changed_actions(&self) -> impl Iterator<Item = &PathAction> {
        self.actions.iter().filter(|a| a.action != Action::Unchanged)
    }

    /// One-line summary of the run.
    pub fn summary(&self) -> String {
        let outcome = if self.success {
            "completed"
        } else if self.aborted.is_some() {
            "aborted"
        } else {
            "completed with errors"
        };
        format!(
            "Bisync {}: {} copies, {} deletes, {} renames, {} conflicts, {} failures",
            outcome,
            self.copies,
            self.deletes,
            self.renames,
            self.conflicts,
            self.failures.len()
        )
    }
}
