//! Run controller
//!
//! [`Bisync`] owns one sync pair and drives a run through its phases:
//!
//! ```text
//! Idle -> Locking -> Loading -> Listing -> Classifying -> Resolving
//!      -> Guarding -> Executing -> Committing -> Done
//! ```
//!
//! Any error moves the run to `Failed`. The run lock is held for the whole
//! run and released on every exit path. A new baseline is only committed
//! after every planned step succeeded; it is derived from the listings
//! taken before execution plus the applied plan, so changes made to either
//! tree while the run was executing still show up on the next run.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use bisync_fs::{Backend, LocalBackend};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::conflict::ConflictResolver;
use crate::delta::{self, Classification, Comparator, Side};
use crate::executor::Executor;
use crate::filter::FilterSet;
use crate::guard;
use crate::options::{CheckSync, Options};
use crate::plan::{Plan, Planner};
use crate::recover;
use crate::report::{PathAction, RunMode, RunReport};
use crate::snapshot::{Snapshot, SnapshotBuilder};
use crate::state::{LoadedState, StateStore};
use crate::{Error, Result};

/// Phase of a reconciliation run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Locking,
    Loading,
    Listing,
    Classifying,
    Resolving,
    Guarding,
    Executing,
    Committing,
    Done,
    Failed,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Locking => "locking",
            Self::Loading => "loading",
            Self::Listing => "listing",
            Self::Classifying => "classifying",
            Self::Resolving => "resolving",
            Self::Guarding => "guarding",
            Self::Executing => "executing",
            Self::Committing => "committing",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// A configured sync pair
pub struct Bisync {
    sides: [Arc<dyn Backend>; 2],
    backups: [Option<Arc<dyn Backend>>; 2],
    options: Options,
    filters: FilterSet,
    store: StateStore,
    cancel: CancellationToken,
}

impl fmt::Debug for Bisync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bisync")
            .field("path1", &self.sides[0].location())
            .field("path2", &self.sides[1].location())
            .field("workdir", &self.store.workdir())
            .finish()
    }
}

impl Bisync {
    /// Set up a pair. Options are validated and the filters file is read
    /// here, before any run touches the trees.
    pub fn new(path1: Arc<dyn Backend>, path2: Arc<dyn Backend>, options: Options) -> Result<Self> {
        options.validate()?;
        let filters = match &options.filters_file {
            Some(path) => FilterSet::load(path)?,
            None => FilterSet::default(),
        };
        let store = StateStore::new(options.workdir.as_deref(), &path1.location(), &path2.location())?;

        Ok(Self {
            sides: [path1, path2],
            backups: [None, None],
            options,
            filters,
            store,
            cancel: CancellationToken::new(),
        })
    }

    /// Pair of local directories, with local backup directories when the
    /// options name them.
    pub fn local(path1: impl AsRef<Path>, path2: impl AsRef<Path>, options: Options) -> Result<Self> {
        let local = |dir: &Option<String>| {
            dir.as_ref()
                .map(|d| Arc::new(LocalBackend::new(d)) as Arc<dyn Backend>)
        };
        let backup1 = local(&options.backup_dir1);
        let backup2 = local(&options.backup_dir2);

        let bisync = Self::new(
            Arc::new(LocalBackend::new(path1)),
            Arc::new(LocalBackend::new(path2)),
            options,
        )?;
        Ok(bisync.with_backup_dirs(backup1, backup2))
    }

    /// Attach the backends that receive deleted files.
    pub fn with_backup_dirs(mut self, backup1: Option<Arc<dyn Backend>>, backup2: Option<Arc<dyn Backend>>) -> Self {
        self.backups = [backup1, backup2];
        self
    }

    /// Token that cancels the run when triggered.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn state_store(&self) -> &StateStore {
        &self.store
    }

    fn backend(&self, side: Side) -> &dyn Backend {
        self.sides[side.index()].as_ref()
    }

    fn comparator(&self) -> Comparator {
        Comparator::from_options(&self.options)
    }

    fn enter(&self, run_id: &str, phase: RunPhase) {
        info!(run_id = %run_id, phase = %phase, "Run phase");
    }

    fn mode(&self) -> RunMode {
        if self.options.check_sync == CheckSync::Only {
            RunMode::CheckOnly
        } else if self.options.resync {
            RunMode::Resync
        } else if self.options.recover {
            RunMode::Recover
        } else if self.options.dry_run {
            RunMode::DryRun
        } else {
            RunMode::Normal
        }
    }

    /// Run one reconciliation.
    ///
    /// Guard failures, missing baselines and failed operations are
    /// returned as errors. A listing failure in resilient mode and partial
    /// success in resilient mode return a report with `success == false`.
    pub async fn run(&self) -> Result<RunReport> {
        let (report, outcome) = self.run_reporting().await;
        outcome.map(|()| report)
    }

    /// Run one reconciliation and hand back the report whatever the
    /// outcome, so callers can show what happened before a failure.
    pub async fn run_reporting(&self) -> (RunReport, Result<()>) {
        let run_id = Uuid::new_v4().to_string();
        let mut report = RunReport::new(&run_id, self.mode(), self.options.dry_run);
        self.enter(&run_id, RunPhase::Idle);
        report.note(format!(
            "Bisync {} <-> {} ({:?}{})",
            self.backend(Side::Path1).location(),
            self.backend(Side::Path2).location(),
            report.mode,
            if self.options.dry_run { ", dry run" } else { "" }
        ));

        let outcome = match self.run_locked(&run_id, &mut report).await {
            Ok(()) => {
                self.enter(&run_id, RunPhase::Done);
                Ok(())
            }
            Err(e @ Error::Listing { .. }) if self.options.resilient => {
                self.enter(&run_id, RunPhase::Failed);
                warn!(error = %e, "Listing failed, aborting without changes");
                report.aborted = Some(e.to_string());
                report.note(format!("Aborted: {}", e));
                Ok(())
            }
            Err(e) => {
                self.enter(&run_id, RunPhase::Failed);
                error!(run_id = %run_id, error = %e, "Run failed");
                report.aborted = Some(e.to_string());
                report.note(format!("Failed: {}", e));
                Err(e)
            }
        };
        (report, outcome)
    }

    async fn run_locked(&self, run_id: &str, report: &mut RunReport) -> Result<()> {
        for (side, configured) in [
            (Side::Path1, &self.options.backup_dir1),
            (Side::Path2, &self.options.backup_dir2),
        ] {
            if configured.is_some() && self.backups[side.index()].is_none() {
                return Err(Error::config(format!(
                    "a backup directory is configured for {} but no backup backend is attached",
                    side
                )));
            }
        }

        self.enter(run_id, RunPhase::Locking);
        let lock = self.store.acquire_lock()?;

        self.enter(run_id, RunPhase::Loading);
        let state = match self.store.load() {
            Ok(state) => state,
            Err(e @ Error::StateCorrupt { .. }) if self.options.resync => {
                warn!(error = %e, "Ignoring unreadable state, resync rebuilds it");
                LoadedState::default()
            }
            Err(e) => return Err(e),
        };

        let result = if self.options.check_sync == CheckSync::Only {
            self.check_only(&state, report)
        } else if self.options.resync {
            self.resync(run_id, &state, report).await
        } else {
            self.normal(run_id, &state, report).await
        };

        lock.release();
        result
    }

    /// Compare the stored baselines without syncing.
    fn check_only(&self, state: &LoadedState, report: &mut RunReport) -> Result<()> {
        let Some((prior1, prior2)) = state.baseline() else {
            return Err(Error::ResyncRequired {
                reason: "no baseline listings exist for this pair".to_string(),
            });
        };

        if let Err(e) = guard::check_sync(prior1, prior2, &self.comparator()) {
            self.store.mark_resync()?;
            return Err(e);
        }
        report.success = true;
        report.note(format!("Baseline listings match ({} paths)", prior1.len()));
        Ok(())
    }

    async fn list_both(&self, run_id: &str) -> Result<(Snapshot, Snapshot)> {
        self.enter(run_id, RunPhase::Listing);
        let builder = SnapshotBuilder::new(&self.options, &self.filters);
        let listing = async {
            tokio::try_join!(
                builder.build(Side::Path1, self.backend(Side::Path1)),
                builder.build(Side::Path2, self.backend(Side::Path2)),
            )
        };

        tokio::select! {
            result = listing => result,
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
        }
    }

    async fn normal(&self, run_id: &str, state: &LoadedState, report: &mut RunReport) -> Result<()> {
        let Some((prior1, prior2)) = state.baseline() else {
            return Err(Error::ResyncRequired {
                reason: "no baseline listings exist for this pair; run with --resync to create them"
                    .to_string(),
            });
        };
        if state.needs_resync() {
            return Err(Error::ResyncRequired {
                reason: "a previous run found the two sides out of sync".to_string(),
            });
        }
        if state.needs_recovery() && !self.options.recover {
            return Err(Error::RecoveryRequired);
        }
        if state.filters_checksum() != self.filters.checksum() {
            return Err(Error::ResyncRequired {
                reason: "the filters changed since the last sync".to_string(),
            });
        }

        if self.options.recover {
            self.replay_interrupted(run_id, state, report).await?;
        }

        let (cur1, cur2) = self.list_both(run_id).await?;
        if self.options.check_access {
            guard::check_access(&cur1, &cur2, &self.options.check_filename)?;
        }

        self.enter(run_id, RunPhase::Classifying);
        let classification = delta::classify(prior1, prior2, &cur1, &cur2, &self.comparator());
        let counts = classification.counts();
        report.note(format!(
            "{} paths: {} new, {} changed, {} deleted, {} conflicts",
            classification.total(),
            counts.created,
            counts.modified,
            counts.deleted,
            counts.conflicts
        ));

        self.enter(run_id, RunPhase::Resolving);
        let resolutions = ConflictResolver::new(&self.options).resolve_all(&classification, &cur1, &cur2);
        report.conflicts = resolutions.len();
        report.actions = classification
            .actions
            .iter()
            .map(|(path, action)| PathAction {
                path: path.clone(),
                action: *action,
                resolution: resolutions.get(path).copied(),
            })
            .collect();
        let plan = Planner::new(&self.options, &cur1, &cur2).plan(&classification, &resolutions);

        self.enter(run_id, RunPhase::Guarding);
        guard::check_delete_threshold(&classification, self.options.max_delete, self.options.force)?;

        self.execute_and_commit(run_id, &plan, &cur1, &cur2, report).await
    }

    /// Finish the steps of an interrupted run that are still pending.
    async fn replay_interrupted(&self, run_id: &str, state: &LoadedState, report: &mut RunReport) -> Result<()> {
        if !state.needs_recovery() {
            report.note("No interrupted run to recover");
            return Ok(());
        }
        let Some(journal) = self.store.load_journal()? else {
            report.note("No journal of the interrupted run; continuing with a full comparison");
            return Ok(());
        };

        let (cur1, cur2) = self.list_both(run_id).await?;
        let assessment = recover::assess(&journal, &cur1, &cur2, &self.comparator());
        let mut replayed = 0;

        if !self.options.dry_run && !assessment.pending.is_empty() {
            self.enter(run_id, RunPhase::Executing);
            let journal = self.store.begin_journal(run_id, &assessment.plan)?;
            for index in &assessment.completed {
                journal.record_done(*index)?;
            }
            self.store.mark_dirty(run_id)?;

            let outcome = self
                .executor()
                .with_journal(&journal)
                .execute_selected(&assessment.plan, &assessment.pending)
                .await;
            if outcome.cancelled {
                return Err(Error::Cancelled);
            }
            replayed = outcome.completed.len();
            if !outcome.failures.is_empty() && !self.options.resilient {
                return Err(Error::OperationsFailed {
                    failures: outcome.failures,
                });
            }
            report.failures.extend(outcome.failures);
        }

        report.note(format!(
            "Recovered run {}: {} steps already applied, {} replayed, {} stale",
            assessment.run_id,
            assessment.completed.len(),
            replayed,
            assessment.stale.len()
        ));
        report.recovery = Some(assessment.summary(replayed));
        Ok(())
    }

    async fn resync(&self, run_id: &str, state: &LoadedState, report: &mut RunReport) -> Result<()> {
        if state.needs_recovery() {
            warn!("Resync replaces the state of an interrupted run");
        }
        let (cur1, cur2) = self.list_both(run_id).await?;
        if self.options.check_access {
            guard::check_access(&cur1, &cur2, &self.options.check_filename)?;
        }

        let (plan, actions) = Planner::new(&self.options, &cur1, &cur2).plan_resync(&self.comparator());
        report.actions = actions
            .iter()
            .map(|(path, action)| PathAction {
                path: path.clone(),
                action: *action,
                resolution: None,
            })
            .collect();
        report.note(format!(
            "Resync ({}): {} paths, {} to copy, {} to delete",
            self.options.resync_mode,
            actions.len(),
            plan.copies(),
            plan.deletes()
        ));

        self.enter(run_id, RunPhase::Guarding);
        let classification = Classification { actions };
        guard::check_delete_threshold(&classification, self.options.max_delete, self.options.force)?;

        self.execute_and_commit(run_id, &plan, &cur1, &cur2, report).await
    }

    fn executor(&self) -> Executor<'_> {
        Executor::new(
            self.backend(Side::Path1),
            self.backend(Side::Path2),
            &self.options,
            self.cancel.clone(),
        )
        .with_backups(self.backups[0].as_deref(), self.backups[1].as_deref())
    }

    async fn execute_and_commit(
        &self,
        run_id: &str,
        plan: &Plan,
        cur1: &Snapshot,
        cur2: &Snapshot,
        report: &mut RunReport,
    ) -> Result<()> {
        report.record_plan(plan);
        for op in plan.operations() {
            if self.options.dry_run {
                report.note(format!("  (dry run) {}", op));
            } else {
                report.note(format!("  {}", op));
            }
        }

        if self.options.dry_run {
            report.success = true;
            report.note("Dry run: no changes made");
            return Ok(());
        }

        self.enter(run_id, RunPhase::Executing);
        let journal = if plan.is_empty() {
            None
        } else {
            let journal = self.store.begin_journal(run_id, plan)?;
            self.store.mark_dirty(run_id)?;
            Some(journal)
        };

        let mut executor = self.executor();
        if let Some(journal) = &journal {
            executor = executor.with_journal(journal);
        }
        let outcome = executor.execute(plan).await;
        report.failures.extend(outcome.failures.iter().cloned());

        if outcome.cancelled {
            return Err(Error::Cancelled);
        }
        if !outcome.is_complete(plan.len()) {
            if self.options.resilient {
                self.store.mark_clean()?;
                if !self.options.no_cleanup {
                    self.store.clear_journal()?;
                }
                report.note(report.summary());
                report.note("Baseline kept; the next run retries the failed paths");
                return Ok(());
            }
            return Err(Error::OperationsFailed {
                failures: outcome.failures,
            });
        }

        self.enter(run_id, RunPhase::Committing);
        let [new1, new2] = plan.project(cur1, cur2, &outcome.pruned, &outcome.kept_dirs);
        if self.options.check_sync == CheckSync::True
            && let Err(e) = guard::check_sync(&new1, &new2, &self.comparator())
        {
            self.store.mark_clean()?;
            self.store.mark_resync()?;
            return Err(e);
        }

        self.store
            .save(&new1, &new2, self.filters.checksum(), run_id, self.options.no_cleanup)?;
        if !self.options.no_cleanup {
            self.store.clear_journal()?;
        }

        report.success = report.failures.is_empty();
        report.note(report.summary());
        Ok(())
    }
}
