//! Recovery workflow: the operator-facing entry point.
//!
//! select units -> run checks -> resolve problems -> start recovery
//! -> optional post-recovery start. `cancel` unwinds applied fixes.
//!
//! Invariants:
//! - recovery never starts while a blocking problem is outstanding
//! - every successful fix with an unwind action is in the ledger
//! - the ledger is drained newest-first on cancellation; failed unwinds stay

use dr_shared::{
    blocking_count, format_text, DrConfig, DrError, DrEvent, PoolMetadataUnit, Problem,
    RecoveryMode, RecoveryRecord, RemedialAction, RollbackLedger, RunReport, StartOutcome,
    UnitSummary,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cancel::CancellationFlag;
use crate::check_engine::{CheckEngine, CheckReport};
use crate::control_plane::{poll_to_completion, run_remedy, ControlPlane};
use crate::emitter::ChannelEmitter;
use crate::scheduler::{RecoveryScheduler, RecoverySummary};
use crate::session::MetadataSessionManager;
use crate::starter::PostRecoveryStarter;

/// Outcome of `resolve_all`
#[derive(Debug, Clone, Default)]
pub struct ResolveReport {
    pub applied: Vec<RemedialAction>,
    pub failed: Vec<(RemedialAction, DrError)>,
    /// Blocking problems left after the re-check
    pub remaining_blocking: usize,
}

pub struct RecoveryWorkflow {
    control_plane: Arc<dyn ControlPlane>,
    sessions: Arc<MetadataSessionManager>,
    emitter: ChannelEmitter,
    cancel: CancellationFlag,
    config: DrConfig,
    ledger_path: Option<PathBuf>,

    units: Vec<PoolMetadataUnit>,
    mode: RecoveryMode,
    checks_run: bool,
    problems: Vec<Problem>,
    ledger: RollbackLedger,
    summary: Option<RecoverySummary>,
    start: Option<StartOutcome>,
    unwound: Vec<RemedialAction>,
}

impl RecoveryWorkflow {
    pub fn new(control_plane: Arc<dyn ControlPlane>, config: DrConfig, emitter: ChannelEmitter) -> Self {
        let sessions = Arc::new(MetadataSessionManager::new(control_plane.clone()));
        Self {
            control_plane,
            sessions,
            emitter,
            cancel: CancellationFlag::new(),
            config,
            ledger_path: None,
            units: Vec::new(),
            mode: RecoveryMode::default(),
            checks_run: false,
            problems: Vec::new(),
            ledger: RollbackLedger::new(),
            summary: None,
            start: None,
            unwound: Vec::new(),
        }
    }

    /// Persist the rollback ledger to `path` after every change
    pub fn with_ledger_path(mut self, path: PathBuf) -> Self {
        self.ledger_path = Some(path);
        self
    }

    /// Shared flag another task can set while a phase is running
    pub fn cancellation(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    pub fn sessions(&self) -> Arc<MetadataSessionManager> {
        self.sessions.clone()
    }

    pub fn select_units(&mut self, units: Vec<PoolMetadataUnit>, mode: RecoveryMode) {
        info!(units = units.len(), mode = %mode, "selected metadata units");
        self.units = units;
        self.mode = mode;
        self.checks_run = false;
        self.problems.clear();
        self.summary = None;
        self.start = None;
    }

    pub fn units(&self) -> &[PoolMetadataUnit] {
        &self.units
    }

    pub fn mode(&self) -> RecoveryMode {
        self.mode
    }

    pub fn problems(&self) -> &[Problem] {
        &self.problems
    }

    pub fn ledger(&self) -> &RollbackLedger {
        &self.ledger
    }

    /// Forward navigation is allowed once checks ran clean of blocking problems
    pub fn can_proceed(&self) -> bool {
        self.checks_run && blocking_count(&self.problems) == 0 && !self.cancel.is_cancelled()
    }

    pub async fn run_checks(&mut self) -> Result<CheckReport, DrError> {
        if self.cancel.is_cancelled() {
            return Err(DrError::Cancelled);
        }
        let engine = CheckEngine::new(
            self.control_plane.clone(),
            self.sessions.clone(),
            self.emitter.clone(),
            self.cancel.clone(),
        );
        let report = engine.run_all(&self.units, self.mode).await;
        self.problems = report.problems.clone();
        self.checks_run = !report.cancelled;
        Ok(report)
    }

    /// Apply one problem's fix and record its unwind action.
    pub async fn resolve_problem(&mut self, problem: &Problem) -> Result<(), DrError> {
        if !problem.is_fixable() {
            return Err(DrError::NotFixable(problem.description.clone()));
        }
        let Some(fix) = &problem.fix else {
            return Err(DrError::NotFixable(problem.description.clone()));
        };

        info!(fix = %fix, "resolving problem");
        run_remedy(self.control_plane.as_ref(), fix, &self.config.task).await?;

        if let Some(unwind) = &problem.unwind {
            self.ledger.record(unwind.clone(), &problem.description);
            self.persist_ledger();
        }
        self.problems.retain(|p| p.id != problem.id);
        Ok(())
    }

    /// Fix every fixable blocking problem, then re-run the whole check pass.
    ///
    /// Identical fixes shared by several problems run once.
    pub async fn resolve_all(&mut self) -> Result<ResolveReport, DrError> {
        let mut report = ResolveReport::default();
        let candidates: Vec<Problem> = self
            .problems
            .iter()
            .filter(|p| p.is_blocking() && p.is_fixable())
            .cloned()
            .collect();

        for problem in candidates {
            if self.cancel.is_cancelled() {
                return Err(DrError::Cancelled);
            }
            let Some(fix) = problem.fix.clone() else {
                continue;
            };
            if report.applied.contains(&fix) {
                continue;
            }
            match self.resolve_problem(&problem).await {
                Ok(()) => report.applied.push(fix),
                Err(e) => {
                    warn!(fix = %fix, error = %e, "fix failed");
                    report.failed.push((fix, e));
                }
            }
        }

        let recheck = self.run_checks().await?;
        report.remaining_blocking = recheck.blocking().count();
        Ok(report)
    }

    /// Run every wave, then the optional post-recovery start.
    pub async fn start_recovery(&mut self) -> Result<RecoverySummary, DrError> {
        if self.cancel.is_cancelled() {
            return Err(DrError::Cancelled);
        }
        if !self.checks_run {
            return Err(DrError::ChecksNotRun);
        }
        let blocking = blocking_count(&self.problems);
        if blocking > 0 {
            return Err(DrError::BlockingProblems(blocking));
        }

        let scheduler = RecoveryScheduler::new(
            self.control_plane.clone(),
            self.sessions.clone(),
            self.emitter.clone(),
            self.cancel.clone(),
            self.config.task.clone(),
        );
        let summary = scheduler.run(&self.units).await;

        if self.config.start.start_after_recovery && !summary.cancelled {
            let starter = PostRecoveryStarter::new(
                self.control_plane.clone(),
                self.emitter.clone(),
                self.config.task.clone(),
            );
            let outcome = starter
                .start(&summary.recovered_ids(), self.config.start.start_paused)
                .await;
            self.start = Some(outcome);
        }

        self.summary = Some(summary.clone());
        Ok(summary)
    }

    /// Override the configured post-recovery start behaviour
    pub fn set_start_options(&mut self, start: bool, paused: bool) {
        self.config.start.start_after_recovery = start;
        self.config.start.start_paused = paused;
    }

    /// Stop at the next object boundary and unwind every applied fix.
    ///
    /// Fixes whose unwind fails stay in the ledger for a later retry.
    pub async fn cancel(&mut self) -> Vec<DrError> {
        self.cancel.cancel();
        info!(entries = self.ledger.len(), "cancelling; unwinding applied fixes");

        let control_plane = self.control_plane.clone();
        let task = self.config.task.clone();
        let report = self
            .ledger
            .unwind_all(|action| {
                let control_plane = control_plane.clone();
                let task = task.clone();
                async move { run_remedy(control_plane.as_ref(), &action, &task).await }
            })
            .await;

        for outcome in &report.outcomes {
            self.emitter.emit(DrEvent::Unwound {
                action: outcome.action.clone(),
                error: outcome.error.as_ref().map(|e| e.to_string()),
            });
        }
        self.unwound.extend(report.succeeded().cloned());
        self.persist_ledger();
        report
            .outcomes
            .into_iter()
            .filter_map(|o| o.error)
            .collect()
    }

    /// Destroy what a dry run recovered, leaving the target pool as it was.
    pub async fn cleanup_dry_run(&mut self) -> Result<usize, DrError> {
        if !self.mode.is_dry_run() {
            return Err(DrError::InvalidOperation(
                "cleanup only applies to dry runs".to_string(),
            ));
        }
        let ids = self
            .summary
            .as_ref()
            .map(|s| s.recovered_ids())
            .unwrap_or_default();
        if ids.is_empty() {
            return Ok(0);
        }
        info!(count = ids.len(), "cleaning up dry-run objects");
        let task = self.control_plane.destroy_objects(&ids).await?;
        poll_to_completion(self.control_plane.as_ref(), &task, &self.config.task).await?;
        Ok(ids.len())
    }

    pub fn records(&self) -> &[RecoveryRecord] {
        self.summary.as_ref().map(|s| s.records.as_slice()).unwrap_or(&[])
    }

    pub fn report(&self) -> RunReport {
        RunReport {
            mode: self.mode,
            units: self
                .units
                .iter()
                .map(|u| UnitSummary {
                    storage: u.storage.clone(),
                    source_pool: u.source_pool.name.clone(),
                    objects: u.object_count(),
                })
                .collect(),
            problems: self.problems.clone(),
            records: self.records().to_vec(),
            start: self.start.clone(),
            unwound: self.unwound.clone(),
        }
    }

    pub fn report_text(&self) -> String {
        format_text(&self.report())
    }

    fn persist_ledger(&self) {
        if let Some(path) = &self.ledger_path {
            if let Err(e) = self.ledger.save(path) {
                warn!(path = %path.display(), error = %e, "failed to save rollback ledger");
            }
        }
    }
}
