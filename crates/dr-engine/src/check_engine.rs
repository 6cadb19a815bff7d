//! Check engine: runs the precheck groups against the selected units.
//!
//! Flow per group:
//! 1. Emit the group header
//! 2. Run each check in list order, emitting `Problem` or `Ok`
//! 3. Report the group's problems once all its checks have run
//!
//! "Can be recovered" checks borrow a metadata session for their unit. It is
//! opened on the unit's first check in the group and released right after
//! the unit's last one. This session is separate from the recovery wave's.

use dr_shared::{total_objects, DrEvent, PoolMetadataUnit, Problem, ProgressMeter, RecoveryMode};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cancel::CancellationFlag;
use crate::checks::{generate_check_groups, session_problem, CheckGroup};
use crate::control_plane::ControlPlane;
use crate::emitter::ChannelEmitter;
use crate::session::{MetadataSessionManager, SessionHandle};

/// Result of a full check pass
#[derive(Debug, Clone, Default)]
pub struct CheckReport {
    pub problems: Vec<Problem>,
    /// Labels of the groups that ran, in order
    pub groups: Vec<String>,
    pub cancelled: bool,
}

impl CheckReport {
    pub fn blocking(&self) -> impl Iterator<Item = &Problem> {
        self.problems.iter().filter(|p| p.is_blocking())
    }

    pub fn has_blocking(&self) -> bool {
        self.blocking().next().is_some()
    }
}

pub struct CheckEngine {
    control_plane: Arc<dyn ControlPlane>,
    sessions: Arc<MetadataSessionManager>,
    emitter: ChannelEmitter,
    cancel: CancellationFlag,
}

impl CheckEngine {
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        sessions: Arc<MetadataSessionManager>,
        emitter: ChannelEmitter,
        cancel: CancellationFlag,
    ) -> Self {
        Self {
            control_plane,
            sessions,
            emitter,
            cancel,
        }
    }

    /// Run every group for `units` in order.
    ///
    /// Progress counts per-object checks against
    /// `objects x per-object groups`, since object count dominates runtime.
    pub async fn run_all(&self, units: &[PoolMetadataUnit], mode: RecoveryMode) -> CheckReport {
        let groups = generate_check_groups(units, mode);
        let per_object_groups = groups.iter().filter(|g| g.is_per_object()).count();
        let mut progress = ProgressMeter::new(total_objects(units) * per_object_groups);
        let mut report = CheckReport::default();

        info!(mode = %mode, units = units.len(), groups = groups.len(), "starting prechecks");
        self.emitter.emit(DrEvent::Progress { percent: 0 });

        for group in &groups {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let problems = self.run_group(group, units, &mut progress).await;
            report.groups.push(group.label.clone());
            report.problems.extend(problems);
        }

        if self.cancel.is_cancelled() {
            report.cancelled = true;
            info!("prechecks cancelled");
        } else {
            self.emitter.emit(DrEvent::Progress {
                percent: progress.advance(0),
            });
            info!(problems = report.problems.len(), "prechecks complete");
        }
        report
    }

    /// Run one group sequentially and collect its problems.
    pub async fn run_group(
        &self,
        group: &CheckGroup,
        units: &[PoolMetadataUnit],
        progress: &mut ProgressMeter,
    ) -> Vec<Problem> {
        self.emitter.emit(DrEvent::Header {
            label: group.label.clone(),
        });

        // Last check index per unit, so the unit's session closes right after it.
        let mut last_for_unit: HashMap<usize, usize> = HashMap::new();
        for (i, check) in group.checks.iter().enumerate() {
            if let Some(unit) = check.unit() {
                last_for_unit.insert(unit, i);
            }
        }

        let mut problems = Vec::new();
        let mut handle: Option<SessionHandle> = None;
        let mut session_error: Option<(usize, String)> = None;

        for (i, check) in group.checks.iter().enumerate() {
            if self.cancel.is_cancelled() {
                info!(group = %group.label, "check group cancelled");
                break;
            }

            let unit_index = check.unit();
            let mut found = Vec::new();

            if check.needs_session() {
                if let Some(unit_index) = unit_index {
                    let unit = &units[unit_index];
                    let failed_for_unit =
                        matches!(&session_error, Some((u, _)) if *u == unit_index);
                    if handle.is_none() && !failed_for_unit {
                        match self.sessions.acquire(&unit.storage).await {
                            Ok(h) => handle = Some(h),
                            Err(e) => {
                                warn!(storage = %unit.storage, error = %e, "check session failed to open");
                                session_error = Some((unit_index, e.to_string()));
                            }
                        }
                    }
                    match (&handle, &session_error) {
                        (Some(h), _) => {
                            found = check
                                .run(self.control_plane.as_ref(), units, Some(h.token()))
                                .await;
                        }
                        (None, Some((_, message))) => {
                            found.push(session_problem(check, &unit.storage, message));
                        }
                        (None, None) => {
                            found = check.run(self.control_plane.as_ref(), units, None).await;
                        }
                    }
                }
            } else {
                found = check.run(self.control_plane.as_ref(), units, None).await;
            }

            if found.is_empty() {
                self.emitter.emit(DrEvent::Ok {
                    check: check.kind(),
                    description: check.description(),
                });
            }
            for problem in &found {
                self.emitter.emit(DrEvent::Problem {
                    problem: problem.clone(),
                });
            }
            problems.extend(found);

            if let Some(unit_index) = unit_index {
                if last_for_unit.get(&unit_index) == Some(&i) {
                    if let Some(h) = handle.take() {
                        self.sessions.release(h).await;
                    }
                }
                let percent = progress.advance(1);
                self.emitter.emit(DrEvent::Progress { percent });
            }
        }

        // Cancellation can leave the current unit's session open.
        if let Some(h) = handle.take() {
            self.sessions.release(h).await;
        }

        problems
    }
}
