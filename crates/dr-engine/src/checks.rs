//! Precheck definitions.
//!
//! Each check is a tagged variant carrying the data it needs. Running a check
//! never fails: remote errors are turned into problems so the engine keeps
//! evaluating the other objects.

use dr_shared::{
    CheckKind, PoolMetadataUnit, Problem, RecoverableObject, RecoveryMode, RemedialAction,
    StorageRef,
};
use tracing::debug;

use crate::control_plane::{ControlPlane, SessionToken};

/// A single precheck instance
#[derive(Debug, Clone)]
pub enum Check {
    /// Target pool HA must be off for a dry run
    HaStatus,
    /// The object must not be live in its origin pool
    StillRunningInSource {
        unit: usize,
        object: RecoverableObject,
    },
    /// No UUID or name collision in the target pool
    AlreadyExistsInTarget {
        unit: usize,
        object: RecoverableObject,
    },
    /// The metadata session can recover the object into the target pool
    CanBeRecovered {
        unit: usize,
        object: RecoverableObject,
    },
}

impl Check {
    pub fn kind(&self) -> CheckKind {
        match self {
            Check::HaStatus => CheckKind::HaStatus,
            Check::StillRunningInSource { .. } => CheckKind::StillRunningInSource,
            Check::AlreadyExistsInTarget { .. } => CheckKind::AlreadyExistsInTarget,
            Check::CanBeRecovered { .. } => CheckKind::CanBeRecovered,
        }
    }

    /// Index of the metadata unit this check is about
    pub fn unit(&self) -> Option<usize> {
        match self {
            Check::HaStatus => None,
            Check::StillRunningInSource { unit, .. }
            | Check::AlreadyExistsInTarget { unit, .. }
            | Check::CanBeRecovered { unit, .. } => Some(*unit),
        }
    }

    pub fn object(&self) -> Option<&RecoverableObject> {
        match self {
            Check::HaStatus => None,
            Check::StillRunningInSource { object, .. }
            | Check::AlreadyExistsInTarget { object, .. }
            | Check::CanBeRecovered { object, .. } => Some(object),
        }
    }

    pub fn needs_session(&self) -> bool {
        matches!(self, Check::CanBeRecovered { .. })
    }

    pub fn description(&self) -> String {
        match self {
            Check::HaStatus => "High availability is disabled on the target pool".to_string(),
            Check::StillRunningInSource { object, .. } => {
                format!("{} is not running in its source pool", object.label())
            }
            Check::AlreadyExistsInTarget { object, .. } => {
                format!("{} does not already exist in the target pool", object.label())
            }
            Check::CanBeRecovered { object, .. } => {
                format!("{} can be recovered", object.label())
            }
        }
    }

    /// Run the check.
    ///
    /// `session` must be the open metadata session of this check's unit when
    /// `needs_session()` is true.
    pub async fn run(
        &self,
        control_plane: &dyn ControlPlane,
        units: &[PoolMetadataUnit],
        session: Option<&SessionToken>,
    ) -> Vec<Problem> {
        let kind = self.kind();
        let desc = self.description();
        let storage = self.unit().and_then(|i| units.get(i)).map(|u| &u.storage);
        debug!(check = %desc, "running check");

        let problems = match self {
            Check::HaStatus => match control_plane.target_pool().await {
                Ok(pool) if pool.ha_enabled => vec![Problem::blocking(
                    kind,
                    &desc,
                    &format!("High availability is enabled on pool '{}'", pool.name),
                )
                .with_fix(
                    RemedialAction::DisableHa {
                        pool: pool.name.clone(),
                    },
                    "Disable HA",
                )
                .with_unwind(RemedialAction::EnableHa { pool: pool.name })],
                Ok(_) => vec![],
                Err(e) => vec![Problem::warning(
                    kind,
                    &desc,
                    &format!("Could not determine the HA status of the target pool: {}", e),
                )],
            },

            Check::StillRunningInSource { unit, object } => {
                let Some(source) = units.get(*unit).map(|u| &u.source_pool) else {
                    return vec![];
                };
                match control_plane.running_in_source(source, object).await {
                    Ok(true) => vec![Problem::blocking(
                        kind,
                        &desc,
                        &format!(
                            "{} is running in source pool '{}'",
                            object.label(),
                            source.name
                        ),
                    )
                    .for_object(object.id())
                    .with_fix(
                        RemedialAction::ShutdownInSource {
                            pool: source.name.clone(),
                            object: object.id().clone(),
                        },
                        "Shut down in source pool",
                    )],
                    Ok(false) => vec![],
                    // An unreachable source pool is the normal failover case.
                    Err(e) => vec![Problem::warning(
                        kind,
                        &desc,
                        &format!(
                            "Could not determine whether {} is running in source pool '{}': {}",
                            object.label(),
                            source.name,
                            e
                        ),
                    )
                    .for_object(object.id())],
                }
            }

            Check::AlreadyExistsInTarget { object, .. } => {
                match control_plane.find_in_target(object).await {
                    Ok(Some(existing)) if existing.id == *object.id() => vec![Problem::blocking(
                        kind,
                        &desc,
                        &format!("{} already exists in the target pool", object.label()),
                    )
                    .for_object(object.id())
                    .with_fix(
                        RemedialAction::DestroyInTarget {
                            object: existing.id.clone(),
                            name: existing.name.clone(),
                        },
                        &format!("Delete existing '{}'", existing.name),
                    )],
                    Ok(Some(existing)) => {
                        let renamed = format!("{} (pre-recovery)", existing.name);
                        vec![Problem::blocking(
                            kind,
                            &desc,
                            &format!(
                                "An object named '{}' already exists in the target pool",
                                existing.name
                            ),
                        )
                        .for_object(object.id())
                        .with_fix(
                            RemedialAction::RenameInTarget {
                                object: existing.id.clone(),
                                from: existing.name.clone(),
                                to: renamed.clone(),
                            },
                            &format!("Rename existing to '{}'", renamed),
                        )
                        .with_unwind(RemedialAction::RenameInTarget {
                            object: existing.id,
                            from: renamed,
                            to: existing.name,
                        })]
                    }
                    Ok(None) => vec![],
                    Err(e) => vec![Problem::blocking(
                        kind,
                        &desc,
                        &format!(
                            "Could not check the target pool for {}: {}",
                            object.label(),
                            e
                        ),
                    )
                    .for_object(object.id())],
                }
            }

            Check::CanBeRecovered { object, .. } => {
                let Some(token) = session else {
                    return with_unit(
                        vec![Problem::blocking(
                            kind,
                            &desc,
                            &format!(
                                "Cannot verify {}: no metadata session is open",
                                object.label()
                            ),
                        )
                        .for_object(object.id())],
                        storage,
                    );
                };
                match control_plane.assert_can_be_recovered(token, object).await {
                    Ok(missing) => missing
                        .into_iter()
                        .map(|sr| missing_storage_problem(kind, &desc, object, sr))
                        .collect(),
                    Err(e) => vec![Problem::blocking(
                        kind,
                        &desc,
                        &format!("{} cannot be recovered: {}", object.label(), e),
                    )
                    .for_object(object.id())],
                }
            }
        };

        with_unit(problems, storage)
    }
}

fn missing_storage_problem(
    kind: CheckKind,
    desc: &str,
    object: &RecoverableObject,
    storage: StorageRef,
) -> Problem {
    Problem::blocking(
        kind,
        desc,
        &format!(
            "{} needs storage {} which is not attached to the target pool",
            object.label(),
            storage
        ),
    )
    .for_object(object.id())
    .with_fix(
        RemedialAction::AttachStorage {
            storage: storage.clone(),
        },
        &format!("Attach storage {}", storage),
    )
    .with_unwind(RemedialAction::DetachStorage { storage })
}

fn with_unit(problems: Vec<Problem>, storage: Option<&StorageRef>) -> Vec<Problem> {
    match storage {
        Some(sr) => problems.into_iter().map(|p| p.in_unit(sr)).collect(),
        None => problems,
    }
}

/// Problem raised for every object of a unit whose check session would not open
pub fn session_problem(check: &Check, storage: &StorageRef, error: &str) -> Problem {
    let mut problem = Problem::blocking(
        check.kind(),
        &check.description(),
        &format!("Could not open metadata session on {}: {}", storage, error),
    )
    .in_unit(storage);
    if let Some(object) = check.object() {
        problem = problem.for_object(object.id());
    }
    problem
}

/// A labelled, ordered set of checks
#[derive(Debug, Clone)]
pub struct CheckGroup {
    pub kind: CheckKind,
    pub label: String,
    pub checks: Vec<Check>,
}

impl CheckGroup {
    fn new(kind: CheckKind) -> Self {
        Self {
            kind,
            label: kind.group_label().to_string(),
            checks: Vec::new(),
        }
    }

    /// Whether this group runs one check per recoverable object
    pub fn is_per_object(&self) -> bool {
        self.kind != CheckKind::HaStatus
    }
}

/// Build the check groups for `units` in their fixed dependency order.
///
/// Groups without checks are omitted.
pub fn generate_check_groups(units: &[PoolMetadataUnit], mode: RecoveryMode) -> Vec<CheckGroup> {
    let mut groups = Vec::new();

    if mode.is_dry_run() {
        let mut ha = CheckGroup::new(CheckKind::HaStatus);
        ha.checks.push(Check::HaStatus);
        groups.push(ha);
    }

    let per_object: &[CheckKind] = if mode.is_dry_run() {
        &[CheckKind::AlreadyExistsInTarget, CheckKind::CanBeRecovered]
    } else {
        &[
            CheckKind::StillRunningInSource,
            CheckKind::AlreadyExistsInTarget,
            CheckKind::CanBeRecovered,
        ]
    };

    for kind in per_object {
        let mut group = CheckGroup::new(*kind);
        for (unit, metadata) in units.iter().enumerate() {
            for object in metadata.recoverable_objects() {
                group.checks.push(match kind {
                    CheckKind::StillRunningInSource => Check::StillRunningInSource { unit, object },
                    CheckKind::AlreadyExistsInTarget => Check::AlreadyExistsInTarget { unit, object },
                    _ => Check::CanBeRecovered { unit, object },
                });
            }
        }
        groups.push(group);
    }

    groups.retain(|g| !g.checks.is_empty());
    groups
}
