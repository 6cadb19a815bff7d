//! Events streamed from the engine to whoever drives the UI.
//!
//! The stream is one-directional and ordered. The engine never reads UI state.

use crate::model::{ObjectId, ObjectKind, StorageRef};
use crate::problem::{CheckKind, Problem, RemedialAction};
use crate::record::RecoveryState;
use serde::{Deserialize, Serialize};

/// Outcome of the post-recovery start stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "message", rename_all = "snake_case")]
pub enum StartOutcome {
    Started,
    Failed(String),
    /// Nothing reached `Recovered`, so no start call was made
    Skipped,
}

/// Totals emitted when the recovery batch completes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchTotals {
    pub recovered: usize,
    pub failed: usize,
    pub not_attempted: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DrEvent {
    /// A check group is starting
    Header { label: String },
    Problem { problem: Problem },
    /// A check instance ran and found nothing
    Ok {
        check: CheckKind,
        description: String,
    },
    Progress { percent: u8 },
    RecoveryRow {
        unit: StorageRef,
        object: ObjectId,
        name: String,
        kind: ObjectKind,
        state: RecoveryState,
    },
    BatchComplete { totals: BatchTotals },
    StartResult {
        requested: usize,
        paused: bool,
        outcome: StartOutcome,
    },
    Unwound {
        action: RemedialAction,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl DrEvent {
    /// Format for debug display and log lines
    pub fn format_debug(&self) -> String {
        match self {
            DrEvent::Header { label } => format!("[dr] == {}", label),
            DrEvent::Problem { problem } => {
                format!("[dr] {} {}", problem.severity, problem.description)
            }
            DrEvent::Ok { description, .. } => format!("[dr] ok: {}", description),
            DrEvent::Progress { percent } => format!("[dr] progress {}%", percent),
            DrEvent::RecoveryRow {
                kind, name, state, ..
            } => format!("[dr] {} '{}' {}", kind, name, state),
            DrEvent::BatchComplete { totals } => format!(
                "[dr] batch complete: {} recovered, {} failed, {} not attempted",
                totals.recovered, totals.failed, totals.not_attempted
            ),
            DrEvent::StartResult {
                requested,
                paused,
                outcome,
            } => {
                let verb = if *paused { "pause" } else { "start" };
                match outcome {
                    StartOutcome::Started => format!("[dr] {} of {} object(s) ok", verb, requested),
                    StartOutcome::Failed(msg) => {
                        format!("[dr] {} of {} object(s) FAILED: {}", verb, requested, msg)
                    }
                    StartOutcome::Skipped => format!("[dr] {} skipped: nothing recovered", verb),
                }
            }
            DrEvent::Unwound { action, error } => match error {
                None => format!("[dr] unwound: {}", action),
                Some(e) => format!("[dr] unwind FAILED: {} ({})", action, e),
            },
        }
    }
}
