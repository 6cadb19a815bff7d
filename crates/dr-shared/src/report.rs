//! Final operator report for a recovery run.
//!
//! Derived from recorded data only; same input gives the same text.

use crate::events::StartOutcome;
use crate::model::{RecoveryMode, StorageRef};
use crate::problem::{Problem, RemedialAction};
use crate::record::{RecoveryRecord, RecoveryState};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitSummary {
    pub storage: StorageRef,
    pub source_pool: String,
    pub objects: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub mode: RecoveryMode,
    pub units: Vec<UnitSummary>,
    /// Problems still outstanding after the last check pass
    pub problems: Vec<Problem>,
    /// Records in unit-selection then discovery order
    pub records: Vec<RecoveryRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<StartOutcome>,
    #[serde(default)]
    pub unwound: Vec<RemedialAction>,
}

impl RunReport {
    pub fn recovered(&self) -> usize {
        self.records.iter().filter(|r| r.is_recovered()).count()
    }

    pub fn failed(&self) -> usize {
        self.records
            .iter()
            .filter(|r| matches!(r.state, RecoveryState::Error(_)))
            .count()
    }

    pub fn executive_summary(&self) -> String {
        if self.records.is_empty() {
            return format!(
                "{}: no recovery performed ({} problem(s) outstanding)",
                self.mode,
                self.problems.len()
            );
        }
        format!(
            "{}: {} of {} object(s) recovered, {} failed",
            self.mode,
            self.recovered(),
            self.records.len(),
            self.failed()
        )
    }
}

/// Format the report as plain text
pub fn format_text(report: &RunReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("Disaster recovery report ({})\n", report.mode));
    out.push_str(&format!("{}\n\n", report.executive_summary()));

    for unit in &report.units {
        out.push_str(&format!(
            "Unit {} (pool '{}', {} object(s))\n",
            unit.storage, unit.source_pool, unit.objects
        ));
        for record in report.records.iter().filter(|r| r.unit == unit.storage) {
            out.push_str(&format!(
                "  {} '{}': {}\n",
                record.kind, record.name, record.state
            ));
        }
    }

    if !report.problems.is_empty() {
        out.push_str("\nOutstanding problems:\n");
        for p in &report.problems {
            out.push_str(&format!("  {}\n", p));
        }
    }

    if let Some(start) = &report.start {
        let line = match start {
            StartOutcome::Started => "started".to_string(),
            StartOutcome::Failed(msg) => format!("failed: {}", msg),
            StartOutcome::Skipped => "skipped".to_string(),
        };
        out.push_str(&format!("\nPost-recovery start: {}\n", line));
    }

    if !report.unwound.is_empty() {
        out.push_str("\nUnwound fixes:\n");
        for a in &report.unwound {
            out.push_str(&format!("  {}\n", a));
        }
    }
    out
}
