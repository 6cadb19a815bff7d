//! Rollback ledger for fixes applied during the precheck phase.
//!
//! Every successfully applied fix that has an unwind action gets an entry.
//! On cancellation the entries are executed newest-first.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::future::Future;
use std::path::Path;
use tracing::{info, warn};

use crate::error::DrError;
use crate::problem::RemedialAction;

/// Single entry in the rollback ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: String,
    pub unwind: RemedialAction,
    pub applied_at: DateTime<Utc>,
    /// Description of the problem whose fix this undoes
    pub problem: String,
}

impl LedgerEntry {
    pub fn new(unwind: RemedialAction, problem: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            unwind,
            applied_at: Utc::now(),
            problem: problem.to_string(),
        }
    }
}

/// Result of one unwind action
#[derive(Debug, Clone, PartialEq)]
pub struct UnwindOutcome {
    pub action: RemedialAction,
    pub error: Option<DrError>,
}

/// Outcome of draining the ledger, in execution order (newest entry first)
#[derive(Debug, Clone, Default)]
pub struct UnwindReport {
    pub outcomes: Vec<UnwindOutcome>,
}

impl UnwindReport {
    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &RemedialAction> {
        self.outcomes
            .iter()
            .filter(|o| o.error.is_none())
            .map(|o| &o.action)
    }

    pub fn failures(&self) -> impl Iterator<Item = (&RemedialAction, &DrError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.error.as_ref().map(|e| (&o.action, e)))
    }

    pub fn failed_count(&self) -> usize {
        self.failures().count()
    }
}

/// Rollback ledger; append-only while the workflow moves forward
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackLedger {
    entries: Vec<LedgerEntry>,
    pub created: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl Default for RollbackLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl RollbackLedger {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            entries: Vec::new(),
            created: now,
            last_modified: now,
        }
    }

    pub fn load(path: &Path) -> Result<Self, DrError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let content = fs::read_to_string(path)?;
        let ledger: RollbackLedger = serde_json::from_str(&content)?;
        Ok(ledger)
    }

    pub fn save(&self, path: &Path) -> Result<(), DrError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Record the unwind action of a fix that has just succeeded.
    pub fn record(&mut self, unwind: RemedialAction, problem: &str) {
        info!(action = %unwind, "recorded unwind action");
        self.entries.push(LedgerEntry::new(unwind, problem));
        self.last_modified = Utc::now();
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Execute every unwind action, most recent first.
    ///
    /// Best-effort: a failing entry is logged and collected, the rest still
    /// run. Failed entries stay in the ledger, in recording order, so a
    /// later unwind can retry them.
    pub async fn unwind_all<F, Fut>(&mut self, mut run: F) -> UnwindReport
    where
        F: FnMut(RemedialAction) -> Fut,
        Fut: Future<Output = Result<(), DrError>>,
    {
        let mut report = UnwindReport::default();
        let mut kept = Vec::new();
        while let Some(entry) = self.entries.pop() {
            match run(entry.unwind.clone()).await {
                Ok(()) => {
                    info!(action = %entry.unwind, "unwound fix");
                    report.outcomes.push(UnwindOutcome {
                        action: entry.unwind,
                        error: None,
                    });
                }
                Err(e) => {
                    warn!(action = %entry.unwind, error = %e, "unwind failed; entry kept");
                    report.outcomes.push(UnwindOutcome {
                        action: entry.unwind.clone(),
                        error: Some(e),
                    });
                    kept.push(entry);
                }
            }
        }
        kept.reverse();
        self.entries = kept;
        self.last_modified = Utc::now();
        report
    }
}
