//! Unwind command
//!
//! Drains a rollback ledger left by an earlier `recover` run, newest fix first.
//! Entries whose unwind fails are saved back so the command can be rerun.

use anyhow::{Context, Result};
use dr_engine::{run_remedy, ControlPlane};
use dr_shared::{DrConfig, DrEvent, RollbackLedger};
use std::path::Path;
use std::sync::Arc;

use crate::render::{format_event, stdout_is_interactive};
use crate::scenario::Scenario;

pub async fn unwind(scenario: &Path, ledger_path: &Path, config: DrConfig) -> Result<()> {
    let scenario = Scenario::load(scenario)?;
    let control_plane: Arc<dyn ControlPlane> = Arc::new(scenario.control_plane());
    let mut ledger = RollbackLedger::load(ledger_path)
        .with_context(|| format!("loading ledger {}", ledger_path.display()))?;

    if ledger.is_empty() {
        println!("Nothing to unwind.");
        return Ok(());
    }

    let task = config.task.clone();
    let report = ledger
        .unwind_all(|action| {
            let control_plane = control_plane.clone();
            let task = task.clone();
            async move { run_remedy(control_plane.as_ref(), &action, &task).await }
        })
        .await;
    ledger.save(ledger_path)?;

    let color = stdout_is_interactive();
    for outcome in &report.outcomes {
        let event = DrEvent::Unwound {
            action: outcome.action.clone(),
            error: outcome.error.as_ref().map(|e| e.to_string()),
        };
        if let Some(line) = format_event(&event, color) {
            println!("{}", line);
        }
    }

    if report.failed_count() > 0 {
        anyhow::bail!(
            "{} of {} unwind action(s) failed; {} left in the ledger for retry",
            report.failed_count(),
            report.attempted(),
            ledger.len()
        );
    }
    Ok(())
}
