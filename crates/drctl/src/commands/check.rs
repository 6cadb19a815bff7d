//! Check command

use anyhow::Result;
use dr_shared::{blocking_count, DrConfig, RecoveryMode};
use std::path::Path;
use tracing::info;

use super::Run;

pub async fn check(scenario: &Path, mode: RecoveryMode, config: DrConfig) -> Result<()> {
    let mut run = Run::open(scenario, mode, config)?;
    let checks = run.workflow.run_checks().await?;
    info!(problems = checks.problems.len(), "check pass finished");

    let report = run.finish().await;
    let blocking = blocking_count(&report.problems);
    if blocking > 0 {
        anyhow::bail!("{} blocking problem(s); recovery cannot start", blocking);
    }
    Ok(())
}
