//! Recover command
//!
//! checks -> optional resolve-all -> recovery waves -> optional start.
//! Ctrl-C during any phase stops at the next boundary and unwinds applied fixes.
//! A dry run destroys what it recovered and unwinds its fixes at the end.

use anyhow::Result;
use dr_engine::RecoveryWorkflow;
use dr_shared::{blocking_count, DrConfig, DrError, RecoveryMode};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::Run;

#[derive(Debug, Clone)]
pub struct RecoverOptions {
    pub mode: RecoveryMode,
    pub resolve_all: bool,
    pub start: bool,
    pub paused: bool,
    pub ledger: Option<PathBuf>,
}

pub async fn recover(scenario: &Path, options: RecoverOptions, config: DrConfig) -> Result<()> {
    let ledger_path = options
        .ledger
        .clone()
        .unwrap_or_else(|| config.ledger_path.clone());
    let start_configured = config.start.start_after_recovery;
    let paused_configured = config.start.start_paused;

    let mut run = Run::open(scenario, options.mode, config)?;
    run.workflow = run.workflow.with_ledger_path(ledger_path);
    run.workflow.set_start_options(
        options.start || start_configured,
        options.paused || paused_configured,
    );

    let cancel = run.workflow.cancellation();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping at the next object boundary");
            cancel.cancel();
        }
    });

    let outcome = drive(&mut run.workflow, &options).await;
    interrupt.abort();

    let report = run.finish().await;
    outcome?;
    if report.failed() > 0 {
        anyhow::bail!("{} object(s) failed to recover", report.failed());
    }
    Ok(())
}

/// How far the forward path got
enum Reached {
    Blocked(usize),
    Recovered,
}

/// Checks, fixes and waves. A cancellation seen at any step surfaces as
/// `DrError::Cancelled`.
async fn forward(wf: &mut RecoveryWorkflow, options: &RecoverOptions) -> Result<Reached, DrError> {
    let checks = wf.run_checks().await?;
    if checks.has_blocking() && options.resolve_all {
        let resolved = wf.resolve_all().await?;
        info!(
            applied = resolved.applied.len(),
            failed = resolved.failed.len(),
            remaining = resolved.remaining_blocking,
            "resolve-all finished"
        );
    }

    if wf.cancellation().is_cancelled() {
        return Err(DrError::Cancelled);
    }
    if !wf.can_proceed() {
        return Ok(Reached::Blocked(blocking_count(wf.problems())));
    }

    let summary = wf.start_recovery().await?;
    if summary.cancelled {
        return Err(DrError::Cancelled);
    }
    Ok(Reached::Recovered)
}

async fn drive(wf: &mut RecoveryWorkflow, options: &RecoverOptions) -> Result<()> {
    match forward(wf, options).await {
        Err(DrError::Cancelled) => {
            let errors = wf.cancel().await;
            anyhow::bail!(
                "recovery cancelled; {} fix(es) unwound, {} unwind failure(s)",
                wf.report().unwound.len(),
                errors.len()
            );
        }
        Err(e) => Err(e.into()),
        Ok(Reached::Blocked(blocking)) => {
            if !wf.ledger().is_empty() {
                wf.cancel().await;
            }
            anyhow::bail!("{} blocking problem(s); recovery not started", blocking);
        }
        Ok(Reached::Recovered) => {
            if wf.mode().is_dry_run() {
                let destroyed = wf.cleanup_dry_run().await?;
                info!(destroyed, "dry-run objects removed");
                let errors = wf.cancel().await;
                if !errors.is_empty() {
                    anyhow::bail!("{} dry-run fix(es) could not be unwound", errors.len());
                }
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dr_engine::{ChannelEmitter, FakeControlPlaneBuilder};
    use dr_shared::config::TaskConfig;
    use dr_shared::{ObjectId, PoolMetadataUnit, SourcePoolDescriptor, StorageRef, VmDef};
    use std::sync::Arc;

    fn options() -> RecoverOptions {
        RecoverOptions {
            mode: RecoveryMode::Failover,
            resolve_all: true,
            start: false,
            paused: false,
            ledger: None,
        }
    }

    fn config() -> DrConfig {
        DrConfig {
            task: TaskConfig {
                poll_interval_ms: 1,
                task_timeout_secs: 5,
            },
            ..DrConfig::default()
        }
    }

    fn unit_needing(storage: &str) -> PoolMetadataUnit {
        PoolMetadataUnit {
            storage: StorageRef::new("vdi-a"),
            source_pool: SourcePoolDescriptor {
                uuid: "p1".to_string(),
                name: "primary".to_string(),
            },
            appliances: vec![],
            vms: vec![VmDef {
                id: ObjectId::new("vm-1"),
                name: "web-01".to_string(),
                appliance: None,
                storage: vec![StorageRef::new(storage)],
            }],
        }
    }

    #[tokio::test]
    async fn test_cancel_during_fix_unwinds_applied_fixes() {
        let fake = Arc::new(FakeControlPlaneBuilder::new().build());
        let mut wf = RecoveryWorkflow::new(fake.clone(), config(), ChannelEmitter::noop());
        wf.select_units(vec![unit_needing("sr-a")], RecoveryMode::Failover);
        fake.cancel_on("remedy:", wf.cancellation());

        let err = drive(&mut wf, &options()).await.unwrap_err();

        assert!(err.to_string().contains("recovery cancelled"));
        assert!(wf.ledger().is_empty());
        assert!(fake.attached_storage().is_empty());
        assert_eq!(fake.call_count("remedy:"), 2);
        assert_eq!(fake.call_count("recover:"), 0);
    }

    #[tokio::test]
    async fn test_cancel_during_checks_is_not_reported_as_blocking() {
        let fake = Arc::new(FakeControlPlaneBuilder::new().attached_storage("sr-a").build());
        let mut wf = RecoveryWorkflow::new(fake.clone(), config(), ChannelEmitter::noop());
        wf.select_units(vec![unit_needing("sr-a")], RecoveryMode::Failover);
        fake.cancel_on("open:", wf.cancellation());

        let err = drive(&mut wf, &options()).await.unwrap_err().to_string();

        assert!(err.contains("recovery cancelled"), "{}", err);
        assert!(!err.contains("blocking"));
        assert_eq!(fake.call_count("recover:"), 0);
    }
}
