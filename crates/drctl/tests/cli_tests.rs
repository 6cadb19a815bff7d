//! CLI tests for drctl.
//!
//! Argument parsing plus end-to-end command runs against scenario files.
//! Commands print to stdout; assertions are on their results.

use clap::Parser;
use dr_shared::config::TaskConfig;
use dr_shared::{DrConfig, RecoveryMode, RollbackLedger};
use drctl::cli::{Cli, Commands};
use drctl::commands::{self, RecoverOptions};
use std::path::{Path, PathBuf};

fn demo() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos/two-units.json")
}

fn fast_config(dir: &Path) -> DrConfig {
    DrConfig {
        task: TaskConfig {
            poll_interval_ms: 1,
            task_timeout_secs: 5,
        },
        ledger_path: dir.join("ledger.json"),
        ..DrConfig::default()
    }
}

fn write_scenario(dir: &Path, json: &str) -> PathBuf {
    let path = dir.join("scenario.json");
    std::fs::write(&path, json).unwrap();
    path
}

const CLEAN: &str = r#"{
    "units": [{
        "storage": "vdi-a",
        "source_pool": { "uuid": "p1", "name": "primary" },
        "vms": [
            { "id": "vm-1", "name": "web-01" },
            { "id": "vm-2", "name": "db-01" }
        ]
    }]
}"#;

// ============================================================================
// Argument parsing
// ============================================================================

#[test]
fn test_parse_check_defaults_to_failover() {
    let cli = Cli::try_parse_from(["drctl", "check", "--scenario", "s.json"]).unwrap();
    match cli.command {
        Commands::Check { scenario, mode } => {
            assert_eq!(scenario, PathBuf::from("s.json"));
            assert_eq!(mode, RecoveryMode::Failover);
        }
        other => panic!("unexpected command {:?}", other),
    }
}

#[test]
fn test_parse_recover_flags() {
    let cli = Cli::try_parse_from([
        "drctl",
        "--config",
        "/tmp/dr.toml",
        "recover",
        "--scenario",
        "s.json",
        "--mode",
        "dry-run",
        "--resolve-all",
        "--paused",
    ])
    .unwrap();
    assert_eq!(cli.config, Some(PathBuf::from("/tmp/dr.toml")));
    match cli.command {
        Commands::Recover {
            mode,
            resolve_all,
            start,
            paused,
            ledger,
            ..
        } => {
            assert_eq!(mode, RecoveryMode::DryRun);
            assert!(resolve_all);
            assert!(!start);
            assert!(paused);
            assert!(ledger.is_none());
        }
        other => panic!("unexpected command {:?}", other),
    }
}

#[test]
fn test_unknown_mode_rejected() {
    assert!(Cli::try_parse_from(["drctl", "check", "--scenario", "s.json", "--mode", "sideways"]).is_err());
}

#[test]
fn test_unwind_requires_ledger() {
    assert!(Cli::try_parse_from(["drctl", "unwind", "--scenario", "s.json"]).is_err());
}

// ============================================================================
// Commands
// ============================================================================

#[tokio::test]
async fn test_check_clean_scenario_passes() {
    let dir = tempfile::tempdir().unwrap();
    let scenario = write_scenario(dir.path(), CLEAN);
    commands::check(&scenario, RecoveryMode::Failover, fast_config(dir.path()))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_check_demo_reports_blocking() {
    let dir = tempfile::tempdir().unwrap();
    let err = commands::check(&demo(), RecoveryMode::DryRun, fast_config(dir.path()))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("blocking problem"));
}

#[tokio::test]
async fn test_recover_without_resolve_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let options = RecoverOptions {
        mode: RecoveryMode::Failover,
        resolve_all: false,
        start: false,
        paused: false,
        ledger: None,
    };
    let err = commands::recover(&demo(), options, fast_config(dir.path()))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("recovery not started"));
}

/// The demo's files-01 recovery is set up to fail
#[tokio::test]
async fn test_recover_demo_with_resolve_all() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = dir.path().join("run-ledger.json");
    let options = RecoverOptions {
        mode: RecoveryMode::Failover,
        resolve_all: true,
        start: true,
        paused: false,
        ledger: Some(ledger.clone()),
    };
    let err = commands::recover(&demo(), options, fast_config(dir.path()))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("1 object(s) failed"));

    // attach sr-iscsi-02 and rename the stale mail-01 were recorded
    let saved = RollbackLedger::load(&ledger).unwrap();
    assert_eq!(saved.len(), 2);
}

#[tokio::test]
async fn test_unwind_drains_ledger() {
    let dir = tempfile::tempdir().unwrap();
    let scenario = write_scenario(dir.path(), CLEAN);
    let ledger_path = dir.path().join("ledger.json");
    let mut ledger = RollbackLedger::new();
    ledger.record(
        dr_shared::RemedialAction::EnableHa {
            pool: "target".to_string(),
        },
        "HA was enabled",
    );
    ledger.save(&ledger_path).unwrap();

    commands::unwind(&scenario, &ledger_path, fast_config(dir.path()))
        .await
        .unwrap();
    assert!(RollbackLedger::load(&ledger_path).unwrap().is_empty());
}

#[test]
fn test_config_prints() {
    commands::config(&DrConfig::default()).unwrap();
}
