//! Rollback ledger persistence and unwind ordering.

use dr_shared::{DrError, RemedialAction, RollbackLedger, StorageRef};
use std::cell::RefCell;

fn detach(s: &str) -> RemedialAction {
    RemedialAction::DetachStorage {
        storage: StorageRef::new(s),
    }
}

#[test]
fn test_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state").join("ledger.json");

    let mut ledger = RollbackLedger::new();
    ledger.record(detach("sr-1"), "storage sr-1 missing");
    ledger.record(
        RemedialAction::EnableHa {
            pool: "target".to_string(),
        },
        "HA enabled",
    );
    ledger.save(&path).unwrap();

    let loaded = RollbackLedger::load(&path).unwrap();
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded.entries()[0].unwind, detach("sr-1"));
    assert_eq!(loaded.entries()[1].problem, "HA enabled");
}

#[test]
fn test_load_missing_file_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = RollbackLedger::load(&dir.path().join("absent.json")).unwrap();
    assert!(ledger.is_empty());
}

#[test]
fn test_load_corrupt_file_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert!(matches!(RollbackLedger::load(&path), Err(DrError::Json(_))));
}

#[tokio::test]
async fn test_unwind_newest_first_best_effort() {
    let mut ledger = RollbackLedger::new();
    ledger.record(detach("sr-1"), "first");
    ledger.record(detach("sr-2"), "second");
    ledger.record(detach("sr-3"), "third");

    let seen = RefCell::new(Vec::new());
    let report = ledger
        .unwind_all(|action| {
            seen.borrow_mut().push(action.clone());
            let fail = action == detach("sr-2");
            async move {
                if fail {
                    Err(DrError::Remote("storage busy".to_string()))
                } else {
                    Ok(())
                }
            }
        })
        .await;

    assert_eq!(
        seen.into_inner(),
        vec![detach("sr-3"), detach("sr-2"), detach("sr-1")]
    );
    assert_eq!(report.attempted(), 3);
    let succeeded: Vec<&RemedialAction> = report.succeeded().collect();
    assert_eq!(succeeded, vec![&detach("sr-3"), &detach("sr-1")]);
    assert_eq!(report.failed_count(), 1);

    // outcomes follow execution order, failures included
    let order: Vec<(RemedialAction, bool)> = report
        .outcomes
        .iter()
        .map(|o| (o.action.clone(), o.error.is_some()))
        .collect();
    assert_eq!(
        order,
        vec![
            (detach("sr-3"), false),
            (detach("sr-2"), true),
            (detach("sr-1"), false)
        ]
    );

    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger.entries()[0].unwind, detach("sr-2"));
    assert_eq!(ledger.entries()[0].problem, "second");
}

#[tokio::test]
async fn test_failed_unwinds_survive_save_in_recording_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.json");

    let mut ledger = RollbackLedger::new();
    ledger.record(detach("sr-1"), "first");
    ledger.record(detach("sr-2"), "second");
    ledger.record(detach("sr-3"), "third");
    ledger.record(detach("sr-4"), "fourth");

    let report = ledger
        .unwind_all(|action| {
            let fail = action == detach("sr-1") || action == detach("sr-3");
            async move {
                if fail {
                    Err(DrError::Remote("storage busy".to_string()))
                } else {
                    Ok(())
                }
            }
        })
        .await;
    assert_eq!(report.failed_count(), 2);
    ledger.save(&path).unwrap();

    let mut reloaded = RollbackLedger::load(&path).unwrap();
    let kept: Vec<&str> = reloaded.entries().iter().map(|e| e.problem.as_str()).collect();
    assert_eq!(kept, vec!["first", "third"]);

    // a retry that succeeds drains what is left, newest first
    let seen = RefCell::new(Vec::new());
    let retry = reloaded
        .unwind_all(|action| {
            seen.borrow_mut().push(action);
            async { Ok(()) }
        })
        .await;
    assert_eq!(retry.failed_count(), 0);
    assert_eq!(seen.into_inner(), vec![detach("sr-3"), detach("sr-1")]);
    assert!(reloaded.is_empty());
}
