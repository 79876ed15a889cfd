//! Three-phase execution: ordering, error codes, and namespace flow.

use crate::fixtures::{chain, trace, traced, TraceAction};
use serde_json::json;
use skylift::engine::{Cursor, ErrorCode, Namespace, Scheduler, SchedulerState};

#[tokio::test]
async fn test_successful_run_skips_rollback() {
    let t = trace();
    let mut scheduler = Scheduler::new(
        Namespace::new(),
        chain(vec![("attach-handles", TraceAction::ok("attach-handles", &t))]),
        chain(vec![
            ("copy-volume", TraceAction::ok("copy-volume", &t)),
            ("boot-instance", TraceAction::ok("boot-instance", &t)),
        ]),
        chain(vec![("restore", TraceAction::ok("restore", &t))]),
    );

    let code = scheduler.start().await;

    assert_eq!(code, ErrorCode::NoError);
    assert_eq!(code.exit_code(), 0);
    assert_eq!(scheduler.state(), SchedulerState::Done);
    assert_eq!(
        traced(&t),
        vec!["attach-handles", "copy-volume", "boot-instance"]
    );
}

#[tokio::test]
async fn test_failing_migration_task_skips_rest_and_rolls_back() {
    // Preparation [A], migration [B fails, C], rollback [R]:
    // C never runs, R does, and the run reports the migration failure.
    let t = trace();
    let mut scheduler = Scheduler::new(
        Namespace::new(),
        chain(vec![("a", TraceAction::ok("a", &t))]),
        chain(vec![
            ("b", TraceAction::failing("b", &t)),
            ("c", TraceAction::ok("c", &t)),
        ]),
        chain(vec![("r", TraceAction::ok("r", &t))]),
    );

    let code = scheduler.start().await;

    assert_eq!(code, ErrorCode::MigrationFailed);
    assert_eq!(code.exit_code(), 2);
    assert_eq!(traced(&t), vec!["a", "b", "r"]);
}

#[tokio::test]
async fn test_failing_rollback_reports_rollback_failure() {
    let t = trace();
    let mut scheduler = Scheduler::new(
        Namespace::new(),
        chain(vec![("a", TraceAction::ok("a", &t))]),
        chain(vec![("b", TraceAction::failing("b", &t))]),
        chain(vec![("r", TraceAction::failing("r", &t))]),
    );

    let code = scheduler.start().await;

    assert_eq!(code, ErrorCode::RollbackFailed);
    assert_eq!(code.exit_code(), 3);
}

#[tokio::test]
async fn test_preparation_failure_never_migrates() {
    let t = trace();
    let mut scheduler = Scheduler::new(
        Namespace::new(),
        chain(vec![("a", TraceAction::failing("a", &t))]),
        chain(vec![("b", TraceAction::ok("b", &t))]),
        chain(vec![("r", TraceAction::ok("r", &t))]),
    );

    let code = scheduler.start().await;

    assert_eq!(code, ErrorCode::PreparationFailed);
    assert_eq!(code.exit_code(), 1);
    assert_eq!(traced(&t), vec!["a"]);
}

#[tokio::test]
async fn test_empty_chains_complete_with_no_error() {
    let mut scheduler = Scheduler::new(
        Namespace::new(),
        Cursor::empty(),
        Cursor::empty(),
        Cursor::empty(),
    );

    let code = scheduler.start().await;

    assert_eq!(code, ErrorCode::NoError);
    assert_eq!(scheduler.state(), SchedulerState::Done);
}

#[tokio::test]
async fn test_results_merge_across_phases() {
    // A variable written in preparation is visible after the run, along
    // with everything migration added; values written by the failing
    // task's predecessors survive.
    let t = trace();
    let mut namespace = Namespace::new();
    namespace.set("seeded", json!("by-driver"));

    let mut scheduler = Scheduler::new(
        namespace,
        chain(vec![(
            "prep",
            TraceAction::writing("prep", &t, vec![("snapshot_id".to_string(), json!("snap-1"))]),
        )]),
        chain(vec![(
            "mig",
            TraceAction::writing("mig", &t, vec![("volume_id".to_string(), json!("vol-9"))]),
        )]),
        Cursor::empty(),
    );

    let code = scheduler.start().await;

    assert_eq!(code, ErrorCode::NoError);
    let ns = scheduler.namespace();
    assert_eq!(ns.get("seeded"), Some(&json!("by-driver")));
    assert_eq!(ns.get("snapshot_id"), Some(&json!("snap-1")));
    assert_eq!(ns.get("volume_id"), Some(&json!("vol-9")));
}
