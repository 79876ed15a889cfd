//! Interrupt handling scoped to the migration chain.
//!
//! Interrupts are delivered through the scheduler's in-process source,
//! which behaves exactly like signal delivery while the migration chain
//! runs and is lost outside that window.

use crate::fixtures::{chain, trace, traced, TraceAction};
use skylift::engine::{Cursor, ErrorCode, Namespace, Scheduler, Task, TaskGraph};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

#[tokio::test]
async fn test_interrupt_during_migration_triggers_rollback() {
    let t = trace();
    let source = Arc::new(Notify::new());

    let mut scheduler = Scheduler::new(
        Namespace::new(),
        Cursor::empty(),
        chain(vec![
            (
                "long-copy",
                TraceAction::slow("long-copy", &t, Duration::from_secs(30)),
            ),
            ("never", TraceAction::ok("never", &t)),
        ]),
        chain(vec![("restore", TraceAction::ok("restore", &t))]),
    )
    .with_interrupt_source(Arc::clone(&source));

    let notifier = Arc::clone(&source);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        notifier.notify_waiters();
    });

    let code = scheduler.start().await;

    // The interrupted task counts as failed: migration stops, rollback runs.
    assert_eq!(code, ErrorCode::MigrationFailed);
    let ran = traced(&t);
    assert!(!ran.contains(&"long-copy".to_string()));
    assert!(!ran.contains(&"never".to_string()));
    assert!(ran.contains(&"restore".to_string()));
}

#[tokio::test]
async fn test_interrupt_while_blocked_on_wait_one_triggers_rollback() {
    // The migration chain is parked on a join when the interrupt lands:
    // the join is cancelled like a running action would be.
    let t = trace();
    let source = Arc::new(Notify::new());

    let mut graph = TaskGraph::new();
    let fork = graph.add_task(Task::new("fork", TraceAction::ok("fork", &t)));
    let copy = graph.add_task(Task::new(
        "slow-copy",
        TraceAction::slow("slow-copy", &t, Duration::from_secs(30)),
    ));
    graph.add_parallel_member(fork, copy).unwrap();
    let join = graph.add_task(Task::wait_one("join", copy));
    graph.add_successor(fork, join).unwrap();

    let mut scheduler = Scheduler::new(
        Namespace::new(),
        Cursor::empty(),
        Cursor::new(Arc::new(graph)),
        chain(vec![("restore", TraceAction::ok("restore", &t))]),
    )
    .with_interrupt_source(Arc::clone(&source));

    let notifier = Arc::clone(&source);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        notifier.notify_waiters();
    });

    let code = scheduler.start().await;

    assert_eq!(code, ErrorCode::MigrationFailed);
    let ran = traced(&t);
    assert!(!ran.contains(&"slow-copy".to_string()));
    assert!(ran.contains(&"restore".to_string()));
}

#[tokio::test]
async fn test_interrupt_while_blocked_on_wait_all_triggers_rollback() {
    let t = trace();
    let source = Arc::new(Notify::new());

    let mut graph = TaskGraph::new();
    let fork = graph.add_task(Task::new("fork", TraceAction::ok("fork", &t)));
    let b1 = graph.add_task(Task::new(
        "b1",
        TraceAction::slow("b1", &t, Duration::from_secs(30)),
    ));
    let b2 = graph.add_task(Task::new(
        "b2",
        TraceAction::slow("b2", &t, Duration::from_secs(30)),
    ));
    graph.add_parallel_member(fork, b1).unwrap();
    graph.add_parallel_member(fork, b2).unwrap();
    let join = graph.add_task(Task::wait_all("join"));
    graph.add_successor(fork, join).unwrap();

    let mut scheduler = Scheduler::new(
        Namespace::new(),
        Cursor::empty(),
        Cursor::new(Arc::new(graph)),
        chain(vec![("restore", TraceAction::ok("restore", &t))]),
    )
    .with_interrupt_source(Arc::clone(&source));

    let notifier = Arc::clone(&source);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        notifier.notify_waiters();
    });

    let code = scheduler.start().await;

    assert_eq!(code, ErrorCode::MigrationFailed);
    assert!(traced(&t).contains(&"restore".to_string()));
}

#[tokio::test]
async fn test_interrupt_during_preparation_is_lost() {
    // Delivery while no guard is installed has no effect on the run.
    let t = trace();
    let source = Arc::new(Notify::new());

    let mut scheduler = Scheduler::new(
        Namespace::new(),
        chain(vec![(
            "slow-prep",
            TraceAction::slow("slow-prep", &t, Duration::from_millis(100)),
        )]),
        chain(vec![("mig", TraceAction::ok("mig", &t))]),
        chain(vec![("roll", TraceAction::ok("roll", &t))]),
    )
    .with_interrupt_source(Arc::clone(&source));

    let notifier = Arc::clone(&source);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        notifier.notify_waiters();
    });

    let code = scheduler.start().await;

    assert_eq!(code, ErrorCode::NoError);
    assert_eq!(traced(&t), vec!["slow-prep", "mig"]);
}

#[tokio::test]
async fn test_interrupt_does_not_cancel_rollback() {
    // The guard is gone once rollback starts: a second delivery during
    // rollback leaves the rollback chain running to completion.
    let t = trace();
    let source = Arc::new(Notify::new());

    let mut scheduler = Scheduler::new(
        Namespace::new(),
        Cursor::empty(),
        chain(vec![(
            "long-copy",
            TraceAction::slow("long-copy", &t, Duration::from_secs(30)),
        )]),
        chain(vec![(
            "slow-restore",
            TraceAction::slow("slow-restore", &t, Duration::from_millis(100)),
        )]),
    )
    .with_interrupt_source(Arc::clone(&source));

    let notifier = Arc::clone(&source);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        notifier.notify_waiters();
        // Second delivery lands mid-rollback
        tokio::time::sleep(Duration::from_millis(50)).await;
        notifier.notify_waiters();
    });

    let code = scheduler.start().await;

    assert_eq!(code, ErrorCode::MigrationFailed);
    assert!(traced(&t).contains(&"slow-restore".to_string()));
}

#[tokio::test]
async fn test_no_interrupt_leaves_run_untouched() {
    let t = trace();
    let source = Arc::new(Notify::new());

    let mut scheduler = Scheduler::new(
        Namespace::new(),
        Cursor::empty(),
        chain(vec![("mig", TraceAction::ok("mig", &t))]),
        Cursor::empty(),
    )
    .with_interrupt_source(source);

    assert_eq!(scheduler.start().await, ErrorCode::NoError);
}
