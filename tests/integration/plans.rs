//! Plan files end to end: load, build with the built-in actions, run.

use serde_json::json;
use skylift::actions::builtin_registry;
use skylift::engine::{ErrorCode, Namespace, Scheduler};
use skylift::plan::Plan;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_plan(text: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp plan file");
    file.write_all(text.as_bytes())
        .expect("Failed to write plan");
    file
}

async fn run_plan(text: &str) -> (ErrorCode, Namespace) {
    let file = write_plan(text);
    let plan = Plan::load(file.path()).expect("plan should load");
    let chains = plan.build(&builtin_registry()).expect("plan should build");
    let mut scheduler = Scheduler::new(
        Namespace::new(),
        chains.preparation,
        chains.migration,
        chains.rollback,
    );
    let code = scheduler.start().await;
    (code, scheduler.into_namespace())
}

#[tokio::test]
async fn test_plan_with_builtin_actions() {
    let (code, ns) = run_plan(
        r#"
name = "end-to-end"

[[preparation]]
name = "seed"
action = "set-var"
args = { region = "dst-1", path = 1 }

[[migration]]
name = "hostname"
action = "command"
args = { cmd = "echo migrated" }
next = ["note"]

[[migration]]
name = "note"
action = "checkpoint"
args = { message = "post-copy" }
"#,
    )
    .await;

    assert_eq!(code, ErrorCode::NoError);
    assert_eq!(ns.get("region"), Some(&json!("dst-1")));
    assert_eq!(ns.get("hostname_output"), Some(&json!("migrated")));
}

#[tokio::test]
async fn test_plan_branch_selection_from_variable() {
    let (code, ns) = run_plan(
        r#"
name = "data-driven"

[[migration]]
name = "seed"
action = "set-var"
args = { path = 1 }
next = ["decide"]

[[migration]]
name = "decide"
action = "select-branch"
args = { var = "path" }
next = ["cold", "hot"]

[[migration]]
name = "cold"
action = "set-var"
args = { took = "cold" }

[[migration]]
name = "hot"
action = "set-var"
args = { took = "hot" }
"#,
    )
    .await;

    assert_eq!(code, ErrorCode::NoError);
    assert_eq!(ns.get("took"), Some(&json!("hot")));
}

#[tokio::test]
async fn test_plan_failure_rolls_back() {
    let (code, ns) = run_plan(
        r#"
name = "failing"

[[migration]]
name = "doomed"
action = "command"
args = { cmd = "exit 7" }

[[rollback]]
name = "undo"
action = "set-var"
args = { rolled_back = true }
"#,
    )
    .await;

    assert_eq!(code, ErrorCode::MigrationFailed);
    assert_eq!(ns.get("rolled_back"), Some(&json!(true)));
}

#[tokio::test]
async fn test_plan_fork_join() {
    let (code, ns) = run_plan(
        r#"
name = "parallel"

[[migration]]
name = "fork"
action = "set-var"
args = { before_fork = "yes" }
parallel = ["copy-a", "copy-b"]
next = ["join"]

[[migration]]
name = "copy-a"
action = "command"
args = { cmd = "true" }

[[migration]]
name = "copy-b"
action = "command"
args = { cmd = "true" }

[[migration]]
name = "join"
wait_all = true
next = ["after"]

[[migration]]
name = "after"
action = "set-var"
args = { joined = true }
"#,
    )
    .await;

    assert_eq!(code, ErrorCode::NoError);
    assert_eq!(ns.get("joined"), Some(&json!(true)));
    assert_eq!(ns.get("before_fork"), Some(&json!("yes")));
    assert_eq!(ns.branch_count(), 0);
}

#[test]
fn test_invalid_plan_file_is_rejected() {
    let file = write_plan("not = [valid");
    assert!(Plan::load(file.path()).is_err());
}
