//! Built-in actions available to every plan file.
//!
//! These cover the glue a migration plan needs between provider-specific
//! steps: setting namespace variables, running external commands, pacing,
//! checkpoint logging, and data-driven branch selection. Embedders extend
//! the set through [`ActionRegistry::register`].

use crate::engine::{Action, ActionContext, ActionOutcome};
use crate::error::{Error, Result};
use crate::plan::ActionRegistry;
use crate::slog;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Registry preloaded with every built-in action.
pub fn builtin_registry() -> ActionRegistry {
    let mut registry = ActionRegistry::new();
    registry.register("set-var", |args| {
        Ok(Arc::new(SetVar { vars: args.clone() }) as Arc<dyn Action>)
    });
    registry.register("command", |args| {
        Ok(Arc::new(CommandAction {
            cmd: required_str(args, "cmd")?,
        }) as Arc<dyn Action>)
    });
    registry.register("sleep", |args| {
        Ok(Arc::new(Sleep {
            ms: required_u64(args, "ms")?,
        }) as Arc<dyn Action>)
    });
    registry.register("checkpoint", |args| {
        Ok(Arc::new(Checkpoint {
            message: required_str(args, "message")?,
        }) as Arc<dyn Action>)
    });
    registry.register("select-branch", |args| {
        Ok(Arc::new(SelectBranch {
            var: required_str(args, "var")?,
        }) as Arc<dyn Action>)
    });
    registry
}

fn required_str(args: &HashMap<String, Value>, key: &str) -> Result<String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| Error::Validation(format!("Missing or non-string argument '{}'", key)))
}

fn required_u64(args: &HashMap<String, Value>, key: &str) -> Result<u64> {
    args.get(key)
        .and_then(|v| v.as_u64())
        .ok_or_else(|| Error::Validation(format!("Missing or non-integer argument '{}'", key)))
}

/// Merge the action's arguments into the namespace verbatim.
struct SetVar {
    vars: HashMap<String, Value>,
}

#[async_trait]
impl Action for SetVar {
    async fn run(&self, _ctx: &ActionContext) -> Result<ActionOutcome> {
        let mut outcome = ActionOutcome::empty();
        for (name, value) in &self.vars {
            outcome = outcome.with_var(name, value.clone());
        }
        Ok(outcome)
    }
}

/// Run a shell command; its trimmed stdout lands in `<task>_output`.
struct CommandAction {
    cmd: String,
}

#[async_trait]
impl Action for CommandAction {
    async fn run(&self, ctx: &ActionContext) -> Result<ActionOutcome> {
        slog!("Task '{}' running command: {}", ctx.task_name(), self.cmd);
        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&self.cmd)
            .output()
            .await?;
        if !output.status.success() {
            return Err(Error::Action {
                task: ctx.task_name().to_string(),
                message: format!(
                    "command exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(ActionOutcome::empty().with_var(
            &format!("{}_output", ctx.task_name()),
            Value::String(stdout),
        ))
    }
}

/// Pause the chain for a fixed duration.
struct Sleep {
    ms: u64,
}

#[async_trait]
impl Action for Sleep {
    async fn run(&self, _ctx: &ActionContext) -> Result<ActionOutcome> {
        tokio::time::sleep(Duration::from_millis(self.ms)).await;
        Ok(ActionOutcome::empty())
    }
}

/// Log a progress checkpoint with the current variable count.
struct Checkpoint {
    message: String,
}

#[async_trait]
impl Action for Checkpoint {
    async fn run(&self, ctx: &ActionContext) -> Result<ActionOutcome> {
        slog!(
            "Checkpoint '{}' at task '{}' ({} var(s) in scope)",
            self.message,
            ctx.task_name(),
            ctx.len()
        );
        Ok(ActionOutcome::empty())
    }
}

/// Select the branch index from an integer namespace variable.
struct SelectBranch {
    var: String,
}

#[async_trait]
impl Action for SelectBranch {
    async fn run(&self, ctx: &ActionContext) -> Result<ActionOutcome> {
        let branch = ctx
            .get(&self.var)
            .and_then(|v| v.as_u64())
            .ok_or_else(|| Error::Action {
                task: ctx.task_name().to_string(),
                message: format!("variable '{}' is missing or not an integer", self.var),
            })?;
        Ok(ActionOutcome::empty().take_branch(branch as usize))
    }
}
