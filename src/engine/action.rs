//! The unit-of-work contract consumed by the scheduler.
//!
//! An [`Action`] is opaque to the engine: it reads the shared execution
//! context, does its work (API calls, file copies, anything), and returns a
//! partial result to merge back plus the successor branch it selected. The
//! engine never inspects an action beyond this contract.

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Read-only view of the owning namespace handed to a running action.
///
/// The context exposes the variables seeded by the driver (cloud handles,
/// run configuration) and everything merged by tasks that ran earlier in
/// the same chain.
#[derive(Debug, Clone)]
pub struct ActionContext {
    /// Name of the task the action runs under, for logging.
    task_name: String,
    /// Snapshot of the namespace variables at dispatch time.
    vars: HashMap<String, Arc<Value>>,
}

impl ActionContext {
    /// Create a context for a task over the given variable snapshot.
    pub fn new(task_name: &str, vars: HashMap<String, Arc<Value>>) -> Self {
        Self {
            task_name: task_name.to_string(),
            vars,
        }
    }

    /// Name of the task this action runs under.
    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    /// Look up a variable by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name).map(|v| v.as_ref())
    }

    /// Look up a string variable by name.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| v.as_str())
    }

    /// Deserialize a variable into a concrete type.
    pub fn get_as<T: serde::de::DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.get(name)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Check whether a variable is present.
    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Number of variables visible to the action.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether the context holds no variables.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// The result a finished action hands back to the scheduler.
///
/// `vars` is merged into the owning namespace; `branch` selects which
/// successor of the task the chain advances to (0 is the default path).
#[derive(Debug, Clone, Default)]
pub struct ActionOutcome {
    /// Partial result to merge into the namespace.
    pub vars: HashMap<String, Value>,
    /// Index of the successor to advance to.
    pub branch: usize,
}

impl ActionOutcome {
    /// An outcome with no variables and the default branch.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Add a variable to the outcome.
    pub fn with_var(mut self, name: &str, value: Value) -> Self {
        self.vars.insert(name.to_string(), value);
        self
    }

    /// Select a non-default successor branch.
    pub fn take_branch(mut self, branch: usize) -> Self {
        self.branch = branch;
        self
    }
}

/// An opaque unit of work executed by the scheduler.
///
/// Implementations must be `Send + Sync`: the same action value may be
/// executed from a forked branch running on another tokio task. Retry of a
/// failing operation is the action's own concern; the engine treats any
/// returned error as terminal for the current chain.
#[async_trait]
pub trait Action: Send + Sync {
    /// Run the unit of work against the current execution context.
    async fn run(&self, ctx: &ActionContext) -> Result<ActionOutcome>;
}
