//! Migration plan files and the action registry that instantiates them.
//!
//! A plan is a TOML document declaring the three phase chains as ordered
//! task lists. Tasks reference each other by name: `next` lists successors
//! in branch-index order, `parallel` lists the entry tasks of branches
//! forked after this task, `wait_for` / `wait_all` declare joins. The first
//! task of each list is the chain entry.
//!
//! Action names in a plan are resolved through an [`ActionRegistry`], so
//! embedders can extend the built-in action set without touching the
//! loader.

use crate::engine::{Action, Cursor, Task, TaskGraph, TaskId};
use crate::error::{Error, Result};
use crate::slog;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Factory resolving an action name plus its plan-file arguments into a
/// runnable [`Action`].
type ActionFactory = dyn Fn(&HashMap<String, Value>) -> Result<Arc<dyn Action>> + Send + Sync;

/// Named action constructors available to plan files.
#[derive(Default)]
pub struct ActionRegistry {
    factories: HashMap<String, Arc<ActionFactory>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under a plan-file action name.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&HashMap<String, Value>) -> Result<Arc<dyn Action>> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Arc::new(factory));
    }

    /// Whether an action name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Instantiate the named action with the given arguments.
    pub fn build(&self, name: &str, args: &HashMap<String, Value>) -> Result<Arc<dyn Action>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| Error::UnknownAction(name.to_string()))?;
        factory(args)
    }
}

/// One task entry in a plan file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TaskSpec {
    pub name: String,
    /// Registered action name. Absent for join tasks.
    pub action: Option<String>,
    /// Arguments handed to the action factory.
    #[serde(default)]
    pub args: HashMap<String, Value>,
    /// Successor task names, in branch-index order.
    #[serde(default)]
    pub next: Vec<String>,
    /// Entry tasks of branches forked after this task.
    #[serde(default)]
    pub parallel: Vec<String>,
    /// Join: wait for the branch forked at the named task.
    pub wait_for: Option<String>,
    /// Join: wait for every branch forked so far.
    #[serde(default)]
    pub wait_all: bool,
}

/// A full migration plan: one ordered task list per phase.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Plan {
    pub name: String,
    #[serde(default)]
    pub preparation: Vec<TaskSpec>,
    #[serde(default)]
    pub migration: Vec<TaskSpec>,
    #[serde(default)]
    pub rollback: Vec<TaskSpec>,
}

impl Plan {
    /// Load a plan from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        slog!("Loading plan from {}", path.display());
        let plan: Self = toml::from_str(&fs::read_to_string(path)?)?;
        slog!(
            "Plan '{}' loaded: {} preparation, {} migration, {} rollback task(s)",
            plan.name,
            plan.preparation.len(),
            plan.migration.len(),
            plan.rollback.len()
        );
        Ok(plan)
    }

    /// Parse a plan from TOML text.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Resolve the plan into the three phase cursors.
    ///
    /// Every action name is instantiated through the registry and every
    /// graph is validated, so a plan that builds is a plan that can run
    /// (up to runtime failures of the actions themselves).
    pub fn build(&self, registry: &ActionRegistry) -> Result<PhaseChains> {
        Ok(PhaseChains {
            preparation: build_chain(&self.preparation, registry)?,
            migration: build_chain(&self.migration, registry)?,
            rollback: build_chain(&self.rollback, registry)?,
        })
    }
}

/// The three cursors a scheduler runs.
#[derive(Debug, Clone)]
pub struct PhaseChains {
    pub preparation: Cursor,
    pub migration: Cursor,
    pub rollback: Cursor,
}

/// Build one phase chain from its ordered task specs.
fn build_chain(specs: &[TaskSpec], registry: &ActionRegistry) -> Result<Cursor> {
    if specs.is_empty() {
        return Ok(Cursor::empty());
    }

    let mut graph = TaskGraph::new();
    let mut ids: HashMap<String, TaskId> = HashMap::new();

    // Action and wait-all tasks first; wait-for tasks need their target's
    // id, which may be declared later in the list.
    for spec in specs {
        if spec.wait_for.is_some() {
            continue;
        }
        let task = if spec.wait_all {
            if spec.action.is_some() {
                return Err(Error::Validation(format!(
                    "Task '{}' declares both an action and wait_all",
                    spec.name
                )));
            }
            Task::wait_all(&spec.name)
        } else {
            let action_name = spec.action.as_deref().ok_or_else(|| {
                Error::Validation(format!(
                    "Task '{}' declares neither an action nor a join",
                    spec.name
                ))
            })?;
            Task::new(&spec.name, registry.build(action_name, &spec.args)?)
        };
        let id = graph.add_task(task);
        if ids.insert(spec.name.clone(), id).is_some() {
            return Err(Error::Validation(format!(
                "Duplicate task name '{}'",
                spec.name
            )));
        }
    }

    for spec in specs {
        let Some(target) = &spec.wait_for else {
            continue;
        };
        if spec.action.is_some() || spec.wait_all {
            return Err(Error::Validation(format!(
                "Task '{}' mixes wait_for with another kind",
                spec.name
            )));
        }
        let target_id = *ids.get(target).ok_or_else(|| {
            Error::Validation(format!(
                "Task '{}' waits for unknown task '{}'",
                spec.name, target
            ))
        })?;
        let id = graph.add_task(Task::wait_one(&spec.name, target_id));
        if ids.insert(spec.name.clone(), id).is_some() {
            return Err(Error::Validation(format!(
                "Duplicate task name '{}'",
                spec.name
            )));
        }
    }

    // Edges, in declaration order so `next` positions map to branch indices.
    for spec in specs {
        let from = ids[&spec.name];
        for next_name in &spec.next {
            let to = *ids.get(next_name).ok_or_else(|| {
                Error::Validation(format!(
                    "Task '{}' names unknown successor '{}'",
                    spec.name, next_name
                ))
            })?;
            graph.add_successor(from, to)?;
        }
        for member_name in &spec.parallel {
            let member = *ids.get(member_name).ok_or_else(|| {
                Error::Validation(format!(
                    "Task '{}' names unknown parallel member '{}'",
                    spec.name, member_name
                ))
            })?;
            graph.add_parallel_member(from, member)?;
        }
    }

    graph.set_entry(ids[&specs[0].name])?;
    graph.validate()?;
    Ok(Cursor::new(Arc::new(graph)))
}
