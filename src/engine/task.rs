//! Task graph for phase execution.
//!
//! A [`Task`] wraps one action (or a join primitive) plus its graph edges:
//! an ordered successor list for conditional branching and an optional
//! parallel group marking the task as a branch root. [`TaskGraph`] is an
//! explicit builder producing an immutable graph value; construction is
//! testable in isolation from execution.

use crate::engine::action::Action;
use crate::error::{Error, Result};
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Unique identifier for a task within a phase graph.
///
/// Uses UUID v4 for generation and provides a short form display
/// for human-readable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Create a new unique task identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// What a task does when the cursor reaches it.
///
/// Joins are first-class task kinds rather than actions because they need
/// access to the branch bookkeeping of the owning namespace, which the
/// action contract deliberately does not expose.
#[derive(Clone)]
pub enum TaskKind {
    /// Run an opaque unit of work.
    Action(Arc<dyn Action>),
    /// Block until the branch forked at the given root terminates.
    WaitOne(TaskId),
    /// Block until every branch registered so far terminates.
    WaitAll,
}

impl std::fmt::Debug for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskKind::Action(_) => write!(f, "Action"),
            TaskKind::WaitOne(root) => write!(f, "WaitOne({})", root.short()),
            TaskKind::WaitAll => write!(f, "WaitAll"),
        }
    }
}

/// A single node in a phase graph.
///
/// Immutable once the graph is sealed for execution; branch selection at
/// runtime never mutates the task, it only picks an index into
/// `successors`.
#[derive(Debug, Clone)]
pub struct Task {
    /// Unique identifier for this task.
    pub id: TaskId,
    /// Human-readable name, used in logs and error messages.
    pub name: String,
    /// What the task executes.
    pub kind: TaskKind,
    /// Ordered candidate next tasks. Index 0 is the default path.
    pub successors: Vec<TaskId>,
    /// Sibling branch entry tasks. Non-empty marks this task a branch root.
    pub parallel_group: Vec<TaskId>,
}

impl Task {
    /// Create a task running the given action.
    pub fn new(name: &str, action: Arc<dyn Action>) -> Self {
        Self {
            id: TaskId::new(),
            name: name.to_string(),
            kind: TaskKind::Action(action),
            successors: Vec::new(),
            parallel_group: Vec::new(),
        }
    }

    /// Create a join task waiting on a single branch.
    pub fn wait_one(name: &str, root: TaskId) -> Self {
        Self {
            id: TaskId::new(),
            name: name.to_string(),
            kind: TaskKind::WaitOne(root),
            successors: Vec::new(),
            parallel_group: Vec::new(),
        }
    }

    /// Create a join task waiting on all registered branches.
    pub fn wait_all(name: &str) -> Self {
        Self {
            id: TaskId::new(),
            name: name.to_string(),
            kind: TaskKind::WaitAll,
            successors: Vec::new(),
            parallel_group: Vec::new(),
        }
    }

    /// Whether this task forks parallel branches.
    pub fn is_branch_root(&self) -> bool {
        !self.parallel_group.is_empty()
    }

    /// Whether this task is a join primitive.
    pub fn is_join(&self) -> bool {
        matches!(self.kind, TaskKind::WaitOne(_) | TaskKind::WaitAll)
    }
}

/// Edge metadata in the phase graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphEdge {
    /// Ordered successor edge; the payload is the branch index.
    Successor(usize),
    /// Membership of a parallel group rooted at the source task.
    Parallel,
}

/// An immutable task graph for one phase.
///
/// Built through the explicit builder API and then wrapped in an `Arc`
/// for execution. The graph stores tasks in a side map keyed by [`TaskId`]
/// and mirrors the topology in a petgraph `DiGraph` so cycle detection
/// runs on every edge insert, the same way dependency edges are validated
/// before they land.
pub struct TaskGraph {
    /// Topology mirror used for cycle detection.
    graph: DiGraph<TaskId, GraphEdge>,
    /// Task store.
    tasks: HashMap<TaskId, Task>,
    /// Index mapping from TaskId to NodeIndex.
    index: HashMap<TaskId, NodeIndex>,
    /// Entry task of the phase chain.
    entry: Option<TaskId>,
}

impl TaskGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            tasks: HashMap::new(),
            index: HashMap::new(),
            entry: None,
        }
    }

    /// Add a task to the graph.
    ///
    /// The first task added becomes the entry task; `set_entry` can
    /// override that. Returns the task's id.
    pub fn add_task(&mut self, task: Task) -> TaskId {
        let id = task.id;
        if self.tasks.contains_key(&id) {
            return id;
        }
        let node = self.graph.add_node(id);
        self.index.insert(id, node);
        self.tasks.insert(id, task);
        if self.entry.is_none() {
            self.entry = Some(id);
        }
        id
    }

    /// Set the entry task of the phase chain.
    pub fn set_entry(&mut self, id: TaskId) -> Result<()> {
        if !self.tasks.contains_key(&id) {
            return Err(Error::Validation(format!("Task {} not found in graph", id)));
        }
        self.entry = Some(id);
        Ok(())
    }

    /// Append a successor to `from`'s ordered successor list.
    ///
    /// The new successor gets the next free branch index. Rejects edges
    /// that would create a cycle or give `to` a second predecessor: phase
    /// chains are trees, and forks happen only through parallel groups.
    pub fn add_successor(&mut self, from: TaskId, to: TaskId) -> Result<()> {
        let from_index = self.node_of(&from)?;
        let to_index = self.node_of(&to)?;

        let has_predecessor = self
            .graph
            .edges_directed(to_index, petgraph::Direction::Incoming)
            .any(|e| matches!(e.weight(), GraphEdge::Successor(_)));
        if has_predecessor {
            return Err(Error::Validation(format!(
                "Task {} already has a predecessor; chains are trees",
                self.name_of(&to)
            )));
        }

        let branch = self.tasks[&from].successors.len();
        // Temporarily add the edge to check for cycles
        let edge = self
            .graph
            .add_edge(from_index, to_index, GraphEdge::Successor(branch));
        if is_cyclic_directed(&self.graph) {
            self.graph.remove_edge(edge);
            return Err(Error::Validation(format!(
                "Adding successor from {} to {} would create a cycle",
                self.name_of(&from),
                self.name_of(&to)
            )));
        }

        if let Some(task) = self.tasks.get_mut(&from) {
            task.successors.push(to);
        }
        Ok(())
    }

    /// Register `member` as a parallel sibling forked at `root`.
    ///
    /// The member is the entry of an independent sub-chain; the scheduler
    /// walks it through a scoped cursor in a forked namespace.
    pub fn add_parallel_member(&mut self, root: TaskId, member: TaskId) -> Result<()> {
        let root_index = self.node_of(&root)?;
        let member_index = self.node_of(&member)?;

        let edge = self
            .graph
            .add_edge(root_index, member_index, GraphEdge::Parallel);
        if is_cyclic_directed(&self.graph) {
            self.graph.remove_edge(edge);
            return Err(Error::Validation(format!(
                "Adding parallel member {} under {} would create a cycle",
                self.name_of(&member),
                self.name_of(&root)
            )));
        }

        if let Some(task) = self.tasks.get_mut(&root) {
            task.parallel_group.push(member);
        }
        Ok(())
    }

    /// Get a task by id.
    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    /// The entry task of the phase chain, if any.
    pub fn entry(&self) -> Option<&Task> {
        self.entry.as_ref().and_then(|id| self.tasks.get(id))
    }

    /// Number of tasks in the graph.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the graph holds no tasks.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Whether the graph contains the given task.
    pub fn contains(&self, id: &TaskId) -> bool {
        self.tasks.contains_key(id)
    }

    /// Structural checks run before execution.
    ///
    /// A dangling branch index is deliberately not checked here; it is a
    /// runtime condition surfaced by the cursor as a graph error when the
    /// action actually selects it.
    pub fn validate(&self) -> Result<()> {
        for task in self.tasks.values() {
            if task.is_branch_root() && task.is_join() {
                return Err(Error::Validation(format!(
                    "Task {} cannot be both a branch root and a join",
                    task.name
                )));
            }
            if let TaskKind::WaitOne(root) = &task.kind {
                if !self.tasks.contains_key(root) {
                    return Err(Error::Validation(format!(
                        "Join task {} waits on unknown root {}",
                        task.name,
                        root.short()
                    )));
                }
            }
        }
        Ok(())
    }

    fn node_of(&self, id: &TaskId) -> Result<NodeIndex> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| Error::Validation(format!("Task {} not found in graph", id)))
    }

    fn name_of(&self, id: &TaskId) -> String {
        self.tasks
            .get(id)
            .map(|t| t.name.clone())
            .unwrap_or_else(|| id.short())
    }
}

impl Default for TaskGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGraph")
            .field("tasks", &self.task_count())
            .field("edges", &self.graph.edge_count())
            .field("entry", &self.entry.map(|id| id.short()))
            .finish()
    }
}
