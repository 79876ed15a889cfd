//! Phase traversal over a task graph.
//!
//! A [`Cursor`] yields the tasks of one phase in execution order, honoring
//! the branch index each finished action declared. It is stateless between
//! runs: iteration always restarts from the graph's entry task. A scoped
//! cursor (`sub_cursor`) gives a forked branch a view rooted at its own
//! entry, so a child scheduler can never walk into tasks outside its branch.

use crate::engine::task::{Task, TaskGraph, TaskId};
use crate::error::{Error, Result};
use std::sync::Arc;

/// Traversal object over a phase graph.
#[derive(Debug, Clone)]
pub struct Cursor {
    graph: Arc<TaskGraph>,
    entry: Option<TaskId>,
}

impl Cursor {
    /// Create a cursor over the whole graph, entering at the graph's entry.
    pub fn new(graph: Arc<TaskGraph>) -> Self {
        let entry = graph.entry().map(|t| t.id);
        Self { graph, entry }
    }

    /// Create a cursor over an empty chain.
    ///
    /// Running an empty chain is a no-op; the scheduler accepts this for
    /// phases a plan does not define.
    pub fn empty() -> Self {
        Self {
            graph: Arc::new(TaskGraph::new()),
            entry: None,
        }
    }

    /// The first task of the chain, or `None` for an empty chain.
    pub fn entry(&self) -> Option<&Task> {
        self.entry.as_ref().and_then(|id| self.graph.get(id))
    }

    /// Advance past a finished task along its declared branch.
    ///
    /// Returns `Ok(None)` when the task has no successors (chain end). A
    /// branch index pointing past the end of a non-empty successor list is
    /// a graph error: the action declared a path the graph does not have.
    pub fn advance(&self, current: &Task, branch: usize) -> Result<Option<&Task>> {
        if current.successors.is_empty() {
            return Ok(None);
        }
        let next_id = current.successors.get(branch).ok_or_else(|| {
            Error::Graph(format!(
                "Task '{}' declared branch {} but has only {} successor(s)",
                current.name,
                branch,
                current.successors.len()
            ))
        })?;
        let next = self.graph.get(next_id).ok_or_else(|| {
            Error::Graph(format!(
                "Task '{}' successor {} not found in graph",
                current.name,
                next_id.short()
            ))
        })?;
        Ok(Some(next))
    }

    /// A cursor scoped to the sub-chain rooted at a branch entry task.
    ///
    /// The graph is shared; only the entry moves. Traversal from the new
    /// entry follows successor edges only, so the scoped cursor reaches
    /// exactly the branch's own sub-graph.
    pub fn sub_cursor(&self, branch_root: TaskId) -> Result<Cursor> {
        if !self.graph.contains(&branch_root) {
            return Err(Error::Graph(format!(
                "Branch root {} not found in graph",
                branch_root.short()
            )));
        }
        Ok(Cursor {
            graph: Arc::clone(&self.graph),
            entry: Some(branch_root),
        })
    }

    /// Look up a task in the underlying graph.
    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.graph.get(id)
    }

    /// Whether the cursor wraps an empty chain.
    pub fn is_empty(&self) -> bool {
        self.entry.is_none()
    }
}
