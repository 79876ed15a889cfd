//! Shared execution context for a running chain.
//!
//! A [`Namespace`] holds the named variables every action reads and writes,
//! plus the bookkeeping for branches forked from the owning chain. Exactly
//! one executing chain owns and mutates a namespace at a time: before a
//! parallel branch starts, the scheduler forks an independent copy, so two
//! chains never mutate the same instance. That copy-before-fork discipline
//! is what makes branch failures isolated; it is enforced here even though
//! tokio would let branches share memory.

use crate::engine::scheduler::ErrorCode;
use crate::engine::task::TaskId;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Completion state of a forked branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchStatus {
    /// The branch's scheduler is still running.
    Running,
    /// The branch terminated with the given code.
    Completed(ErrorCode),
}

/// Bookkeeping for one forked branch, keyed by its root task.
#[derive(Debug)]
pub struct BranchInfo {
    /// Entry task of the branch's sub-chain.
    pub root: TaskId,
    /// Branch entry task name, for logging.
    pub name: String,
    /// Handle to await the branch scheduler's completion. Taken (set to
    /// `None`) by the join that awaits it.
    pub handle: Option<JoinHandle<(ErrorCode, Namespace)>>,
    /// Last observed completion state.
    pub status: BranchStatus,
}

/// Mutable shared execution context.
#[derive(Debug, Default)]
pub struct Namespace {
    /// Named variables. Values are held behind `Arc` so a shallow fork is
    /// a reference-sharing copy and a deep fork re-materializes them.
    vars: HashMap<String, Arc<Value>>,
    /// Live branches forked from the owning chain.
    branches: HashMap<TaskId, BranchInfo>,
}

impl Namespace {
    /// Create an empty namespace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a variable by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name).map(|v| v.as_ref())
    }

    /// Set a variable, replacing any previous value.
    pub fn set(&mut self, name: &str, value: Value) {
        self.vars.insert(name.to_string(), Arc::new(value));
    }

    /// Merge a finished action's partial result into the variables.
    pub fn merge(&mut self, partial: HashMap<String, Value>) {
        for (name, value) in partial {
            self.vars.insert(name, Arc::new(value));
        }
    }

    /// Number of variables.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether the namespace holds no variables.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Cheap snapshot of the variables for an [`ActionContext`].
    ///
    /// [`ActionContext`]: crate::engine::action::ActionContext
    pub fn snapshot(&self) -> HashMap<String, Arc<Value>> {
        self.vars.clone()
    }

    /// Fork an independent copy for a parallel branch.
    ///
    /// A deep fork re-materializes every value, giving the branch true
    /// isolation; this is the scheduler default. A shallow fork shares the
    /// underlying values by reference and is only safe when the caller can
    /// guarantee nothing replaces nested state concurrently.
    ///
    /// Branch bookkeeping never crosses a fork: the copy starts with an
    /// empty branch map.
    pub fn fork(&self, deep: bool) -> Namespace {
        let vars = if deep {
            self.vars
                .iter()
                .map(|(k, v)| (k.clone(), Arc::new(v.as_ref().clone())))
                .collect()
        } else {
            self.vars.clone()
        };
        Namespace {
            vars,
            branches: HashMap::new(),
        }
    }

    // ========== Branch bookkeeping ==========

    /// Register a newly forked branch under its root task.
    pub fn register_branch(&mut self, root: TaskId, info: BranchInfo) {
        self.branches.insert(root, info);
    }

    /// Record a branch's terminal code.
    pub fn complete_branch(&mut self, root: &TaskId, code: ErrorCode) {
        if let Some(info) = self.branches.get_mut(root) {
            info.status = BranchStatus::Completed(code);
        }
    }

    /// Look up a branch by its root task.
    pub fn lookup_branch(&self, root: &TaskId) -> Option<&BranchInfo> {
        self.branches.get(root)
    }

    /// Take the awaitable handle of a registered branch, leaving the entry
    /// in place so its terminal code can be recorded. `None` if the branch
    /// is unknown or its handle was already taken by an earlier join.
    pub fn take_branch_handle(
        &mut self,
        root: &TaskId,
    ) -> Option<JoinHandle<(ErrorCode, Namespace)>> {
        self.branches.get_mut(root).and_then(|info| info.handle.take())
    }

    /// Root task ids of every registered branch.
    pub fn branch_roots(&self) -> Vec<TaskId> {
        self.branches.keys().copied().collect()
    }

    /// Remove a branch from the bookkeeping entirely.
    ///
    /// Joins keep completed branches around for inspection; this is for
    /// discarding a branch whose task panicked and has no terminal code.
    pub fn take_branch(&mut self, root: &TaskId) -> Option<BranchInfo> {
        self.branches.remove(root)
    }

    /// Number of branches currently registered.
    pub fn branch_count(&self) -> usize {
        self.branches.len()
    }
}
