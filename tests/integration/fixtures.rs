//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Actions that record their execution into a shared trace
//! - Building linear chains and branching graphs
//! - Predefined phase setups

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use skylift::engine::{Action, ActionContext, ActionOutcome, Cursor, Task, TaskGraph, TaskId};
use skylift::{Error, Result};

/// Shared record of which actions ran, in order.
pub type Trace = Arc<Mutex<Vec<String>>>;

pub fn trace() -> Trace {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn traced(trace: &Trace) -> Vec<String> {
    trace.lock().unwrap().clone()
}

/// Action that records itself into a trace, then optionally sleeps,
/// fails, writes variables, or selects a branch.
pub struct TraceAction {
    name: String,
    trace: Trace,
    fail: bool,
    branch: usize,
    delay: Option<Duration>,
    vars: Vec<(String, Value)>,
}

impl TraceAction {
    pub fn ok(name: &str, trace: &Trace) -> Arc<dyn Action> {
        Arc::new(Self::base(name, trace))
    }

    pub fn failing(name: &str, trace: &Trace) -> Arc<dyn Action> {
        Arc::new(Self {
            fail: true,
            ..Self::base(name, trace)
        })
    }

    pub fn branching(name: &str, trace: &Trace, branch: usize) -> Arc<dyn Action> {
        Arc::new(Self {
            branch,
            ..Self::base(name, trace)
        })
    }

    pub fn slow(name: &str, trace: &Trace, delay: Duration) -> Arc<dyn Action> {
        Arc::new(Self {
            delay: Some(delay),
            ..Self::base(name, trace)
        })
    }

    pub fn writing(name: &str, trace: &Trace, vars: Vec<(String, Value)>) -> Arc<dyn Action> {
        Arc::new(Self {
            vars,
            ..Self::base(name, trace)
        })
    }

    fn base(name: &str, trace: &Trace) -> Self {
        Self {
            name: name.to_string(),
            trace: Arc::clone(trace),
            fail: false,
            branch: 0,
            delay: None,
            vars: Vec::new(),
        }
    }
}

#[async_trait]
impl Action for TraceAction {
    async fn run(&self, _ctx: &ActionContext) -> Result<ActionOutcome> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.trace.lock().unwrap().push(self.name.clone());
        if self.fail {
            return Err(Error::Action {
                task: self.name.clone(),
                message: "induced failure".to_string(),
            });
        }
        let mut outcome = ActionOutcome::empty().take_branch(self.branch);
        for (name, value) in &self.vars {
            outcome = outcome.with_var(name, value.clone());
        }
        Ok(outcome)
    }
}

/// Build a linear chain from named actions.
pub fn chain(actions: Vec<(&str, Arc<dyn Action>)>) -> Cursor {
    let (graph, _) = chain_graph(actions);
    Cursor::new(Arc::new(graph))
}

/// Build a linear chain and return the graph plus the task ids, for
/// tests that keep wiring edges.
pub fn chain_graph(actions: Vec<(&str, Arc<dyn Action>)>) -> (TaskGraph, Vec<TaskId>) {
    let mut graph = TaskGraph::new();
    let mut ids = Vec::new();
    for (name, action) in actions {
        let id = graph.add_task(Task::new(name, action));
        if let Some(prev) = ids.last() {
            graph
                .add_successor(*prev, id)
                .expect("chain edge should be valid");
        }
        ids.push(id);
    }
    (graph, ids)
}
