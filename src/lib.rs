//! skylift - cloud workload migration workflow engine
//!
//! skylift executes migration plans as three phase chains (preparation,
//! migration, rollback) over an explicit task graph. Tasks within a chain
//! run sequentially; parallel branches are forked explicitly and joined
//! explicitly, each with its own namespace copy and child scheduler.

pub mod actions;
pub mod config;
pub mod engine;
pub mod error;
pub mod log;
pub mod plan;

pub use config::Config;
pub use engine::{
    Action, ActionContext, ActionOutcome, Cursor, ErrorCode, Namespace, Phase, Scheduler,
    SchedulerState, Task, TaskGraph, TaskId, TaskKind,
};
pub use error::{Error, Result};
pub use plan::{ActionRegistry, Plan};
