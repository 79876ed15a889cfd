//! Workflow engine: task graphs, cursors, namespaces, and the three-phase
//! scheduler that drives them.

pub mod action;
pub mod cursor;
pub mod interrupt;
pub mod namespace;
pub mod scheduler;
pub mod task;

pub use action::{Action, ActionContext, ActionOutcome};
pub use cursor::Cursor;
pub use interrupt::InterruptGuard;
pub use namespace::{BranchInfo, BranchStatus, Namespace};
pub use scheduler::{ErrorCode, Phase, Scheduler, SchedulerState};
pub use task::{GraphEdge, Task, TaskGraph, TaskId, TaskKind};
