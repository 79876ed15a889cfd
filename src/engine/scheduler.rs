//! Three-phase migration scheduler.
//!
//! The scheduler drives the preparation, migration, and rollback chains of
//! one run: preparation must succeed for migration to start, a failed
//! migration triggers rollback, and rollback always runs to completion
//! once entered. Within a chain, tasks run strictly one after another in
//! cursor order; parallelism exists only at explicit branch roots, where
//! the scheduler forks an independent namespace and a child scheduler per
//! sibling onto its own tokio task.
//!
//! Failures are recovered at the chain boundary: a failing task stops its
//! chain, sets the phase error code, and is logged in full, but no error
//! value ever escapes [`Scheduler::start`].

use crate::engine::action::ActionContext;
use crate::engine::cursor::Cursor;
use crate::engine::interrupt::InterruptGuard;
use crate::engine::namespace::{BranchInfo, BranchStatus, Namespace};
use crate::engine::task::{Task, TaskId, TaskKind};
use crate::error::{Error, Result};
use crate::{slog, slog_debug, slog_error, slog_task};
use futures::FutureExt;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Execution phase of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Preparation,
    Migration,
    Rollback,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Preparation => write!(f, "preparation"),
            Phase::Migration => write!(f, "migration"),
            Phase::Rollback => write!(f, "rollback"),
        }
    }
}

/// Terminal (and interim) status of a run.
///
/// Exactly one value is held by the scheduler at any time and it is
/// monotonic per run: once a failure is recorded it is never reset to
/// `NoError`. The numeric mapping of [`ErrorCode::exit_code`] is stable;
/// operators script against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NoError,
    PreparationFailed,
    MigrationFailed,
    RollbackFailed,
}

impl ErrorCode {
    /// Process exit code for this status: 0, 1, 2, 3 in declaration order.
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorCode::NoError => 0,
            ErrorCode::PreparationFailed => 1,
            ErrorCode::MigrationFailed => 2,
            ErrorCode::RollbackFailed => 3,
        }
    }

    /// The failure code recorded when a task of the given phase fails.
    pub fn failure_for(phase: Phase) -> Self {
        match phase {
            Phase::Preparation => ErrorCode::PreparationFailed,
            Phase::Migration => ErrorCode::MigrationFailed,
            Phase::Rollback => ErrorCode::RollbackFailed,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCode::NoError => write!(f, "NO_ERROR"),
            ErrorCode::PreparationFailed => write!(f, "PREPARATION_FAILED"),
            ErrorCode::MigrationFailed => write!(f, "MIGRATION_FAILED"),
            ErrorCode::RollbackFailed => write!(f, "ROLLBACK_FAILED"),
        }
    }
}

/// Scheduler lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    RunningPreparation,
    RunningMigration,
    RunningRollback,
    Done,
}

impl SchedulerState {
    /// Check whether a transition to the target state is valid.
    ///
    /// Valid transitions:
    /// - Idle -> RunningPreparation
    /// - RunningPreparation -> RunningMigration (preparation succeeded)
    /// - RunningPreparation -> Done (preparation failed)
    /// - RunningMigration -> Done (migration succeeded)
    /// - RunningMigration -> RunningRollback (migration failed)
    /// - RunningRollback -> Done (always)
    pub fn can_transition(self, target: SchedulerState) -> bool {
        matches!(
            (self, target),
            (SchedulerState::Idle, SchedulerState::RunningPreparation)
                | (SchedulerState::RunningPreparation, SchedulerState::RunningMigration)
                | (SchedulerState::RunningPreparation, SchedulerState::Done)
                | (SchedulerState::RunningMigration, SchedulerState::Done)
                | (SchedulerState::RunningMigration, SchedulerState::RunningRollback)
                | (SchedulerState::RunningRollback, SchedulerState::Done)
        )
    }
}

/// The phase driver for one migration run.
pub struct Scheduler {
    /// Shared execution context owned by this chain.
    namespace: Namespace,
    /// Preparation chain.
    preparation: Cursor,
    /// Migration chain.
    migration: Cursor,
    /// Rollback chain.
    rollback: Cursor,
    /// Lifecycle state.
    state: SchedulerState,
    /// Current run status; monotonic.
    error_code: ErrorCode,
    /// Only the top-level scheduler installs interrupt handling; forked
    /// branch schedulers never do.
    top_level: bool,
    /// Forked branches get a deep namespace copy unless disabled.
    deep_fork: bool,
    /// In-process interrupt source for tests and embedders.
    interrupt_source: Option<Arc<Notify>>,
}

impl Scheduler {
    /// Create a top-level scheduler over the three phase chains.
    ///
    /// The caller seeds `namespace` with everything every action in the
    /// graphs needs (cloud handles, run configuration) before `start`.
    pub fn new(
        namespace: Namespace,
        preparation: Cursor,
        migration: Cursor,
        rollback: Cursor,
    ) -> Self {
        Self {
            namespace,
            preparation,
            migration,
            rollback,
            state: SchedulerState::Idle,
            error_code: ErrorCode::NoError,
            top_level: true,
            deep_fork: true,
            interrupt_source: None,
        }
    }

    /// Create a child scheduler for a forked branch.
    ///
    /// A branch runs its sub-chain as a single migration-phase chain with
    /// empty preparation and rollback, and never installs interrupt
    /// handling of its own.
    fn branch(namespace: Namespace, chain: Cursor) -> Self {
        Self {
            namespace,
            preparation: Cursor::empty(),
            migration: chain,
            rollback: Cursor::empty(),
            state: SchedulerState::Idle,
            error_code: ErrorCode::NoError,
            top_level: false,
            deep_fork: true,
            interrupt_source: None,
        }
    }

    /// Use shallow namespace forks for parallel branches.
    ///
    /// Shallow forks share nested values by reference and give up the
    /// isolation guarantee; deep forks are the default for a reason.
    pub fn with_shallow_fork(mut self) -> Self {
        self.deep_fork = false;
        self
    }

    /// Deliver interrupts from an in-process source instead of OS signals.
    ///
    /// `notify_waiters` on the source while the migration chain runs
    /// behaves exactly like signal delivery; outside that window the
    /// notification is lost, like a signal without an installed handler.
    pub fn with_interrupt_source(mut self, source: Arc<Notify>) -> Self {
        self.interrupt_source = Some(source);
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Current run status.
    pub fn error_code(&self) -> ErrorCode {
        self.error_code
    }

    /// The execution context owned by this scheduler.
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Consume the scheduler, yielding its final namespace.
    pub fn into_namespace(self) -> Namespace {
        self.namespace
    }

    /// Run the three phases and return the terminal status.
    ///
    /// Preparation runs first; if it fails, migration and rollback never
    /// run. A successful migration ends the run; a failed one triggers
    /// rollback, which always runs to completion once entered. No error
    /// value escapes: failures surface only as the returned [`ErrorCode`]
    /// plus the logged task-level detail.
    pub async fn start(&mut self) -> ErrorCode {
        self.transition(SchedulerState::RunningPreparation);
        self.process_chain(Phase::Preparation, None).await;
        if self.error_code != ErrorCode::NoError {
            self.transition(SchedulerState::Done);
            return self.error_code;
        }

        self.transition(SchedulerState::RunningMigration);
        {
            // Interrupt handling covers exactly the migration chain of the
            // top-level scheduler. The guard's Drop removes the watcher on
            // every exit path.
            let guard = if self.top_level {
                Some(match &self.interrupt_source {
                    Some(source) => InterruptGuard::install_with_source(Arc::clone(source)),
                    None => InterruptGuard::install(),
                })
            } else {
                None
            };
            let token = guard.as_ref().map(|g| g.token());
            self.process_chain(Phase::Migration, token).await;
        }
        if self.error_code == ErrorCode::NoError {
            self.transition(SchedulerState::Done);
            return self.error_code;
        }

        self.transition(SchedulerState::RunningRollback);
        // Rollback is not wrapped by the interrupt guard: a second
        // interrupt here falls through to the process default disposition.
        self.process_chain(Phase::Rollback, None).await;
        self.transition(SchedulerState::Done);
        self.error_code
    }

    /// Run one phase chain to completion or first failure.
    ///
    /// An empty chain is a no-op and leaves the error code unchanged. On
    /// failure the phase error code is recorded and the remainder of the
    /// chain does not run; everything before the failing task has already
    /// had its result merged into the namespace.
    async fn process_chain(&mut self, phase: Phase, cancel: Option<CancellationToken>) {
        let cursor = match phase {
            Phase::Preparation => self.preparation.clone(),
            Phase::Migration => self.migration.clone(),
            Phase::Rollback => self.rollback.clone(),
        };
        let mut current = match cursor.entry() {
            Some(task) => task.clone(),
            None => {
                slog_debug!("{} chain is empty, skipping", phase);
                return;
            }
        };
        slog!("Starting {} chain at '{}'", phase, current.name);

        loop {
            let branch = match self.run_task(&cursor, &current, cancel.as_ref()).await {
                Ok(branch) => branch,
                Err(err) => {
                    slog_task!(Error, phase, &current.name, "failed: {}", err);
                    self.error_code = ErrorCode::failure_for(phase);
                    return;
                }
            };
            match cursor.advance(&current, branch) {
                Ok(Some(next)) => {
                    slog_task!(
                        Debug,
                        phase,
                        &current.name,
                        "advancing to '{}' (branch {})",
                        next.name,
                        branch
                    );
                    current = next.clone();
                }
                Ok(None) => {
                    slog!("{} chain completed", phase);
                    return;
                }
                Err(err) => {
                    slog_task!(Error, phase, &current.name, "failed: {}", err);
                    self.error_code = ErrorCode::failure_for(phase);
                    return;
                }
            }
        }
    }

    /// Execute one task and return the branch index it selected.
    async fn run_task(
        &mut self,
        cursor: &Cursor,
        task: &Task,
        cancel: Option<&CancellationToken>,
    ) -> Result<usize> {
        let branch = match &task.kind {
            TaskKind::Action(action) => {
                let ctx = ActionContext::new(&task.name, self.namespace.snapshot());
                let outcome = match cancel {
                    // Racing the action against the token makes a delivered
                    // interrupt equivalent to the task failing.
                    Some(token) => tokio::select! {
                        _ = token.cancelled() => {
                            return Err(Error::Interrupted {
                                task: task.name.clone(),
                            })
                        }
                        result = action.run(&ctx) => result?,
                    },
                    None => action.run(&ctx).await?,
                };
                self.namespace.merge(outcome.vars);
                outcome.branch
            }
            TaskKind::WaitOne(root) => {
                // A join blocks the chain like a running action does, so it
                // is raced against the token the same way.
                match cancel {
                    Some(token) => tokio::select! {
                        _ = token.cancelled() => {
                            return Err(Error::Interrupted {
                                task: task.name.clone(),
                            })
                        }
                        result = self.join_one(root) => result?,
                    },
                    None => self.join_one(root).await?,
                }
                0
            }
            TaskKind::WaitAll => {
                match cancel {
                    Some(token) => tokio::select! {
                        _ = token.cancelled() => {
                            return Err(Error::Interrupted {
                                task: task.name.clone(),
                            })
                        }
                        result = self.join_all() => result?,
                    },
                    None => self.join_all().await?,
                }
                0
            }
        };

        if task.is_branch_root() {
            self.fork_branches(cursor, task)?;
        }
        Ok(branch)
    }

    /// Fork every sibling of a branch root onto its own tokio task.
    ///
    /// Each sibling gets an independent namespace copy (deep by default)
    /// and a cursor scoped to its own sub-chain, so sibling branches never
    /// share mutable state and never see each other's tasks.
    fn fork_branches(&mut self, cursor: &Cursor, root: &Task) -> Result<()> {
        for member_id in &root.parallel_group {
            let member = cursor.get(member_id).ok_or_else(|| {
                Error::Graph(format!(
                    "Parallel member {} of '{}' not found in graph",
                    member_id.short(),
                    root.name
                ))
            })?;
            let forked = self.namespace.fork(self.deep_fork);
            let sub = cursor.sub_cursor(*member_id)?;
            slog!("Forking branch '{}' from root '{}'", member.name, root.name);
            let handle = tokio::spawn(run_branch(forked, sub));
            self.namespace.register_branch(
                *member_id,
                BranchInfo {
                    root: *member_id,
                    name: member.name.clone(),
                    handle: Some(handle),
                    status: BranchStatus::Running,
                },
            );
        }
        Ok(())
    }

    /// Block until the referenced branch terminates.
    ///
    /// The branch's terminal code is recorded in its bookkeeping entry. A
    /// branch that terminated with a failure fails this join, and
    /// therefore the joining chain: the parent's status stays honest about
    /// work it explicitly synchronized on.
    async fn join_one(&mut self, root: &TaskId) -> Result<()> {
        let name = self
            .namespace
            .lookup_branch(root)
            .ok_or_else(|| Error::BranchNotFound(root.short()))?
            .name
            .clone();
        let handle = self
            .namespace
            .take_branch_handle(root)
            .ok_or_else(|| Error::BranchJoin(format!("branch '{}' already awaited", name)))?;
        match handle.await {
            Ok((code, _branch_ns)) => {
                self.namespace.complete_branch(root, code);
                slog!("Joined branch '{}' with {}", name, code);
                if code != ErrorCode::NoError {
                    return Err(Error::Branch { root: name, code });
                }
                Ok(())
            }
            Err(e) => {
                // A panicked branch has no terminal code to record.
                self.namespace.take_branch(root);
                Err(Error::BranchJoin(e.to_string()))
            }
        }
    }

    /// Block until every still-running branch terminates.
    ///
    /// All branches are awaited before any failure is surfaced, so one
    /// failing branch never cuts a running sibling short. Terminal codes
    /// are recorded per branch; branches forked after this join are
    /// unaffected, and branches already joined are skipped.
    async fn join_all(&mut self) -> Result<()> {
        let mut roots = Vec::new();
        let mut names = Vec::new();
        let mut handles = Vec::new();
        for root in self.namespace.branch_roots() {
            let name = match self.namespace.lookup_branch(&root) {
                Some(info) => info.name.clone(),
                None => continue,
            };
            let Some(handle) = self.namespace.take_branch_handle(&root) else {
                continue;
            };
            roots.push(root);
            names.push(name);
            handles.push(handle);
        }
        if handles.is_empty() {
            return Ok(());
        }

        let results = futures::future::join_all(handles).await;
        let mut failed: Option<(String, ErrorCode)> = None;
        let mut join_error: Option<String> = None;
        for ((root, name), result) in roots.into_iter().zip(names).zip(results) {
            match result {
                Ok((code, _branch_ns)) => {
                    self.namespace.complete_branch(&root, code);
                    slog!("Joined branch '{}' with {}", name, code);
                    if code != ErrorCode::NoError && failed.is_none() {
                        failed = Some((name, code));
                    }
                }
                Err(e) => {
                    self.namespace.take_branch(&root);
                    slog_error!("Branch '{}' join failed: {}", name, e);
                    if join_error.is_none() {
                        join_error = Some(format!("branch '{}': {}", name, e));
                    }
                }
            }
        }

        if let Some(message) = join_error {
            return Err(Error::BranchJoin(message));
        }
        if let Some((root, code)) = failed {
            return Err(Error::Branch { root, code });
        }
        Ok(())
    }

    fn transition(&mut self, target: SchedulerState) {
        debug_assert!(
            self.state.can_transition(target),
            "invalid scheduler transition {:?} -> {:?}",
            self.state,
            target
        );
        slog_debug!("Scheduler state {:?} -> {:?}", self.state, target);
        self.state = target;
    }
}

/// Run a forked branch to completion on its own task.
///
/// Boxed so the branch future's type does not recurse through
/// [`Scheduler::start`].
fn run_branch(
    namespace: Namespace,
    chain: Cursor,
) -> futures::future::BoxFuture<'static, (ErrorCode, Namespace)> {
    async move {
        let mut scheduler = Scheduler::branch(namespace, chain);
        let code = scheduler.start().await;
        (code, scheduler.into_namespace())
    }
    .boxed()
}
