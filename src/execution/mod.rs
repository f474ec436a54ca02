//! Test executions and the runner that moves them through their phases.

mod runner;
mod scheduler;


use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use tokio::sync::watch;

use crate::canvas::Canvas;
use crate::error::{AppError, AppResult, ExecutionError};
use crate::sync::lock;

pub use runner::{TaskId, TestRunner};
pub use scheduler::{ScheduledTask, Scheduler};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    PreStop,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TestState {
    Enqueued,
    Starting,
    Running,
    Stopping,
    Completed,
}

/// Callback invoked by the runner for every phase of every execution.
#[async_trait]
pub trait TestExecutionTask: Send + Sync {
    async fn invoke(&self, execution: &Arc<TestExecution>, phase: Phase);
}

#[derive(Debug)]
pub(crate) struct ExecutionState {
    pub(crate) state: TestState,
    pub(crate) complete_requested: bool,
}

pub struct TestExecution {
    id: u64,
    canvas: Arc<Canvas>,
    runner: Weak<TestRunner>,
    lifecycle: Mutex<ExecutionState>,
    state: watch::Sender<TestState>,
}

impl std::fmt::Debug for TestExecution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestExecution")
            .field("id", &self.id)
            .field("canvas", &self.canvas.id())
            .field("state", &self.state())
            .finish()
    }
}

impl TestExecution {
    fn new(id: u64, canvas: Arc<Canvas>, runner: Weak<TestRunner>) -> Self {
        let (state, _) = watch::channel(TestState::Enqueued);
        Self {
            id,
            canvas,
            runner,
            lifecycle: Mutex::new(ExecutionState {
                state: TestState::Enqueued,
                complete_requested: false,
            }),
            state,
        }
    }

    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// The canvas the execution was started for.
    #[must_use]
    pub const fn canvas(&self) -> &Arc<Canvas> {
        &self.canvas
    }

    #[must_use]
    pub fn state(&self) -> TestState {
        *self.state.borrow()
    }

    /// Whether `canvas` takes part in this execution: the started canvas
    /// itself, or a scenario of a started project that follows it.
    #[must_use]
    pub fn contains(&self, canvas: &Canvas) -> bool {
        if std::ptr::eq(self.canvas.as_ref(), canvas) {
            return true;
        }
        self.canvas.is_project()
            && canvas.follows_project()
            && canvas
                .project()
                .is_some_and(|project| Arc::ptr_eq(&project, &self.canvas))
    }

    /// Ask the runner to stop this execution. A request made while the START
    /// phase is still running takes effect once it has finished.
    pub fn complete(self: &Arc<Self>) {
        if let Some(runner) = self.runner.upgrade() {
            runner.complete(self);
        }
    }

    /// Wait until the execution has reached at least `expected`.
    ///
    /// # Errors
    ///
    /// Returns an error if the execution is dropped while waiting.
    pub async fn wait_for_state(&self, expected: TestState) -> AppResult<()> {
        let mut receiver = self.state.subscribe();
        receiver
            .wait_for(|state| *state >= expected)
            .await
            .map(|_| ())
            .map_err(|_closed| {
                AppError::execution(ExecutionError::StateChannelClosed { expected })
            })
    }

    pub(crate) fn transition<R>(&self, update: impl FnOnce(&mut ExecutionState) -> R) -> R {
        let mut lifecycle = lock(&self.lifecycle);
        let result = update(&mut lifecycle);
        self.state.send_replace(lifecycle.state);
        result
    }
}
