use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::runtime::Handle;
use tracing::debug;

use crate::canvas::Canvas;
use crate::sync::lock;

use super::{Phase, TestExecution, TestExecutionTask, TestState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

/// Queue of executions. The head runs through START, and once completed
/// through PRE_STOP and STOP, notifying every registered task on each phase.
pub struct TestRunner {
    self_ref: Weak<TestRunner>,
    handle: Handle,
    next_task: AtomicU64,
    next_execution: AtomicU64,
    tasks: Mutex<BTreeMap<TaskId, Arc<dyn TestExecutionTask>>>,
    queue: Mutex<VecDeque<Arc<TestExecution>>>,
}

impl std::fmt::Debug for TestRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestRunner")
            .field("queued", &lock(&self.queue).len())
            .finish()
    }
}

impl TestRunner {
    #[must_use]
    pub fn new(handle: Handle) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            handle,
            next_task: AtomicU64::new(1),
            next_execution: AtomicU64::new(1),
            tasks: Mutex::new(BTreeMap::new()),
            queue: Mutex::new(VecDeque::new()),
        })
    }

    /// Tasks are invoked in registration order.
    pub fn register_task(&self, task: Arc<dyn TestExecutionTask>) -> TaskId {
        let id = TaskId(self.next_task.fetch_add(1, Ordering::Relaxed));
        lock(&self.tasks).insert(id, task);
        id
    }

    pub fn unregister_task(&self, id: TaskId) -> bool {
        lock(&self.tasks).remove(&id).is_some()
    }

    #[must_use]
    pub fn execution_queue(&self) -> Vec<Arc<TestExecution>> {
        lock(&self.queue).iter().cloned().collect()
    }

    #[must_use]
    pub fn head(&self) -> Option<Arc<TestExecution>> {
        lock(&self.queue).front().cloned()
    }

    /// Find the first queued execution started for `canvas`.
    #[must_use]
    pub fn execution_for(&self, canvas: &Canvas) -> Option<Arc<TestExecution>> {
        lock(&self.queue)
            .iter()
            .find(|execution| std::ptr::eq(execution.canvas().as_ref(), canvas))
            .cloned()
    }

    /// Queue an execution for `canvas`. It starts right away when the queue
    /// was empty.
    pub fn enqueue(&self, canvas: Arc<Canvas>) -> Arc<TestExecution> {
        let execution = Arc::new(TestExecution::new(
            self.next_execution.fetch_add(1, Ordering::Relaxed),
            canvas,
            self.self_ref.clone(),
        ));
        let is_head = {
            let mut queue = lock(&self.queue);
            queue.push_back(Arc::clone(&execution));
            queue.len() == 1
        };
        debug!(
            "Enqueued execution {} for {} (head: {})",
            execution.id(),
            execution.canvas().id(),
            is_head
        );
        if is_head {
            self.start(Arc::clone(&execution));
        }
        execution
    }

    fn start(&self, execution: Arc<TestExecution>) {
        let Some(runner) = self.self_ref.upgrade() else {
            return;
        };
        execution.transition(|state| state.state = TestState::Starting);
        self.handle.spawn(async move {
            runner.run_phase(&execution, Phase::Start).await;
            let complete_now = execution.transition(|state| {
                state.state = TestState::Running;
                if state.complete_requested {
                    state.state = TestState::Stopping;
                    true
                } else {
                    false
                }
            });
            if complete_now {
                runner.finish(execution).await;
            }
        });
    }

    pub(super) fn complete(&self, execution: &Arc<TestExecution>) {
        let current = execution.transition(|state| {
            let current = state.state;
            match current {
                TestState::Enqueued => state.state = TestState::Completed,
                TestState::Starting => state.complete_requested = true,
                TestState::Running => state.state = TestState::Stopping,
                TestState::Stopping | TestState::Completed => {}
            }
            current
        });
        match current {
            TestState::Enqueued => {
                lock(&self.queue).retain(|queued| queued.id() != execution.id());
                debug!("Removed queued execution {}", execution.id());
            }
            TestState::Running => {
                let Some(runner) = self.self_ref.upgrade() else {
                    return;
                };
                let execution = Arc::clone(execution);
                self.handle.spawn(async move {
                    runner.finish(execution).await;
                });
            }
            TestState::Starting | TestState::Stopping | TestState::Completed => {}
        }
    }

    async fn finish(self: Arc<Self>, execution: Arc<TestExecution>) {
        self.run_phase(&execution, Phase::PreStop).await;
        self.run_phase(&execution, Phase::Stop).await;
        execution.transition(|state| state.state = TestState::Completed);
        debug!("Execution {} completed", execution.id());

        let next = {
            let mut queue = lock(&self.queue);
            queue.retain(|queued| queued.id() != execution.id());
            queue.front().cloned()
        };
        if let Some(next) = next
            && next.state() == TestState::Enqueued
        {
            self.start(next);
        }
    }

    async fn run_phase(&self, execution: &Arc<TestExecution>, phase: Phase) {
        let tasks: Vec<Arc<dyn TestExecutionTask>> = lock(&self.tasks).values().cloned().collect();
        debug!(
            "Execution {} entering {:?} with {} tasks",
            execution.id(),
            phase,
            tasks.len()
        );
        for task in tasks {
            task.invoke(execution, phase).await;
        }
    }
}
