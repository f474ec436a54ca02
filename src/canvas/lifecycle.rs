use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::counter;
use crate::error::{AppError, AppResult, CanvasError};
use crate::events::{Event, EventFilter, EventKind, actions, keys};
use crate::execution::{Phase, ScheduledTask, TestExecution, TestExecutionTask};
use crate::summary::{Chapter, Section, Summary};
use crate::sync::lock;

use super::{Canvas, CanvasRole};

/// Run state shared by projects and scenarios.
#[derive(Debug, Default)]
pub(super) struct Lifecycle {
    pub(super) running: bool,
    pub(super) has_started: bool,
    pub(super) time_ms: i64,
    pub(super) start_time: Option<DateTime<Utc>>,
    pub(super) end_time: Option<DateTime<Utc>>,
}

#[derive(Default)]
pub(super) struct Timers {
    time_update: Option<ScheduledTask>,
    time_limit: Option<ScheduledTask>,
}

/// Runner callback driving one canvas through the phases of the executions
/// it takes part in.
pub(super) struct CanvasTask {
    canvas: Weak<Canvas>,
}

impl CanvasTask {
    pub(super) const fn new(canvas: Weak<Canvas>) -> Self {
        Self { canvas }
    }
}

#[async_trait]
impl TestExecutionTask for CanvasTask {
    async fn invoke(&self, execution: &Arc<TestExecution>, phase: Phase) {
        let Some(canvas) = self.canvas.upgrade() else {
            return;
        };
        if !execution.contains(&canvas) {
            return;
        }
        match phase {
            Phase::Start => canvas.on_start(),
            Phase::PreStop => canvas.on_pre_stop(execution).await,
            Phase::Stop => canvas.on_stop(),
        }
    }
}

impl Canvas {
    #[must_use]
    pub fn is_running(&self) -> bool {
        lock(&self.lifecycle).running
    }

    /// Whether the current run got past its START phase and has not begun
    /// stopping yet.
    #[must_use]
    pub fn is_started(&self) -> bool {
        lock(&self.lifecycle).has_started
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        *self.completed.borrow()
    }

    #[must_use]
    pub fn time_ms(&self) -> i64 {
        lock(&self.lifecycle).time_ms
    }

    #[must_use]
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        lock(&self.lifecycle).start_time
    }

    #[must_use]
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        lock(&self.lifecycle).end_time
    }

    pub(super) fn set_time(&self, time_ms: i64) {
        lock(&self.lifecycle).time_ms = time_ms;
    }

    /// Start the canvas, or return the execution it already takes part in.
    ///
    /// # Errors
    ///
    /// Returns an error if the canvas has been released.
    pub fn start(self: &Arc<Self>) -> AppResult<Arc<TestExecution>> {
        self.ensure_live()?;
        let runner = self.workspace.runner();
        if let Some(execution) = runner
            .execution_queue()
            .into_iter()
            .find(|execution| execution.contains(self))
        {
            return Ok(execution);
        }
        Ok(runner.enqueue(Arc::clone(self)))
    }

    /// Stop the canvas and complete the execution started for it, if any.
    pub fn stop(&self) {
        self.trigger_action(actions::STOP);
        self.trigger_action(actions::COMPLETE);
        if let Some(execution) = self.workspace.runner().execution_for(self) {
            execution.complete();
        }
    }

    /// Wait until the current run has completed, including summary
    /// generation. Returns `false` on timeout.
    pub async fn wait_until_completed(&self, timeout: Duration) -> bool {
        let mut receiver = self.completed.subscribe();
        matches!(
            tokio::time::timeout(timeout, receiver.wait_for(|completed| *completed)).await,
            Ok(Ok(_))
        )
    }

    fn set_running(&self, running: bool) {
        {
            let mut lifecycle = lock(&self.lifecycle);
            if lifecycle.running == running {
                return;
            }
            lifecycle.running = running;
        }
        if running {
            self.trigger_action(actions::COUNTER_RESET);
            self.trigger_action(actions::START);
        }
        self.bus.fire(&Event::base(keys::RUNNING, &self.id));
        if self.is_scenario() {
            self.bus.fire(&Event::base(keys::ACTIVITY, &self.id));
        }
    }

    pub(super) fn set_completed(&self, completed: bool) {
        let changed = self.completed.send_if_modified(|current| {
            if *current == completed {
                return false;
            }
            *current = completed;
            true
        });
        if changed && completed {
            lock(&self.lifecycle).end_time = Some(Utc::now());
        }
        if completed {
            self.trigger_action(actions::READY);
        }
    }

    /// Zero counters and statistics for a fresh run.
    pub(super) fn reset(&self) {
        {
            let mut lifecycle = lock(&self.lifecycle);
            if lifecycle.running {
                lifecycle.start_time = Some(Utc::now());
                lifecycle.end_time = None;
            } else {
                lifecycle.start_time = None;
            }
            lifecycle.has_started = lifecycle.running;
            lifecycle.time_ms = 0;
        }
        self.counters.reset();
        self.statistics.reset();
        self.fix_time_limit();
        if let CanvasRole::Scenario(state) = &self.role {
            state.clear_reports();
        }
        debug!("Reset counters of {}", self.id);
    }

    pub(super) fn on_start(self: &Arc<Self>) {
        self.set_running(true);
        self.set_time(0);

        let initial = self.time_ms();
        let started = tokio::time::Instant::now();
        let canvas_ref = Arc::downgrade(self);
        let time_update = self.workspace.scheduler().schedule_at_fixed_rate(
            self.workspace.settings().time_update_interval,
            move || {
                if let Some(canvas) = canvas_ref.upgrade() {
                    let elapsed = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
                    canvas.set_time(initial.saturating_add(elapsed));
                }
            },
        );
        lock(&self.timers).time_update = Some(time_update);

        self.fix_time_limit();
        lock(&self.lifecycle).has_started = true;
        self.set_completed(false);
        info!("Started {}", self.id);
    }

    pub(super) async fn on_pre_stop(self: &Arc<Self>, execution: &Arc<TestExecution>) {
        lock(&self.lifecycle).has_started = false;
        let time_limit = lock(&self.timers).time_limit.take();
        if let Some(task) = time_limit {
            task.cancel();
        }

        if self.abort_on_finish() {
            self.cancel_components();
        } else {
            let timeout = self.workspace.settings().busy_timeout;
            for component in self.components() {
                if component.is_busy() && !component.wait_until_idle(timeout).await {
                    error!(
                        "Component {} on {} still busy after {:?}",
                        component.id(),
                        self.id,
                        timeout
                    );
                }
                component.set_busy(false);
            }
        }
        self.on_complete(execution.canvas());
    }

    pub(super) fn on_stop(&self) {
        if let Some(task) = lock(&self.timers).time_update.take() {
            task.cancel();
        }
        self.set_running(false);
        info!("Stopped {}", self.id);
    }

    pub(super) fn cancel_timers(&self) {
        let mut timers = lock(&self.timers);
        if let Some(task) = timers.time_update.take() {
            task.cancel();
        }
        if let Some(task) = timers.time_limit.take() {
            task.cancel();
        }
    }

    /// Reschedule the time limit against the current run time.
    pub(super) fn fix_time_limit(&self) {
        let limit = self.limit(counter::TIME);
        let (running, time_ms) = {
            let lifecycle = lock(&self.lifecycle);
            (lifecycle.running, lifecycle.time_ms)
        };
        let mut timers = lock(&self.timers);
        if let Some(task) = timers.time_limit.take() {
            task.cancel();
        }
        if !running || limit <= 0 {
            return;
        }
        let remaining = limit.saturating_mul(1000).saturating_sub(time_ms);
        let Ok(delay) = u64::try_from(remaining) else {
            return;
        };
        if delay == 0 {
            return;
        }
        let canvas_ref = self.self_ref.clone();
        timers.time_limit = Some(self.workspace.scheduler().schedule(
            Duration::from_millis(delay),
            move || {
                if let Some(canvas) = canvas_ref.upgrade() {
                    canvas.on_time_limit(limit);
                }
            },
        ));
    }

    fn on_time_limit(&self, limit: i64) {
        debug!("Time limit of {}s reached on {}", limit, self.id);
        let head = self.workspace.runner().head();
        self.set_time(limit.saturating_mul(1000));
        self.finish_on_limit(head);
    }

    /// Check a counter against its limit on the controller.
    pub(super) fn on_counter(&self, event: &Event) {
        let Event::Counter { counter, value, .. } = event else {
            return;
        };
        if !self.workspace.is_controller() || !self.is_running() {
            return;
        }
        let limit = self.limit(counter);
        if limit > 0 && limit <= *value {
            debug!("Limit {}={} reached on {}", counter, limit, self.id);
            let head = self.workspace.runner().head();
            self.finish_on_limit(head);
        }
    }

    fn finish_on_limit(&self, head: Option<Arc<TestExecution>>) {
        self.trigger_action(actions::STOP);
        self.trigger_action(actions::COMPLETE);
        if let Some(execution) = head
            && std::ptr::eq(execution.canvas().as_ref(), self)
        {
            execution.complete();
        }
    }

    pub(super) fn on_complete(self: &Arc<Self>, source: &Arc<Self>) {
        match &self.role {
            CanvasRole::Project(_) => self.project_complete(source),
            CanvasRole::Scenario(_) => self.scenario_complete(source),
        }
    }

    /// Cancel work in progress on this canvas, remotely when the scenario
    /// runs on agents.
    pub fn cancel_components(&self) {
        match &self.role {
            CanvasRole::Scenario(_) if !self.propagates() && self.has_assigned_agents() => {
                self.broadcast_cancel();
            }
            CanvasRole::Scenario(_) | CanvasRole::Project(_) => self.cancel_local(),
        }
    }

    pub(super) fn cancel_local(&self) {
        for component in self.components() {
            if component.is_busy() {
                component.trigger_action(actions::CANCEL);
            }
        }
    }

    /// Finish a run: mark it completed, build the summary, publish it.
    pub(super) fn generate_summary(&self) {
        self.set_completed(true);
        let summary = match self.build_summary() {
            Ok(summary) => summary,
            Err(err) => {
                warn!("{}", err);
                return;
            }
        };
        self.workspace.sink().publish(&self.id, &summary);
        *lock(&self.summary) = Some(Arc::new(summary));
        self.bus.fire(&Event::base(keys::SUMMARY, &self.id));
    }

    /// The summary of the last run, or `None` if it has not both started and
    /// ended.
    #[must_use]
    pub fn summary(&self) -> Option<Arc<Summary>> {
        if self.start_time().is_none() || self.end_time().is_none() {
            return None;
        }
        if let Some(summary) = lock(&self.summary).clone() {
            return Some(summary);
        }
        self.build_summary().ok().map(Arc::new)
    }

    fn build_summary(&self) -> AppResult<Summary> {
        let (Some(start), Some(end)) = (self.start_time(), self.end_time()) else {
            return Err(AppError::canvas(CanvasError::SummaryUnavailable {
                id: self.id.clone(),
            }));
        };
        let mut summary = Summary::new(&self.label(), start, end);
        summary.chapters.push(self.canvas_chapter());
        for scenario in self.scenarios() {
            summary.chapters.push(scenario.canvas_chapter());
        }
        for component in self.components() {
            if let Some(chapter) = component.generate_summary() {
                summary.chapters.push(chapter);
            }
        }
        Ok(summary)
    }

    fn canvas_chapter(&self) -> Chapter {
        let mut chapter = Chapter::new(&self.label());
        let lifecycle_section = {
            let lifecycle = lock(&self.lifecycle);
            let mut section = Section::new("Execution");
            if let Some(start) = lifecycle.start_time {
                section.add_entry("Start", start.format("%Y-%m-%d %H:%M:%S%.3f"));
            }
            if let Some(end) = lifecycle.end_time {
                section.add_entry("End", end.format("%Y-%m-%d %H:%M:%S%.3f"));
            }
            section.add_entry("Time (ms)", lifecycle.time_ms);
            section
        };
        chapter.add_section(lifecycle_section);

        let mut counters = Section::new("Counters");
        for (name, value) in self.counters.snapshot() {
            counters.add_entry(&name, value);
        }
        chapter.add_section(counters);

        let mut statistics = Section::new("Statistics");
        for name in self.statistics.names() {
            let Some(variable) = self.statistics.variable(&name) else {
                continue;
            };
            match variable.snapshot() {
                Ok(snapshot) => {
                    for (writer, value) in snapshot {
                        statistics.add_entry(&format!("{} ({})", name, writer), value);
                    }
                }
                Err(err) => debug!("Skipping statistic {} of {}: {}", name, self.id, err),
            }
        }
        chapter.add_section(statistics);
        chapter
    }

    /// Fire a workspace-level action into this project. Projects listen for
    /// workspace actions from load until release.
    pub(super) fn listen_to_workspace(&self) {
        let CanvasRole::Project(state) = &self.role else {
            return;
        };
        let project_ref = self.self_ref.clone();
        let id = self
            .workspace
            .bus()
            .subscribe(EventFilter::Kind(EventKind::Action), move |event| {
                if let Some(project) = project_ref.upgrade() {
                    project.trigger_action(event.key());
                }
            });
        state.set_workspace_subscription(id);
    }
}
