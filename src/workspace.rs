//! The workspace: process-wide settings, the shared scheduler and runner, and
//! the behaviour registry every canvas is created against.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::canvas::Canvas;
use crate::component::BehaviorRegistry;
use crate::config::{EngineSettings, ProjectConfig};
use crate::error::AppResult;
use crate::events::{Event, EventBus, keys};
use crate::execution::{Scheduler, TestRunner};
use crate::summary::SummarySink;

pub const WORKSPACE_ID: &str = "workspace";

/// Which side of a distributed run this process is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Controller,
    Agent,
}

pub struct Workspace {
    settings: EngineSettings,
    local_mode: AtomicBool,
    bus: EventBus,
    scheduler: Scheduler,
    runner: Arc<TestRunner>,
    registry: Arc<BehaviorRegistry>,
    sink: Arc<dyn SummarySink>,
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("mode", &self.settings.mode)
            .field("local_mode", &self.is_local_mode())
            .finish()
    }
}

impl Workspace {
    /// Create a workspace on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error when called outside of a tokio runtime.
    pub fn new(
        settings: EngineSettings,
        registry: Arc<BehaviorRegistry>,
        sink: Arc<dyn SummarySink>,
    ) -> AppResult<Arc<Self>> {
        let scheduler = Scheduler::current()?;
        let runner = TestRunner::new(scheduler.handle().clone());
        info!(
            "Workspace started as {:?} (local mode: {})",
            settings.mode, settings.local_mode
        );
        Ok(Arc::new(Self {
            local_mode: AtomicBool::new(settings.local_mode),
            settings,
            bus: EventBus::new(),
            scheduler,
            runner,
            registry,
            sink,
        }))
    }

    #[must_use]
    pub const fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    #[must_use]
    pub const fn mode(&self) -> ExecutionMode {
        self.settings.mode
    }

    #[must_use]
    pub fn is_controller(&self) -> bool {
        self.settings.mode == ExecutionMode::Controller
    }

    #[must_use]
    pub fn is_local_mode(&self) -> bool {
        self.local_mode.load(Ordering::SeqCst)
    }

    /// Switch between running scenarios in-process and on their agents.
    pub fn set_local_mode(&self, local_mode: bool) {
        if self.local_mode.swap(local_mode, Ordering::SeqCst) != local_mode {
            info!("Local mode set to {}", local_mode);
            self.bus.fire(&Event::base(keys::LOCAL_MODE, WORKSPACE_ID));
        }
    }

    #[must_use]
    pub const fn bus(&self) -> &EventBus {
        &self.bus
    }

    #[must_use]
    pub const fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    #[must_use]
    pub const fn runner(&self) -> &Arc<TestRunner> {
        &self.runner
    }

    #[must_use]
    pub const fn registry(&self) -> &Arc<BehaviorRegistry> {
        &self.registry
    }

    #[must_use]
    pub const fn sink(&self) -> &Arc<dyn SummarySink> {
        &self.sink
    }

    /// Trigger an action at workspace scope. Every project forwards it to
    /// its own listeners.
    pub fn trigger_action(&self, action: &str) {
        self.bus.fire(&Event::action(action, WORKSPACE_ID));
    }

    /// # Errors
    ///
    /// Returns an error when the project fails to initialise.
    pub fn create_project(self: &Arc<Self>, label: &str) -> AppResult<Arc<Canvas>> {
        self.load_project(ProjectConfig::new(label))
    }

    /// Build a project and everything below it from its persisted form.
    ///
    /// # Errors
    ///
    /// Returns an error when the project fails to initialise. Individual bad
    /// components or connections only flag the canvas instead.
    pub fn load_project(self: &Arc<Self>, config: ProjectConfig) -> AppResult<Arc<Canvas>> {
        Canvas::load_project(self, config)
    }
}
