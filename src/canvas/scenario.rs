use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::component::ComponentItem;
use crate::config::ScenarioConfig;
use crate::distributed::{
    AgentId, ChannelMessage, MessageEndpoint, ScenePayload, StatisticsReport, channels,
    format_timestamp,
};
use crate::error::{AppError, AppResult, CanvasError, DistributedError, TerminalError};
use crate::events::{CollectionChange, Event, EventFilter, EventKind, SubscriptionId, actions, keys};
use crate::sync::lock;
use crate::terminal::{Direction, Terminal};

use super::{Canvas, CanvasRole};

pub(super) struct ScenarioState {
    project: Weak<Canvas>,
    version: AtomicU64,
    follow_project: AtomicBool,
    exports: Mutex<Vec<String>>,
    reports: Mutex<BTreeMap<AgentId, StatisticsReport>>,
    awaiting_statistics: AtomicBool,
    endpoint: Mutex<Option<Arc<dyn MessageEndpoint>>>,
    project_subscription: Mutex<Option<SubscriptionId>>,
}

impl ScenarioState {
    pub(super) fn new(project: &Arc<Canvas>, version: u64, follow_project: bool) -> Self {
        Self {
            project: Arc::downgrade(project),
            version: AtomicU64::new(version),
            follow_project: AtomicBool::new(follow_project),
            exports: Mutex::new(Vec::new()),
            reports: Mutex::new(BTreeMap::new()),
            awaiting_statistics: AtomicBool::new(false),
            endpoint: Mutex::new(None),
            project_subscription: Mutex::new(None),
        }
    }

    pub(super) fn project(&self) -> Option<Arc<Canvas>> {
        self.project.upgrade()
    }

    pub(super) fn clear_reports(&self) {
        lock(&self.reports).clear();
        self.awaiting_statistics.store(false, Ordering::SeqCst);
    }

    pub(super) fn release(&self) {
        if let Some(project) = self.project.upgrade()
            && let Some(id) = lock(&self.project_subscription).take()
        {
            project.bus().unsubscribe(id);
        }
        *lock(&self.endpoint) = None;
        lock(&self.reports).clear();
    }
}

impl Canvas {
    fn scenario_state(&self) -> AppResult<&ScenarioState> {
        match &self.role {
            CanvasRole::Scenario(state) => Ok(state),
            CanvasRole::Project(_) => Err(AppError::canvas(CanvasError::NotAScenario {
                id: self.id.clone(),
            })),
        }
    }

    /// Content version of a scenario. Bumped once per batch of changes so
    /// agents can tell whether they run the current definition. `0` for
    /// projects.
    #[must_use]
    pub fn version(&self) -> u64 {
        match &self.role {
            CanvasRole::Scenario(state) => state.version.load(Ordering::SeqCst),
            CanvasRole::Project(_) => 0,
        }
    }

    /// Whether a scenario starts and stops with its project.
    #[must_use]
    pub fn follows_project(&self) -> bool {
        match &self.role {
            CanvasRole::Scenario(state) => state.follow_project.load(Ordering::SeqCst),
            CanvasRole::Project(_) => false,
        }
    }

    pub fn set_follow_project(&self, follow: bool) {
        if let CanvasRole::Scenario(state) = &self.role {
            state.follow_project.store(follow, Ordering::SeqCst);
        }
    }

    /// The persisted form of a scenario.
    ///
    /// # Errors
    ///
    /// Returns an error for projects.
    pub fn scenario_config(&self) -> AppResult<ScenarioConfig> {
        let state = self.scenario_state()?;
        Ok(ScenarioConfig {
            canvas: self.canvas_config(),
            version: state.version.load(Ordering::SeqCst),
            follow_project: state.follow_project.load(Ordering::SeqCst),
            exports: lock(&state.exports).clone(),
        })
    }

    // Exports

    /// Expose a component output of this scenario on the project level.
    ///
    /// # Errors
    ///
    /// Returns an error for projects, relay or input terminals, and terminals
    /// owned by another canvas.
    pub fn export(&self, terminal: &Terminal) -> AppResult<()> {
        let state = self.scenario_state()?;
        terminal.ensure_real("export")?;
        terminal.ensure_direction(Direction::Output)?;
        let owned = self
            .components()
            .iter()
            .any(|component| component.terminal(terminal.id()).is_some());
        if !owned {
            return Err(AppError::terminal(TerminalError::NotOwned {
                terminal: terminal.id().to_owned(),
                holder: self.id.clone(),
            }));
        }
        {
            let mut exports = lock(&state.exports);
            if exports.iter().any(|id| id == terminal.id()) {
                return Ok(());
            }
            exports.push(terminal.id().to_owned());
        }
        self.bus.fire(&Event::Collection {
            key: keys::EXPORTS,
            change: CollectionChange::Added,
            element: terminal.id().to_owned(),
            source: self.id.clone(),
        });
        Ok(())
    }

    pub fn unexport(&self, terminal_id: &str) {
        let CanvasRole::Scenario(state) = &self.role else {
            return;
        };
        let removed = {
            let mut exports = lock(&state.exports);
            let before = exports.len();
            exports.retain(|id| id != terminal_id);
            exports.len() != before
        };
        if removed {
            self.bus.fire(&Event::Collection {
                key: keys::EXPORTS,
                change: CollectionChange::Removed,
                element: terminal_id.to_owned(),
                source: self.id.clone(),
            });
        }
    }

    #[must_use]
    pub fn exports(&self) -> Vec<Arc<Terminal>> {
        let CanvasRole::Scenario(state) = &self.role else {
            return Vec::new();
        };
        let ids = lock(&state.exports).clone();
        ids.iter().filter_map(|id| self.find_terminal(id)).collect()
    }

    pub(super) fn restore_exports(&self, exports: Vec<String>) {
        let CanvasRole::Scenario(state) = &self.role else {
            return;
        };
        let mut kept = Vec::with_capacity(exports.len());
        for id in exports {
            if self.find_terminal(&id).is_some() {
                kept.push(id);
            } else {
                warn!("Dropping export of unknown terminal {} on {}", id, self.id);
            }
        }
        *lock(&state.exports) = kept;
    }

    // Listeners

    pub(super) fn listen_to_self(&self) {
        let scenario_ref = self.self_ref.clone();
        self.bus.subscribe(EventFilter::All, move |event| {
            if let Some(scenario) = scenario_ref.upgrade() {
                scenario.on_own_event(event);
            }
        });
    }

    fn on_own_event(&self, event: &Event) {
        match event {
            Event::Collection { .. } => self.request_version_bump(),
            Event::Action { action, source } if *source == self.id && !self.propagates() => {
                self.fire_remote_action(action);
            }
            Event::Base { key, .. } => match *key {
                keys::LABEL | keys::EXPORTS => self.request_version_bump(),
                keys::INCREMENT_VERSION => {
                    if let CanvasRole::Scenario(state) = &self.role {
                        let version = state.version.fetch_add(1, Ordering::SeqCst);
                        debug!("Scenario {} now at version {}", self.id, version.saturating_add(1));
                    }
                }
                _ => {}
            },
            Event::Action { .. } | Event::RemoteAction { .. } | Event::Counter { .. } => {}
        }
    }

    /// Coalesces every change made during one dispatch on the calling thread
    /// into a single bump.
    fn request_version_bump(&self) {
        if self.is_scenario() {
            self.bus
                .defer_unique(Event::base(keys::INCREMENT_VERSION, &self.id));
        }
    }

    pub(super) fn listen_to_project(&self, project: &Canvas) {
        let CanvasRole::Scenario(state) = &self.role else {
            return;
        };
        let scenario_ref = self.self_ref.clone();
        let id = project
            .bus()
            .subscribe(EventFilter::Kind(EventKind::Action), move |event| {
                if let Some(scenario) = scenario_ref.upgrade() {
                    scenario.on_project_action(event);
                }
            });
        *lock(&state.project_subscription) = Some(id);
    }

    fn on_project_action(&self, event: &Event) {
        let action = event.key();
        if !self.follows_project() && (action == actions::START || action == actions::STOP) {
            return;
        }
        if !self.propagates() || action == actions::COUNTER_RESET {
            self.fire_remote_action(action);
        }
        self.bus.fire(event);
    }

    fn fire_remote_action(&self, action: &str) {
        self.bus.fire(&Event::RemoteAction {
            action: action.to_owned(),
            source: self.id.clone(),
        });
        self.relay_remote_action(None, action);
    }

    /// Send an action to every agent this scenario is assigned to. Only does
    /// anything for scenarios on a controller outside local mode.
    pub(crate) fn relay_remote_action(&self, component_id: Option<&str>, action: &str) {
        if self.propagates() || !self.is_scenario() {
            return;
        }
        let Some(project) = self.project() else {
            return;
        };
        let message = ChannelMessage {
            channel: channels::SCENE.to_owned(),
            scenario_id: self.id.clone(),
            version: self.version(),
            payload: ScenePayload::Action {
                action: action.to_owned(),
                component_id: component_id.map(str::to_owned),
            },
        };
        project.broadcast_message(self, &message);
    }

    // Agent side

    /// Attach the link an agent uses to talk back to its controller.
    pub fn attach_controller_endpoint(&self, endpoint: Arc<dyn MessageEndpoint>) {
        if let CanvasRole::Scenario(state) = &self.role {
            *lock(&state.endpoint) = Some(endpoint);
        }
    }

    pub(crate) fn send_to_controller(&self, message: ChannelMessage) -> AppResult<()> {
        let state = self.scenario_state()?;
        let endpoint = lock(&state.endpoint).clone().ok_or_else(|| {
            AppError::distributed(DistributedError::MissingEndpoint {
                id: self.id.clone(),
            })
        })?;
        endpoint.send_message(message)
    }

    /// Handle a scene message sent by the controller to this scenario.
    ///
    /// # Errors
    ///
    /// Returns an error when the message targets an unknown component.
    pub fn handle_controller_message(self: &Arc<Self>, message: ChannelMessage) -> AppResult<()> {
        match message.payload {
            ScenePayload::CancelComponents => {
                if message.version != self.version() {
                    warn!(
                        "Cancel for {} at version {}, local version is {}",
                        self.id,
                        message.version,
                        self.version()
                    );
                }
                self.cancel_local();
            }
            ScenePayload::Action {
                action,
                component_id: Some(component_id),
            } => self.require_component(&component_id)?.trigger_action(&action),
            ScenePayload::Action {
                action,
                component_id: None,
            } => match action.as_str() {
                actions::START => {
                    self.start()?;
                }
                actions::STOP => self.stop(),
                other => self.trigger_action(other),
            },
            ScenePayload::ComponentMessage {
                component_id,
                message: terminal_message,
            } => self
                .require_component(&component_id)?
                .receive_remote_message(terminal_message),
            ScenePayload::Statistics(_) => {
                warn!("Ignoring statistics sent to agent scenario {}", self.id);
            }
        }
        Ok(())
    }

    fn require_component(&self, id: &str) -> AppResult<Arc<ComponentItem>> {
        self.component(id).ok_or_else(|| {
            AppError::canvas(CanvasError::UnknownComponent {
                id: id.to_owned(),
                canvas: self.id.clone(),
            })
        })
    }

    fn report_statistics(&self) {
        let mut components = BTreeMap::new();
        let mut variables = BTreeMap::new();
        for component in self.components() {
            components.insert(component.id().to_owned(), component.collect_statistics_data());
            if component.statistics().is_empty() {
                continue;
            }
            match component.statistics().snapshot() {
                Ok(snapshot) => {
                    variables.insert(component.id().to_owned(), snapshot);
                }
                Err(err) => warn!(
                    "Cannot snapshot statistics of {} on {}: {}",
                    component.id(),
                    self.id,
                    err
                ),
            }
        }
        let now = Utc::now();
        let report = StatisticsReport {
            scene_id: self.id.clone(),
            start_time: format_timestamp(self.start_time().unwrap_or(now)),
            end_time: format_timestamp(self.end_time().unwrap_or(now)),
            components,
            variables,
        };
        let message = ChannelMessage {
            channel: channels::AGENT.to_owned(),
            scenario_id: self.id.clone(),
            version: self.version(),
            payload: ScenePayload::Statistics(report),
        };
        if let Err(err) = self.send_to_controller(message) {
            error!("Cannot report statistics of {}: {}", self.id, err);
        }
    }

    // Controller side

    /// Agents assigned to this scenario that are currently ready.
    fn active_agents(&self) -> Vec<AgentId> {
        let Some(project) = self.project() else {
            return Vec::new();
        };
        project
            .assigned_agents(&self.id)
            .into_iter()
            .filter(|agent| agent.is_ready())
            .map(|agent| agent.id().clone())
            .collect()
    }

    pub(super) fn has_active_agents(&self) -> bool {
        !self.active_agents().is_empty()
    }

    pub(super) fn has_assigned_agents(&self) -> bool {
        self.project()
            .is_some_and(|project| !project.agents_assigned_to(&self.id).is_empty())
    }

    pub(super) fn broadcast_cancel(&self) {
        let Some(project) = self.project() else {
            return;
        };
        let message = ChannelMessage {
            channel: channels::SCENE.to_owned(),
            scenario_id: self.id.clone(),
            version: self.version(),
            payload: ScenePayload::CancelComponents,
        };
        project.broadcast_message(self, &message);
    }

    /// Whether every ready agent assigned to this scenario has reported.
    #[must_use]
    pub fn statistics_ready(&self) -> bool {
        let CanvasRole::Scenario(state) = &self.role else {
            return false;
        };
        let active = self.active_agents();
        let reports = lock(&state.reports);
        active.iter().all(|agent| reports.contains_key(agent))
    }

    /// Whether agent reports are pending or already partly in, so a change
    /// in agent readiness may complete the scenario.
    pub(super) fn expects_reports(&self) -> bool {
        match &self.role {
            CanvasRole::Scenario(state) => {
                state.awaiting_statistics.load(Ordering::SeqCst)
                    || !lock(&state.reports).is_empty()
            }
            CanvasRole::Project(_) => false,
        }
    }

    /// Store an agent's report, and once every active agent has reported
    /// hand the merged data to the components and complete the scenario.
    pub(crate) fn handle_statistics_data(&self, agent: &AgentId, report: StatisticsReport) {
        let CanvasRole::Scenario(state) = &self.role else {
            return;
        };
        debug!("Statistics for {} from agent {}", self.id, agent);
        lock(&state.reports).insert(agent.clone(), report);
        self.check_statistics_ready();
    }

    pub(super) fn check_statistics_ready(&self) {
        let CanvasRole::Scenario(state) = &self.role else {
            return;
        };
        if !self.statistics_ready() || self.is_completed() {
            return;
        }
        let reports = lock(&state.reports).clone();
        for component in self.components() {
            for (agent, report) in &reports {
                let Some(snapshot) = report.variables.get(component.id()) else {
                    continue;
                };
                if let Err(err) = component.statistics().merge(snapshot) {
                    warn!(
                        "Dropping statistics of {} from agent {}: {}",
                        component.id(),
                        agent,
                        err
                    );
                }
            }
            let data: BTreeMap<AgentId, Value> = reports
                .iter()
                .map(|(agent, report)| {
                    (
                        agent.clone(),
                        report
                            .components
                            .get(component.id())
                            .cloned()
                            .unwrap_or(Value::Null),
                    )
                })
                .collect();
            component.handle_statistics_data(&data);
        }
        state.awaiting_statistics.store(false, Ordering::SeqCst);
        self.set_completed(true);
        self.bus.fire(&Event::base(keys::ON_COMPLETE_DONE, &self.id));
    }

    pub(super) fn scenario_complete(self: &Arc<Self>, source: &Arc<Self>) {
        let source_is_self = Arc::ptr_eq(source, self);
        if !self.workspace.is_controller() {
            self.report_statistics();
            self.set_time(0);
            return;
        }
        if self.workspace.is_local_mode() {
            if source_is_self {
                self.generate_summary();
            } else {
                self.set_completed(true);
            }
            return;
        }
        if !self.has_active_agents() {
            if source_is_self {
                self.generate_summary();
            } else {
                self.set_completed(true);
            }
            return;
        }
        if let CanvasRole::Scenario(state) = &self.role
            && !self.is_completed()
        {
            state.awaiting_statistics.store(true, Ordering::SeqCst);
        }
        if !source_is_self {
            self.check_statistics_ready();
            return;
        }
        let scenario_ref = self.self_ref.clone();
        let id = self.bus.subscribe_once(
            EventFilter::key(EventKind::Base, keys::ON_COMPLETE_DONE),
            move |_| {
                if let Some(scenario) = scenario_ref.upgrade() {
                    scenario.generate_summary();
                }
            },
        );
        if self.is_completed() && self.bus.unsubscribe(id) {
            self.generate_summary();
        }
    }
}
