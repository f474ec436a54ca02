//! Canvases: projects and scenarios.
//!
//! A canvas owns its components and the connections between their
//! terminals, and runs through the START / PRE_STOP / STOP phases of every
//! execution it takes part in. Projects additionally own scenarios, agents and
//! assignments; scenarios carry a content version and reconcile statistics
//! reported by the agents they are deployed to.

mod lifecycle;
mod limits;
mod project;
mod scenario;


use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::watch;
use tracing::{debug, error, warn};

use crate::component::ComponentItem;
use crate::config::types::LIMITS_ATTRIBUTE;
use crate::config::{
    CanvasConfig, ComponentConfig, ConnectionConfig, ProjectConfig, ScenarioConfig, content_hash,
    parse_limits,
};
use crate::counter::{self, CounterSupport};
use crate::error::{AppError, AppResult, CanvasError, TerminalError};
use crate::events::{
    CollectionChange, Event, EventBus, EventFilter, EventKind, actions, keys,
};
use crate::execution::TaskId;
use crate::statistics::{CounterStatisticsWriter, StatisticHolder};
use crate::summary::Summary;
use crate::sync::lock;
use crate::terminal::{
    Connection, Direction, Terminal, TerminalEvent, TerminalHolder, TerminalSet,
};
use crate::workspace::Workspace;

use lifecycle::{CanvasTask, Lifecycle, Timers};
use project::ProjectState;
use scenario::ScenarioState;

/// Label of a scenario's input terminal that enables or disables it.
pub const STATE_TERMINAL: &str = "state";

enum CanvasRole {
    Project(ProjectState),
    Scenario(ScenarioState),
}

pub struct Canvas {
    id: String,
    self_ref: Weak<Canvas>,
    workspace: Arc<Workspace>,
    role: CanvasRole,
    config: Mutex<CanvasConfig>,
    bus: EventBus,
    components: Mutex<Vec<Arc<ComponentItem>>>,
    connections: Mutex<Vec<Arc<Connection>>>,
    terminals: TerminalSet,
    counters: CounterSupport,
    statistics: StatisticHolder,
    limits: Mutex<BTreeMap<String, i64>>,
    lifecycle: Mutex<Lifecycle>,
    completed: watch::Sender<bool>,
    timers: Mutex<Timers>,
    summary: Mutex<Option<Arc<Summary>>>,
    saved_hash: Mutex<Option<String>>,
    loading_error: AtomicBool,
    released: AtomicBool,
    task: Mutex<Option<TaskId>>,
}

impl std::fmt::Debug for Canvas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Canvas")
            .field("id", &self.id)
            .field("project", &self.is_project())
            .field("running", &self.is_running())
            .finish()
    }
}

impl Canvas {
    fn new(workspace: &Arc<Workspace>, role: CanvasRole, config: CanvasConfig) -> Arc<Self> {
        let (completed, _) = watch::channel(false);
        Arc::new_cyclic(|self_ref| Self {
            id: config.id.clone(),
            self_ref: self_ref.clone(),
            workspace: Arc::clone(workspace),
            role,
            config: Mutex::new(config),
            bus: EventBus::new(),
            components: Mutex::new(Vec::new()),
            connections: Mutex::new(Vec::new()),
            terminals: TerminalSet::default(),
            counters: CounterSupport::default(),
            statistics: StatisticHolder::default(),
            limits: Mutex::new(BTreeMap::new()),
            lifecycle: Mutex::new(Lifecycle::default()),
            completed,
            timers: Mutex::new(Timers::default()),
            summary: Mutex::new(None),
            saved_hash: Mutex::new(None),
            loading_error: AtomicBool::new(false),
            released: AtomicBool::new(false),
            task: Mutex::new(None),
        })
    }

    /// Build a project, its scenarios, agents and assignments.
    ///
    /// # Errors
    ///
    /// Returns an error when the project or one of its scenarios cannot be
    /// initialised at all.
    pub(crate) fn load_project(
        workspace: &Arc<Workspace>,
        config: ProjectConfig,
    ) -> AppResult<Arc<Self>> {
        let ProjectConfig {
            canvas,
            scenarios,
            agents,
            assignments,
        } = config;
        let project = Self::new(
            workspace,
            CanvasRole::Project(ProjectState::default()),
            canvas,
        );
        project.init_base()?;
        project.load_components();

        for agent in agents {
            project.add_agent(&agent.id, &agent.label, agent.url)?;
        }
        for scenario in scenarios {
            let scenario = Self::load_scenario(&project, scenario)?;
            project.attach_scenario(scenario, false);
        }
        for assignment in assignments {
            if let Err(err) = project.assign(&assignment.scenario, &assignment.agent) {
                error!("Dropping assignment on {}: {}", project.id, err);
                project.loading_error.store(true, Ordering::SeqCst);
            }
        }
        project.load_connections();
        project.listen_to_workspace();
        project.register_task();
        project.mark_clean();
        debug!("Loaded project {}", project.id);
        Ok(project)
    }

    fn load_scenario(project: &Arc<Self>, config: ScenarioConfig) -> AppResult<Arc<Self>> {
        let ScenarioConfig {
            canvas,
            version,
            follow_project,
            exports,
        } = config;
        let scenario = Self::new(
            &project.workspace,
            CanvasRole::Scenario(ScenarioState::new(project, version, follow_project)),
            canvas,
        );
        scenario.init_base()?;
        let holder: Weak<dyn TerminalHolder> = scenario.self_ref.clone();
        scenario.terminals.create(
            holder,
            &scenario.id,
            STATE_TERMINAL,
            "Enables or disables the scenario",
            Direction::Input,
        )?;
        scenario.load_components();
        scenario.load_connections();
        scenario.restore_exports(exports);
        scenario.listen_to_self();
        scenario.listen_to_project(project);
        scenario.register_task();
        scenario.mark_clean();
        debug!("Loaded scenario {}", scenario.id);
        Ok(scenario)
    }

    fn init_base(&self) -> AppResult<()> {
        let limits_attribute = self.attribute(LIMITS_ATTRIBUTE).unwrap_or_default();
        *lock(&self.limits) = parse_limits(&limits_attribute);

        for name in counter::AGGREGATED {
            self.statistics
                .add_variable_with_writer(name, CounterStatisticsWriter::TYPE)?;
        }

        let action_ref = self.self_ref.clone();
        self.bus
            .subscribe(EventFilter::Kind(EventKind::Action), move |event| {
                if let Some(canvas) = action_ref.upgrade() {
                    canvas.on_action(event);
                }
            });
        let counter_ref = self.self_ref.clone();
        self.bus
            .subscribe(EventFilter::Kind(EventKind::Counter), move |event| {
                if let Some(canvas) = counter_ref.upgrade() {
                    canvas.on_counter(event);
                }
            });
        Ok(())
    }

    /// Create every configured component. Entries that fail are logged,
    /// stripped from the config once the pass is over, and flag the canvas.
    fn load_components(self: &Arc<Self>) {
        let configs = lock(&self.config).components.clone();
        let mut failed = Vec::new();
        for (index, config) in configs.into_iter().enumerate() {
            let id = config.id.clone();
            match ComponentItem::create(self, config) {
                Ok(component) => lock(&self.components).push(component),
                Err(err) => {
                    error!("Failed to load component {} on {}: {}", id, self.id, err);
                    failed.push(index);
                }
            }
        }
        if !failed.is_empty() {
            let mut config = lock(&self.config);
            config.components = strip_indices(std::mem::take(&mut config.components), &failed);
            self.loading_error.store(true, Ordering::SeqCst);
        }
    }

    fn load_connections(self: &Arc<Self>) {
        let configs = lock(&self.config).connections.clone();
        let mut failed = Vec::new();
        for (index, config) in configs.iter().enumerate() {
            if let Err(err) = self.load_connection(config) {
                error!(
                    "Failed to load connection {} -> {} on {}: {}",
                    config.output, config.input, self.id, err
                );
                failed.push(index);
            }
        }
        if !failed.is_empty() {
            let mut config = lock(&self.config);
            config.connections = strip_indices(std::mem::take(&mut config.connections), &failed);
            self.loading_error.store(true, Ordering::SeqCst);
        }
    }

    fn load_connection(self: &Arc<Self>, config: &ConnectionConfig) -> AppResult<()> {
        let output = self.require_terminal(&config.output)?;
        let input = self.require_terminal(&config.input)?;
        validate_endpoints(&output, &input)?;
        self.attach_connection(&output, &input, false);
        Ok(())
    }

    fn register_task(&self) {
        let task = Arc::new(CanvasTask::new(self.self_ref.clone()));
        let id = self.workspace.runner().register_task(task);
        *lock(&self.task) = Some(id);
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub const fn workspace(&self) -> &Arc<Workspace> {
        &self.workspace
    }

    #[must_use]
    pub const fn bus(&self) -> &EventBus {
        &self.bus
    }

    #[must_use]
    pub const fn statistics(&self) -> &StatisticHolder {
        &self.statistics
    }

    #[must_use]
    pub const fn is_project(&self) -> bool {
        matches!(self.role, CanvasRole::Project(_))
    }

    #[must_use]
    pub const fn is_scenario(&self) -> bool {
        matches!(self.role, CanvasRole::Scenario(_))
    }

    /// The owning project of a scenario. `None` for projects.
    #[must_use]
    pub fn project(&self) -> Option<Arc<Self>> {
        match &self.role {
            CanvasRole::Project(_) => None,
            CanvasRole::Scenario(state) => state.project(),
        }
    }

    /// The project itself, or the project owning this scenario.
    ///
    /// # Errors
    ///
    /// Returns an error if the scenario outlived its project.
    pub fn require_project(&self) -> AppResult<Arc<Self>> {
        match &self.role {
            CanvasRole::Project(_) => self.self_arc(),
            CanvasRole::Scenario(state) => state.project().ok_or_else(|| {
                AppError::canvas(CanvasError::Released {
                    id: self.id.clone(),
                })
            }),
        }
    }

    fn self_arc(&self) -> AppResult<Arc<Self>> {
        self.self_ref.upgrade().ok_or_else(|| {
            AppError::canvas(CanvasError::Released {
                id: self.id.clone(),
            })
        })
    }

    /// Whether actions and terminal messages are handled in this process.
    /// Scenarios on a controller outside local mode leave that to their agents.
    #[must_use]
    pub fn propagates(&self) -> bool {
        self.is_project() || !self.workspace.is_controller() || self.workspace.is_local_mode()
    }

    #[must_use]
    pub fn label(&self) -> String {
        lock(&self.config).label.clone()
    }

    pub fn set_label(&self, label: &str) {
        {
            let mut config = lock(&self.config);
            if config.label == label {
                return;
            }
            label.clone_into(&mut config.label);
        }
        self.bus.fire(&Event::base(keys::LABEL, &self.id));
    }

    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<String> {
        lock(&self.config).attributes.get(key).cloned()
    }

    pub fn set_attribute(&self, key: &str, value: &str) {
        lock(&self.config)
            .attributes
            .insert(key.to_owned(), value.to_owned());
    }

    #[must_use]
    pub fn is_loading_error(&self) -> bool {
        self.loading_error.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    fn ensure_live(&self) -> AppResult<()> {
        if self.is_released() {
            return Err(AppError::canvas(CanvasError::Released {
                id: self.id.clone(),
            }));
        }
        Ok(())
    }

    /// Fire `action` on this canvas with the canvas as source.
    pub fn trigger_action(&self, action: &str) {
        self.bus.fire(&Event::action(action, &self.id));
    }

    fn on_action(self: &Arc<Self>, event: &Event) {
        match event.key() {
            actions::COUNTER_RESET => self.reset(),
            actions::START if event.source() == self.id => {
                if let Err(err) = self.start() {
                    warn!("Cannot start {}: {}", self.id, err);
                }
            }
            _ => {}
        }
    }

    // Components

    #[must_use]
    pub fn components(&self) -> Vec<Arc<ComponentItem>> {
        lock(&self.components).clone()
    }

    #[must_use]
    pub fn component(&self, id: &str) -> Option<Arc<ComponentItem>> {
        lock(&self.components)
            .iter()
            .find(|component| component.id() == id)
            .cloned()
    }

    #[must_use]
    pub fn get_component_by_label(&self, label: &str) -> Option<Arc<ComponentItem>> {
        lock(&self.components)
            .iter()
            .find(|component| component.label() == label)
            .cloned()
    }

    /// # Errors
    ///
    /// See [`Canvas::inject_component`].
    pub fn create_component(
        self: &Arc<Self>,
        label: &str,
        type_name: &str,
    ) -> AppResult<Arc<ComponentItem>> {
        self.inject_component(ComponentConfig::new(label, type_name))
    }

    /// Create a component from its persisted form and add it to the canvas.
    ///
    /// # Errors
    ///
    /// Returns an error for released canvases, empty labels or types,
    /// unregistered types, or a failing behaviour factory.
    pub fn inject_component(
        self: &Arc<Self>,
        config: ComponentConfig,
    ) -> AppResult<Arc<ComponentItem>> {
        self.ensure_live()?;
        let component = ComponentItem::create(self, config)?;
        lock(&self.components).push(Arc::clone(&component));
        lock(&self.config).components.push(component.config());
        self.bus.fire(&Event::Collection {
            key: keys::COMPONENTS,
            change: CollectionChange::Added,
            element: component.id().to_owned(),
            source: self.id.clone(),
        });
        Ok(component)
    }

    pub(crate) fn forget_component(&self, id: &str) {
        let removed = {
            let mut components = lock(&self.components);
            let before = components.len();
            components.retain(|component| component.id() != id);
            components.len() != before
        };
        lock(&self.config)
            .components
            .retain(|component| component.id != id);
        if removed {
            self.bus.fire(&Event::Collection {
                key: keys::COMPONENTS,
                change: CollectionChange::Removed,
                element: id.to_owned(),
                source: self.id.clone(),
            });
        }
    }

    pub(crate) fn sync_component_config(&self, updated: ComponentConfig) {
        let mut config = lock(&self.config);
        if let Some(entry) = config
            .components
            .iter_mut()
            .find(|component| component.id == updated.id)
        {
            *entry = updated;
        }
    }

    // Terminals and connections

    /// Terminals owned by the canvas itself.
    #[must_use]
    pub fn terminals(&self) -> Vec<Arc<Terminal>> {
        self.terminals.all()
    }

    /// Find a terminal of this canvas, its components, and for projects every
    /// scenario below it.
    #[must_use]
    pub fn find_terminal(&self, id: &str) -> Option<Arc<Terminal>> {
        if let Some(terminal) = self.terminals.get(id) {
            return Some(terminal);
        }
        if let Some(terminal) = self
            .components()
            .iter()
            .find_map(|component| component.terminal(id))
        {
            return Some(terminal);
        }
        self.scenarios()
            .iter()
            .find_map(|scenario| scenario.find_terminal(id))
    }

    fn require_terminal(&self, id: &str) -> AppResult<Arc<Terminal>> {
        self.find_terminal(id).ok_or_else(|| {
            AppError::terminal(TerminalError::NotFound { id: id.to_owned() })
        })
    }

    #[must_use]
    pub fn connections(&self) -> Vec<Arc<Connection>> {
        lock(&self.connections).clone()
    }

    /// Connect `output` to `input`, returning the existing connection when the
    /// pair is already connected. Connections between terminals of different
    /// canvases are owned by the project.
    ///
    /// # Errors
    ///
    /// Returns an error for relay terminals, wrong directions, or terminals
    /// whose holder is gone.
    pub fn connect(
        self: &Arc<Self>,
        output: &Arc<Terminal>,
        input: &Arc<Terminal>,
    ) -> AppResult<Arc<Connection>> {
        self.ensure_live()?;
        validate_endpoints(output, input)?;
        let output_canvas = terminal_canvas(output)?;
        let input_canvas = terminal_canvas(input)?;
        let owner = if Arc::ptr_eq(&output_canvas, &input_canvas) {
            output_canvas
        } else {
            output_canvas.require_project()?
        };
        if !Arc::ptr_eq(&owner, self) {
            return owner.connect(output, input);
        }
        Ok(self.attach_connection(output, input, true))
    }

    fn attach_connection(
        self: &Arc<Self>,
        output: &Arc<Terminal>,
        input: &Arc<Terminal>,
        persist: bool,
    ) -> Arc<Connection> {
        let (connection, created) = {
            let mut connections = lock(&self.connections);
            match output.find_connection_to(input) {
                Some(existing) => (existing, false),
                None => {
                    let connection = Connection::establish(self, output, input);
                    connections.push(Arc::clone(&connection));
                    (connection, true)
                }
            }
        };
        if created {
            if persist {
                lock(&self.config).connections.push(ConnectionConfig {
                    output: output.id().to_owned(),
                    input: input.id().to_owned(),
                });
            }
            connection.announce();
            if persist {
                self.bus.fire(&Event::Collection {
                    key: keys::CONNECTIONS,
                    change: CollectionChange::Added,
                    element: connection.id().to_owned(),
                    source: self.id.clone(),
                });
            }
        }
        connection
    }

    pub(crate) fn forget_connection(&self, connection: &Connection) {
        let removed = {
            let mut connections = lock(&self.connections);
            let before = connections.len();
            connections.retain(|owned| owned.id() != connection.id());
            connections.len() != before
        };
        lock(&self.config).connections.retain(|config| {
            config.output != connection.output().id() || config.input != connection.input().id()
        });
        if removed && !self.is_released() {
            self.bus.fire(&Event::Collection {
                key: keys::CONNECTIONS,
                change: CollectionChange::Removed,
                element: connection.id().to_owned(),
                source: self.id.clone(),
            });
        }
    }

    // Counters

    /// Current value of a counter. `Time` is the elapsed run time in seconds.
    #[must_use]
    pub fn counter(&self, name: &str) -> i64 {
        if name == counter::TIME {
            return self.time_ms().saturating_div(1000);
        }
        self.counters.get(name)
    }

    #[must_use]
    pub fn counter_names(&self) -> Vec<String> {
        self.counters.names()
    }

    /// Aggregate a component's counter increment into this canvas and its
    /// project.
    pub(crate) fn increment_counter(&self, name: &str, delta: i64) {
        let value = self.counters.increment(name, delta);
        if let Some(variable) = self.statistics.variable(name) {
            variable.update(value);
        }
        self.bus.fire(&Event::Counter {
            counter: name.to_owned(),
            value,
            source: self.id.clone(),
        });
        if let Some(project) = self.project() {
            project.increment_counter(name, delta);
        }
    }

    // Persistence

    /// The persisted form of this canvas alone.
    #[must_use]
    pub fn canvas_config(&self) -> CanvasConfig {
        lock(&self.config).clone()
    }

    fn hash_source(&self) -> AppResult<String> {
        match &self.role {
            CanvasRole::Project(_) => content_hash(&self.project_config()?),
            CanvasRole::Scenario(_) => content_hash(&self.scenario_config()?),
        }
    }

    /// SHA-256 of the persisted form, including every scenario of a project.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized.
    pub fn content_hash(&self) -> AppResult<String> {
        self.hash_source()
    }

    /// Whether the persisted form changed since the last [`Canvas::mark_clean`].
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        match self.hash_source() {
            Ok(hash) => lock(&self.saved_hash).as_deref() != Some(hash.as_str()),
            Err(err) => {
                warn!("Cannot hash {}: {}", self.id, err);
                true
            }
        }
    }

    pub fn mark_clean(&self) {
        match self.hash_source() {
            Ok(hash) => *lock(&self.saved_hash) = Some(hash),
            Err(err) => warn!("Cannot hash {}: {}", self.id, err),
        }
    }

    /// Tear down the canvas and everything it owns. Safe to call more than once.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        self.bus.fire(&Event::base(keys::RELEASED, &self.id));
        if let Some(task) = lock(&self.task).take() {
            self.workspace.runner().unregister_task(task);
        }
        self.cancel_timers();
        match &self.role {
            CanvasRole::Project(state) => state.release(&self.workspace),
            CanvasRole::Scenario(state) => state.release(),
        }

        let components: Vec<Arc<ComponentItem>> = lock(&self.components).drain(..).collect();
        for component in components {
            component.release();
        }
        let connections: Vec<Arc<Connection>> = lock(&self.connections).drain(..).collect();
        for connection in connections {
            connection.disconnect();
        }
        self.terminals.release();
        *lock(&self.summary) = None;
        self.statistics.release();
        self.bus.clear();
        debug!("Released canvas {}", self.id);
    }
}

impl TerminalHolder for Canvas {
    fn holder_id(&self) -> &str {
        &self.id
    }

    fn canvas(&self) -> Option<Arc<Canvas>> {
        self.self_ref.upgrade()
    }

    fn handle_terminal_event(&self, terminal: &Arc<Terminal>, event: TerminalEvent) {
        let TerminalEvent::Message(message) = event else {
            return;
        };
        if terminal.label() != STATE_TERMINAL {
            return;
        }
        match message.get("enabled").and_then(serde_json::Value::as_bool) {
            Some(true) => self.trigger_action(actions::START),
            Some(false) => self.stop(),
            None => debug!("Ignoring state message without 'enabled' on {}", self.id),
        }
    }
}

fn validate_endpoints(output: &Terminal, input: &Terminal) -> AppResult<()> {
    output.ensure_real("connect")?;
    input.ensure_real("connect")?;
    output.ensure_direction(Direction::Output)?;
    input.ensure_direction(Direction::Input)
}

fn terminal_canvas(terminal: &Terminal) -> AppResult<Arc<Canvas>> {
    terminal.canvas().ok_or_else(|| {
        AppError::canvas(CanvasError::DetachedTerminal {
            id: terminal.id().to_owned(),
        })
    })
}

fn strip_indices<T>(items: Vec<T>, indices: &[usize]) -> Vec<T> {
    items
        .into_iter()
        .enumerate()
        .filter(|(index, _)| !indices.contains(index))
        .map(|(_, item)| item)
        .collect()
}
