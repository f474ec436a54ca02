//! Components: hosts for a pluggable behaviour, living on exactly one canvas.
//!
//! A component owns its terminals, counters and statistic variables. Inbound
//! terminal events are handed to the behaviour either inline, for components
//! flagged non-blocking, or on the shared blocking pool.

mod behavior;
mod context;

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tracing::debug;

use crate::canvas::Canvas;
use crate::config::ComponentConfig;
use crate::counter::{self, CounterSupport};
use crate::distributed::{AgentId, ChannelMessage, ScenePayload, channels};
use crate::error::{AppError, AppResult, ComponentError, TerminalError};
use crate::events::{
    CollectionChange, Event, EventBus, EventFilter, EventKind, SubscriptionId, actions, keys,
};
use crate::statistics::StatisticHolder;
use crate::summary::Chapter;
use crate::sync::{lock, read, write};
use crate::terminal::{
    Direction, Terminal, TerminalEvent, TerminalHolder, TerminalKind, TerminalMessage, TerminalSet,
};
use crate::workspace::Workspace;

pub use behavior::{
    ActivityFlag, ActivityStrategy, BehaviorFactory, BehaviorRegistry, ComponentBehavior,
    ComponentDescriptor,
};
pub use context::ComponentContext;

pub const REMOTE_TERMINAL: &str = "remoteTerminal";
pub const CONTROLLER_TERMINAL: &str = "controllerTerminal";

#[derive(Default)]
struct Subscriptions {
    canvas: Option<SubscriptionId>,
    project: Option<SubscriptionId>,
    context: Vec<SubscriptionId>,
}

pub struct ComponentItem {
    id: String,
    type_name: String,
    self_ref: Weak<ComponentItem>,
    canvas: Weak<Canvas>,
    workspace: Arc<Workspace>,
    config: Mutex<ComponentConfig>,
    behavior: RwLock<Option<Arc<dyn ComponentBehavior>>>,
    terminals: TerminalSet,
    remote_terminal: Arc<Terminal>,
    controller_terminal: Arc<Terminal>,
    agent_terminals: Mutex<BTreeMap<AgentId, Arc<Terminal>>>,
    counters: CounterSupport,
    statistics: StatisticHolder,
    bus: EventBus,
    busy: watch::Sender<bool>,
    invalid: AtomicBool,
    non_blocking: AtomicBool,
    released: AtomicBool,
    activity: Mutex<Option<(Arc<dyn ActivityStrategy>, SubscriptionId)>>,
    subscriptions: Mutex<Subscriptions>,
}

impl std::fmt::Debug for ComponentItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentItem")
            .field("id", &self.id)
            .field("type", &self.type_name)
            .field("released", &self.is_released())
            .finish()
    }
}

impl ComponentItem {
    /// Build a component on `canvas` and instantiate its behaviour.
    ///
    /// The caller attaches the returned component to the canvas.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty label or type, an unregistered type, or
    /// when the behaviour factory fails. Nothing is left behind on failure.
    pub(crate) fn create(canvas: &Arc<Canvas>, mut config: ComponentConfig) -> AppResult<Arc<Self>> {
        if config.label.trim().is_empty() {
            return Err(AppError::component(ComponentError::EmptyLabel));
        }
        if config.type_name.trim().is_empty() {
            return Err(AppError::component(ComponentError::EmptyType));
        }
        let workspace = Arc::clone(canvas.workspace());
        let descriptor = workspace.registry().descriptor(&config.type_name).ok_or_else(|| {
            AppError::component(ComponentError::UnknownType {
                type_name: config.type_name.clone(),
            })
        })?;
        if config.category.is_none() {
            config.category = Some(descriptor.category.clone());
        }
        if config.help_url.is_none() {
            config.help_url.clone_from(&descriptor.help_url);
        }

        let component = Arc::new_cyclic(|self_ref: &Weak<Self>| {
            let holder: Weak<dyn TerminalHolder> = self_ref.clone();
            let (busy, _) = watch::channel(false);
            Self {
                id: config.id.clone(),
                type_name: config.type_name.clone(),
                self_ref: self_ref.clone(),
                canvas: Arc::downgrade(canvas),
                remote_terminal: Terminal::relay(
                    holder.clone(),
                    &config.id,
                    REMOTE_TERMINAL,
                    TerminalKind::RemoteRelay,
                ),
                controller_terminal: Terminal::relay(
                    holder,
                    &config.id,
                    CONTROLLER_TERMINAL,
                    TerminalKind::ControllerRelay,
                ),
                non_blocking: AtomicBool::new(config.non_blocking),
                workspace: Arc::clone(&workspace),
                config: Mutex::new(config),
                behavior: RwLock::new(None),
                terminals: TerminalSet::default(),
                agent_terminals: Mutex::new(BTreeMap::new()),
                counters: CounterSupport::default(),
                statistics: StatisticHolder::default(),
                bus: EventBus::new(),
                busy,
                invalid: AtomicBool::new(false),
                released: AtomicBool::new(false),
                activity: Mutex::new(None),
                subscriptions: Mutex::new(Subscriptions::default()),
            }
        });

        let context = component.context();
        let behavior = match workspace.registry().create(&component.type_name, &context) {
            Ok(behavior) => behavior,
            Err(err) => {
                component.release();
                return Err(err);
            }
        };
        component.set_behavior(behavior)?;
        component.init(canvas);
        Ok(component)
    }

    fn init(&self, canvas: &Arc<Canvas>) {
        let own_ref = self.self_ref.clone();
        self.bus
            .subscribe(EventFilter::Kind(EventKind::Action), move |event| {
                if let Some(component) = own_ref.upgrade() {
                    component.on_own_action(event);
                }
            });

        let canvas_ref = self.self_ref.clone();
        let canvas_subscription =
            canvas
                .bus()
                .subscribe(EventFilter::Kind(EventKind::Action), move |event| {
                    if let Some(component) = canvas_ref.upgrade() {
                        component.on_canvas_action(event);
                    }
                });

        let mut project_subscription = None;
        if canvas.is_scenario()
            && self.workspace.is_controller()
            && let Some(project) = canvas.project()
        {
            let project_ref = self.self_ref.clone();
            project_subscription = Some(project.bus().subscribe(
                EventFilter::key(EventKind::Collection, keys::ASSIGNMENTS),
                move |event| {
                    if let Some(component) = project_ref.upgrade() {
                        component.on_assignment(event);
                    }
                },
            ));
            for agent in project.agents_assigned_to(canvas.id()) {
                self.add_agent_terminal(&agent);
            }
        }

        let mut subscriptions = lock(&self.subscriptions);
        subscriptions.canvas = Some(canvas_subscription);
        subscriptions.project = project_subscription;
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    #[must_use]
    pub fn label(&self) -> String {
        lock(&self.config).label.clone()
    }

    #[must_use]
    pub fn category(&self) -> Option<String> {
        lock(&self.config).category.clone()
    }

    #[must_use]
    pub fn help_url(&self) -> Option<String> {
        lock(&self.config).help_url.clone()
    }

    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<String> {
        lock(&self.config).attributes.get(key).cloned()
    }

    #[must_use]
    pub fn config(&self) -> ComponentConfig {
        lock(&self.config).clone()
    }

    #[must_use]
    pub fn canvas(&self) -> Option<Arc<Canvas>> {
        self.canvas.upgrade()
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
    pub fn context(&self) -> ComponentContext {
        ComponentContext::new(&self.id, self.self_ref.clone())
    }

    #[must_use]
    pub fn behavior(&self) -> Option<Arc<dyn ComponentBehavior>> {
        read(&self.behavior).clone()
    }

    /// # Errors
    ///
    /// Returns an error once the component has been released.
    pub fn set_behavior(&self, behavior: Arc<dyn ComponentBehavior>) -> AppResult<()> {
        if self.is_released() {
            return Err(AppError::component(ComponentError::Released {
                id: self.id.clone(),
            }));
        }
        *write(&self.behavior) = Some(behavior);
        Ok(())
    }

    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        *self.busy.borrow()
    }

    pub fn set_busy(&self, busy: bool) {
        let changed = self.busy.send_if_modified(|current| {
            if *current == busy {
                false
            } else {
                *current = busy;
                true
            }
        });
        if changed {
            self.bus.fire(&Event::base(keys::BUSY, &self.id));
        }
    }

    /// Wait until the component reports not busy. Returns `false` on timeout.
    pub async fn wait_until_idle(&self, timeout: Duration) -> bool {
        let mut receiver = self.busy.subscribe();
        matches!(
            tokio::time::timeout(timeout, receiver.wait_for(|busy| !*busy)).await,
            Ok(Ok(_))
        )
    }

    #[must_use]
    pub fn is_invalid(&self) -> bool {
        self.invalid.load(Ordering::SeqCst)
    }

    pub fn set_invalid(&self, invalid: bool) {
        if self.invalid.swap(invalid, Ordering::SeqCst) != invalid {
            self.bus.fire(&Event::base(keys::INVALID, &self.id));
        }
    }

    #[must_use]
    pub fn is_non_blocking(&self) -> bool {
        self.non_blocking.load(Ordering::SeqCst)
    }

    pub fn set_non_blocking(&self, non_blocking: bool) {
        self.non_blocking.store(non_blocking, Ordering::SeqCst);
        lock(&self.config).non_blocking = non_blocking;
        self.sync_config();
    }

    /// # Errors
    ///
    /// Returns an error for an empty label.
    pub fn set_label(&self, label: &str) -> AppResult<()> {
        if label.trim().is_empty() {
            return Err(AppError::component(ComponentError::EmptyLabel));
        }
        {
            let mut config = lock(&self.config);
            if config.label == label {
                return Ok(());
            }
            label.clone_into(&mut config.label);
        }
        self.sync_config();
        self.bus.fire(&Event::base(keys::LABEL, &self.id));
        Ok(())
    }

    pub fn set_category(&self, category: &str) {
        {
            let mut config = lock(&self.config);
            if config.category.as_deref() == Some(category) {
                return;
            }
            config.category = Some(category.to_owned());
        }
        self.sync_config();
        self.bus.fire(&Event::base(keys::CATEGORY, &self.id));
    }

    pub fn set_attribute(&self, key: &str, value: &str) {
        lock(&self.config)
            .attributes
            .insert(key.to_owned(), value.to_owned());
        self.sync_config();
    }

    fn sync_config(&self) {
        if let Some(canvas) = self.canvas() {
            canvas.sync_component_config(self.config());
        }
    }

    /// Whether events and messages are handled here rather than on the agents.
    #[must_use]
    pub fn propagates(&self) -> bool {
        !(self.workspace.is_controller()
            && !self.workspace.is_local_mode()
            && self.canvas().is_some_and(|canvas| canvas.is_scenario()))
    }

    /// Fire an event on this component. While the component does not
    /// propagate, its own actions are turned into remote actions for the
    /// agents; a counter reset still happens locally.
    pub fn fire_event(&self, event: &Event) {
        if !self.propagates()
            && let Event::Action { action, source } = event
        {
            if *source == self.id {
                self.bus.fire(&Event::RemoteAction {
                    action: action.clone(),
                    source: source.clone(),
                });
                if let Some(canvas) = self.canvas() {
                    canvas.relay_remote_action(Some(&self.id), action);
                }
            }
            if action == actions::COUNTER_RESET {
                self.bus.fire(event);
            }
            return;
        }
        self.bus.fire(event);
    }

    pub fn trigger_action(&self, action: &str) {
        self.fire_event(&Event::action(action, &self.id));
    }

    fn on_canvas_action(&self, event: &Event) {
        if event.key() == actions::COMPLETE {
            self.fire_event(&Event::action(actions::STOP, event.source()));
        }
        self.fire_event(event);
    }

    fn on_own_action(&self, event: &Event) {
        if event.key() == actions::COUNTER_RESET {
            self.counters.reset();
            self.statistics.reset();
        }
        if let Some(behavior) = self.behavior() {
            behavior.on_action(event.key());
        }
    }

    fn on_assignment(&self, event: &Event) {
        let Event::Collection {
            change,
            element,
            source,
            ..
        } = event
        else {
            return;
        };
        if self.canvas().is_none_or(|canvas| canvas.id() != source) {
            return;
        }
        let agent = AgentId::new(element);
        match change {
            CollectionChange::Added => self.add_agent_terminal(&agent),
            CollectionChange::Removed => self.remove_agent_terminal(&agent),
        }
    }

    fn add_agent_terminal(&self, agent: &AgentId) {
        let terminal = {
            let mut terminals = lock(&self.agent_terminals);
            if terminals.contains_key(agent) {
                return;
            }
            let holder: Weak<dyn TerminalHolder> = self.self_ref.clone();
            let terminal = Terminal::relay(
                holder,
                &self.id,
                &format!("agent:{}", agent),
                TerminalKind::AgentRelay(agent.clone()),
            );
            terminals.insert(agent.clone(), Arc::clone(&terminal));
            terminal
        };
        self.bus.fire(&Event::Collection {
            key: keys::AGENT_TERMINALS,
            change: CollectionChange::Added,
            element: terminal.id().to_owned(),
            source: self.id.clone(),
        });
    }

    fn remove_agent_terminal(&self, agent: &AgentId) {
        let Some(terminal) = lock(&self.agent_terminals).remove(agent) else {
            return;
        };
        self.bus.fire(&Event::Collection {
            key: keys::AGENT_TERMINALS,
            change: CollectionChange::Removed,
            element: terminal.id().to_owned(),
            source: self.id.clone(),
        });
    }

    /// # Errors
    ///
    /// Returns an error if the label is already taken on this component.
    pub fn create_terminal(
        &self,
        label: &str,
        description: &str,
        direction: Direction,
    ) -> AppResult<Arc<Terminal>> {
        let holder: Weak<dyn TerminalHolder> = self.self_ref.clone();
        self.terminals
            .create(holder, &self.id, label, description, direction)
    }

    /// Disconnect and drop a terminal, unexporting it first.
    pub fn delete_terminal(&self, terminal: &Terminal) {
        if let Some(canvas) = self.canvas() {
            canvas.unexport(terminal.id());
        }
        self.terminals.remove(terminal.id());
    }

    #[must_use]
    pub fn terminals(&self) -> Vec<Arc<Terminal>> {
        self.terminals.all()
    }

    #[must_use]
    pub fn terminal(&self, id: &str) -> Option<Arc<Terminal>> {
        self.terminals.get(id)
    }

    #[must_use]
    pub fn terminal_by_label(&self, label: &str) -> Option<Arc<Terminal>> {
        self.terminals.get_by_label(label)
    }

    #[must_use]
    pub const fn remote_terminal(&self) -> &Arc<Terminal> {
        &self.remote_terminal
    }

    #[must_use]
    pub const fn controller_terminal(&self) -> &Arc<Terminal> {
        &self.controller_terminal
    }

    #[must_use]
    pub fn agent_terminal(&self, agent: &AgentId) -> Option<Arc<Terminal>> {
        lock(&self.agent_terminals).get(agent).cloned()
    }

    #[must_use]
    pub fn agent_terminals(&self) -> Vec<Arc<Terminal>> {
        lock(&self.agent_terminals).values().cloned().collect()
    }

    /// Send `message` on `terminal`.
    ///
    /// Real outputs deliver to their connected inputs only while the canvas
    /// runs. Relay terminals forward over the scenario message channel
    /// regardless of run state.
    ///
    /// # Errors
    ///
    /// Returns an error for inputs, terminals of other holders, or when the
    /// message channel cannot be reached.
    pub fn send(&self, terminal: &Arc<Terminal>, message: &TerminalMessage) -> AppResult<()> {
        match terminal.kind() {
            TerminalKind::Real => {
                terminal.ensure_direction(Direction::Output)?;
                if !self.terminals.contains(terminal) {
                    return Err(AppError::terminal(TerminalError::NotOwned {
                        terminal: terminal.id().to_owned(),
                        holder: self.id.clone(),
                    }));
                }
                if self.canvas().is_some_and(|canvas| canvas.is_running()) {
                    terminal.send_message(message);
                } else {
                    debug!("Dropping message on {}: canvas not running", terminal.id());
                }
                Ok(())
            }
            TerminalKind::ControllerRelay => {
                if self.workspace.is_controller() {
                    self.dispatch(&self.remote_terminal, TerminalEvent::Message(message.clone()));
                    Ok(())
                } else {
                    self.send_to_controller(message)
                }
            }
            TerminalKind::RemoteRelay => {
                if !self.workspace.is_controller() {
                    self.send_to_controller(message)
                } else if self.propagates() {
                    self.dispatch(&self.remote_terminal, TerminalEvent::Message(message.clone()));
                    Ok(())
                } else {
                    let canvas = self.require_canvas()?;
                    let project = canvas.require_project()?;
                    project.broadcast_message(&canvas, &self.channel_message(&canvas, message));
                    Ok(())
                }
            }
            TerminalKind::AgentRelay(agent) => {
                let canvas = self.require_canvas()?;
                let project = canvas.require_project()?;
                project.send_to_agent(agent, self.channel_message(&canvas, message))
            }
        }
    }

    fn channel_message(&self, canvas: &Canvas, message: &TerminalMessage) -> ChannelMessage {
        ChannelMessage {
            channel: channels::COMPONENT_CONTEXT.to_owned(),
            scenario_id: canvas.id().to_owned(),
            version: canvas.version(),
            payload: ScenePayload::ComponentMessage {
                component_id: self.id.clone(),
                message: message.clone(),
            },
        }
    }

    fn send_to_controller(&self, message: &TerminalMessage) -> AppResult<()> {
        let canvas = self.require_canvas()?;
        canvas.send_to_controller(self.channel_message(&canvas, message))
    }

    pub(crate) fn require_canvas(&self) -> AppResult<Arc<Canvas>> {
        self.canvas().ok_or_else(|| {
            AppError::component(ComponentError::Released {
                id: self.id.clone(),
            })
        })
    }

    /// A message relayed from the other side of the scenario channel.
    pub(crate) fn receive_remote_message(&self, message: TerminalMessage) {
        self.dispatch(&self.remote_terminal, TerminalEvent::Message(message));
    }

    /// A message relayed from `agent`, delivered on that agent's terminal.
    pub(crate) fn receive_agent_message(&self, agent: &AgentId, message: TerminalMessage) {
        match self.agent_terminal(agent) {
            Some(terminal) => self.dispatch(&terminal, TerminalEvent::Message(message)),
            None => debug!("{} has no terminal for agent {}", self.id, agent),
        }
    }

    fn dispatch(&self, terminal: &Arc<Terminal>, event: TerminalEvent) {
        let Some(behavior) = self.behavior() else {
            return;
        };
        let terminal = Arc::clone(terminal);
        if self.is_non_blocking() {
            deliver_to_behavior(behavior.as_ref(), &terminal, event);
        } else {
            drop(self.workspace.scheduler().spawn_blocking(move || {
                deliver_to_behavior(behavior.as_ref(), &terminal, event);
            }));
        }
    }

    /// Current value of a counter. The timer counter reads the canvas' time.
    #[must_use]
    pub fn counter(&self, name: &str) -> i64 {
        if name == counter::TIME {
            return self.canvas().map_or(0, |canvas| canvas.counter(counter::TIME));
        }
        self.counters.get(name)
    }

    /// Add `delta` to a counter and aggregate it into the canvas.
    ///
    /// # Errors
    ///
    /// Returns an error for the read-only timer counter.
    pub fn increment_counter(&self, name: &str, delta: i64) -> AppResult<i64> {
        if name == counter::TIME {
            return Err(AppError::component(ComponentError::TimerCounterReadOnly));
        }
        let value = self.counters.increment(name, delta);
        self.bus.fire(&Event::Counter {
            counter: name.to_owned(),
            value,
            source: self.id.clone(),
        });
        if let Some(canvas) = self.canvas() {
            canvas.increment_counter(name, delta);
        }
        Ok(value)
    }

    #[must_use]
    pub fn counter_names(&self) -> Vec<String> {
        self.counters.names()
    }

    /// Replace the activity strategy, relaying its changes as `activity` events.
    pub fn set_activity_strategy(&self, strategy: Arc<dyn ActivityStrategy>) {
        self.remove_activity_listener();
        let weak = self.self_ref.clone();
        let subscription = strategy.bus().subscribe(EventFilter::All, move |_event| {
            if let Some(component) = weak.upgrade() {
                component
                    .bus
                    .fire(&Event::base(keys::ACTIVITY, &component.id));
            }
        });
        *lock(&self.activity) = Some((strategy, subscription));
        self.bus.fire(&Event::base(keys::ACTIVITY, &self.id));
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        lock(&self.activity)
            .as_ref()
            .is_some_and(|(strategy, _)| strategy.is_active())
    }

    fn remove_activity_listener(&self) {
        if let Some((strategy, subscription)) = lock(&self.activity).take() {
            strategy.bus().unsubscribe(subscription);
        }
    }

    pub(crate) fn track_subscription(&self, id: SubscriptionId) {
        lock(&self.subscriptions).context.push(id);
    }

    pub(crate) fn clear_tracked_subscriptions(&self) {
        let tracked: Vec<SubscriptionId> = lock(&self.subscriptions).context.drain(..).collect();
        for id in tracked {
            self.bus.unsubscribe(id);
        }
    }

    #[must_use]
    pub fn collect_statistics_data(&self) -> Value {
        self.behavior()
            .map_or(Value::Null, |behavior| behavior.collect_statistics_data())
    }

    pub fn handle_statistics_data(&self, data: &BTreeMap<AgentId, Value>) {
        if let Some(behavior) = self.behavior() {
            behavior.handle_statistics_data(data);
        }
    }

    /// Chapter for this component, or `None` when the behaviour adds nothing.
    #[must_use]
    pub fn generate_summary(&self) -> Option<Chapter> {
        let behavior = self.behavior()?;
        let mut chapter = Chapter::new(&self.label());
        behavior.generate_summary(&mut chapter);
        if chapter.sections.is_empty() {
            None
        } else {
            Some(chapter)
        }
    }

    /// Create a copy of this component on the same canvas.
    ///
    /// # Errors
    ///
    /// Returns an error when the component is detached or the copy fails to
    /// initialise.
    pub fn duplicate(&self) -> AppResult<Arc<Self>> {
        let canvas = self.require_canvas()?;
        let mut config = self.config();
        config.id = crate::config::types::new_item_id();
        config.label = format!("Copy of {}", config.label);
        canvas.inject_component(config)
    }

    /// Disconnect everything, drop the component from its canvas and release it.
    pub fn delete(&self) {
        if self.is_released() {
            return;
        }
        let connections: Vec<_> = self
            .terminals
            .all()
            .iter()
            .flat_map(|terminal| terminal.connections())
            .collect();
        for connection in connections {
            connection.disconnect();
        }
        self.bus.fire(&Event::base(keys::DELETED, &self.id));
        if let Some(canvas) = self.canvas() {
            canvas.forget_component(&self.id);
        }
        self.release();
    }

    /// Tear the component down. Safe to call more than once.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        let canvas = self.canvas();
        let (canvas_subscription, project_subscription) = {
            let mut subscriptions = lock(&self.subscriptions);
            (subscriptions.canvas.take(), subscriptions.project.take())
        };
        if let (Some(canvas), Some(id)) = (&canvas, canvas_subscription) {
            canvas.bus().unsubscribe(id);
        }
        if let Some(id) = project_subscription
            && let Some(project) = canvas.as_ref().and_then(|canvas| canvas.project())
        {
            project.bus().unsubscribe(id);
        }

        if canvas.as_ref().is_some_and(|canvas| canvas.is_running()) {
            self.trigger_action(actions::STOP);
        }
        if let Some(behavior) = self.behavior() {
            behavior.on_release();
        }

        self.counters.reset();
        self.terminals.release();
        lock(&self.agent_terminals).clear();
        self.statistics.release();

        self.bus.fire(&Event::base(keys::RELEASED, &self.id));
        self.bus.clear();
        *lock(&self.subscriptions) = Subscriptions::default();
        *write(&self.behavior) = None;
        self.remove_activity_listener();
        debug!("Released component {}", self.id);
    }
}

impl TerminalHolder for ComponentItem {
    fn holder_id(&self) -> &str {
        &self.id
    }

    fn canvas(&self) -> Option<Arc<Canvas>> {
        self.canvas.upgrade()
    }

    fn handle_terminal_event(&self, terminal: &Arc<Terminal>, event: TerminalEvent) {
        if matches!(event, TerminalEvent::Message(_)) && !self.propagates() {
            return;
        }
        self.dispatch(terminal, event);
    }
}

fn deliver_to_behavior(
    behavior: &dyn ComponentBehavior,
    terminal: &Arc<Terminal>,
    event: TerminalEvent,
) {
    match event {
        TerminalEvent::Message(message) => behavior.on_terminal_message(terminal, message),
        TerminalEvent::SignatureChanged(signature) => {
            behavior.on_terminal_signature_change(terminal, &signature);
        }
        TerminalEvent::Connected(connection) => behavior.on_terminal_connect(terminal, &connection),
        TerminalEvent::Disconnected(connection) => {
            behavior.on_terminal_disconnect(terminal, &connection);
        }
    }
}
