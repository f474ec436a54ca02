use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use serde_json::Value;

use crate::distributed::AgentId;
use crate::error::{AppError, AppResult, ComponentError};
use crate::events::{Event, EventBus, keys};
use crate::summary::Chapter;
use crate::sync::{read, write};
use crate::terminal::{Connection, Signature, Terminal, TerminalMessage};

use super::ComponentContext;

/// Pluggable logic of a component. Every hook has a no-op default.
pub trait ComponentBehavior: Send + Sync {
    fn on_terminal_message(&self, _input: &Arc<Terminal>, _message: TerminalMessage) {}

    fn on_terminal_signature_change(&self, _input: &Arc<Terminal>, _signature: &Signature) {}

    fn on_terminal_connect(&self, _terminal: &Arc<Terminal>, _connection: &Arc<Connection>) {}

    fn on_terminal_disconnect(&self, _terminal: &Arc<Terminal>, _connection: &Arc<Connection>) {}

    /// Actions reaching the component: its own, and those of its canvas.
    fn on_action(&self, _action: &str) {}

    fn on_release(&self) {}

    /// Serialized statistics sent to the controller when an agent finishes.
    fn collect_statistics_data(&self) -> Value {
        Value::Null
    }

    /// Statistics reported by every agent for this component, keyed by agent.
    fn handle_statistics_data(&self, _data: &BTreeMap<AgentId, Value>) {}

    fn generate_summary(&self, _chapter: &mut Chapter) {}
}

/// Static information about a registered component type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentDescriptor {
    pub type_name: String,
    pub label: String,
    pub category: String,
    pub description: String,
    pub help_url: Option<String>,
}

impl ComponentDescriptor {
    #[must_use]
    pub fn new(type_name: &str, label: &str, category: &str) -> Self {
        Self {
            type_name: type_name.to_owned(),
            label: label.to_owned(),
            category: category.to_owned(),
            description: String::new(),
            help_url: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: &str) -> Self {
        description.clone_into(&mut self.description);
        self
    }
}

pub type BehaviorFactory =
    Arc<dyn Fn(&ComponentContext) -> AppResult<Arc<dyn ComponentBehavior>> + Send + Sync>;

/// Behaviour factories keyed by component type.
#[derive(Default)]
pub struct BehaviorRegistry {
    entries: RwLock<BTreeMap<String, (ComponentDescriptor, BehaviorFactory)>>,
}

impl std::fmt::Debug for BehaviorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BehaviorRegistry")
            .field("types", &read(&self.entries).keys().collect::<Vec<_>>())
            .finish()
    }
}

impl BehaviorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in behaviours.
    #[must_use]
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        crate::behaviors::register_builtins(&registry);
        registry
    }

    /// Register `factory` for `descriptor.type_name`, replacing any earlier one.
    pub fn register<F>(&self, descriptor: ComponentDescriptor, factory: F)
    where
        F: Fn(&ComponentContext) -> AppResult<Arc<dyn ComponentBehavior>> + Send + Sync + 'static,
    {
        write(&self.entries).insert(
            descriptor.type_name.clone(),
            (descriptor, Arc::new(factory)),
        );
    }

    #[must_use]
    pub fn descriptor(&self, type_name: &str) -> Option<ComponentDescriptor> {
        read(&self.entries)
            .get(type_name)
            .map(|(descriptor, _)| descriptor.clone())
    }

    #[must_use]
    pub fn descriptors(&self) -> Vec<ComponentDescriptor> {
        read(&self.entries)
            .values()
            .map(|(descriptor, _)| descriptor.clone())
            .collect()
    }

    /// # Errors
    ///
    /// Returns an error for unregistered types or when the factory fails.
    pub fn create(
        &self,
        type_name: &str,
        context: &ComponentContext,
    ) -> AppResult<Arc<dyn ComponentBehavior>> {
        let factory = read(&self.entries)
            .get(type_name)
            .map(|(_, factory)| Arc::clone(factory))
            .ok_or_else(|| {
                AppError::component(ComponentError::UnknownType {
                    type_name: type_name.to_owned(),
                })
            })?;
        factory(context)
    }
}

/// Reports whether a component is currently doing something worth showing.
pub trait ActivityStrategy: Send + Sync {
    fn is_active(&self) -> bool;

    /// Fires a base `activity` event whenever the state flips.
    fn bus(&self) -> &EventBus;
}

/// Activity driven by an explicit flag.
#[derive(Debug, Default)]
pub struct ActivityFlag {
    active: AtomicBool,
    bus: EventBus,
}

impl ActivityFlag {
    pub fn set_active(&self, active: bool) {
        if self.active.swap(active, Ordering::SeqCst) != active {
            self.bus.fire(&Event::base(keys::ACTIVITY, "activity"));
        }
    }
}

impl ActivityStrategy for ActivityFlag {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn bus(&self) -> &EventBus {
        &self.bus
    }
}
