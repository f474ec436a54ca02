use std::sync::{Arc, Weak};

use crate::error::{AppError, AppResult, ComponentError};
use crate::events::{Event, EventFilter, Scope, SubscriptionId};
use crate::execution::Scheduler;
use crate::statistics::StatisticVariable;
use crate::terminal::{Direction, Terminal, TerminalMessage};

use super::{ActivityStrategy, ComponentItem};

/// Facade a behaviour uses to talk to its component.
///
/// Holds a weak reference only, so a behaviour keeping its context does not
/// keep the component alive.
#[derive(Debug, Clone)]
pub struct ComponentContext {
    id: String,
    component: Weak<ComponentItem>,
}

impl ComponentContext {
    pub(crate) fn new(id: &str, component: Weak<ComponentItem>) -> Self {
        Self {
            id: id.to_owned(),
            component,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// # Errors
    ///
    /// Returns an error once the component has been dropped.
    pub fn component(&self) -> AppResult<Arc<ComponentItem>> {
        self.component.upgrade().ok_or_else(|| {
            AppError::component(ComponentError::Released {
                id: self.id.clone(),
            })
        })
    }

    /// # Errors
    ///
    /// Returns an error if the label is taken or the component is gone.
    pub fn create_input(&self, label: &str, description: &str) -> AppResult<Arc<Terminal>> {
        self.component()?
            .create_terminal(label, description, Direction::Input)
    }

    /// # Errors
    ///
    /// Returns an error if the label is taken or the component is gone.
    pub fn create_output(&self, label: &str, description: &str) -> AppResult<Arc<Terminal>> {
        self.component()?
            .create_terminal(label, description, Direction::Output)
    }

    /// # Errors
    ///
    /// Returns an error if the component is gone.
    pub fn delete_terminal(&self, terminal: &Terminal) -> AppResult<()> {
        self.component()?.delete_terminal(terminal);
        Ok(())
    }

    /// # Errors
    ///
    /// See [`ComponentItem::send`].
    pub fn send(&self, terminal: &Arc<Terminal>, message: &TerminalMessage) -> AppResult<()> {
        self.component()?.send(terminal, message)
    }

    /// # Errors
    ///
    /// Returns an error if the component is gone.
    pub fn remote_terminal(&self) -> AppResult<Arc<Terminal>> {
        Ok(Arc::clone(self.component()?.remote_terminal()))
    }

    /// # Errors
    ///
    /// Returns an error if the component is gone.
    pub fn controller_terminal(&self) -> AppResult<Arc<Terminal>> {
        Ok(Arc::clone(self.component()?.controller_terminal()))
    }

    /// Terminals for every agent the scenario is assigned to. Empty on agents.
    ///
    /// # Errors
    ///
    /// Returns an error if the component is gone.
    pub fn agent_terminals(&self) -> AppResult<Vec<Arc<Terminal>>> {
        Ok(self.component()?.agent_terminals())
    }

    /// # Errors
    ///
    /// See [`ComponentItem::increment_counter`].
    pub fn increment_counter(&self, name: &str, delta: i64) -> AppResult<i64> {
        self.component()?.increment_counter(name, delta)
    }

    #[must_use]
    pub fn counter(&self, name: &str) -> i64 {
        self.component
            .upgrade()
            .map_or(0, |component| component.counter(name))
    }

    /// # Errors
    ///
    /// Returns an error for unknown writer types or if the component is gone.
    pub fn add_statistic_variable(
        &self,
        name: &str,
        writer_type: &str,
    ) -> AppResult<Arc<StatisticVariable>> {
        self.component()?
            .statistics()
            .add_variable_with_writer(name, writer_type)
    }

    pub fn set_busy(&self, busy: bool) {
        if let Some(component) = self.component.upgrade() {
            component.set_busy(busy);
        }
    }

    pub fn set_invalid(&self, invalid: bool) {
        if let Some(component) = self.component.upgrade() {
            component.set_invalid(invalid);
        }
    }

    /// # Errors
    ///
    /// Returns an error if the component is gone.
    pub fn set_activity_strategy(&self, strategy: Arc<dyn ActivityStrategy>) -> AppResult<()> {
        self.component()?.set_activity_strategy(strategy);
        Ok(())
    }

    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<String> {
        self.component.upgrade()?.attribute(key)
    }

    pub fn set_attribute(&self, key: &str, value: &str) {
        if let Some(component) = self.component.upgrade() {
            component.set_attribute(key, value);
        }
    }

    /// Whether the owning canvas is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.component
            .upgrade()
            .and_then(|component| component.canvas())
            .is_some_and(|canvas| canvas.is_running())
    }

    #[must_use]
    pub fn is_controller(&self) -> bool {
        self.component
            .upgrade()
            .is_some_and(|component| component.workspace().is_controller())
    }

    /// # Errors
    ///
    /// Returns an error if the component is gone.
    pub fn scheduler(&self) -> AppResult<Scheduler> {
        Ok(self.component()?.workspace().scheduler().clone())
    }

    /// Trigger `action` on this component or one of its containers.
    ///
    /// # Errors
    ///
    /// Returns an error if the component, its canvas or project is gone.
    pub fn trigger_action(&self, action: &str, scope: Scope) -> AppResult<()> {
        let component = self.component()?;
        match scope {
            Scope::Component => component.trigger_action(action),
            Scope::Canvas => component.require_canvas()?.trigger_action(action),
            Scope::Project => component
                .require_canvas()?
                .require_project()?
                .trigger_action(action),
            Scope::Workspace => component.workspace().trigger_action(action),
        }
        Ok(())
    }

    /// Listen on the component's events. The subscription is dropped by
    /// [`ComponentContext::clear_event_listeners`] or on release.
    ///
    /// # Errors
    ///
    /// Returns an error if the component is gone.
    pub fn subscribe<F>(&self, filter: EventFilter, handler: F) -> AppResult<SubscriptionId>
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let component = self.component()?;
        let id = component.bus().subscribe(filter, handler);
        component.track_subscription(id);
        Ok(id)
    }

    pub fn clear_event_listeners(&self) {
        if let Some(component) = self.component.upgrade() {
            component.clear_tracked_subscriptions();
        }
    }
}
