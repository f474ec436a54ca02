//! Events fired by workspaces, canvases and components.
//!
//! Every model item owns an [`EventBus`]. Listeners subscribe with an
//! [`EventFilter`] and get a [`SubscriptionId`] back which is the only handle
//! needed to unsubscribe again.

mod bus;

#[cfg(test)]
mod tests;

pub use bus::{EventBus, EventFilter, Handler, SubscriptionId};

/// Keys of base events.
pub mod keys {
    pub const RUNNING: &str = "running";
    pub const BUSY: &str = "busy";
    pub const INVALID: &str = "invalid";
    pub const RELEASED: &str = "released";
    pub const DELETED: &str = "deleted";
    pub const LIMITS: &str = "limits";
    pub const SUMMARY: &str = "summary";
    pub const LABEL: &str = "label";
    pub const ACTIVITY: &str = "activity";
    pub const CATEGORY: &str = "category";
    pub const INCREMENT_VERSION: &str = "incrementVersion";
    pub const ON_COMPLETE_DONE: &str = "onCompleteDone";
    pub const LOCAL_MODE: &str = "localMode";
    pub const AGENT_READY: &str = "agentReady";

    pub const COMPONENTS: &str = "components";
    pub const CONNECTIONS: &str = "connections";
    pub const EXPORTS: &str = "exports";
    pub const SCENARIOS: &str = "scenarios";
    pub const ASSIGNMENTS: &str = "assignments";
    pub const AGENT_TERMINALS: &str = "agentTerminals";
}

/// Names of actions that can be triggered on any scope.
pub mod actions {
    pub const START: &str = "START";
    pub const STOP: &str = "STOP";
    pub const COMPLETE: &str = "COMPLETE";
    pub const CANCEL: &str = "CANCEL";
    pub const COUNTER_RESET: &str = "COUNTER_RESET";
    pub const READY: &str = "READY";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Base,
    Action,
    RemoteAction,
    Collection,
    Counter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionChange {
    Added,
    Removed,
}

/// Scope an action is triggered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Component,
    Canvas,
    Project,
    Workspace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Base {
        key: &'static str,
        source: String,
    },
    Action {
        action: String,
        source: String,
    },
    /// An action that was raised on the controller but must execute on the
    /// agents the source is deployed to.
    RemoteAction {
        action: String,
        source: String,
    },
    Collection {
        key: &'static str,
        change: CollectionChange,
        element: String,
        source: String,
    },
    Counter {
        counter: String,
        value: i64,
        source: String,
    },
}

impl Event {
    pub fn base(key: &'static str, source: &str) -> Self {
        Self::Base {
            key,
            source: source.to_owned(),
        }
    }

    pub fn action(action: &str, source: &str) -> Self {
        Self::Action {
            action: action.to_owned(),
            source: source.to_owned(),
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Base { key, .. } | Self::Collection { key, .. } => key,
            Self::Action { action, .. } | Self::RemoteAction { action, .. } => action,
            Self::Counter { counter, .. } => counter,
        }
    }

    #[must_use]
    pub fn source(&self) -> &str {
        match self {
            Self::Base { source, .. }
            | Self::Action { source, .. }
            | Self::RemoteAction { source, .. }
            | Self::Collection { source, .. }
            | Self::Counter { source, .. } => source,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Base { .. } => EventKind::Base,
            Self::Action { .. } => EventKind::Action,
            Self::RemoteAction { .. } => EventKind::RemoteAction,
            Self::Collection { .. } => EventKind::Collection,
            Self::Counter { .. } => EventKind::Counter,
        }
    }
}
