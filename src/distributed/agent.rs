use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult, DistributedError};
use crate::sync::lock;

use super::{ChannelMessage, MessageEndpoint};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    #[must_use]
    pub fn new(id: &str) -> Self {
        Self(id.to_owned())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A remote node scenarios can be deployed to.
pub struct Agent {
    id: AgentId,
    label: String,
    url: Option<String>,
    ready: AtomicBool,
    endpoint: Mutex<Option<Arc<dyn MessageEndpoint>>>,
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("ready", &self.is_ready())
            .finish()
    }
}

impl Agent {
    #[must_use]
    pub fn new(id: AgentId, label: &str, url: Option<String>) -> Self {
        Self {
            id,
            label: label.to_owned(),
            url,
            ready: AtomicBool::new(false),
            endpoint: Mutex::new(None),
        }
    }

    #[must_use]
    pub const fn id(&self) -> &AgentId {
        &self.id
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Returns `true` if the flag changed.
    pub(crate) fn set_ready(&self, ready: bool) -> bool {
        self.ready.swap(ready, Ordering::SeqCst) != ready
    }

    pub fn attach_endpoint(&self, endpoint: Arc<dyn MessageEndpoint>) {
        *lock(&self.endpoint) = Some(endpoint);
    }

    pub fn detach_endpoint(&self) {
        *lock(&self.endpoint) = None;
    }

    /// # Errors
    ///
    /// Returns an error when no endpoint is attached or the endpoint is closed.
    pub fn send_message(&self, message: ChannelMessage) -> AppResult<()> {
        let endpoint = lock(&self.endpoint).clone().ok_or_else(|| {
            AppError::distributed(DistributedError::AgentDetached {
                id: self.id.to_string(),
            })
        })?;
        endpoint.send_message(message)
    }
}

/// Binds a scenario to an agent.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Assignment {
    pub scenario: String,
    pub agent: AgentId,
}
