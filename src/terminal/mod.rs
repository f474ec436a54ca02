//! Terminals, connections and the messages that travel between them.

mod connection;
mod message;
mod set;

#[cfg(test)]
mod tests;

use std::sync::{Arc, Mutex, Weak};

use tracing::debug;

use crate::canvas::Canvas;
use crate::distributed::AgentId;
use crate::error::{AppError, AppResult, TerminalError};
use crate::sync::lock;

pub use connection::Connection;
pub use message::{Signature, TerminalMessage, ValueType};
pub(crate) use set::TerminalSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    const fn name(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
        }
    }
}

/// What a terminal is backed by.
///
/// Relay terminals stand in for a peer process: sending on them routes the
/// message over the scenario's message channel instead of local connections,
/// and every other terminal operation is unsupported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalKind {
    Real,
    /// The other side: every agent when on the controller, the controller when on an agent.
    RemoteRelay,
    ControllerRelay,
    AgentRelay(AgentId),
}

#[derive(Debug, Clone)]
pub enum TerminalEvent {
    Message(TerminalMessage),
    SignatureChanged(Signature),
    Connected(Arc<Connection>),
    Disconnected(Arc<Connection>),
}

/// Anything that owns terminals: components and canvases.
pub trait TerminalHolder: Send + Sync {
    fn holder_id(&self) -> &str;

    /// The canvas whose run state gates delivery for this holder.
    fn canvas(&self) -> Option<Arc<Canvas>>;

    fn handle_terminal_event(&self, terminal: &Arc<Terminal>, event: TerminalEvent);
}

pub struct Terminal {
    id: String,
    label: String,
    description: String,
    direction: Direction,
    kind: TerminalKind,
    holder_id: String,
    holder: Weak<dyn TerminalHolder>,
    connections: Mutex<Vec<Arc<Connection>>>,
    signature: Mutex<Signature>,
}

impl std::fmt::Debug for Terminal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Terminal")
            .field("id", &self.id)
            .field("direction", &self.direction)
            .field("kind", &self.kind)
            .finish()
    }
}

impl Terminal {
    pub(crate) fn new(
        holder: Weak<dyn TerminalHolder>,
        holder_id: &str,
        label: &str,
        description: &str,
        direction: Direction,
        kind: TerminalKind,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: format!("{}/{}", holder_id, label),
            label: label.to_owned(),
            description: description.to_owned(),
            direction,
            kind,
            holder_id: holder_id.to_owned(),
            holder,
            connections: Mutex::new(Vec::new()),
            signature: Mutex::new(Signature::new()),
        })
    }

    pub(crate) fn relay(
        holder: Weak<dyn TerminalHolder>,
        holder_id: &str,
        label: &str,
        kind: TerminalKind,
    ) -> Arc<Self> {
        Self::new(holder, holder_id, label, "", Direction::Output, kind)
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub const fn direction(&self) -> Direction {
        self.direction
    }

    #[must_use]
    pub const fn kind(&self) -> &TerminalKind {
        &self.kind
    }

    #[must_use]
    pub const fn is_relay(&self) -> bool {
        !matches!(self.kind, TerminalKind::Real)
    }

    #[must_use]
    pub fn holder_id(&self) -> &str {
        &self.holder_id
    }

    #[must_use]
    pub fn holder(&self) -> Option<Arc<dyn TerminalHolder>> {
        self.holder.upgrade()
    }

    #[must_use]
    pub fn canvas(&self) -> Option<Arc<Canvas>> {
        self.holder()?.canvas()
    }

    #[must_use]
    pub fn connections(&self) -> Vec<Arc<Connection>> {
        lock(&self.connections).clone()
    }

    /// Advertised signature for outputs. For inputs, the union of every
    /// connected output's signature where later connections win.
    #[must_use]
    pub fn signature(&self) -> Signature {
        match self.direction {
            Direction::Output => lock(&self.signature).clone(),
            Direction::Input => {
                let mut merged = Signature::new();
                for connection in self.connections() {
                    merged.extend(connection.output().signature());
                }
                merged
            }
        }
    }

    /// Replace the advertised signature and notify every connected input.
    ///
    /// # Errors
    ///
    /// Returns an error for relay terminals and input terminals.
    pub fn set_signature(&self, signature: Signature) -> AppResult<()> {
        self.ensure_real("set_signature")?;
        self.ensure_direction(Direction::Output)?;
        *lock(&self.signature) = signature;
        for connection in self.connections() {
            let input = connection.input();
            if let Err(err) = input.deliver(TerminalEvent::SignatureChanged(input.signature())) {
                debug!("Signature change not delivered to {}: {}", input.id(), err);
            }
        }
        Ok(())
    }

    /// Hand an event to the owning holder.
    ///
    /// # Errors
    ///
    /// Returns an error for relay terminals or when the holder is gone.
    pub fn deliver(self: &Arc<Self>, event: TerminalEvent) -> AppResult<()> {
        self.ensure_real("deliver")?;
        let holder = self.holder().ok_or_else(|| {
            AppError::terminal(TerminalError::HolderReleased {
                terminal: self.id.clone(),
            })
        })?;
        holder.handle_terminal_event(self, event);
        Ok(())
    }

    /// Deliver a copy of `message` to every connected input. Returns the
    /// number of inputs reached.
    pub(crate) fn send_message(&self, message: &TerminalMessage) -> usize {
        let mut delivered: usize = 0;
        for connection in self.connections() {
            match connection
                .input()
                .deliver(TerminalEvent::Message(message.clone()))
            {
                Ok(()) => delivered = delivered.saturating_add(1),
                Err(err) => debug!("Dropping message for {}: {}", connection.id(), err),
            }
        }
        delivered
    }

    pub(crate) fn ensure_real(&self, operation: &'static str) -> AppResult<()> {
        if self.is_relay() {
            return Err(AppError::terminal(TerminalError::Unsupported {
                operation,
                terminal: self.id.clone(),
            }));
        }
        Ok(())
    }

    pub(crate) fn ensure_direction(&self, expected: Direction) -> AppResult<()> {
        if self.direction != expected {
            return Err(AppError::terminal(TerminalError::WrongDirection {
                terminal: self.id.clone(),
                expected: expected.name(),
            }));
        }
        Ok(())
    }

    pub(crate) fn find_connection_to(&self, input: &Terminal) -> Option<Arc<Connection>> {
        lock(&self.connections)
            .iter()
            .find(|connection| connection.input().id() == input.id())
            .cloned()
    }

    fn attach(&self, connection: Arc<Connection>) {
        lock(&self.connections).push(connection);
    }

    fn detach(&self, connection_id: &str) {
        lock(&self.connections).retain(|connection| connection.id() != connection_id);
    }

    /// Disconnect every attached connection.
    pub fn disconnect_all(&self) {
        for connection in self.connections() {
            connection.disconnect();
        }
    }
}
