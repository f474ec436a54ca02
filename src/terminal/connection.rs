use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tracing::debug;

use crate::canvas::Canvas;

use super::{Terminal, TerminalEvent};

/// Directed edge from an output terminal to an input terminal, owned by the
/// canvas that created it.
pub struct Connection {
    id: String,
    output: Arc<Terminal>,
    input: Arc<Terminal>,
    owner: Weak<Canvas>,
    disconnected: AtomicBool,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").field("id", &self.id).finish()
    }
}

impl Connection {
    #[must_use]
    pub fn connection_id(output: &Terminal, input: &Terminal) -> String {
        format!("{}->{}", output.id(), input.id())
    }

    pub(crate) fn establish(
        owner: &Arc<Canvas>,
        output: &Arc<Terminal>,
        input: &Arc<Terminal>,
    ) -> Arc<Self> {
        let connection = Arc::new(Self {
            id: Self::connection_id(output, input),
            output: Arc::clone(output),
            input: Arc::clone(input),
            owner: Arc::downgrade(owner),
            disconnected: AtomicBool::new(false),
        });
        output.attach(Arc::clone(&connection));
        input.attach(Arc::clone(&connection));
        connection
    }

    /// Tell both endpoints about the new edge. Kept apart from
    /// [`Connection::establish`] so the owner can notify after unlocking.
    pub(crate) fn announce(self: &Arc<Self>) {
        notify(&self.output, TerminalEvent::Connected(Arc::clone(self)));
        notify(&self.input, TerminalEvent::Connected(Arc::clone(self)));
        if !self.output.signature().is_empty() {
            notify(
                &self.input,
                TerminalEvent::SignatureChanged(self.input.signature()),
            );
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub const fn output(&self) -> &Arc<Terminal> {
        &self.output
    }

    #[must_use]
    pub const fn input(&self) -> &Arc<Terminal> {
        &self.input
    }

    #[must_use]
    pub fn owner(&self) -> Option<Arc<Canvas>> {
        self.owner.upgrade()
    }

    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }

    /// Remove the edge from both endpoints and from the owning canvas.
    /// Repeated calls are no-ops.
    pub fn disconnect(self: &Arc<Self>) {
        if self.disconnected.swap(true, Ordering::SeqCst) {
            return;
        }
        self.output.detach(&self.id);
        self.input.detach(&self.id);

        notify(&self.output, TerminalEvent::Disconnected(Arc::clone(self)));
        notify(&self.input, TerminalEvent::Disconnected(Arc::clone(self)));
        notify(
            &self.input,
            TerminalEvent::SignatureChanged(self.input.signature()),
        );

        if let Some(owner) = self.owner.upgrade() {
            owner.forget_connection(self);
        }
    }
}

fn notify(terminal: &Arc<Terminal>, event: TerminalEvent) {
    if let Err(err) = terminal.deliver(event) {
        debug!("Skipping notification for terminal {}: {}", terminal.id(), err);
    }
}
