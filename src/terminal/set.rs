use std::sync::{Arc, Mutex, Weak};

use crate::error::{AppError, AppResult, TerminalError};
use crate::sync::lock;

use super::{Direction, Terminal, TerminalHolder, TerminalKind};

/// Terminals owned by a single holder, unique by label.
#[derive(Default)]
pub(crate) struct TerminalSet {
    terminals: Mutex<Vec<Arc<Terminal>>>,
}

impl TerminalSet {
    pub(crate) fn create(
        &self,
        holder: Weak<dyn TerminalHolder>,
        holder_id: &str,
        label: &str,
        description: &str,
        direction: Direction,
    ) -> AppResult<Arc<Terminal>> {
        let mut terminals = lock(&self.terminals);
        if terminals.iter().any(|terminal| terminal.label() == label) {
            return Err(AppError::terminal(TerminalError::DuplicateLabel {
                label: label.to_owned(),
                holder: holder_id.to_owned(),
            }));
        }
        let terminal = Terminal::new(
            holder,
            holder_id,
            label,
            description,
            direction,
            TerminalKind::Real,
        );
        terminals.push(Arc::clone(&terminal));
        Ok(terminal)
    }

    pub(crate) fn get(&self, id: &str) -> Option<Arc<Terminal>> {
        lock(&self.terminals)
            .iter()
            .find(|terminal| terminal.id() == id)
            .cloned()
    }

    pub(crate) fn get_by_label(&self, label: &str) -> Option<Arc<Terminal>> {
        lock(&self.terminals)
            .iter()
            .find(|terminal| terminal.label() == label)
            .cloned()
    }

    pub(crate) fn contains(&self, terminal: &Terminal) -> bool {
        lock(&self.terminals)
            .iter()
            .any(|owned| std::ptr::eq(owned.as_ref(), terminal))
    }

    pub(crate) fn all(&self) -> Vec<Arc<Terminal>> {
        lock(&self.terminals).clone()
    }

    /// Disconnect and drop a terminal.
    pub(crate) fn remove(&self, id: &str) -> Option<Arc<Terminal>> {
        let removed = {
            let mut terminals = lock(&self.terminals);
            let position = terminals.iter().position(|terminal| terminal.id() == id)?;
            terminals.remove(position)
        };
        removed.disconnect_all();
        Some(removed)
    }

    pub(crate) fn release(&self) {
        let drained: Vec<Arc<Terminal>> = lock(&self.terminals).drain(..).collect();
        for terminal in drained {
            terminal.disconnect_all();
        }
    }
}
