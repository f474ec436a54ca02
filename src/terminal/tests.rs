use std::sync::{Arc, Mutex, Weak};

use serde_json::json;

use crate::canvas::Canvas;
use crate::error::{AppError, AppResult, TerminalError};
use crate::sync::lock;

use super::{
    Direction, Terminal, TerminalEvent, TerminalHolder, TerminalKind, TerminalMessage,
    TerminalSet, ValueType,
};

#[derive(Default)]
struct RecordingHolder {
    events: Mutex<Vec<String>>,
}

impl TerminalHolder for RecordingHolder {
    fn holder_id(&self) -> &str {
        "holder"
    }

    fn canvas(&self) -> Option<Arc<Canvas>> {
        None
    }

    fn handle_terminal_event(&self, terminal: &Arc<Terminal>, event: TerminalEvent) {
        let entry = match event {
            TerminalEvent::Message(message) => format!("{}:message:{}", terminal.label(), message.len()),
            TerminalEvent::SignatureChanged(_) => format!("{}:signature", terminal.label()),
            TerminalEvent::Connected(_) => format!("{}:connected", terminal.label()),
            TerminalEvent::Disconnected(_) => format!("{}:disconnected", terminal.label()),
        };
        lock(&self.events).push(entry);
    }
}

fn weak_holder(holder: &Arc<RecordingHolder>) -> Weak<dyn TerminalHolder> {
    let weak: Weak<RecordingHolder> = Arc::downgrade(holder);
    weak
}

#[test]
fn message_put_keeps_insertion_order() -> AppResult<()> {
    let mut message = TerminalMessage::new().with("a", 1).with("b", "two");
    let previous = message.put("a", 3);
    if previous != Some(json!(1)) {
        return Err(AppError::terminal("Expected previous value of a"));
    }
    let keys: Vec<&str> = message.keys().collect();
    if keys != vec!["a", "b"] {
        return Err(AppError::terminal(format!("Unexpected key order: {:?}", keys)));
    }
    let signature = message.signature();
    if signature.get("a") != Some(&ValueType::Integer)
        || signature.get("b") != Some(&ValueType::Text)
    {
        return Err(AppError::terminal(format!("Unexpected signature: {:?}", signature)));
    }
    Ok(())
}

#[test]
fn cloned_message_is_independent() -> AppResult<()> {
    let original = TerminalMessage::new().with("nested", json!({"k": [1, 2]}));
    let mut copy = original.clone();
    copy.put("nested", json!(null));
    if original.get("nested") != Some(&json!({"k": [1, 2]})) {
        return Err(AppError::terminal("Original message was mutated"));
    }
    Ok(())
}

#[test]
fn terminal_set_rejects_duplicate_labels() -> AppResult<()> {
    let holder = Arc::new(RecordingHolder::default());
    let set = TerminalSet::default();
    set.create(weak_holder(&holder), "holder", "out", "", Direction::Output)?;
    match set.create(weak_holder(&holder), "holder", "out", "", Direction::Input) {
        Err(AppError::Terminal(TerminalError::DuplicateLabel { label, .. })) if label == "out" => {}
        Err(err) => return Err(err),
        Ok(_) => {
            return Err(AppError::terminal("Duplicate label was accepted"));
        }
    }
    if set.all().len() != 1 {
        return Err(AppError::terminal("Unexpected terminal count"));
    }
    Ok(())
}

#[test]
fn deliver_reaches_holder() -> AppResult<()> {
    let holder = Arc::new(RecordingHolder::default());
    let set = TerminalSet::default();
    let input = set.create(weak_holder(&holder), "holder", "in", "", Direction::Input)?;
    input.deliver(TerminalEvent::Message(TerminalMessage::new().with("x", 1)))?;
    let events = lock(&holder.events).clone();
    if events != vec!["in:message:1".to_owned()] {
        return Err(AppError::terminal(format!("Unexpected events: {:?}", events)));
    }
    Ok(())
}

#[test]
fn relay_terminals_reject_terminal_operations() -> AppResult<()> {
    let holder = Arc::new(RecordingHolder::default());
    let relay = Terminal::relay(
        weak_holder(&holder),
        "holder",
        "controller",
        TerminalKind::ControllerRelay,
    );
    if !matches!(
        relay.deliver(TerminalEvent::Message(TerminalMessage::new())),
        Err(AppError::Terminal(TerminalError::Unsupported { .. }))
    ) {
        return Err(AppError::terminal("Relay deliver should be unsupported"));
    }
    if !matches!(
        relay.set_signature(TerminalMessage::new().with("a", 1).signature()),
        Err(AppError::Terminal(TerminalError::Unsupported { .. }))
    ) {
        return Err(AppError::terminal("Relay signature should be unsupported"));
    }
    if !lock(&holder.events).is_empty() {
        return Err(AppError::terminal("Relay reached the holder"));
    }
    Ok(())
}

#[test]
fn deliver_fails_once_holder_is_dropped() -> AppResult<()> {
    let holder = Arc::new(RecordingHolder::default());
    let set = TerminalSet::default();
    let input = set.create(weak_holder(&holder), "holder", "in", "", Direction::Input)?;
    drop(holder);
    if !matches!(
        input.deliver(TerminalEvent::Message(TerminalMessage::new())),
        Err(AppError::Terminal(TerminalError::HolderReleased { .. }))
    ) {
        return Err(AppError::terminal("Delivery to a dropped holder should fail"));
    }
    Ok(())
}
