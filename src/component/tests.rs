use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::counter;
use crate::error::{AppError, AppResult, ComponentError};
use crate::events::{EventFilter, EventKind, actions, keys};
use crate::terminal::{Direction, TerminalMessage};
use crate::test_support::{Fixture, RECORDER, inline};

#[tokio::test(flavor = "current_thread")]
async fn create_rejects_empty_label_and_type() -> AppResult<()> {
    let fixture = Fixture::local()?;
    let project = fixture.workspace.create_project("p")?;

    match project.create_component("  ", RECORDER) {
        Err(AppError::Component(ComponentError::EmptyLabel)) => {}
        other => {
            return Err(AppError::component(format!(
                "Expected EmptyLabel, got {:?}",
                other.map(|component| component.id().to_owned())
            )));
        }
    }
    match project.create_component("c", "") {
        Err(AppError::Component(ComponentError::EmptyType)) => {}
        _ => return Err(AppError::component("Expected EmptyType")),
    }
    match project.create_component("c", "no-such-type") {
        Err(AppError::Component(ComponentError::UnknownType { .. })) => {}
        _ => return Err(AppError::component("Expected UnknownType")),
    }
    if !project.components().is_empty() {
        return Err(AppError::component("Failed creations left components behind"));
    }
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn descriptor_fills_category() -> AppResult<()> {
    let fixture = Fixture::local()?;
    let project = fixture.workspace.create_project("p")?;
    let component = project.create_component("rec", RECORDER)?;
    if component.category().as_deref() != Some("test") {
        return Err(AppError::component(format!(
            "Unexpected category: {:?}",
            component.category()
        )));
    }

    let hits = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&hits);
    component
        .bus()
        .subscribe(EventFilter::key(EventKind::Base, keys::CATEGORY), move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
    component.set_category("custom");
    component.set_category("custom");
    if hits.load(Ordering::SeqCst) != 1 {
        return Err(AppError::component("CATEGORY should fire once per change"));
    }
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn duplicate_terminal_label_is_rejected() -> AppResult<()> {
    let fixture = Fixture::local()?;
    let project = fixture.workspace.create_project("p")?;
    let component = project.create_component("rec", RECORDER)?;
    if component
        .create_terminal("in", "again", Direction::Input)
        .is_ok()
    {
        return Err(AppError::component("Duplicate label must be rejected"));
    }
    if component.terminals().len() != 2 {
        return Err(AppError::component("Terminal set changed on failure"));
    }
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn time_counter_is_read_only() -> AppResult<()> {
    let fixture = Fixture::local()?;
    let project = fixture.workspace.create_project("p")?;
    let component = project.create_component("rec", RECORDER)?;
    match component.increment_counter(counter::TIME, 1) {
        Err(AppError::Component(ComponentError::TimerCounterReadOnly)) => {}
        _ => return Err(AppError::component("Time counter accepted an increment")),
    }
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn counters_aggregate_into_canvas() -> AppResult<()> {
    let fixture = Fixture::local()?;
    let project = fixture.workspace.create_project("p")?;
    let scenario = project.create_scenario("s")?;
    let component = scenario.create_component("rec", RECORDER)?;

    component.increment_counter(counter::REQUESTS, 2)?;
    component.increment_counter(counter::REQUESTS, 3)?;

    if component.counter(counter::REQUESTS) != 5 {
        return Err(AppError::component("Component counter mismatch"));
    }
    if scenario.counter(counter::REQUESTS) != 5 {
        return Err(AppError::component("Scenario did not aggregate"));
    }
    if project.counter(counter::REQUESTS) != 5 {
        return Err(AppError::component("Project did not aggregate"));
    }

    component.trigger_action(actions::COUNTER_RESET);
    if component.counter(counter::REQUESTS) != 0 {
        return Err(AppError::component("COUNTER_RESET did not zero the counter"));
    }
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn busy_flag_fires_and_wait_until_idle_resolves() -> AppResult<()> {
    let fixture = Fixture::local()?;
    let project = fixture.workspace.create_project("p")?;
    let component = project.create_component("rec", RECORDER)?;

    let hits = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&hits);
    component
        .bus()
        .subscribe(EventFilter::key(EventKind::Base, keys::BUSY), move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

    component.set_busy(true);
    component.set_busy(true);
    if !component.is_busy() || hits.load(Ordering::SeqCst) != 1 {
        return Err(AppError::component("BUSY should fire once on change"));
    }
    if component.wait_until_idle(Duration::from_millis(20)).await {
        return Err(AppError::component("Busy component reported idle"));
    }

    let waiter = Arc::clone(&component);
    let handle = tokio::spawn(async move { waiter.wait_until_idle(Duration::from_secs(5)).await });
    tokio::task::yield_now().await;
    component.set_busy(false);
    if !handle.await? {
        return Err(AppError::component("wait_until_idle missed the transition"));
    }
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn release_order_and_behavior_detach() -> AppResult<()> {
    let fixture = Fixture::local()?;
    let project = fixture.workspace.create_project("p")?;
    let component = project.inject_component(inline("rec", RECORDER))?;
    let log = Arc::clone(&fixture.log);
    component
        .bus()
        .subscribe(EventFilter::key(EventKind::Base, keys::RELEASED), move |_| {
            crate::sync::lock(&log).push("event:released".to_owned());
        });
    fixture.clear_log();

    component.release();
    component.release();

    let entries = fixture.entries();
    if entries != ["release".to_owned(), "event:released".to_owned()] {
        return Err(AppError::component(format!("Unexpected release log: {:?}", entries)));
    }
    if component.behavior().is_some() {
        return Err(AppError::component("Behavior still attached after release"));
    }
    if !component.terminals().is_empty() {
        return Err(AppError::component("Terminals survived release"));
    }
    let replacement = project.create_component("other", RECORDER)?;
    let Some(behavior) = replacement.behavior() else {
        return Err(AppError::component("Missing behavior"));
    };
    match component.set_behavior(behavior) {
        Err(AppError::Component(ComponentError::Released { .. })) => Ok(()),
        _ => Err(AppError::component("set_behavior accepted a released component")),
    }
}

#[tokio::test(flavor = "current_thread")]
async fn duplicate_copies_config_under_new_id() -> AppResult<()> {
    let fixture = Fixture::local()?;
    let project = fixture.workspace.create_project("p")?;
    let component = project.create_component("rec", RECORDER)?;
    component.set_attribute("k", "v");

    let copy = component.duplicate()?;
    if copy.id() == component.id() {
        return Err(AppError::component("Copy reused the id"));
    }
    if copy.label() != "Copy of rec" || copy.attribute("k").as_deref() != Some("v") {
        return Err(AppError::component(format!(
            "Unexpected copy: {} {:?}",
            copy.label(),
            copy.attribute("k")
        )));
    }
    if project.components().len() != 2 || project.canvas_config().components.len() != 2 {
        return Err(AppError::component("Copy not added to the canvas"));
    }
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn delete_removes_component_and_connections() -> AppResult<()> {
    let fixture = Fixture::local()?;
    let project = fixture.workspace.create_project("p")?;
    let source = project.inject_component(inline("a", RECORDER))?;
    let target = project.inject_component(inline("b", RECORDER))?;
    let (Some(output), Some(input)) = (
        source.terminal_by_label("out"),
        target.terminal_by_label("in"),
    ) else {
        return Err(AppError::component("Recorder terminals missing"));
    };
    project.connect(&output, &input)?;

    target.delete();

    if project.component(target.id()).is_some() {
        return Err(AppError::component("Deleted component still listed"));
    }
    if !project.connections().is_empty() || !project.canvas_config().connections.is_empty() {
        return Err(AppError::component("Connection survived delete"));
    }
    if !target.is_released() {
        return Err(AppError::component("Deleted component not released"));
    }
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn messages_are_dropped_while_canvas_is_idle() -> AppResult<()> {
    let fixture = Fixture::local()?;
    let project = fixture.workspace.create_project("p")?;
    let source = project.inject_component(inline("a", RECORDER))?;
    let target = project.inject_component(inline("b", RECORDER))?;
    let (Some(output), Some(input)) = (
        source.terminal_by_label("out"),
        target.terminal_by_label("in"),
    ) else {
        return Err(AppError::component("Recorder terminals missing"));
    };
    project.connect(&output, &input)?;
    fixture.clear_log();

    source.send(&output, &TerminalMessage::new().with("seq", 1))?;
    if fixture.entries().iter().any(|entry| entry.starts_with("message:")) {
        return Err(AppError::component("Message delivered on an idle canvas"));
    }
    if source.send(&input, &TerminalMessage::new()).is_ok() {
        return Err(AppError::component("Sending on an input must fail"));
    }
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn relay_terminals_reject_connections() -> AppResult<()> {
    let fixture = Fixture::local()?;
    let project = fixture.workspace.create_project("p")?;
    let source = project.create_component("a", RECORDER)?;
    let target = project.create_component("b", RECORDER)?;
    let Some(input) = target.terminal_by_label("in") else {
        return Err(AppError::component("Recorder input missing"));
    };
    if project.connect(source.remote_terminal(), &input).is_ok() {
        return Err(AppError::component("Relay terminal accepted a connection"));
    }
    Ok(())
}
