use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use crate::error::{AppError, AppResult};
use crate::sync::lock;

use super::{Event, EventBus, EventFilter, EventKind, keys};

#[test]
fn filters_by_kind_and_key() -> AppResult<()> {
    let bus = EventBus::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    bus.subscribe(EventFilter::key(EventKind::Base, keys::LABEL), move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    bus.fire(&Event::base(keys::LABEL, "a"));
    bus.fire(&Event::base(keys::BUSY, "a"));
    bus.fire(&Event::action(keys::LABEL, "a"));

    if hits.load(Ordering::SeqCst) != 1 {
        return Err(AppError::canvas(format!(
            "Unexpected hit count: {}",
            hits.load(Ordering::SeqCst)
        )));
    }
    Ok(())
}

#[test]
fn unsubscribe_stops_delivery() -> AppResult<()> {
    let bus = EventBus::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let id = bus.subscribe(EventFilter::All, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    bus.fire(&Event::base(keys::RUNNING, "a"));
    if !bus.unsubscribe(id) {
        return Err(AppError::canvas("Expected subscription to be removed"));
    }
    if bus.unsubscribe(id) {
        return Err(AppError::canvas("Second unsubscribe should report false"));
    }
    bus.fire(&Event::base(keys::RUNNING, "a"));
    if hits.load(Ordering::SeqCst) != 1 {
        return Err(AppError::canvas("Handler ran after unsubscribe"));
    }
    Ok(())
}

#[test]
fn subscribe_once_runs_a_single_time() -> AppResult<()> {
    let bus = EventBus::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    bus.subscribe_once(EventFilter::All, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    bus.fire(&Event::base(keys::RUNNING, "a"));
    bus.fire(&Event::base(keys::RUNNING, "a"));
    if hits.load(Ordering::SeqCst) != 1 {
        return Err(AppError::canvas("Once handler ran twice"));
    }
    if !bus.is_empty() {
        return Err(AppError::canvas("Once handler still registered"));
    }
    Ok(())
}

#[test]
fn deferred_events_fire_after_all_listeners() -> AppResult<()> {
    let bus = Arc::new(EventBus::new());
    let order = Arc::new(Mutex::new(Vec::new()));

    let deferring_bus = Arc::downgrade(&bus);
    let first = Arc::clone(&order);
    bus.subscribe(EventFilter::Kind(EventKind::Base), move |event| {
        lock(&first).push(format!("first:{}", event.key()));
        if event.key() == keys::LABEL
            && let Some(bus) = deferring_bus.upgrade()
        {
            bus.defer(Event::base(keys::INCREMENT_VERSION, "a"));
        }
    });
    let second = Arc::clone(&order);
    bus.subscribe(EventFilter::Kind(EventKind::Base), move |event| {
        lock(&second).push(format!("second:{}", event.key()));
    });

    bus.fire(&Event::base(keys::LABEL, "a"));

    let recorded = lock(&order).clone();
    let expected = vec![
        "first:label".to_owned(),
        "second:label".to_owned(),
        "first:incrementVersion".to_owned(),
        "second:incrementVersion".to_owned(),
    ];
    if recorded != expected {
        return Err(AppError::canvas(format!("Unexpected order: {:?}", recorded)));
    }
    Ok(())
}

#[test]
fn defer_on_idle_bus_fires_immediately() -> AppResult<()> {
    let bus = EventBus::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    bus.subscribe(EventFilter::All, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    bus.defer(Event::base(keys::RUNNING, "a"));
    if hits.load(Ordering::SeqCst) != 1 {
        return Err(AppError::canvas("Deferred event was not fired"));
    }
    Ok(())
}

#[test]
fn defer_ignores_dispatches_on_other_threads() -> AppResult<()> {
    let bus = Arc::new(EventBus::new());
    let (entered_tx, entered_rx) = mpsc::channel::<()>();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let entered = Mutex::new(entered_tx);
    let release = Mutex::new(release_rx);
    bus.subscribe(EventFilter::Kind(EventKind::Counter), move |_| {
        if lock(&entered).send(()).is_ok() {
            lock(&release).recv_timeout(Duration::from_secs(5)).ok();
        }
    });
    let bumps = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&bumps);
    bus.subscribe(
        EventFilter::key(EventKind::Base, keys::INCREMENT_VERSION),
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        },
    );

    let dispatching = Arc::clone(&bus);
    let dispatcher = thread::spawn(move || {
        dispatching.fire(&Event::Counter {
            counter: "Requests".to_owned(),
            value: 1,
            source: "c".to_owned(),
        });
    });
    entered_rx
        .recv_timeout(Duration::from_secs(5))
        .map_err(|err| AppError::canvas(format!("Dispatcher never started: {}", err)))?;

    bus.defer(Event::base(keys::INCREMENT_VERSION, "a"));
    bus.defer_unique(Event::base(keys::INCREMENT_VERSION, "a"));
    let seen = bumps.load(Ordering::SeqCst);

    release_tx
        .send(())
        .map_err(|err| AppError::canvas(format!("Dispatcher gone: {}", err)))?;
    if dispatcher.join().is_err() {
        return Err(AppError::canvas("Dispatcher thread panicked"));
    }
    if seen != 2 {
        return Err(AppError::canvas(format!(
            "Deferred events waited on another thread: {} fired",
            seen
        )));
    }
    Ok(())
}

#[test]
fn defer_unique_drops_duplicates_within_a_dispatch() -> AppResult<()> {
    let bus = Arc::new(EventBus::new());
    let deferring_bus = Arc::downgrade(&bus);
    bus.subscribe(EventFilter::key(EventKind::Base, keys::LABEL), move |_| {
        if let Some(bus) = deferring_bus.upgrade() {
            bus.defer_unique(Event::base(keys::INCREMENT_VERSION, "a"));
            bus.defer_unique(Event::base(keys::INCREMENT_VERSION, "a"));
        }
    });
    let bumps = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&bumps);
    bus.subscribe(
        EventFilter::key(EventKind::Base, keys::INCREMENT_VERSION),
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        },
    );
    bus.fire(&Event::base(keys::LABEL, "a"));
    if bumps.load(Ordering::SeqCst) != 1 {
        return Err(AppError::canvas("Duplicate deferred event fired twice"));
    }
    Ok(())
}
