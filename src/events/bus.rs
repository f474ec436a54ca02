use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, ThreadId};

use crate::sync::{lock, read, write};

use super::{Event, EventKind};

pub type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Token returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventFilter {
    All,
    Kind(EventKind),
    Key(EventKind, String),
}

impl EventFilter {
    pub fn key(kind: EventKind, key: &str) -> Self {
        Self::Key(kind, key.to_owned())
    }

    fn matches(&self, event: &Event) -> bool {
        match self {
            Self::All => true,
            Self::Kind(kind) => event.kind() == *kind,
            Self::Key(kind, key) => event.kind() == *kind && event.key() == key,
        }
    }
}

struct Registration {
    id: SubscriptionId,
    filter: EventFilter,
    handler: Handler,
    once: bool,
}

/// Dispatch nesting of one thread on one bus.
#[derive(Default)]
struct Dispatch {
    depth: usize,
    queue: VecDeque<Event>,
}

/// Synchronous event dispatcher.
///
/// Handlers run on the firing thread against a snapshot of the registrations,
/// so they may freely subscribe or unsubscribe. Events passed to
/// [`EventBus::defer`] while the calling thread is dispatching are fired once
/// that thread's outermost dispatch on this bus has returned. Dispatches
/// running on other threads never hold them back.
pub struct EventBus {
    next_id: AtomicU64,
    registrations: RwLock<Arc<Vec<Arc<Registration>>>>,
    dispatches: Mutex<HashMap<ThreadId, Dispatch>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.len())
            .finish()
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            registrations: RwLock::new(Arc::new(Vec::new())),
            dispatches: Mutex::new(HashMap::new()),
        }
    }

    pub fn subscribe<F>(&self, filter: EventFilter, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.register(filter, Arc::new(handler), false)
    }

    /// Subscribe a handler that is removed before its first invocation.
    pub fn subscribe_once<F>(&self, filter: EventFilter, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.register(filter, Arc::new(handler), true)
    }

    fn register(&self, filter: EventFilter, handler: Handler, once: bool) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut registrations = write(&self.registrations);
        let mut next: Vec<Arc<Registration>> = registrations.as_ref().clone();
        next.push(Arc::new(Registration {
            id,
            filter,
            handler,
            once,
        }));
        *registrations = Arc::new(next);
        id
    }

    /// Returns `true` if the subscription was still registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registrations = write(&self.registrations);
        if !registrations.iter().any(|registration| registration.id == id) {
            return false;
        }
        let next: Vec<Arc<Registration>> = registrations
            .iter()
            .filter(|registration| registration.id != id)
            .cloned()
            .collect();
        *registrations = Arc::new(next);
        true
    }

    pub fn clear(&self) {
        *write(&self.registrations) = Arc::new(Vec::new());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        read(&self.registrations).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn fire(&self, event: &Event) {
        let thread = thread::current().id();
        {
            let mut dispatches = lock(&self.dispatches);
            let dispatch = dispatches.entry(thread).or_default();
            dispatch.depth = dispatch.depth.saturating_add(1);
        }
        let snapshot = Arc::clone(&read(&self.registrations));
        for registration in snapshot.iter() {
            if !registration.filter.matches(event) {
                continue;
            }
            if registration.once && !self.unsubscribe(registration.id) {
                continue;
            }
            (registration.handler)(event);
        }
        let pending: VecDeque<Event> = {
            let mut dispatches = lock(&self.dispatches);
            let outermost = dispatches.get_mut(&thread).is_none_or(|dispatch| {
                dispatch.depth = dispatch.depth.saturating_sub(1);
                dispatch.depth == 0
            });
            if outermost {
                dispatches
                    .remove(&thread)
                    .map(|dispatch| dispatch.queue)
                    .unwrap_or_default()
            } else {
                VecDeque::new()
            }
        };
        for next in pending {
            self.fire(&next);
        }
    }

    /// Fire `event` after the dispatch in progress on the calling thread has
    /// finished. Fires immediately when this thread is not dispatching.
    pub fn defer(&self, event: Event) {
        self.enqueue_deferred(event, false);
    }

    /// Like [`EventBus::defer`], but skips `event` when an equal event is
    /// already waiting on the calling thread.
    pub fn defer_unique(&self, event: Event) {
        self.enqueue_deferred(event, true);
    }

    fn enqueue_deferred(&self, event: Event, unique: bool) {
        {
            let mut dispatches = lock(&self.dispatches);
            if let Some(dispatch) = dispatches.get_mut(&thread::current().id())
                && dispatch.depth > 0
            {
                if !unique || !dispatch.queue.contains(&event) {
                    dispatch.queue.push_back(event);
                }
                return;
            }
        }
        self.fire(&event);
    }
}
