//! Named counters kept by components and canvases.

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::sync::lock;

/// Elapsed run time in seconds. Owned by the canvas and read-only.
pub const TIME: &str = "Time";
pub const REQUESTS: &str = "Requests";
pub const FAILURES: &str = "Failures";
pub const ASSERTION_FAILURES: &str = "Assertion Failures";
pub const REQUEST_FAILURES: &str = "Request Failures";

/// Counters aggregated from components up to their canvas.
pub const AGGREGATED: [&str; 4] = [REQUESTS, FAILURES, ASSERTION_FAILURES, REQUEST_FAILURES];

#[derive(Debug, Default)]
pub struct CounterSupport {
    counters: Mutex<BTreeMap<String, i64>>,
}

impl CounterSupport {
    /// Add `delta` and return the new value.
    pub fn increment(&self, name: &str, delta: i64) -> i64 {
        let mut counters = lock(&self.counters);
        let value = counters.entry(name.to_owned()).or_insert(0);
        *value = value.saturating_add(delta);
        *value
    }

    #[must_use]
    pub fn get(&self, name: &str) -> i64 {
        lock(&self.counters).get(name).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        lock(&self.counters).keys().cloned().collect()
    }

    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, i64> {
        lock(&self.counters).clone()
    }

    pub fn reset(&self) {
        for value in lock(&self.counters).values_mut() {
            *value = 0;
        }
    }
}
