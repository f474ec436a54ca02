use std::collections::BTreeMap;

use crate::config::format_limits;
use crate::config::types::{ABORT_ON_FINISH_ATTRIBUTE, LIMITS_ATTRIBUTE};
use crate::counter;
use crate::events::{Event, keys};
use crate::sync::lock;

use super::Canvas;

impl Canvas {
    /// Every positive limit, by counter name.
    #[must_use]
    pub fn limits(&self) -> BTreeMap<String, i64> {
        lock(&self.limits).clone()
    }

    /// The limit for `name`, or `0` when unlimited.
    #[must_use]
    pub fn limit(&self, name: &str) -> i64 {
        lock(&self.limits).get(name).copied().unwrap_or(0)
    }

    /// Set the limit for a counter. Values `<= 0` remove it. The `Time`
    /// limit is in seconds and takes effect on a running canvas right away.
    pub fn set_limit(&self, name: &str, value: i64) {
        let attribute = {
            let mut limits = lock(&self.limits);
            if value > 0 {
                limits.insert(name.to_owned(), value);
            } else {
                limits.remove(name);
            }
            format_limits(&limits)
        };
        self.set_attribute(LIMITS_ATTRIBUTE, &attribute);
        if name == counter::TIME {
            self.fix_time_limit();
        }
        self.bus.fire(&Event::base(keys::LIMITS, &self.id));
    }

    /// Whether PRE_STOP cancels busy components instead of waiting for them.
    #[must_use]
    pub fn abort_on_finish(&self) -> bool {
        self.attribute(ABORT_ON_FINISH_ATTRIBUTE)
            .is_some_and(|value| value.eq_ignore_ascii_case("true"))
    }

    pub fn set_abort_on_finish(&self, abort: bool) {
        self.set_attribute(ABORT_ON_FINISH_ATTRIBUTE, if abort { "true" } else { "false" });
    }
}
