//! Built-in component behaviours.

mod counter_sink;
mod generator;


use std::sync::Arc;

use crate::component::{BehaviorRegistry, ComponentBehavior, ComponentDescriptor};

pub use counter_sink::CounterSink;
pub use generator::Generator;

/// Register every built-in behaviour on `registry`.
pub fn register_builtins(registry: &BehaviorRegistry) {
    registry.register(
        ComponentDescriptor::new(Generator::TYPE, "Generator", "generators")
            .with_description("Emits one message per tick while its canvas runs."),
        |context| {
            let behavior: Arc<dyn ComponentBehavior> = Arc::new(Generator::new(context)?);
            Ok(behavior)
        },
    );
    registry.register(
        ComponentDescriptor::new(CounterSink::TYPE, "Counter Sink", "output")
            .with_description("Counts incoming messages as requests and failures."),
        |context| {
            let behavior: Arc<dyn ComponentBehavior> = Arc::new(CounterSink::new(context)?);
            Ok(behavior)
        },
    );
}
