//! Fixtures shared by the unit tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;

use crate::component::{
    BehaviorRegistry, ComponentBehavior, ComponentContext, ComponentDescriptor,
};
use crate::config::{ComponentConfig, EngineSettings};
use crate::distributed::AgentId;
use crate::error::AppResult;
use crate::summary::{CollectingSummarySink, Section};
use crate::sync::lock;
use crate::terminal::{Connection, Terminal, TerminalMessage};
use crate::workspace::{ExecutionMode, Workspace};

pub(crate) const RECORDER: &str = "recorder";

pub(crate) type Log = Arc<Mutex<Vec<String>>>;

/// Logs every hook it receives. Owns an `in` input and an `out` output.
pub(crate) struct Recorder {
    log: Log,
}

impl Recorder {
    fn push(&self, entry: String) {
        lock(&self.log).push(entry);
    }
}

impl ComponentBehavior for Recorder {
    fn on_terminal_message(&self, input: &Arc<Terminal>, message: TerminalMessage) {
        let seq = message.get("seq").cloned().unwrap_or(Value::Null);
        self.push(format!("message:{}:{}", input.label(), seq));
    }

    fn on_terminal_connect(&self, terminal: &Arc<Terminal>, _connection: &Arc<Connection>) {
        self.push(format!("connect:{}", terminal.label()));
    }

    fn on_terminal_disconnect(&self, terminal: &Arc<Terminal>, _connection: &Arc<Connection>) {
        self.push(format!("disconnect:{}", terminal.label()));
    }

    fn on_action(&self, action: &str) {
        self.push(format!("action:{}", action));
    }

    fn on_release(&self) {
        self.push("release".to_owned());
    }

    fn collect_statistics_data(&self) -> Value {
        Value::from("local")
    }

    fn handle_statistics_data(&self, data: &BTreeMap<AgentId, Value>) {
        self.push(format!("stats:{}", data.len()));
    }

    fn generate_summary(&self, chapter: &mut crate::summary::Chapter) {
        chapter.add_section(Section::new("Recorder").with_entry("Entries", lock(&self.log).len()));
    }
}

pub(crate) fn registry(log: &Log) -> BehaviorRegistry {
    let registry = BehaviorRegistry::with_builtins();
    let shared = Arc::clone(log);
    registry.register(
        ComponentDescriptor::new(RECORDER, "Recorder", "test"),
        move |context: &ComponentContext| {
            context.create_input("in", "Recorded input")?;
            context.create_output("out", "Recorded output")?;
            let behavior: Arc<dyn ComponentBehavior> = Arc::new(Recorder {
                log: Arc::clone(&shared),
            });
            Ok(behavior)
        },
    );
    registry
}

pub(crate) fn settings(mode: ExecutionMode, local_mode: bool) -> EngineSettings {
    EngineSettings {
        mode,
        local_mode,
        time_update_interval: Duration::from_millis(100),
        busy_timeout: Duration::from_millis(500),
        summary_wait: Duration::from_secs(5),
    }
}

pub(crate) struct Fixture {
    pub(crate) workspace: Arc<Workspace>,
    pub(crate) sink: Arc<CollectingSummarySink>,
    pub(crate) log: Log,
}

impl Fixture {
    pub(crate) fn new(mode: ExecutionMode, local_mode: bool) -> AppResult<Self> {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::new(CollectingSummarySink::default());
        let workspace = Workspace::new(
            settings(mode, local_mode),
            Arc::new(registry(&log)),
            sink.clone(),
        )?;
        Ok(Self {
            workspace,
            sink,
            log,
        })
    }

    pub(crate) fn local() -> AppResult<Self> {
        Self::new(ExecutionMode::Controller, true)
    }

    pub(crate) fn entries(&self) -> Vec<String> {
        lock(&self.log).clone()
    }

    pub(crate) fn clear_log(&self) {
        lock(&self.log).clear();
    }
}

/// A component config whose terminal events are handled inline.
pub(crate) fn inline(label: &str, type_name: &str) -> ComponentConfig {
    let mut config = ComponentConfig::new(label, type_name);
    config.non_blocking = true;
    config
}
