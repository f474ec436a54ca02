use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::{Value, json};
use tracing::debug;

use crate::component::{ComponentBehavior, ComponentContext};
use crate::counter;
use crate::distributed::AgentId;
use crate::error::AppResult;
use crate::statistics::{AverageStatisticWriter, StatisticVariable};
use crate::summary::{Chapter, Section};
use crate::sync::lock;
use crate::terminal::{Terminal, TerminalMessage};

/// Counts every message on its input as a request, and messages carrying
/// `failed: true` as failures. Messages stamped with `sentAt` feed the
/// delivery latency statistic.
pub struct CounterSink {
    context: ComponentContext,
    input: Arc<Terminal>,
    latency: Arc<StatisticVariable>,
    remote: Mutex<BTreeMap<AgentId, (i64, i64)>>,
}

impl CounterSink {
    pub const TYPE: &'static str = "counter-sink";
    pub const INPUT: &'static str = "input";
    pub const LATENCY: &'static str = "Latency";
    pub const SENT_AT: &'static str = "sentAt";

    /// # Errors
    ///
    /// Returns an error when the input terminal or the latency statistic
    /// cannot be created.
    pub fn new(context: &ComponentContext) -> AppResult<Self> {
        let input = context.create_input(Self::INPUT, "Messages to count")?;
        let latency = context.add_statistic_variable(Self::LATENCY, AverageStatisticWriter::TYPE)?;
        Ok(Self {
            context: context.clone(),
            input,
            latency,
            remote: Mutex::new(BTreeMap::new()),
        })
    }

    /// Requests and failures reported by each agent for the last run.
    #[must_use]
    pub fn remote_totals(&self) -> BTreeMap<AgentId, (i64, i64)> {
        lock(&self.remote).clone()
    }

    /// Delivery latency over every local and merged sample, if any.
    fn latency_section(&self) -> Option<Section> {
        let snapshot = self
            .latency
            .writer(AverageStatisticWriter::TYPE)?
            .snapshot()
            .ok()?;
        let field = |key: &str| snapshot.get(key).and_then(Value::as_i64).unwrap_or(0);
        if field("count") == 0 {
            return None;
        }
        Some(
            Section::new("Latency (us)")
                .with_entry("Samples", field("count"))
                .with_entry("Average", field("average"))
                .with_entry("Median", field("median"))
                .with_entry("P90", field("p90"))
                .with_entry("Max", field("max")),
        )
    }
}

impl ComponentBehavior for CounterSink {
    fn on_terminal_message(&self, input: &Arc<Terminal>, message: TerminalMessage) {
        if input.id() != self.input.id() {
            return;
        }
        if let Err(err) = self.context.increment_counter(counter::REQUESTS, 1) {
            debug!("Sink {} lost a request: {}", self.context.id(), err);
        }
        let failed = message
            .get("failed")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if failed && let Err(err) = self.context.increment_counter(counter::FAILURES, 1) {
            debug!("Sink {} lost a failure: {}", self.context.id(), err);
        }
        if let Some(sent_at) = message.get(Self::SENT_AT).and_then(Value::as_i64) {
            let elapsed = Utc::now().timestamp_micros().saturating_sub(sent_at);
            self.latency.update(elapsed.max(0));
        }
    }

    fn collect_statistics_data(&self) -> Value {
        json!({
            "requests": self.context.counter(counter::REQUESTS),
            "failures": self.context.counter(counter::FAILURES),
        })
    }

    fn handle_statistics_data(&self, data: &BTreeMap<AgentId, Value>) {
        let totals = data
            .iter()
            .map(|(agent, value)| {
                let requests = value.get("requests").and_then(Value::as_i64).unwrap_or(0);
                let failures = value.get("failures").and_then(Value::as_i64).unwrap_or(0);
                (agent.clone(), (requests, failures))
            })
            .collect();
        *lock(&self.remote) = totals;
    }

    fn generate_summary(&self, chapter: &mut Chapter) {
        chapter.add_section(
            Section::new("Local")
                .with_entry("Requests", self.context.counter(counter::REQUESTS))
                .with_entry("Failures", self.context.counter(counter::FAILURES)),
        );
        if let Some(section) = self.latency_section() {
            chapter.add_section(section);
        }
        let remote = self.remote_totals();
        if remote.is_empty() {
            return;
        }
        let mut section = Section::new("Agents");
        let mut requests_total: i64 = 0;
        let mut failures_total: i64 = 0;
        for (agent, (requests, failures)) in remote {
            section.add_entry(
                &agent.to_string(),
                format!("{} requests, {} failures", requests, failures),
            );
            requests_total = requests_total.saturating_add(requests);
            failures_total = failures_total.saturating_add(failures);
        }
        section.add_entry("Requests", requests_total);
        section.add_entry("Failures", failures_total);
        chapter.add_section(section);
    }
}
