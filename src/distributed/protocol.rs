use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, AppResult, DistributedError};
use crate::terminal::TerminalMessage;

pub mod channels {
    /// Controller to agent scenario control.
    pub const SCENE: &str = "sceneCommunication";
    /// Agent to controller statistics.
    pub const AGENT: &str = "agentChannel";
    /// Relay terminal traffic between component instances.
    pub const COMPONENT_CONTEXT: &str = "componentContext";
}

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S%3f";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub channel: String,
    pub scenario_id: String,
    pub version: u64,
    pub payload: ScenePayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScenePayload {
    CancelComponents,
    /// An action for the scenario, or for one of its components.
    Action {
        action: String,
        #[serde(default)]
        component_id: Option<String>,
    },
    Statistics(StatisticsReport),
    ComponentMessage {
        component_id: String,
        message: TerminalMessage,
    },
}

/// What an agent reports for a scenario once its execution completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsReport {
    pub scene_id: String,
    pub start_time: String,
    pub end_time: String,
    /// Component id to the component's serialized statistics.
    pub components: BTreeMap<String, Value>,
    /// Component id to the snapshot of its statistic variables.
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,
}

impl StatisticsReport {
    /// # Errors
    ///
    /// Returns an error if the start timestamp is malformed.
    pub fn start(&self) -> AppResult<DateTime<Utc>> {
        parse_timestamp(&self.start_time)
    }

    /// # Errors
    ///
    /// Returns an error if the end timestamp is malformed.
    pub fn end(&self) -> AppResult<DateTime<Utc>> {
        parse_timestamp(&self.end_time)
    }
}

#[must_use]
pub fn format_timestamp(time: DateTime<Utc>) -> String {
    time.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a `yyyyMMddHHmmssSSS` UTC timestamp.
///
/// # Errors
///
/// Returns an error if the value does not match the format.
pub fn parse_timestamp(value: &str) -> AppResult<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_err| {
            AppError::distributed(DistributedError::InvalidTimestamp {
                value: value.to_owned(),
            })
        })
}
