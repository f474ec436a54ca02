use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult, ConfigError};
use crate::workspace::ExecutionMode;

use super::parse_duration_value;

/// Attribute key holding a canvas' limits.
pub const LIMITS_ATTRIBUTE: &str = "limits";
/// Attribute key holding a canvas' abort-on-finish flag.
pub const ABORT_ON_FINISH_ATTRIBUTE: &str = "abortOnFinish";

pub(crate) fn new_item_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

const fn default_follow_project() -> bool {
    true
}

/// Engine settings as written in a config file. Every field is optional.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    pub mode: Option<ExecutionMode>,
    pub local_mode: Option<bool>,
    pub time_update_interval: Option<DurationValue>,
    pub busy_timeout: Option<DurationValue>,
    pub summary_wait: Option<DurationValue>,
}

impl EngineConfig {
    /// Resolve against the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error when a duration is malformed or zero.
    pub fn into_settings(self) -> AppResult<EngineSettings> {
        let defaults = EngineSettings::default();
        Ok(EngineSettings {
            mode: self.mode.unwrap_or(defaults.mode),
            local_mode: self.local_mode.unwrap_or(defaults.local_mode),
            time_update_interval: resolve(
                self.time_update_interval.as_ref(),
                defaults.time_update_interval,
            )?,
            busy_timeout: resolve(self.busy_timeout.as_ref(), defaults.busy_timeout)?,
            summary_wait: resolve(self.summary_wait.as_ref(), defaults.summary_wait)?,
        })
    }
}

fn resolve(value: Option<&DurationValue>, default: Duration) -> AppResult<Duration> {
    value.map_or(Ok(default), DurationValue::to_duration)
}

/// Resolved engine settings shared by every canvas of a workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub mode: ExecutionMode,
    pub local_mode: bool,
    /// Period of the elapsed-time refresh while a canvas runs.
    pub time_update_interval: Duration,
    /// How long PRE_STOP waits for each busy component.
    pub busy_timeout: Duration,
    /// How long a project waits for its scenarios before summarising.
    pub summary_wait: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Controller,
            local_mode: true,
            time_update_interval: Duration::from_millis(250),
            busy_timeout: Duration::from_secs(60),
            summary_wait: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum DurationValue {
    Seconds(u64),
    Text(String),
}

impl DurationValue {
    /// # Errors
    ///
    /// Returns an error when the value is zero or cannot be parsed.
    pub fn to_duration(&self) -> AppResult<Duration> {
        match self {
            Self::Seconds(secs) => {
                if *secs == 0 {
                    Err(AppError::config(ConfigError::DurationZero))
                } else {
                    Ok(Duration::from_secs(*secs))
                }
            }
            Self::Text(text) => parse_duration_value(text),
        }
    }
}

/// Persisted state shared by projects and scenarios.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CanvasConfig {
    #[serde(default = "new_item_id")]
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub components: Vec<ComponentConfig>,
    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,
}

impl CanvasConfig {
    #[must_use]
    pub fn new(label: &str) -> Self {
        Self {
            id: new_item_id(),
            label: label.to_owned(),
            attributes: BTreeMap::new(),
            components: Vec::new(),
            connections: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ComponentConfig {
    #[serde(default = "new_item_id")]
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub help_url: Option<String>,
    #[serde(default)]
    pub non_blocking: bool,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl ComponentConfig {
    #[must_use]
    pub fn new(label: &str, type_name: &str) -> Self {
        Self {
            id: new_item_id(),
            label: label.to_owned(),
            type_name: type_name.to_owned(),
            category: None,
            help_url: None,
            non_blocking: false,
            attributes: BTreeMap::new(),
        }
    }
}

/// An edge between two terminals, by terminal id (`<holder id>/<label>`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConnectionConfig {
    pub output: String,
    pub input: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ScenarioConfig {
    #[serde(flatten)]
    pub canvas: CanvasConfig,
    #[serde(default)]
    pub version: u64,
    #[serde(default = "default_follow_project")]
    pub follow_project: bool,
    /// Ids of exported output terminals.
    #[serde(default)]
    pub exports: Vec<String>,
}

impl ScenarioConfig {
    #[must_use]
    pub fn new(label: &str) -> Self {
        Self {
            canvas: CanvasConfig::new(label),
            version: 0,
            follow_project: true,
            exports: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AgentConfig {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AssignmentConfig {
    /// Scenario id.
    pub scenario: String,
    /// Agent id.
    pub agent: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProjectConfig {
    #[serde(flatten)]
    pub canvas: CanvasConfig,
    #[serde(default)]
    pub scenarios: Vec<ScenarioConfig>,
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
    #[serde(default)]
    pub assignments: Vec<AssignmentConfig>,
}

impl ProjectConfig {
    #[must_use]
    pub fn new(label: &str) -> Self {
        Self {
            canvas: CanvasConfig::new(label),
            scenarios: Vec::new(),
            agents: Vec::new(),
            assignments: Vec::new(),
        }
    }
}
