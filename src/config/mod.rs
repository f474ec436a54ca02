//! Engine settings and the persisted project tree.
mod hash;
mod loader;
mod parse;
pub mod types;

#[cfg(test)]
mod tests;

pub use hash::content_hash;
pub use loader::{load_config_file, load_engine_config, load_project, save_config_file};
pub use parse::{format_limits, parse_duration_value, parse_limit, parse_limits};
pub use types::{
    AgentConfig, AssignmentConfig, CanvasConfig, ComponentConfig, ConnectionConfig,
    DurationValue, EngineConfig, EngineSettings, ProjectConfig, ScenarioConfig,
};
