use std::time::Duration;

use tempfile::tempdir;

use crate::error::{AppError, AppResult, ConfigError};
use crate::workspace::ExecutionMode;

use super::{
    ComponentConfig, ConnectionConfig, DurationValue, EngineConfig, ProjectConfig,
    ScenarioConfig, content_hash, format_limits, load_config_file, load_project,
    parse_duration_value, parse_limit, parse_limits, save_config_file,
};

#[test]
fn durations_accept_units() -> AppResult<()> {
    let cases = [
        ("250ms", Duration::from_millis(250)),
        ("10", Duration::from_secs(10)),
        ("2m", Duration::from_secs(120)),
        ("1h", Duration::from_secs(3600)),
    ];
    for (input, expected) in cases {
        let parsed = parse_duration_value(input)?;
        if parsed != expected {
            return Err(AppError::config(format!(
                "Unexpected duration for {}: {:?}",
                input, parsed
            )));
        }
    }
    for input in ["", "ms", "10d", "0s"] {
        if parse_duration_value(input).is_ok() {
            return Err(AppError::config(format!("Accepted '{}'", input)));
        }
    }
    Ok(())
}

#[test]
fn limits_attribute_skips_malformed_entries() -> AppResult<()> {
    let limits = parse_limits("Failures=3;broken;Time=;Requests=100;=4;Negative=-1;");
    if limits.len() != 2 {
        return Err(AppError::config(format!("Unexpected limits: {:?}", limits)));
    }
    if limits.get("Failures") != Some(&3) || limits.get("Requests") != Some(&100) {
        return Err(AppError::config(format!("Unexpected limits: {:?}", limits)));
    }
    let formatted = format_limits(&limits);
    if formatted != "Failures=3;Requests=100;" {
        return Err(AppError::config(format!(
            "Unexpected attribute: {}",
            formatted
        )));
    }
    Ok(())
}

#[test]
fn cli_limit_requires_separator() -> AppResult<()> {
    let (name, value) = parse_limit("Time = 30")?;
    if name != "Time" || value != 30 {
        return Err(AppError::config("Unexpected parsed limit"));
    }
    match parse_limit("Time30") {
        Err(AppError::Config(ConfigError::InvalidLimit { .. })) => Ok(()),
        _ => Err(AppError::config("Expected invalid limit")),
    }
}

#[test]
fn engine_config_falls_back_to_defaults() -> AppResult<()> {
    let settings = EngineConfig {
        mode: Some(ExecutionMode::Agent),
        busy_timeout: Some(DurationValue::Text("5s".to_owned())),
        ..EngineConfig::default()
    }
    .into_settings()?;
    if settings.mode != ExecutionMode::Agent {
        return Err(AppError::config("Mode not applied"));
    }
    if settings.busy_timeout != Duration::from_secs(5) {
        return Err(AppError::config("Busy timeout not applied"));
    }
    if settings.time_update_interval != Duration::from_millis(250) || !settings.local_mode {
        return Err(AppError::config("Defaults not kept"));
    }
    Ok(())
}

#[test]
fn project_toml_loads_nested_tree() -> AppResult<()> {
    let dir = tempdir()?;
    let path = dir.path().join("project.toml");
    let content = r#"
id = "p1"
label = "Project"

[attributes]
limits = "Time=60;"

[[scenarios]]
id = "s1"
label = "Scenario"
follow_project = false

[[scenarios.components]]
id = "gen"
label = "Generator"
type = "generator"

[[scenarios.components]]
id = "sink"
label = "Sink"
type = "counter-sink"
non_blocking = true

[[scenarios.connections]]
output = "gen/output"
input = "sink/input"

[[agents]]
id = "a1"
label = "Agent 1"

[[assignments]]
scenario = "s1"
agent = "a1"
"#;
    std::fs::write(&path, content)?;

    let project = load_project(&path)?;
    if project.canvas.id != "p1" || project.canvas.attributes.get("limits").map(String::as_str) != Some("Time=60;") {
        return Err(AppError::config("Project canvas not parsed"));
    }
    let Some(scenario) = project.scenarios.first() else {
        return Err(AppError::config("Missing scenario"));
    };
    if scenario.follow_project || scenario.canvas.components.len() != 2 {
        return Err(AppError::config("Scenario not parsed"));
    }
    if scenario.canvas.connections.first()
        != Some(&ConnectionConfig {
            output: "gen/output".to_owned(),
            input: "sink/input".to_owned(),
        })
    {
        return Err(AppError::config("Connection not parsed"));
    }
    if project.assignments.len() != 1 || project.agents.len() != 1 {
        return Err(AppError::config("Agents not parsed"));
    }
    Ok(())
}

#[test]
fn project_round_trips_through_json_file() -> AppResult<()> {
    let dir = tempdir()?;
    let path = dir.path().join("project.json");
    let mut project = ProjectConfig::new("Project");
    let mut scenario = ScenarioConfig::new("Scenario");
    scenario
        .canvas
        .components
        .push(ComponentConfig::new("Sink", "counter-sink"));
    project.scenarios.push(scenario);

    save_config_file(&path, &project)?;
    let loaded: ProjectConfig = load_config_file(&path)?;
    if loaded != project {
        return Err(AppError::config("Project changed on disk"));
    }
    Ok(())
}

#[test]
fn unsupported_extension_is_rejected() -> AppResult<()> {
    let dir = tempdir()?;
    let path = dir.path().join("project.yaml");
    std::fs::write(&path, "id: p1")?;
    match load_project(&path) {
        Err(AppError::Config(ConfigError::UnsupportedExtension { ext })) if ext == "yaml" => Ok(()),
        _ => Err(AppError::config("Expected unsupported extension")),
    }
}

#[test]
fn content_hash_tracks_changes() -> AppResult<()> {
    let mut project = ProjectConfig::new("Project");
    let first = content_hash(&project)?;
    if first.len() != 64 || content_hash(&project)? != first {
        return Err(AppError::config("Hash is not a stable sha256 hex digest"));
    }
    project.canvas.label = "Renamed".to_owned();
    if content_hash(&project)? == first {
        return Err(AppError::config("Hash ignored a change"));
    }
    Ok(())
}
