
use tempfile::tempdir;

use loadcanvas::config::{
    CanvasConfig, ComponentConfig, ConnectionConfig, ProjectConfig, save_config_file,
};
use support_local::{
    DEMO_PROJECT_TOML, FAST_ENGINE_TOML, run_loadcanvas, summary_value, write_file,
};

#[test]
fn e2e_local_request_limit() -> Result<(), String> {
    let dir = tempdir().map_err(|err| format!("tempdir failed: {}", err))?;
    let project = write_file(dir.path(), "demo.toml", DEMO_PROJECT_TOML)?;
    let engine = write_file(dir.path(), "engine.toml", FAST_ENGINE_TOML)?;

    let output = run_loadcanvas([
        "--project",
        project.as_str(),
        "--engine",
        engine.as_str(),
        "--limit",
        "Requests=20",
        "--no-color",
    ])?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    if !output.status.success() {
        return Err(format!(
            "loadcanvas failed: {}",
            String::from_utf8_lossy(&output.stderr)
        ));
    }
    if !stdout.starts_with("Local demo") {
        return Err(format!("Summary title missing:\n{}", stdout));
    }
    let requests = summary_value(&stdout, "Requests")?;
    if requests < 20 {
        return Err(format!("Stopped before the limit: {}", requests));
    }
    let failures = summary_value(&stdout, "Failures")?;
    if failures < 4 || failures > requests {
        return Err(format!("Unexpected failures: {}", failures));
    }
    Ok(())
}

#[test]
fn e2e_local_failure_limit_json_project() -> Result<(), String> {
    let dir = tempdir().map_err(|err| format!("tempdir failed: {}", err))?;

    let mut generator = ComponentConfig::new("Generator", "generator");
    generator.id = "gen".to_owned();
    generator.non_blocking = true;
    generator
        .attributes
        .insert("interval".to_owned(), "5ms".to_owned());
    generator
        .attributes
        .insert("failEvery".to_owned(), "2".to_owned());
    let mut sink = ComponentConfig::new("Sink", "counter-sink");
    sink.id = "sink".to_owned();
    sink.non_blocking = true;
    let mut canvas = CanvasConfig::new("Failing demo");
    canvas.attributes.insert("limits".to_owned(), "Failures=3;".to_owned());
    canvas.components = vec![generator, sink];
    canvas.connections = vec![ConnectionConfig {
        output: "gen/output".to_owned(),
        input: "sink/input".to_owned(),
    }];
    let mut config = ProjectConfig::new("Failing demo");
    config.canvas = canvas;
    let path = dir.path().join("failing.json");
    save_config_file(&path, &config).map_err(|err| format!("save project failed: {}", err))?;

    let output = run_loadcanvas(["--project", path.to_string_lossy().as_ref()])?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    if !output.status.success() {
        return Err(format!(
            "loadcanvas failed: {}",
            String::from_utf8_lossy(&output.stderr)
        ));
    }
    let failures = summary_value(&stdout, "Failures")?;
    let requests = summary_value(&stdout, "Requests")?;
    if failures < 3 || requests < 6 {
        return Err(format!(
            "Unexpected totals: {} requests, {} failures",
            requests, failures
        ));
    }
    Ok(())
}

#[test]
fn e2e_local_missing_project_fails() -> Result<(), String> {
    let dir = tempdir().map_err(|err| format!("tempdir failed: {}", err))?;
    let missing = dir.path().join("nope.toml");
    let output = run_loadcanvas(["--project", missing.to_string_lossy().as_ref()])?;
    if output.status.success() {
        return Err("Missing project file should fail".to_owned());
    }
    Ok(())
}

#[test]
fn e2e_local_rejects_bad_limit() -> Result<(), String> {
    let dir = tempdir().map_err(|err| format!("tempdir failed: {}", err))?;
    let project = write_file(dir.path(), "demo.toml", DEMO_PROJECT_TOML)?;
    let output = run_loadcanvas(["--project", project.as_str(), "--limit", "Requests"])?;
    if output.status.success() {
        return Err("Malformed --limit should fail".to_owned());
    }
    Ok(())
}
