use clap::Parser;

use super::*;
use crate::error::{AppError, AppResult};

#[test]
fn parses_project_and_repeated_limits() -> AppResult<()> {
    let args = RunArgs::try_parse_from([
        "loadcanvas",
        "--project",
        "demo.toml",
        "--limit",
        "Requests=100",
        "-l",
        "Time = 30",
        "--abort-on-finish",
        "--no-color",
    ])?;
    if args.project.to_str() != Some("demo.toml") {
        return Err(AppError::config(format!("Unexpected project: {:?}", args.project)));
    }
    let expected = vec![
        LimitArg {
            name: "Requests".to_owned(),
            value: 100,
        },
        LimitArg {
            name: "Time".to_owned(),
            value: 30,
        },
    ];
    if args.limits != expected {
        return Err(AppError::config(format!("Unexpected limits: {:?}", args.limits)));
    }
    if !args.abort_on_finish || !args.no_color || args.verbose || args.engine.is_some() {
        return Err(AppError::config("Flags not parsed as given"));
    }
    Ok(())
}

#[test]
fn rejects_malformed_limit() -> AppResult<()> {
    for bad in ["Requests", "=5", "Requests=many"] {
        if RunArgs::try_parse_from(["loadcanvas", "--project", "p.toml", "--limit", bad]).is_ok() {
            return Err(AppError::config(format!("Accepted limit {}", bad)));
        }
    }
    Ok(())
}

#[test]
fn project_is_required() -> AppResult<()> {
    if RunArgs::try_parse_from(["loadcanvas", "--verbose"]).is_ok() {
        return Err(AppError::config("Missing --project accepted"));
    }
    Ok(())
}
