use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use crate::args::RunArgs;
use crate::component::BehaviorRegistry;
use crate::config::{load_engine_config, load_project};
use crate::error::AppResult;
use crate::execution::TestState;
use crate::summary::{LogSummarySink, Summary};
use crate::workspace::Workspace;

pub fn run() -> AppResult<()> {
    let args = RunArgs::parse();

    crate::logger::init_logging(args.verbose, args.no_color);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    if let Some(summary) = runtime.block_on(run_project(&args))? {
        println!("{}", summary);
    }
    Ok(())
}

/// Load the project named by `args`, run it in local mode until it completes
/// (or Ctrl-C stops it) and return its summary.
///
/// # Errors
///
/// Returns an error when a config file cannot be loaded or the run cannot be
/// started.
pub async fn run_project(args: &RunArgs) -> AppResult<Option<Summary>> {
    let mut settings = load_engine_config(args.engine.as_deref())?.into_settings()?;
    settings.local_mode = true;
    let summary_wait = settings.summary_wait;

    let config = load_project(&args.project)?;
    let workspace = Workspace::new(
        settings,
        Arc::new(BehaviorRegistry::with_builtins()),
        Arc::new(LogSummarySink),
    )?;
    let project = workspace.load_project(config)?;
    if project.is_loading_error() {
        warn!(
            "Project {} loaded with errors; broken items were skipped",
            project.label()
        );
    }
    for limit in &args.limits {
        project.set_limit(&limit.name, limit.value);
    }
    if args.abort_on_finish {
        project.set_abort_on_finish(true);
    }

    let execution = project.start()?;
    info!("Running {} (execution {})", project.label(), execution.id());
    tokio::select! {
        result = execution.wait_for_state(TestState::Completed) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, stopping {}", project.label());
            project.stop();
            execution.wait_for_state(TestState::Completed).await?;
        }
    }

    if !project.wait_until_completed(summary_wait).await {
        warn!("No summary for {} after {:?}", project.label(), summary_wait);
    }
    let summary = project.summary().map(|summary| summary.as_ref().clone());
    project.release();
    Ok(summary)
}
