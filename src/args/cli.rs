use std::path::PathBuf;

use clap::Parser;

use super::parsers::parse_limit_arg;

/// A `name=value` counter limit given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitArg {
    pub name: String,
    pub value: i64,
}

#[derive(Debug, Parser, Clone)]
#[clap(
    version,
    about = "Run a load test project: load the canvas tree, execute it locally and print the summary."
)]
pub struct RunArgs {
    /// Project file to run (TOML/JSON)
    #[arg(long, short = 'p', env = "LOADCANVAS_PROJECT")]
    pub project: PathBuf,

    /// Engine settings file (TOML/JSON). Defaults apply when omitted.
    #[arg(long, short = 'e', env = "LOADCANVAS_ENGINE")]
    pub engine: Option<PathBuf>,

    /// Enable verbose logging (sets log level to debug unless overridden by LOADCANVAS_LOG/RUST_LOG)
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// Disable colored log output
    #[arg(long = "no-color")]
    pub no_color: bool,

    /// Stop the run once a counter reaches a value (e.g. Requests=1000, Time=30). Repeatable.
    #[arg(long = "limit", short = 'l', value_parser = parse_limit_arg)]
    pub limits: Vec<LimitArg>,

    /// Cancel busy components on stop instead of waiting for them
    #[arg(long = "abort-on-finish")]
    pub abort_on_finish: bool,
}
