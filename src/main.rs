use anyhow::{Context, Result};
use clap::Parser;
use shadowtrace::cli::{Cli, Command, FlattenArgs};
use shadowtrace::flatten::Flattener;
use shadowtrace::session::Sink;
use shadowtrace::stats::LogStats;
use std::path::Path;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Diagnostics go to stderr at WARN; `--debug` lowers the floor to TRACE.
/// `RUST_LOG` directives are applied on top.
fn init_tracing(debug: bool) {
    let floor = if debug { Level::TRACE } else { Level::WARN };
    let filter = EnvFilter::builder()
        .with_default_directive(floor.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(debug)
        .without_time()
        .init();
}

fn run_flatten(args: &FlattenArgs) -> Result<()> {
    let config = args.trace_config().context("invalid flatten configuration")?;

    let sink = match &args.output {
        Some(path) => Sink::create(path)
            .with_context(|| format!("failed to create output {}", path.display()))?,
        None => Sink::from_writer(std::io::stdout()),
    };
    let mut flattener = Flattener::new(sink, &config, args.format)?;

    for input in &args.inputs {
        flattener
            .flatten_file(input)
            .with_context(|| format!("failed to flatten {}", input.display()))?;
    }

    flattener.close().context("failed to close output")?;
    Ok(())
}

fn run_stats(input: &Path) -> Result<()> {
    let stats = LogStats::from_file(input)
        .with_context(|| format!("failed to read raw log {}", input.display()))?;
    stats.print_summary();
    Ok(())
}

fn main() -> Result<()> {
    let args = Cli::parse();

    init_tracing(args.debug);

    match &args.command {
        Command::Flatten(flatten) => run_flatten(flatten),
        Command::Stats { input } => run_stats(input),
    }
}
