// ABOUTME: Entry point for the devstack CLI application.
// ABOUTME: Parses arguments and dispatches to appropriate command handlers.

mod cli;
mod output;

use clap::Parser;
use cli::{Cli, Commands};
use devstack::config::{self, StackConfig};
use devstack::error::{Error, Result};
use devstack::runtime::{self, BollardRuntime};
use devstack::stack::OrchestrationScheduler;
use output::Output;
use std::env;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbose flag
    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mut output = Output::new(cli.output_mode());
    output.start_timer();

    if let Err(e) = run(cli, &output).await {
        output.error(&e.to_string());
        std::process::exit(1);
    }
}

async fn run(cli: Cli, output: &Output) -> Result<()> {
    match cli.command {
        Commands::Init { prefix, force } => {
            let cwd = env::current_dir()?;
            let path = config::init_config(&cwd, prefix.as_deref(), force)?;
            output.success(&format!("Wrote {}", path.display()));
            Ok(())
        }
        Commands::Config => {
            let (config, base_dir) = load(cli.file.as_deref())?;
            let registry = config.build_registry(&base_dir)?;
            output.start_order(&registry);
            Ok(())
        }
        Commands::Up => {
            let (config, base_dir) = load(cli.file.as_deref())?;
            let scheduler = scheduler(&config, &base_dir)?;
            let runtime = connect(&config).await?;

            output.progress(&format!(
                "Starting {} service(s) for stack '{}'",
                scheduler.registry().len(),
                scheduler.registry().prefix()
            ));
            let summary = scheduler.up(&runtime).await;
            output.run_summary(&summary);

            if summary.is_success() {
                output.success("Stack is up");
                Ok(())
            } else {
                Err(Error::StackFailed {
                    failed: summary.failed().count(),
                    skipped: summary.skipped().count(),
                })
            }
        }
        Commands::Down { kill } => {
            let (config, base_dir) = load(cli.file.as_deref())?;
            let scheduler = scheduler(&config, &base_dir)?;
            let runtime = connect(&config).await?;

            output.progress(&format!(
                "Stopping stack '{}'",
                scheduler.registry().prefix()
            ));
            let summary = scheduler.down(&runtime, !kill).await;
            output.teardown_summary(&summary);

            if summary.is_clean() {
                output.success("Stack is down");
                Ok(())
            } else {
                Err(Error::TeardownFailed(
                    summary.errors.len() + summary.network_errors.len(),
                ))
            }
        }
        Commands::Status => {
            let (config, base_dir) = load(cli.file.as_deref())?;
            let scheduler = scheduler(&config, &base_dir)?;
            let runtime = connect(&config).await?;

            scheduler.refresh(&runtime).await?;
            output.status(&scheduler);
            Ok(())
        }
    }
}

/// Read the stack file and the directory its relative paths resolve against.
fn load(file: Option<&Path>) -> Result<(StackConfig, PathBuf)> {
    let path = match file {
        Some(path) => path.to_path_buf(),
        None => StackConfig::locate(&env::current_dir()?)?,
    };
    let config = StackConfig::load(&path)?;

    let mut base_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    // .devstack/config.yml belongs to the directory above
    if base_dir.file_name().is_some_and(|n| n == ".devstack") {
        base_dir.pop();
    }
    Ok((config, base_dir))
}

fn scheduler(config: &StackConfig, base_dir: &Path) -> Result<OrchestrationScheduler> {
    let registry = config.build_registry(base_dir)?;
    Ok(OrchestrationScheduler::new(
        registry,
        config.scheduler_options()?,
    ))
}

async fn connect(config: &StackConfig) -> Result<BollardRuntime> {
    let runtime = runtime::connect_local(config.engine.as_ref()).await?;
    tracing::debug!(runtime = %runtime.runtime_type(), "engine connected");
    Ok(runtime)
}
