// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! harbor - run and inspect coordinating contexts

mod commands;
mod completions;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use commands::{config, inspect, simulate};
use completions::CompletionsArgs;
use harbor_core::config::HarborConfig;
use output::OutputFormat;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "harbor",
    version,
    about = "Harbor - leader election, write-ahead log and event log for contexts sharing one origin"
)]
pub(crate) struct Cli {
    /// Configuration file (TOML); defaults apply to anything it omits
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run several contexts against one shared store
    Simulate(simulate::SimulateArgs),
    /// Show the write-ahead log persisted in a store directory
    Inspect(inspect::InspectArgs),
    /// Print the effective configuration
    Config,
    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging();

    if let Commands::Completions(args) = cli.command {
        completions::generate_completions::<Cli>(args.shell);
        return Ok(());
    }

    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Commands::Simulate(args) => simulate::simulate(args, &config, cli.format).await,
        Commands::Inspect(args) => inspect::inspect(args, &config, cli.format).await,
        Commands::Config => config::show(&config, cli.format),
        Commands::Completions(_) => Ok(()),
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<HarborConfig> {
    match path {
        Some(path) => HarborConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(HarborConfig::default()),
    }
}

/// Logs go to stderr so stdout stays parseable
fn setup_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
