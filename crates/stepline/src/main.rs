//! Stepline - declarative workflow runner
//!
//! Main entry point for the Stepline CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::prelude::*;

mod app;
mod commands;

use commands::{config, list, run, schema, validate};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Stepline - declarative workflow runner
#[derive(Parser)]
#[command(name = "stepline")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Load configuration from this file instead of the discovered layers
    #[arg(long, global = true, env = "STEPLINE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Workflow definition directory (overrides config)
    #[arg(short = 'd', long, global = true, env = "STEPLINE_WORKFLOWS_DIR")]
    pub workflows_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List workflow tools
    List(list::ListArgs),

    /// Print a workflow's input schema
    Schema(schema::SchemaArgs),

    /// Run a workflow
    Run(run::RunArgs),

    /// Check a workflow definition file
    Validate(validate::ValidateArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = app::load_config(cli.config.as_deref())?;
    let logging = loaded.config.logging();
    let verbose = cli.verbose || logging.verbose;

    // Console (human-readable, stderr) + optional rotating JSON file
    let filter = if verbose {
        "stepline=debug,stepline_pipeline=debug,stepline_tools=debug,stepline_cache=debug,stepline_connectors=debug,stepline_config=debug,info"
    } else {
        "stepline=info,stepline_pipeline=info,stepline_tools=info,stepline_cache=info,stepline_connectors=info,warn"
    };
    let console_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    let (json_layer, _guard) = match logging.json_dir() {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, "stepline.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "stepline=trace,stepline_pipeline=trace,stepline_tools=trace,stepline_cache=trace,stepline_connectors=trace,info",
                ));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .with(json_layer)
        .init();

    for warning in loaded.warnings() {
        tracing::warn!("{warning}");
    }

    let ctx = commands::Context {
        json_output: cli.json,
        verbose,
        workflows_dir: cli.workflows_dir,
    };

    match cli.command {
        Commands::List(args) => list::run(args, loaded, &ctx).await,
        Commands::Schema(args) => schema::run(args, loaded, &ctx).await,
        Commands::Run(args) => run::run(args, loaded, &ctx).await,
        Commands::Validate(args) => validate::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, loaded, &ctx).await,
    }
}
