//! CLI command handlers.

pub mod config;
pub mod list;
pub mod run;
pub mod schema;
pub mod validate;

use std::path::PathBuf;

use anyhow::Result;
use stepline_config::LoadedConfig;

use crate::app::Stepline;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
    /// Workflow directory override from the command line.
    pub workflows_dir: Option<PathBuf>,
}

impl Context {
    /// Build the application from the loaded configuration.
    pub fn app(&self, loaded: LoadedConfig) -> Result<Stepline> {
        Stepline::new(loaded.config, self.workflows_dir.clone())
    }
}

/// Print a value as pretty JSON on stdout.
pub fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
