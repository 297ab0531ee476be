//! Config command - configuration management.

use anyhow::Result;
use clap::{Args, Subcommand};
use stepline_config::LoadedConfig;

use super::{Context, print_json};

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the resolved configuration and where it came from
    Show,

    /// Show the user configuration file path
    Path,
}

/// Run the config command.
pub async fn run(args: ConfigArgs, loaded: LoadedConfig, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(loaded, ctx),
        ConfigCommand::Path => cmd_path(),
    }
}

fn cmd_show(loaded: LoadedConfig, ctx: &Context) -> Result<()> {
    if ctx.json_output {
        return print_json(&serde_json::json!({
            "sources": loaded.loaded_from(),
            "warnings": loaded.warnings(),
            "workflows": loaded.config.workflows(),
            "catalog": loaded.config.catalog(),
            "llm": loaded.config.llm(),
            "http": loaded.config.http(),
            "logging": loaded.config.logging(),
        }));
    }

    println!("# Stepline Configuration\n");
    let sources = loaded.loaded_from();
    if sources.is_empty() {
        println!("# No config files loaded (using defaults)\n");
    } else {
        for source in sources {
            println!("# loaded: {}", source.display());
        }
        println!();
    }
    for warning in loaded.warnings() {
        println!("# warning: {warning}");
    }

    // Print every section, defaults included
    let mut resolved = loaded.config.clone();
    resolved.workflows = Some(loaded.config.workflows());
    resolved.catalog = Some(loaded.config.catalog());
    resolved.logging = Some(loaded.config.logging());
    resolved.connectors = Some(stepline_config::ConnectorsSection {
        llm: Some(loaded.config.llm()),
        http: Some(loaded.config.http()),
    });
    print!("{}", resolved.to_toml()?);
    Ok(())
}

fn cmd_path() -> Result<()> {
    match stepline_config::user_config_path() {
        Some(path) => println!("{}", path.display()),
        None => println!("(no user config directory on this platform)"),
    }
    Ok(())
}
