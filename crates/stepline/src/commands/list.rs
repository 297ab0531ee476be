//! List command - show the workflow tool catalog.

use std::time::Duration;

use anyhow::Result;
use clap::Args;
use stepline_config::LoadedConfig;
use stepline_pipeline::{ConnectorRegistry, WorkflowEvent};
use stepline_tools::CatalogSnapshot;

use super::{Context, print_json};

/// Arguments for the list command.
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Keep running and print the catalog again whenever it changes
    #[arg(short, long)]
    pub watch: bool,
}

/// Poll interval while watching.
const WATCH_POLL: Duration = Duration::from_millis(500);

/// Run the list command.
pub async fn run(args: ListArgs, loaded: LoadedConfig, ctx: &Context) -> Result<()> {
    let app = ctx.app(loaded)?;
    let snapshot = app.catalog.snapshot_async().await?;
    print_snapshot(&snapshot, ctx)?;
    if ctx.verbose && !ctx.json_output {
        print_connectors(app.engine.connectors());
    }

    if !args.watch {
        return Ok(());
    }

    let _watcher = if app.is_watching() {
        None
    } else {
        Some(app.catalog.watch()?)
    };
    let mut seen = app.catalog.stats().loads;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = tokio::time::sleep(WATCH_POLL) => {}
        }
        let snapshot = app.catalog.snapshot_async().await?;
        let loads = app.catalog.stats().loads;
        if loads != seen {
            seen = loads;
            print_snapshot(&snapshot, ctx)?;
        }
    }
    Ok(())
}

fn print_snapshot(snapshot: &CatalogSnapshot, ctx: &Context) -> Result<()> {
    if ctx.json_output {
        return print_json(&snapshot.infos());
    }

    if snapshot.tools.is_empty() {
        println!("No workflows found.");
    }
    for tool in &snapshot.tools {
        let def = tool.definition();
        println!("{}  v{}  {}", tool.name(), version(&def.version), def.description);
        if ctx.verbose {
            for param in &def.parameters {
                let required = if param.required { " (required)" } else { "" };
                println!("    {}: {}{}", param.name, param.param_type, required);
            }
        }
    }
    for event in snapshot.errors() {
        if let WorkflowEvent::Error { path, error } = event {
            eprintln!("skipped {}: {}", path.display(), error);
        }
    }
    Ok(())
}

fn print_connectors(connectors: &ConnectorRegistry) {
    println!("\nConnectors:");
    for name in connectors.names() {
        let Some(connector) = connectors.get(name) else {
            continue;
        };
        let operations = connector.operations();
        if operations.is_empty() {
            println!("  {name}");
        } else {
            println!("  {name}: {}", operations.join(", "));
        }
    }
}

fn version(v: &str) -> &str {
    if v.is_empty() { "0" } else { v }
}
