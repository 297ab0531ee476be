//! Schema command - print a workflow's input schema.

use anyhow::Result;
use clap::Args;
use stepline_config::LoadedConfig;

use super::{Context, print_json};

/// Arguments for the schema command.
#[derive(Args, Debug)]
pub struct SchemaArgs {
    /// Workflow id
    pub id: String,
}

/// Run the schema command.
pub async fn run(args: SchemaArgs, loaded: LoadedConfig, ctx: &Context) -> Result<()> {
    let app = ctx.app(loaded)?;
    let schema = app.catalog.schema(&args.id)?;
    print_json(&schema)
}
