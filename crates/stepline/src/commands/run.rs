//! Run command - invoke a workflow tool.

use anyhow::{Context as _, Result, bail};
use clap::Args;
use serde_json::Value;
use stepline_config::LoadedConfig;
use stepline_tools::tool_name;
use tokio_util::sync::CancellationToken;

use super::{Context, print_json};

/// Arguments for the run command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Workflow id
    pub id: String,

    /// Input arguments as a JSON object
    #[arg(short, long, default_value = "{}")]
    pub input: String,

    /// Session id (random if omitted)
    #[arg(short, long)]
    pub session: Option<String>,
}

/// Run the run command.
pub async fn run(args: RunArgs, loaded: LoadedConfig, ctx: &Context) -> Result<()> {
    let arguments: Value =
        serde_json::from_str(&args.input).context("--input must be a JSON object")?;
    let session = args
        .session
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let app = ctx.app(loaded)?;

    // Ctrl-C cancels the run; the engine reports it as a cancelled result
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling run");
            on_signal.cancel();
        }
    });

    let response = app
        .catalog
        .call_tool_with_cancel(&tool_name(&args.id), &arguments, &session, &cancel)
        .await;
    signal_task.abort();

    if ctx.json_output {
        print_json(&response)?;
    } else {
        println!("{}", response.text());
    }

    if response.is_error {
        bail!("workflow '{}' did not complete successfully", args.id);
    }
    Ok(())
}
