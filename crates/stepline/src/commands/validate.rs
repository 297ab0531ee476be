//! Validate command - check a definition file without running it.

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Args;
use serde_json::json;
use stepline_pipeline::loader::load_file;
use stepline_tools::{input_schema, tool_name};

use super::{Context, print_json};

/// Arguments for the validate command.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Definition file (.json or .toml)
    pub file: PathBuf,
}

/// Run the validate command.
pub async fn run(args: ValidateArgs, ctx: &Context) -> Result<()> {
    let definition = match load_file(&args.file) {
        Ok(definition) => definition,
        Err(e) => {
            if ctx.json_output {
                print_json(&json!({"valid": false, "error": e.to_string()}))?;
            }
            bail!("{}: {}", args.file.display(), e);
        }
    };

    if ctx.json_output {
        return print_json(&json!({
            "valid": true,
            "id": definition.id,
            "tool": tool_name(&definition.id),
            "steps": definition.steps.len(),
            "inputSchema": input_schema(&definition),
        }));
    }

    println!(
        "{}: ok ({} as {}, {} steps, {} parameters, {} outputs)",
        args.file.display(),
        definition.id,
        tool_name(&definition.id),
        definition.steps.len(),
        definition.parameters.len(),
        definition.outputs.len()
    );
    if ctx.verbose {
        for step in &definition.steps {
            let condition = step
                .condition
                .as_deref()
                .map(|c| format!(" if {c}"))
                .unwrap_or_default();
            println!("  {} -> {}.{}{}", step.id, step.connector, step.operation, condition);
        }
    }
    Ok(())
}
