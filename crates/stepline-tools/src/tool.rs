//! A registered workflow exposed as a callable tool.

use std::sync::Arc;

use serde_json::{Map, Value};
use stepline_pipeline::{WorkflowDefinition, WorkflowEngine};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::args::convert_arguments;
use crate::error::{Result, ToolError};
use crate::response::{ToolInfo, ToolResponse, tool_name};
use crate::schema::input_schema;
use crate::validate::ArgumentValidator;

/// Invocation adapter for one workflow.
///
/// Converts and validates arguments, drives the engine and formats the
/// run into a [`ToolResponse`].
#[derive(Debug, Clone)]
pub struct WorkflowTool {
    definition: Arc<WorkflowDefinition>,
    engine: WorkflowEngine,
    name: String,
    schema: Value,
    validator: ArgumentValidator,
}

impl WorkflowTool {
    pub fn new(definition: Arc<WorkflowDefinition>, engine: WorkflowEngine) -> Self {
        Self {
            name: tool_name(&definition.id),
            schema: input_schema(&definition),
            validator: ArgumentValidator::new(&definition),
            definition,
            engine,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn definition(&self) -> &Arc<WorkflowDefinition> {
        &self.definition
    }

    pub fn input_schema(&self) -> &Value {
        &self.schema
    }

    pub fn info(&self) -> ToolInfo {
        ToolInfo {
            name: self.name.clone(),
            description: self.definition.description.clone(),
            input_schema: self.schema.clone(),
        }
    }

    /// Convert and validate raw arguments into the run's input bag.
    pub fn prepare_input(&self, arguments: &Value) -> Result<Map<String, Value>> {
        let args = match arguments {
            Value::Object(map) => convert_arguments(map),
            Value::Null => Default::default(),
            other => {
                return Err(ToolError::InvalidArguments(vec![format!(
                    "arguments must be an object, got {}",
                    crate::args::ArgValue::from(other).type_name()
                )]));
            }
        };
        self.validator.validate(&self.definition, args)
    }

    /// Run the workflow. Validation failures become error responses and no
    /// step runs.
    pub async fn call(
        &self,
        arguments: &Value,
        session_id: &str,
        cancel: &CancellationToken,
    ) -> ToolResponse {
        let input = match self.prepare_input(arguments) {
            Ok(input) => input,
            Err(e) => {
                debug!(tool = %self.name, error = %e, "rejected invocation");
                return ToolResponse::error(e);
            }
        };

        let result = self
            .engine
            .run_definition(Arc::clone(&self.definition), session_id, input, cancel)
            .await;
        info!(
            tool = %self.name,
            session = %session_id,
            success = result.is_success,
            duration_ms = result.execution_time_ms,
            "tool call finished"
        );
        ToolResponse::from_result(&result)
    }
}
