//! Tool-facing listing and response types.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use stepline_pipeline::WorkflowResult;

/// Name prefix of every workflow tool.
pub const TOOL_PREFIX: &str = "workflow_";

/// Tool name for a workflow id.
pub fn tool_name(workflow_id: &str) -> String {
    format!("{TOOL_PREFIX}{workflow_id}")
}

/// A callable tool as listed in discovery responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Content item in a tool response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    Text { text: String },
}

/// Response to a tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    pub content: Vec<ToolContent>,
    pub is_error: bool,
}

impl ToolResponse {
    /// An error response with a single message.
    pub fn error(message: impl std::fmt::Display) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: format!("Error: {message}"),
            }],
            is_error: true,
        }
    }

    /// Format a workflow run.
    ///
    /// The first item is the JSON payload
    /// `{success, executionTime, outputs, metadata}`. An `Error:` line follows
    /// when the run was not successful, then a step-details block.
    pub fn from_result(result: &WorkflowResult) -> Self {
        let payload = json!({
            "success": result.is_success,
            "executionTime": result.execution_time_ms,
            "outputs": result.outputs,
            "metadata": result.metadata,
        });
        let mut content = vec![ToolContent::Text {
            text: serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string()),
        }];

        if !result.is_success {
            content.push(ToolContent::Text {
                text: format!(
                    "Error: {}",
                    result.error.as_deref().unwrap_or("workflow run failed")
                ),
            });
        }

        if !result.step_results.is_empty() {
            let mut details = String::from("Step details:");
            for step in &result.step_results {
                details.push_str(&format!(
                    "\n- {}: {} (success={}, duration={}ms, attempts={})",
                    step.step_id,
                    step.status,
                    step.success,
                    step.duration_ms,
                    step.attempts
                ));
                if let Some(error) = &step.error {
                    details.push_str(&format!(", error: {error}"));
                }
            }
            content.push(ToolContent::Text { text: details });
        }

        Self {
            content,
            is_error: !result.is_success,
        }
    }

    /// All text content joined with newlines.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .map(|c| match c {
                ToolContent::Text { text } => text.as_str(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// The parsed JSON payload of a formatted run, if present.
    pub fn payload(&self) -> Option<Value> {
        let ToolContent::Text { text } = self.content.first()?;
        serde_json::from_str(text).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;
    use stepline_pipeline::StepResult;

    fn result(is_success: bool) -> WorkflowResult {
        let mut outputs = Map::new();
        outputs.insert("found".into(), json!(true));
        WorkflowResult {
            is_success,
            execution_time_ms: 42,
            outputs,
            metadata: Map::new(),
            step_results: vec![
                StepResult::failed("find", "no such object", 5, 2),
                StepResult::skipped("bind"),
            ],
            error: (!is_success).then(|| "workflow run cancelled".to_string()),
        }
    }

    #[test]
    fn test_successful_run() {
        let response = ToolResponse::from_result(&result(true));
        assert!(!response.is_error);
        assert_eq!(response.content.len(), 2);
        assert_eq!(
            response.payload().unwrap(),
            json!({"success": true, "executionTime": 42, "outputs": {"found": true}, "metadata": {}})
        );
        assert_eq!(
            response.content[1],
            ToolContent::Text {
                text: "Step details:\n\
                       - find: failed (success=false, duration=5ms, attempts=2), error: no such object\n\
                       - bind: skipped (success=false, duration=0ms, attempts=0)"
                    .into()
            }
        );
    }

    #[test]
    fn test_unsuccessful_run_adds_error_line() {
        let response = ToolResponse::from_result(&result(false));
        assert!(response.is_error);
        assert_eq!(
            response.content[1],
            ToolContent::Text {
                text: "Error: workflow run cancelled".into()
            }
        );
        assert!(response.text().contains("Step details:"));
    }

    #[test]
    fn test_error_response() {
        let response = ToolResponse::error("Workflow not found: x");
        assert!(response.is_error);
        assert_eq!(response.text(), "Error: Workflow not found: x");
        assert!(response.payload().is_none());
    }

    #[test]
    fn test_tool_name() {
        assert_eq!(tool_name("bind_character"), "workflow_bind_character");
    }
}
