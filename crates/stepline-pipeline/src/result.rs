//! Step and workflow run results.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Terminal state of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Succeeded,
    Failed,
    Skipped,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Outcome of one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub step_id: String,
    pub success: bool,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    /// Connector invocations made (0 when skipped).
    pub attempts: u32,
}

impl StepResult {
    pub fn succeeded(step_id: impl Into<String>, result: Value, duration_ms: u64, attempts: u32) -> Self {
        Self {
            step_id: step_id.into(),
            success: true,
            status: StepStatus::Succeeded,
            result: Some(result),
            error: None,
            duration_ms,
            attempts,
        }
    }

    pub fn failed(
        step_id: impl Into<String>,
        error: impl Into<String>,
        duration_ms: u64,
        attempts: u32,
    ) -> Self {
        Self {
            step_id: step_id.into(),
            success: false,
            status: StepStatus::Failed,
            result: None,
            error: Some(error.into()),
            duration_ms,
            attempts,
        }
    }

    pub fn skipped(step_id: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            success: false,
            status: StepStatus::Skipped,
            result: None,
            error: None,
            duration_ms: 0,
            attempts: 0,
        }
    }

    /// The entry templates see under `${<step_id>...}`.
    pub fn context_view(&self) -> Value {
        let mut view = Map::new();
        view.insert("success".into(), json!(self.success));
        view.insert("status".into(), json!(self.status.to_string()));
        if let Some(result) = &self.result {
            view.insert("result".into(), result.clone());
        }
        if let Some(error) = &self.error {
            view.insert("error".into(), json!(error));
        }
        view.insert("durationMs".into(), json!(self.duration_ms));
        view.insert("attempts".into(), json!(self.attempts));
        Value::Object(view)
    }
}

/// Outcome of one workflow run.
///
/// `is_success` reports whether the run itself could be carried out. A run
/// whose steps failed is still successful at this level; inspect
/// `step_results` or `outputs` for business-level success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowResult {
    pub is_success: bool,
    pub execution_time_ms: u64,
    pub outputs: Map<String, Value>,
    pub metadata: Map<String, Value>,
    pub step_results: Vec<StepResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowResult {
    /// A run that could not be carried out at all.
    pub fn failure(error: impl Into<String>, execution_time_ms: u64) -> Self {
        Self {
            is_success: false,
            execution_time_ms,
            outputs: Map::new(),
            metadata: Map::new(),
            step_results: Vec::new(),
            error: Some(error.into()),
        }
    }

    /// Result for a step id, if that step was reached.
    pub fn step(&self, step_id: &str) -> Option<&StepResult> {
        self.step_results.iter().find(|r| r.step_id == step_id)
    }

    /// Number of steps with the given status.
    pub fn count(&self, status: StepStatus) -> usize {
        self.step_results.iter().filter(|r| r.status == status).count()
    }
}
