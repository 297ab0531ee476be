//! Declarative workflow definitions.
//!
//! One document per workflow, in JSON or TOML with the same camelCase
//! field names.
//!
//! # Example JSON
//!
//! ```json
//! {
//!   "id": "bind_character",
//!   "name": "Bind character",
//!   "version": "1.0.0",
//!   "parameters": [
//!     {"name": "characterName", "type": "string", "required": true}
//!   ],
//!   "steps": [
//!     {"id": "find", "connector": "scene", "operation": "find",
//!      "parameters": {"name": "${input.characterName}"}},
//!     {"id": "bind", "connector": "scene", "operation": "bind",
//!      "parameters": {"target": "${find.result}"},
//!      "condition": "${find.success}",
//!      "retryPolicy": {"maxAttempts": 3, "delaySeconds": 1, "backoffStrategy": "exponential"}}
//!   ],
//!   "outputs": {
//!     "bindingResult": {"source": "${bind.result}", "type": "object"}
//!   }
//! }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{PipelineError, Result};
use crate::template::{self, TemplatePath};

/// Root identifier for workflow inputs in templates.
pub const INPUT_ROOT: &str = "input";

/// A complete declarative workflow definition.
///
/// Immutable once registered; the registry hands out `Arc`s.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    /// Unique workflow id.
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub version: String,

    #[serde(default)]
    pub author: String,

    #[serde(default)]
    pub metadata: WorkflowMetadata,

    /// Ordered invocation parameters.
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,

    /// Steps, executed strictly in this order.
    pub steps: Vec<StepSpec>,

    /// Named outputs resolved after the last step.
    #[serde(default)]
    pub outputs: BTreeMap<String, OutputSpec>,
}

/// Descriptive workflow metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowMetadata {
    pub category: String,
    pub tags: Vec<String>,
    pub runtime_requirements: Vec<String>,
    pub plugin_dependencies: Vec<String>,
}

/// A named invocation parameter.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSpec {
    pub name: String,

    #[serde(rename = "type", default)]
    pub param_type: ParamType,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub required: bool,

    /// Applied when the caller omits the parameter or passes `null`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,

    #[serde(default)]
    pub validation: Vec<ValidationRule>,
}

/// Declared parameter type.
///
/// Type names are normalized on parse (`int`/`integer`/`long` → `Integer`,
/// `bool`/`boolean` → `Bool`, ...). Unrecognized names are kept as
/// `Other` and accept any value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum ParamType {
    #[default]
    String,
    Integer,
    Float,
    Bool,
    Array,
    Object,
    Other(String),
}

impl ParamType {
    /// Normalize a declared type name.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "string" | "str" | "text" => Self::String,
            "int" | "integer" | "long" => Self::Integer,
            "float" | "double" | "number" | "decimal" => Self::Float,
            "bool" | "boolean" => Self::Bool,
            "array" | "list" => Self::Array,
            "object" | "map" | "dict" => Self::Object,
            _ => Self::Other(name.trim().to_string()),
        }
    }

    /// Canonical short name.
    pub fn as_str(&self) -> &str {
        match self {
            Self::String => "string",
            Self::Integer => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Array => "array",
            Self::Object => "object",
            Self::Other(name) => name.as_str(),
        }
    }

    /// JSON Schema type word used in tool input schemas.
    ///
    /// Unlike [`ParamType::as_str`], integers are not folded into the
    /// generic numeric word: `Integer` maps to `"integer"` and only `Float`
    /// maps to `"number"`, so schema clients can reject fractional values
    /// for integer parameters before a call.
    pub fn schema_type(&self) -> &str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "number",
            Self::Bool => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            Self::Other(name) => name.as_str(),
        }
    }
}

impl From<String> for ParamType {
    fn from(name: String) -> Self {
        Self::parse(&name)
    }
}

impl From<ParamType> for String {
    fn from(t: ParamType) -> Self {
        t.as_str().to_string()
    }
}

impl std::fmt::Display for ParamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validation rule attached to a parameter, e.g. `{"type": "min", "parameters": {"value": 1}}`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ValidationRule {
    #[serde(rename = "type")]
    pub rule_type: String,

    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl ValidationRule {
    /// The regex source of a `pattern` rule.
    pub fn pattern(&self) -> Option<&str> {
        if self.rule_type != "pattern" {
            return None;
        }
        self.parameters.get("value").and_then(Value::as_str)
    }
}

/// A single step within a workflow.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepSpec {
    /// Unique step id within this workflow.
    pub id: String,

    /// Operation family tag (e.g. `remote-call`, `model-inference`). Informational.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub step_type: Option<String>,

    pub connector: String,

    pub operation: String,

    /// Literal values, nested containers or `${...}` templates.
    #[serde(default)]
    pub parameters: Map<String, Value>,

    /// Template evaluated for truthiness; absent means always run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<RetryPolicy>,
}

impl StepSpec {
    /// Attempt deadline: the step's own timeout, capped by `ceiling`.
    ///
    /// Missing, zero, negative or non-finite timeouts fall back to the ceiling.
    pub fn effective_timeout(&self, ceiling: Duration) -> Duration {
        self.timeout_seconds
            .filter(|secs| *secs > 0.0)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .map_or(ceiling, |t| t.min(ceiling))
    }

    /// The retry policy, defaulting to a single attempt.
    pub fn retry(&self) -> RetryPolicy {
        self.retry_policy.clone().unwrap_or_default()
    }
}

/// Retry configuration for a step.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default)]
    pub delay_seconds: f64,

    #[serde(default)]
    pub backoff_strategy: BackoffStrategy,
}

fn default_max_attempts() -> u32 {
    1
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_seconds: 0.0,
            backoff_strategy: BackoffStrategy::Fixed,
        }
    }
}

impl RetryPolicy {
    /// Wait after failed attempt `attempt` (1-based) before the next one.
    ///
    /// fixed: `d`, linear: `d × attempt`, exponential: `d × 2^(attempt−1)`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let base = if self.delay_seconds.is_finite() && self.delay_seconds > 0.0 {
            self.delay_seconds
        } else {
            return Duration::ZERO;
        };
        let factor = match self.backoff_strategy {
            BackoffStrategy::Fixed => 1.0,
            BackoffStrategy::Linear => f64::from(attempt.max(1)),
            BackoffStrategy::Exponential => {
                let shift = attempt.saturating_sub(1).min(20);
                f64::from(1u32 << shift)
            }
        };
        Duration::try_from_secs_f64(base * factor).unwrap_or(Duration::MAX)
    }
}

/// Backoff strategy between retries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// Constant delay.
    #[default]
    #[serde(alias = "Fixed", alias = "FIXED")]
    Fixed,
    /// Delay grows with the attempt number.
    #[serde(alias = "Linear", alias = "LINEAR")]
    Linear,
    /// Delay doubles each attempt.
    #[serde(alias = "Exponential", alias = "EXPONENTIAL")]
    Exponential,
}

/// A named workflow output.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputSpec {
    /// Template resolved against the final context.
    pub source: String,

    #[serde(rename = "type", default)]
    pub output_type: String,

    #[serde(default)]
    pub description: String,
}

impl WorkflowDefinition {
    /// Parse from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| PipelineError::InvalidWorkflow(format!("JSON parse error: {}", e)))
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| PipelineError::InvalidWorkflow(format!("TOML parse error: {}", e)))
    }

    /// Load from a `.json` or `.toml` file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml(&content),
            Some("json") => Self::from_json(&content),
            other => Err(PipelineError::InvalidWorkflow(format!(
                "Unsupported definition format '{}' for {}",
                other.unwrap_or(""),
                path.display()
            ))),
        }
    }

    /// Look up a parameter spec by name.
    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Validate structural constraints.
    ///
    /// Checks:
    /// - Non-empty id and at least one step
    /// - Unique, non-empty step ids and parameter names
    /// - Every step names a connector and an operation
    /// - Template references in parameters and conditions point at `input`
    ///   or a step declared earlier; output sources at `input` or any step
    /// - Sane retry policies
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(PipelineError::InvalidWorkflow(
                "Workflow id cannot be empty".into(),
            ));
        }

        if self.steps.is_empty() {
            return Err(PipelineError::InvalidWorkflow(format!(
                "Workflow '{}' must have at least one step",
                self.id
            )));
        }

        let mut param_names = HashSet::new();
        for param in &self.parameters {
            if param.name.is_empty() {
                return Err(PipelineError::InvalidWorkflow(format!(
                    "Workflow '{}' has a parameter with an empty name",
                    self.id
                )));
            }
            if !param_names.insert(param.name.as_str()) {
                return Err(PipelineError::InvalidWorkflow(format!(
                    "Duplicate parameter name: {}",
                    param.name
                )));
            }
            for pattern in param.validation.iter().filter_map(ValidationRule::pattern) {
                if let Err(e) = Regex::new(pattern) {
                    return Err(PipelineError::InvalidWorkflow(format!(
                        "Parameter '{}' has an invalid pattern /{}/: {}",
                        param.name, pattern, e
                    )));
                }
            }
        }

        let mut earlier: HashSet<&str> = HashSet::new();
        for step in &self.steps {
            if step.id.is_empty() {
                return Err(PipelineError::InvalidWorkflow(
                    "Step id cannot be empty".into(),
                ));
            }
            if step.id == INPUT_ROOT {
                return Err(PipelineError::InvalidWorkflow(format!(
                    "Step id '{}' is reserved",
                    INPUT_ROOT
                )));
            }
            if earlier.contains(step.id.as_str()) {
                return Err(PipelineError::InvalidWorkflow(format!(
                    "Duplicate step id: {}",
                    step.id
                )));
            }
            if step.connector.trim().is_empty() || step.operation.trim().is_empty() {
                return Err(PipelineError::InvalidWorkflow(format!(
                    "Step '{}' must name a connector and an operation",
                    step.id
                )));
            }

            let mut refs = template::references(&Value::Object(step.parameters.clone()));
            if let Some(condition) = &step.condition {
                refs.extend(template::references_in_str(condition));
            }
            check_refs(&refs, &earlier, &format!("step '{}'", step.id))?;

            if let Some(policy) = &step.retry_policy {
                if policy.max_attempts < 1 {
                    return Err(PipelineError::InvalidWorkflow(format!(
                        "Step '{}': maxAttempts must be at least 1",
                        step.id
                    )));
                }
                if !policy.delay_seconds.is_finite() || policy.delay_seconds < 0.0 {
                    return Err(PipelineError::InvalidWorkflow(format!(
                        "Step '{}': delaySeconds must be a non-negative number",
                        step.id
                    )));
                }
            }

            earlier.insert(step.id.as_str());
        }

        for (name, output) in &self.outputs {
            let refs = template::references_in_str(&output.source);
            check_refs(&refs, &earlier, &format!("output '{}'", name))?;
        }

        Ok(())
    }
}

/// Every reference root must be `input` or one of `known`.
fn check_refs(refs: &[TemplatePath], known: &HashSet<&str>, owner: &str) -> Result<()> {
    for path in refs {
        let root = path.root();
        if root != INPUT_ROOT && !known.contains(root) {
            return Err(PipelineError::InvalidWorkflow(format!(
                "{} references '${{{}}}' but '{}' is not input or an earlier step",
                owner, path, root
            )));
        }
    }
    Ok(())
}
