//! Pure data-transform connector.
//!
//! Operations take the payload under `value` and never touch anything
//! outside their parameters:
//!
//! | Operation        | Extra params               | Result                         |
//! |------------------|----------------------------|--------------------------------|
//! | `to_json`        |                            | compact JSON string            |
//! | `to_pretty_json` |                            | indented JSON string           |
//! | `to_toml`        |                            | TOML document (objects only)   |
//! | `to_text`        |                            | human-readable text            |
//! | `pick`           | `path` or `fields`         | sub-value or subset object     |

use async_trait::async_trait;
use serde_json::{Map, Value};
use stepline_pipeline::template::value_to_string;
use stepline_pipeline::{
    Connector, ConnectorContext, ConnectorError, ConnectorResult, TemplatePath, TemplateResolver,
};

use crate::params;

const OPERATIONS: &[&str] = &["to_json", "to_pretty_json", "to_toml", "to_text", "pick"];

#[derive(Debug, Default, Clone)]
pub struct TransformConnector;

impl TransformConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for TransformConnector {
    fn name(&self) -> &str {
        "transform"
    }

    fn description(&self) -> &str {
        "Serialize and reshape structured data"
    }

    fn operations(&self) -> Vec<String> {
        OPERATIONS.iter().map(|s| s.to_string()).collect()
    }

    async fn invoke(
        &self,
        operation: &str,
        params: &Map<String, Value>,
        _ctx: &ConnectorContext,
    ) -> ConnectorResult {
        match operation {
            "to_json" => {
                let value = params::required(params, "value")?;
                Ok(Value::String(value.to_string()))
            }
            "to_pretty_json" => {
                let value = params::required(params, "value")?;
                serde_json::to_string_pretty(value)
                    .map(Value::String)
                    .map_err(|e| ConnectorError::failed(e.to_string()))
            }
            "to_toml" => to_toml(params::required(params, "value")?),
            "to_text" => {
                let value = params::required(params, "value")?;
                Ok(Value::String(to_text(value)))
            }
            "pick" => pick(params),
            other => Err(ConnectorError::unknown_operation(self.name(), other)),
        }
    }
}

fn to_toml(value: &Value) -> ConnectorResult {
    if !value.is_object() {
        return Err(ConnectorError::invalid_params(
            "'value' must be an object to render as TOML",
        ));
    }
    toml::to_string(value)
        .map(Value::String)
        .map_err(|e| ConnectorError::failed(format!("TOML serialization failed: {e}")))
}

/// Render a value as indented `key: value` / `- item` lines.
fn to_text(value: &Value) -> String {
    let mut out = String::new();
    match value {
        Value::Object(_) | Value::Array(_) => write_text(value, 0, &mut out),
        scalar => out.push_str(&scalar_text(scalar)),
    }
    out.trim_end().to_string()
}

fn write_text(value: &Value, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    match value {
        Value::Object(map) => {
            for (key, item) in map {
                if is_container(item) {
                    out.push_str(&format!("{indent}{key}:\n"));
                    write_text(item, depth + 1, out);
                } else {
                    out.push_str(&format!("{indent}{key}: {}\n", scalar_text(item)));
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                if is_container(item) {
                    out.push_str(&format!("{indent}-\n"));
                    write_text(item, depth + 1, out);
                } else {
                    out.push_str(&format!("{indent}- {}\n", scalar_text(item)));
                }
            }
        }
        scalar => out.push_str(&format!("{indent}{}\n", scalar_text(scalar))),
    }
}

fn is_container(value: &Value) -> bool {
    matches!(value, Value::Object(m) if !m.is_empty()) || matches!(value, Value::Array(a) if !a.is_empty())
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        other => value_to_string(other),
    }
}

/// `path` selects one nested value (`items[0].name`); `fields` keeps a
/// subset of an object's keys.
fn pick(params: &Map<String, Value>) -> ConnectorResult {
    let value = params::required(params, "value")?;

    if let Some(path) = params::optional_str(params, "path")? {
        let full = format!("value.{path}");
        let parsed = TemplatePath::parse(&full)
            .ok_or_else(|| ConnectorError::invalid_params(format!("invalid path '{path}'")))?;
        let mut scope = Map::new();
        scope.insert("value".to_string(), value.clone());
        return TemplateResolver::new(&scope)
            .resolve_path(&parsed)
            .ok_or_else(|| ConnectorError::failed(format!("path '{path}' not found")));
    }

    match params.get("fields") {
        Some(Value::Array(fields)) => {
            let source = value.as_object().ok_or_else(|| {
                ConnectorError::invalid_params("'value' must be an object to pick fields")
            })?;
            let picked = fields
                .iter()
                .filter_map(Value::as_str)
                .filter_map(|f| source.get(f).map(|v| (f.to_string(), v.clone())))
                .collect::<Map<_, _>>();
            Ok(Value::Object(picked))
        }
        Some(_) => Err(ConnectorError::invalid_params("'fields' must be an array")),
        None => Err(ConnectorError::invalid_params(
            "pick needs either 'path' or 'fields'",
        )),
    }
}
