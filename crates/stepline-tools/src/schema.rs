//! Input schema for a workflow tool.

use serde_json::{Map, Value, json};
use stepline_pipeline::WorkflowDefinition;

/// Build a JSON Schema object with one property per parameter.
///
/// Parameter types map to JSON Schema words (`int` → `integer`,
/// `float` → `number`, ...); undeclared type names pass through.
pub fn input_schema(definition: &WorkflowDefinition) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for param in &definition.parameters {
        let mut property = Map::new();
        property.insert("type".into(), json!(param.param_type.schema_type()));
        if !param.description.is_empty() {
            property.insert("description".into(), json!(param.description));
        }
        if let Some(default) = &param.default_value {
            property.insert("default".into(), default.clone());
        }
        properties.insert(param.name.clone(), Value::Object(property));
        if param.required {
            required.push(Value::String(param.name.clone()));
        }
    }

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}
