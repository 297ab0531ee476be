//! Parameter accessors shared by the connectors.

use serde_json::{Map, Value};
use stepline_pipeline::ConnectorError;

pub(crate) fn required<'a>(
    params: &'a Map<String, Value>,
    key: &str,
) -> Result<&'a Value, ConnectorError> {
    params
        .get(key)
        .filter(|v| !v.is_null())
        .ok_or_else(|| ConnectorError::invalid_params(format!("missing '{key}'")))
}

pub(crate) fn required_str<'a>(
    params: &'a Map<String, Value>,
    key: &str,
) -> Result<&'a str, ConnectorError> {
    required(params, key)?
        .as_str()
        .ok_or_else(|| ConnectorError::invalid_params(format!("'{key}' must be a string")))
}

pub(crate) fn optional_str<'a>(
    params: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a str>, ConnectorError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(ConnectorError::invalid_params(format!(
            "'{key}' must be a string"
        ))),
    }
}

/// A `{name: value}` object whose values are rendered as strings.
pub(crate) fn string_pairs(
    params: &Map<String, Value>,
    key: &str,
) -> Result<Vec<(String, String)>, ConnectorError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Object(map)) => Ok(map
            .iter()
            .map(|(k, v)| (k.clone(), stepline_pipeline::template::value_to_string(v)))
            .collect()),
        Some(_) => Err(ConnectorError::invalid_params(format!(
            "'{key}' must be an object"
        ))),
    }
}
