//! Canonical argument values.
//!
//! Invocation arguments arrive as loosely typed JSON. [`ArgValue`] is the
//! canonical form validation works on: integers and floats are told apart
//! by whether the number survives as an integer without loss.

use std::collections::BTreeMap;

use serde_json::{Map, Number, Value};
use stepline_pipeline::ParamType;

#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Vec<ArgValue>),
    Object(BTreeMap<String, ArgValue>),
}

impl ArgValue {
    /// Short runtime type name used in validation messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Whether this value satisfies a declared parameter type.
    ///
    /// Integers are accepted where floats are expected, and undeclared
    /// type names accept anything.
    pub fn is_compatible(&self, expected: &ParamType) -> bool {
        match (expected, self) {
            (ParamType::Other(_), _) => true,
            (ParamType::String, Self::Str(_)) => true,
            (ParamType::Integer, Self::Int(_)) => true,
            (ParamType::Float, Self::Int(_) | Self::Float(_)) => true,
            (ParamType::Bool, Self::Bool(_)) => true,
            (ParamType::Array, Self::Array(_)) => true,
            (ParamType::Object, Self::Object(_)) => true,
            _ => false,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::from(*i),
            Self::Float(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
            Self::Str(s) => Value::String(s.clone()),
            Self::Array(items) => Value::Array(items.iter().map(Self::to_value).collect()),
            Self::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_value()))
                    .collect::<Map<_, _>>(),
            ),
        }
    }
}

impl From<&Value> for ArgValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => from_number(n),
            Value::String(s) => Self::Str(s.clone()),
            Value::Array(items) => Self::Array(items.iter().map(Self::from).collect()),
            Value::Object(map) => Self::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from(v)))
                    .collect(),
            ),
        }
    }
}

/// Integer when representable without precision loss, float otherwise.
fn from_number(n: &Number) -> ArgValue {
    if let Some(i) = n.as_i64() {
        return ArgValue::Int(i);
    }
    // u64 beyond i64::MAX
    if n.is_u64() {
        return n.as_f64().map_or(ArgValue::Null, ArgValue::Float);
    }
    match n.as_f64() {
        Some(f) if !f.is_finite() => ArgValue::Null,
        Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
            ArgValue::Int(f as i64)
        }
        Some(f) => ArgValue::Float(f),
        None => ArgValue::Null,
    }
}

/// Convert an argument object. Anything other than an object (or null) is
/// rejected by the caller.
pub fn convert_arguments(arguments: &Map<String, Value>) -> BTreeMap<String, ArgValue> {
    arguments
        .iter()
        .map(|(k, v)| (k.clone(), ArgValue::from(v)))
        .collect()
}
