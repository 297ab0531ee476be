//! Argument validation against a workflow's parameter specs.

use std::collections::{BTreeMap, HashMap};

use regex::Regex;
use serde_json::{Map, Value};
use stepline_pipeline::{ParameterSpec, ValidationRule, WorkflowDefinition};
use tracing::debug;

use crate::args::ArgValue;
use crate::error::{Result, ToolError};

/// Apply defaults and validate arguments.
///
/// Compiles the definition's patterns on every call; tools keep an
/// [`ArgumentValidator`] instead.
pub fn validate_arguments(
    definition: &WorkflowDefinition,
    args: BTreeMap<String, ArgValue>,
) -> Result<Map<String, Value>> {
    ArgumentValidator::new(definition).validate(definition, args)
}

/// Validation rules of one definition with `pattern` regexes compiled once.
#[derive(Debug, Clone, Default)]
pub struct ArgumentValidator {
    patterns: HashMap<String, Regex>,
}

impl ArgumentValidator {
    pub fn new(definition: &WorkflowDefinition) -> Self {
        let mut patterns = HashMap::new();
        for rule in definition.parameters.iter().flat_map(|p| &p.validation) {
            let Some(source) = rule.pattern() else {
                continue;
            };
            if patterns.contains_key(source) {
                continue;
            }
            match Regex::new(source) {
                Ok(re) => {
                    patterns.insert(source.to_string(), re);
                }
                Err(e) => debug!(pattern = %source, error = %e, "pattern does not compile"),
            }
        }
        Self { patterns }
    }

    /// Number of compiled patterns.
    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// Returns the input bag for the run: every supplied argument in
    /// canonical form plus defaults for absent or null parameters. All
    /// problems are collected into one [`ToolError::InvalidArguments`].
    pub fn validate(
        &self,
        definition: &WorkflowDefinition,
        mut args: BTreeMap<String, ArgValue>,
    ) -> Result<Map<String, Value>> {
        let mut problems = Vec::new();

        for spec in &definition.parameters {
            let supplied = args.get(&spec.name).filter(|v| !v.is_null()).cloned();
            let value = match (supplied, &spec.default_value) {
                (Some(value), _) => value,
                (None, Some(default)) if !default.is_null() => {
                    let value = ArgValue::from(default);
                    args.insert(spec.name.clone(), value.clone());
                    value
                }
                (None, _) => {
                    if spec.required {
                        problems.push(format!("missing required parameter '{}'", spec.name));
                    }
                    continue;
                }
            };

            if !value.is_compatible(&spec.param_type) {
                problems.push(format!(
                    "parameter '{}' expects {}, got {}",
                    spec.name,
                    spec.param_type,
                    value.type_name()
                ));
                continue;
            }

            for rule in &spec.validation {
                if let Some(problem) = self.check_rule(spec, rule, &value) {
                    problems.push(problem);
                }
            }
        }

        if !problems.is_empty() {
            return Err(ToolError::InvalidArguments(problems));
        }

        Ok(args
            .into_iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k, v.to_value()))
            .collect())
    }

    /// Check one rule; `Some(message)` on violation.
    fn check_rule(
        &self,
        spec: &ParameterSpec,
        rule: &ValidationRule,
        value: &ArgValue,
    ) -> Option<String> {
        let name = &spec.name;
        let param = |key: &str| rule.parameters.get(key);

        match rule.rule_type.as_str() {
            "min" => {
                let (bound, actual) = (param("value")?.as_f64()?, value.as_f64()?);
                (actual < bound).then(|| format!("parameter '{name}' must be >= {bound}"))
            }
            "max" => {
                let (bound, actual) = (param("value")?.as_f64()?, value.as_f64()?);
                (actual > bound).then(|| format!("parameter '{name}' must be <= {bound}"))
            }
            "minLength" => {
                let (bound, actual) = (param("value")?.as_u64()?, length(value)?);
                (actual < bound)
                    .then(|| format!("parameter '{name}' must have length >= {bound}"))
            }
            "maxLength" => {
                let (bound, actual) = (param("value")?.as_u64()?, length(value)?);
                (actual > bound)
                    .then(|| format!("parameter '{name}' must have length <= {bound}"))
            }
            "pattern" => {
                let ArgValue::Str(text) = value else {
                    return None;
                };
                let pattern = rule.pattern()?;
                match self.patterns.get(pattern) {
                    Some(re) if re.is_match(text) => None,
                    Some(_) => Some(format!("parameter '{name}' must match /{pattern}/")),
                    None => Some(format!("parameter '{name}' has an invalid pattern /{pattern}/")),
                }
            }
            "enum" => {
                let allowed = param("values")?.as_array()?;
                let actual = value.to_value();
                (!allowed.iter().any(|v| same_value(v, &actual))).then(|| {
                    let list: Vec<String> = allowed.iter().map(Value::to_string).collect();
                    format!("parameter '{name}' must be one of [{}]", list.join(", "))
                })
            }
            other => {
                debug!(parameter = %name, rule = %other, "ignoring unknown validation rule");
                None
            }
        }
    }
}

/// Equality where numbers compare by value, so `1` matches `1.0`.
fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| same_value(x, y))
        }
        _ => a == b,
    }
}

fn length(value: &ArgValue) -> Option<u64> {
    match value {
        ArgValue::Str(s) => Some(s.chars().count() as u64),
        ArgValue::Array(items) => Some(items.len() as u64),
        _ => None,
    }
}
