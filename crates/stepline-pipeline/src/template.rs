//! `${path}` template resolution for workflow data flow.
//!
//! Resolves template expressions in step parameters, conditions and output
//! sources against the run's context, so earlier step results can feed later
//! steps.
//!
//! # Template Syntax
//!
//! - `${input.field}`: a workflow input parameter
//! - `${step_id.result}`: the full result of an earlier step
//! - `${step_id.result.items[0].name}`: nested field and array index access
//! - `${step_id.success}` / `${step_id.error}`: step outcome fields
//!
//! A string that is exactly one expression keeps the referenced value's JSON
//! type. Expressions embedded in other text are stringified. Anything that
//! cannot be resolved is *undefined* (`None`); resolution never fails.
//!
//! The grammar is deliberately small: dot-separated segments, each an
//! identifier with optional `[n]` indices. Text that looks like `${...}` but
//! does not parse as a path is kept verbatim.

use std::collections::HashMap;

use serde_json::{Map, Value};

/// Root lookup for template resolution.
pub trait Scope {
    /// Look up a root identifier: `input` or a recorded step id.
    fn root(&self, name: &str) -> Option<&Value>;
}

impl Scope for HashMap<String, Value> {
    fn root(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

impl Scope for Map<String, Value> {
    fn root(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

/// Resolves `${...}` templates against a [`Scope`].
pub struct TemplateResolver<'a, S: Scope + ?Sized> {
    scope: &'a S,
}

impl<'a, S: Scope + ?Sized> TemplateResolver<'a, S> {
    pub fn new(scope: &'a S) -> Self {
        Self { scope }
    }

    /// Resolve all templates in a JSON value tree.
    ///
    /// - Strings: see [`TemplateResolver::resolve_str`]
    /// - Objects: undefined members are dropped
    /// - Arrays: undefined elements become `null` so positions are kept
    /// - Other types: returned unchanged
    pub fn resolve_value(&self, value: &Value) -> Option<Value> {
        match value {
            Value::String(s) => self.resolve_str(s),
            Value::Object(map) => Some(Value::Object(self.resolve_map(map))),
            Value::Array(items) => Some(Value::Array(
                items
                    .iter()
                    .map(|v| self.resolve_value(v).unwrap_or(Value::Null))
                    .collect(),
            )),
            other => Some(other.clone()),
        }
    }

    /// Resolve every value of a parameter map, dropping undefined entries.
    pub fn resolve_map(&self, params: &Map<String, Value>) -> Map<String, Value> {
        params
            .iter()
            .filter_map(|(k, v)| self.resolve_value(v).map(|v| (k.clone(), v)))
            .collect()
    }

    /// Resolve templates in a single string.
    ///
    /// Mixed text is undefined as a whole when any embedded expression is.
    pub fn resolve_str(&self, s: &str) -> Option<Value> {
        let parts = parse_parts(s);

        if let [Part::Expr(path)] = parts.as_slice() {
            return self.resolve_path(path);
        }

        if !parts.iter().any(|p| matches!(p, Part::Expr(_))) {
            return Some(Value::String(s.to_string()));
        }

        let mut out = String::with_capacity(s.len());
        for part in &parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Expr(path) => out.push_str(&value_to_string(&self.resolve_path(path)?)),
            }
        }
        Some(Value::String(out))
    }

    /// Resolve one parsed path.
    pub fn resolve_path(&self, path: &TemplatePath) -> Option<Value> {
        let (first, rest) = path.segments.split_first()?;
        let mut current = self.scope.root(&first.name)?;
        for &i in &first.indices {
            current = current.as_array()?.get(i)?;
        }
        for segment in rest {
            current = navigate_segment(current, segment)?;
        }
        Some(current.clone())
    }

    /// Evaluate a step condition. An absent or blank condition holds.
    pub fn condition_holds(&self, condition: Option<&str>) -> bool {
        match condition.map(str::trim) {
            None | Some("") => true,
            Some(c) => is_truthy(self.resolve_str(c).as_ref()),
        }
    }
}

/// Truthiness of a resolved condition value.
///
/// Truthy: boolean `true`, the string `"true"` (any case), or a step entry
/// whose `success` is `true`. Everything else, including undefined, is falsy.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        Some(Value::Object(map)) => matches!(map.get("success"), Some(Value::Bool(true))),
        _ => false,
    }
}

/// Every well-formed template path in a value tree, in document order.
pub fn references(value: &Value) -> Vec<TemplatePath> {
    let mut out = Vec::new();
    collect_references(value, &mut out);
    out
}

/// Every well-formed template path in a string.
pub fn references_in_str(s: &str) -> Vec<TemplatePath> {
    parse_parts(s)
        .into_iter()
        .filter_map(|p| match p {
            Part::Expr(path) => Some(path),
            Part::Literal(_) => None,
        })
        .collect()
}

fn collect_references(value: &Value, out: &mut Vec<TemplatePath>) {
    match value {
        Value::String(s) => out.extend(references_in_str(s)),
        Value::Array(items) => items.iter().for_each(|v| collect_references(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_references(v, out)),
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// Template parsing
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq)]
enum Part {
    Literal(String),
    Expr(TemplatePath),
}

/// Split a string into literal text and `${...}` expressions.
fn parse_parts(s: &str) -> Vec<Part> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut rest = s;

    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break; // Unclosed `${`: the remainder is literal
        };

        literal.push_str(&rest[..start]);
        match TemplatePath::parse(&after[..end]) {
            Some(path) => {
                if !literal.is_empty() {
                    parts.push(Part::Literal(std::mem::take(&mut literal)));
                }
                parts.push(Part::Expr(path));
            }
            None => literal.push_str(&rest[start..start + end + 3]),
        }
        rest = &after[end + 1..];
    }

    literal.push_str(rest);
    if !literal.is_empty() {
        parts.push(Part::Literal(literal));
    }
    parts
}

/// A parsed, dot-separated template path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplatePath {
    segments: Vec<PathSegment>,
}

impl TemplatePath {
    /// Parse the inside of a `${...}` expression.
    ///
    /// `"task.result.items[0].name"` →
    /// `[("task", []), ("result", []), ("items", [0]), ("name", [])]`
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }
        let segments = s
            .split('.')
            .map(PathSegment::parse)
            .collect::<Option<Vec<_>>>()?;
        if segments[0].name.is_empty() {
            return None;
        }
        Some(Self { segments })
    }

    /// The first segment: `input` or a step id.
    pub fn root(&self) -> &str {
        self.segments
            .first()
            .map(|s| s.name.as_str())
            .unwrap_or_default()
    }
}

impl std::fmt::Display for TemplatePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

/// One path segment: an identifier with optional array indices.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PathSegment {
    name: String,
    indices: Vec<usize>,
}

impl PathSegment {
    fn parse(part: &str) -> Option<Self> {
        let part = part.trim();
        let (name, mut rest) = match part.find('[') {
            Some(i) => (&part[..i], &part[i..]),
            None => (part, ""),
        };
        if !name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
            return None;
        }

        let mut indices = Vec::new();
        while !rest.is_empty() {
            let inner = rest.strip_prefix('[')?;
            let close = inner.find(']')?;
            indices.push(inner[..close].trim().parse::<usize>().ok()?);
            rest = &inner[close + 1..];
        }

        if name.is_empty() && indices.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            indices,
        })
    }
}

impl std::fmt::Display for PathSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)?;
        for i in &self.indices {
            write!(f, "[{}]", i)?;
        }
        Ok(())
    }
}

/// Navigate one segment of a path through a JSON value.
///
/// A numeric segment name indexes into arrays, so `items.0` and `items[0]`
/// are equivalent.
fn navigate_segment<'v>(value: &'v Value, segment: &PathSegment) -> Option<&'v Value> {
    let mut current = if segment.name.is_empty() {
        value
    } else {
        match value {
            Value::Object(map) => map.get(&segment.name)?,
            Value::Array(items) => items.get(segment.name.parse::<usize>().ok()?)?,
            _ => return None,
        }
    };
    for &i in &segment.indices {
        current = current.as_array()?.get(i)?;
    }
    Some(current)
}

/// Convert a JSON value to its string form for interpolation.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        // Objects and arrays get compact JSON
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_scope() -> HashMap<String, Value> {
        let mut scope = HashMap::new();
        scope.insert(
            "input".to_string(),
            json!({
                "characterName": "Hero",
                "count": 42,
                "tags": ["rust", "tokio"]
            }),
        );
        scope.insert(
            "find".to_string(),
            json!({
                "success": true,
                "result": {
                    "matches": [
                        {"name": "Hero", "id": 7},
                        {"name": "Villain", "id": 9}
                    ],
                    "summary": "two matches"
                },
                "durationMs": 12
            }),
        );
        scope.insert(
            "broken".to_string(),
            json!({"success": false, "error": "not found", "durationMs": 3}),
        );
        scope
    }

    fn resolve(s: &str) -> Option<Value> {
        let scope = test_scope();
        TemplateResolver::new(&scope).resolve_str(s)
    }

    #[test]
    fn test_exact_form_preserves_type() {
        assert_eq!(resolve("${input.count}"), Some(json!(42)));
        assert_eq!(resolve("${input.tags}"), Some(json!(["rust", "tokio"])));
        assert_eq!(resolve("${find.success}"), Some(json!(true)));
    }

    #[test]
    fn test_nested_and_indexed_access() {
        assert_eq!(
            resolve("${find.result.matches[1].name}"),
            Some(json!("Villain"))
        );
        assert_eq!(resolve("${find.result.matches.0.id}"), Some(json!(7)));
        assert_eq!(resolve("${input.tags[0]}"), Some(json!("rust")));
    }

    #[test]
    fn test_mixed_text_is_stringified() {
        assert_eq!(
            resolve("Find ${input.characterName} (${input.count})"),
            Some(json!("Find Hero (42)"))
        );
        assert_eq!(
            resolve("tags=${input.tags}"),
            Some(json!(r#"tags=["rust","tokio"]"#))
        );
    }

    #[test]
    fn test_unknown_root_is_undefined() {
        assert_eq!(resolve("${bind.result}"), None);
        assert_eq!(resolve("${input.missing}"), None);
        assert_eq!(resolve("${find.result.matches[5]}"), None);
        assert_eq!(resolve("${input.count.deeper}"), None);
    }

    #[test]
    fn test_mixed_text_with_undefined_is_undefined() {
        assert_eq!(resolve("Bound: ${bind.result}"), None);
    }

    #[test]
    fn test_plain_strings_pass_through() {
        assert_eq!(resolve("no templates here"), Some(json!("no templates here")));
        assert_eq!(resolve(""), Some(json!("")));
        assert_eq!(resolve("cost: $5 {approx}"), Some(json!("cost: $5 {approx}")));
    }

    #[test]
    fn test_malformed_expressions_kept_literally() {
        assert_eq!(resolve("${}"), Some(json!("${}")));
        assert_eq!(resolve("${input..count}"), Some(json!("${input..count}")));
        assert_eq!(resolve("${input.tags[x]}"), Some(json!("${input.tags[x]}")));
        assert_eq!(resolve("open ${input.count"), Some(json!("open ${input.count")));
        assert_eq!(
            resolve("${bad path} and ${input.count}"),
            Some(json!("${bad path} and 42"))
        );
    }

    #[test]
    fn test_resolve_value_recurses() {
        let scope = test_scope();
        let resolver = TemplateResolver::new(&scope);
        let params = json!({
            "name": "${input.characterName}",
            "ids": ["${find.result.matches[0].id}", "${nope.result}", 3],
            "nested": {"summary": "${find.result.summary}", "gone": "${nope}"},
            "flag": true
        });

        let resolved = resolver.resolve_value(&params).unwrap();
        assert_eq!(
            resolved,
            json!({
                "name": "Hero",
                "ids": [7, null, 3],
                "nested": {"summary": "two matches"},
                "flag": true
            })
        );
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let scope = test_scope();
        let resolver = TemplateResolver::new(&scope);
        let params = json!({"a": "${find.result}", "b": "x ${input.count}"});
        assert_eq!(resolver.resolve_value(&params), resolver.resolve_value(&params));
    }

    #[test]
    fn test_truthiness() {
        assert!(is_truthy(Some(&json!(true))));
        assert!(is_truthy(Some(&json!("TRUE"))));
        assert!(is_truthy(Some(&json!({"success": true}))));
        assert!(!is_truthy(Some(&json!(false))));
        assert!(!is_truthy(Some(&json!("yes"))));
        assert!(!is_truthy(Some(&json!(1))));
        assert!(!is_truthy(Some(&json!({"success": "true"}))));
        assert!(!is_truthy(None));
    }

    #[test]
    fn test_conditions() {
        let scope = test_scope();
        let resolver = TemplateResolver::new(&scope);
        assert!(resolver.condition_holds(None));
        assert!(resolver.condition_holds(Some("  ")));
        assert!(resolver.condition_holds(Some("${find.success}")));
        assert!(resolver.condition_holds(Some("${find}")));
        assert!(!resolver.condition_holds(Some("${broken.success}")));
        assert!(!resolver.condition_holds(Some("${skipped.success}")));
        assert!(!resolver.condition_holds(Some("false")));
    }

    #[test]
    fn test_references() {
        let value = json!({
            "a": "${input.x}",
            "b": ["prefix ${find.result} and ${other.error}"],
            "c": "${not valid}"
        });
        let roots: Vec<String> = references(&value)
            .iter()
            .map(|p| p.root().to_string())
            .collect();
        assert_eq!(roots, vec!["input", "find", "other"]);
    }

    #[test]
    fn test_path_display_round_trip() {
        let path = TemplatePath::parse(" find.result.items[0][2].name ").unwrap();
        assert_eq!(path.to_string(), "find.result.items[0][2].name");
        assert_eq!(path.root(), "find");
    }
}
