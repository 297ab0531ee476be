//! Per-run data-flow context.
//!
//! Holds the immutable input bag and an append-only record of step results.
//! Templates resolve against it through [`Scope`]: `input` maps to the input
//! bag, and a step id maps to that step's [`StepResult::context_view`].

use std::collections::HashMap;

use serde_json::{Map, Value};
use tracing::warn;

use crate::definition::INPUT_ROOT;
use crate::result::StepResult;
use crate::template::{Scope, TemplateResolver};

/// The data a single run reads and writes.
///
/// Owned by exactly one run. Skipped steps are never recorded, so references
/// to them resolve as undefined.
#[derive(Debug, Clone)]
pub struct DataFlowContext {
    session_id: String,
    input: Value,
    results: HashMap<String, StepResult>,
    views: HashMap<String, Value>,
}

impl DataFlowContext {
    pub fn new(session_id: impl Into<String>, input: Map<String, Value>) -> Self {
        Self {
            session_id: session_id.into(),
            input: Value::Object(input),
            results: HashMap::new(),
            views: HashMap::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn input(&self) -> &Value {
        &self.input
    }

    /// Record a finished step. Returns `false` and keeps the first entry if
    /// the step was already recorded.
    pub fn record(&mut self, result: StepResult) -> bool {
        if self.results.contains_key(&result.step_id) {
            warn!(step = %result.step_id, "step already recorded, keeping first result");
            return false;
        }
        self.views
            .insert(result.step_id.clone(), result.context_view());
        self.results.insert(result.step_id.clone(), result);
        true
    }

    pub fn get(&self, step_id: &str) -> Option<&StepResult> {
        self.results.get(step_id)
    }

    pub fn contains(&self, step_id: &str) -> bool {
        self.results.contains_key(step_id)
    }

    /// A template resolver bound to this context.
    pub fn resolver(&self) -> TemplateResolver<'_, Self> {
        TemplateResolver::new(self)
    }
}

impl Scope for DataFlowContext {
    fn root(&self, name: &str) -> Option<&Value> {
        if name == INPUT_ROOT {
            Some(&self.input)
        } else {
            self.views.get(name)
        }
    }
}
