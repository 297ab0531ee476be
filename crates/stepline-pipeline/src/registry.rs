//! Registered workflow definitions.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::definition::WorkflowDefinition;
use crate::error::Result;

/// Source of truth for which workflow ids exist.
///
/// Definitions are validated on registration and stored behind `Arc`, so a
/// run keeps the definition it started with even if the registry is reloaded
/// underneath it.
#[derive(Debug, Default)]
pub struct WorkflowRegistry {
    workflows: RwLock<HashMap<String, Arc<WorkflowDefinition>>>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and register a definition, replacing any with the same id.
    pub fn register(&self, definition: WorkflowDefinition) -> Result<Arc<WorkflowDefinition>> {
        definition.validate()?;
        let definition = Arc::new(definition);
        let previous = self
            .workflows
            .write()
            .insert(definition.id.clone(), Arc::clone(&definition));
        if previous.is_some() {
            warn!(workflow = %definition.id, "replaced registered workflow");
        } else {
            info!(workflow = %definition.id, "registered workflow");
        }
        Ok(definition)
    }

    pub fn get(&self, id: &str) -> Option<Arc<WorkflowDefinition>> {
        self.workflows.read().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.workflows.read().contains_key(id)
    }

    /// All definitions, sorted by id.
    pub fn list(&self) -> Vec<Arc<WorkflowDefinition>> {
        let mut all: Vec<_> = self.workflows.read().values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Swap the whole set in one step. Definitions are assumed validated.
    pub fn replace_all(&self, definitions: impl IntoIterator<Item = Arc<WorkflowDefinition>>) {
        let next: HashMap<_, _> = definitions
            .into_iter()
            .map(|d| (d.id.clone(), d))
            .collect();
        *self.workflows.write() = next;
    }

    pub fn len(&self) -> usize {
        self.workflows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.read().is_empty()
    }
}
