//! Error types for the tool layer.

use stepline_cache::CacheError;
use stepline_pipeline::PipelineError;
use thiserror::Error;

/// Result type alias for tool operations.
pub type Result<T> = std::result::Result<T, ToolError>;

#[derive(Debug, Error)]
pub enum ToolError {
    /// Invocation arguments failed validation; no step ran.
    #[error("Invalid arguments: {}", .0.join("; "))]
    InvalidArguments(Vec<String>),

    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    /// The name does not follow the `workflow_<id>` convention.
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// The catalog could not be (re)built.
    #[error("Catalog error: {0}")]
    Catalog(#[from] CacheError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}
