//! Error types for the workflow engine.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can occur during pipeline operations.
///
/// Definition and lookup errors are fatal to the call that raised them.
/// Connector, timeout and cancellation errors are step-level: the engine
/// records them on the failing step and keeps going.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Malformed or inconsistent workflow definition.
    #[error("Invalid workflow: {0}")]
    InvalidWorkflow(String),

    /// Workflow not found.
    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    /// A connector reported a failure.
    #[error("Connector error: {0}")]
    Connector(String),

    /// No connector registered under the requested name.
    #[error("Connector not found: {0}")]
    ConnectorNotFound(String),

    /// A step attempt exceeded its deadline.
    #[error("Step timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// The run was cancelled.
    #[error("cancelled")]
    Cancelled,

    /// Failed to read a definition file or directory.
    #[error("I/O error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to start the directory watcher.
    #[error("Watcher error: {0}")]
    Watch(String),
}

impl PipelineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
