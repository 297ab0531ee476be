//! Connector abstraction.
//!
//! A connector is an external capability provider addressed by name
//! (`llm`, `http`, `transform`, or a host-supplied one). Steps dispatch
//! `(connector, operation, resolved parameters)` to it through the
//! [`ConnectorRegistry`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Errors a connector can report.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectorError {
    /// No connector registered under this name.
    #[error("connector '{0}' is not registered")]
    NotFound(String),

    /// The connector does not support the operation.
    #[error("connector '{connector}' has no operation '{operation}'")]
    UnknownOperation { connector: String, operation: String },

    /// Parameters were missing or malformed.
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    /// The operation ran and failed.
    #[error("{0}")]
    Failed(String),
}

impl ConnectorError {
    pub fn unknown_operation(connector: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::UnknownOperation {
            connector: connector.into(),
            operation: operation.into(),
        }
    }

    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::InvalidParams(msg.into())
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

impl From<ConnectorError> for crate::error::PipelineError {
    fn from(err: ConnectorError) -> Self {
        match err {
            ConnectorError::NotFound(name) => Self::ConnectorNotFound(name),
            other => Self::Connector(other.to_string()),
        }
    }
}

/// Result of a connector invocation: the payload or an error.
pub type ConnectorResult = std::result::Result<Value, ConnectorError>;

/// Context provided to connectors for one attempt.
#[derive(Debug, Clone)]
pub struct ConnectorContext {
    pub session_id: String,
    pub workflow_id: String,
    pub step_id: String,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Cancelled when the run is cancelled.
    pub cancellation: CancellationToken,
}

impl ConnectorContext {
    /// A context outside any workflow run.
    pub fn detached(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            workflow_id: String::new(),
            step_id: String::new(),
            attempt: 1,
            cancellation: CancellationToken::new(),
        }
    }
}

/// An external capability provider.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Unique connector name referenced by steps.
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Operation names this connector supports, for listings.
    fn operations(&self) -> Vec<String> {
        Vec::new()
    }

    /// Run one operation.
    async fn invoke(
        &self,
        operation: &str,
        params: &Map<String, Value>,
        ctx: &ConnectorContext,
    ) -> ConnectorResult;
}

/// Explicit, statically built set of connectors.
///
/// Populated once at startup through [`ConnectorRegistry::register`], then
/// shared read-only behind an `Arc`.
#[derive(Default)]
pub struct ConnectorRegistry {
    connectors: HashMap<String, Arc<dyn Connector>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connector, replacing any with the same name.
    pub fn register<C: Connector + 'static>(&mut self, connector: C) {
        self.register_arc(Arc::new(connector));
    }

    pub fn register_arc(&mut self, connector: Arc<dyn Connector>) {
        let name = connector.name().to_string();
        if self.connectors.insert(name.clone(), connector).is_some() {
            debug!(connector = %name, "replaced connector registration");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Connector>> {
        self.connectors.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.connectors.contains_key(name)
    }

    /// Registered connector names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.connectors.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }

    /// Dispatch an operation to a named connector.
    pub async fn invoke(
        &self,
        connector: &str,
        operation: &str,
        params: &Map<String, Value>,
        ctx: &ConnectorContext,
    ) -> ConnectorResult {
        let Some(target) = self.connectors.get(connector) else {
            return Err(ConnectorError::NotFound(connector.to_string()));
        };
        debug!(
            connector,
            operation,
            step = %ctx.step_id,
            attempt = ctx.attempt,
            "dispatching"
        );
        target.invoke(operation, params, ctx).await
    }
}

impl std::fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorRegistry")
            .field("connectors", &self.names())
            .finish()
    }
}

type ConnectorFn =
    dyn Fn(&str, &Map<String, Value>, &ConnectorContext) -> ConnectorResult + Send + Sync;

/// A synchronous connector built from a closure.
///
/// Handy for hosts exposing a handful of in-process operations.
pub struct FnConnector {
    name: String,
    description: String,
    handler: Box<ConnectorFn>,
}

impl FnConnector {
    pub fn new<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&str, &Map<String, Value>, &ConnectorContext) -> ConnectorResult
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            description: String::new(),
            handler: Box::new(handler),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[async_trait]
impl Connector for FnConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn invoke(
        &self,
        operation: &str,
        params: &Map<String, Value>,
        ctx: &ConnectorContext,
    ) -> ConnectorResult {
        (self.handler)(operation, params, ctx)
    }
}
