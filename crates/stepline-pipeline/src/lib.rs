//! Declarative workflow engine.
//!
//! A workflow is an ordered list of steps, each dispatched to a named
//! connector. Step parameters, conditions and outputs are `${path}`
//! templates resolved against the run's data-flow context, so earlier
//! results feed later steps.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   ┌────────────────────┐   ┌───────────────────┐
//! │ WorkflowLoader   │──▶│ WorkflowRegistry   │◀──│ WorkflowEngine    │
//! │ .json / .toml    │   │ id → Arc<def>      │   │ step state machine│
//! │ fingerprint/watch│   └────────────────────┘   │ retries, timeouts │
//! └──────────────────┘                            └─────────┬─────────┘
//!                         ┌────────────────────┐            │
//!                         │ TemplateResolver   │◀───────────┤
//!                         │ ${input.x} ${a.b}  │            │
//!                         └────────────────────┘            ▼
//!                                                 ┌───────────────────┐
//!                                                 │ ConnectorRegistry │
//!                                                 └───────────────────┘
//! ```

pub mod connector;
pub mod context;
pub mod definition;
pub mod engine;
pub mod error;
pub mod loader;
pub mod registry;
pub mod result;
pub mod template;

pub use connector::{
    Connector, ConnectorContext, ConnectorError, ConnectorRegistry, ConnectorResult, FnConnector,
};
pub use context::DataFlowContext;
pub use definition::{
    BackoffStrategy, OutputSpec, ParamType, ParameterSpec, RetryPolicy, StepSpec,
    ValidationRule, WorkflowDefinition, WorkflowMetadata,
};
pub use engine::{EngineConfig, WorkflowEngine};
pub use error::{PipelineError, Result};
pub use loader::{LoadReport, WatcherHandle, WorkflowEvent, WorkflowLoader};
pub use registry::WorkflowRegistry;
pub use result::{StepResult, StepStatus, WorkflowResult};
pub use template::{Scope, TemplatePath, TemplateResolver, is_truthy};
