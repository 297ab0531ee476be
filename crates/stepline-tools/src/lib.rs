//! Workflows as callable tools.
//!
//! Each registered workflow is exposed as a tool named `workflow_<id>`
//! with a JSON Schema built from its parameter specs. Invoking a tool
//! converts the raw arguments to canonical values, applies defaults,
//! validates them, runs the workflow and formats the result.
//!
//! [`ToolCatalog`] keeps the tool list derived from a definition
//! directory behind a throttled [`stepline_cache::CacheManager`].

pub mod args;
pub mod catalog;
pub mod error;
pub mod response;
pub mod schema;
pub mod tool;
pub mod validate;

pub use args::ArgValue;
pub use catalog::{CatalogSnapshot, ToolCatalog, reload_policy};
pub use error::{Result, ToolError};
pub use response::{TOOL_PREFIX, ToolContent, ToolInfo, ToolResponse, tool_name};
pub use schema::input_schema;
pub use tool::WorkflowTool;
pub use validate::{ArgumentValidator, validate_arguments};
