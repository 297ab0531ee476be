//! Built-in connectors.
//!
//! - [`TransformConnector`] (`transform`): pure data reshaping and serialization
//! - [`LlmConnector`] (`llm`): chat-style model inference through a [`ModelBackend`]
//! - [`HttpConnector`] (`http`): remote calls over HTTP
//!
//! Host-automation connectors live with the host application, which
//! registers them next to these through
//! [`ConnectorRegistry::register`](stepline_pipeline::ConnectorRegistry::register).

pub mod error;
pub mod http;
pub mod llm;
mod params;
pub mod transform;

#[cfg(test)]
mod test_server;

pub use error::{Error, Result};
pub use http::HttpConnector;
pub use llm::{
    ChatMessage, GenerateRequest, Generation, LlmConnector, ModelBackend, OpenAiCompatBackend,
};
pub use transform::TransformConnector;

use stepline_config::SteplineConfig;
use stepline_pipeline::ConnectorRegistry;

/// Register the built-in connectors configured in `config`.
pub fn register_builtin(registry: &mut ConnectorRegistry, config: &SteplineConfig) -> Result<()> {
    registry.register(TransformConnector::new());
    registry.register(HttpConnector::from_config(&config.http())?);
    registry.register(LlmConnector::new(OpenAiCompatBackend::from_config(
        &config.llm(),
    )?));
    tracing::debug!(connectors = ?registry.names(), "registered built-in connectors");
    Ok(())
}
