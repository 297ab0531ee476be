//! Error types for the built-in connectors.

use stepline_pipeline::ConnectorError;
use thiserror::Error;

/// Result type alias for connector backends.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Building the client or sending the request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote service rejected the credentials.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The remote service answered with an error.
    #[error("Backend error: {0}")]
    Backend(String),

    /// A response body could not be decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<Error> for ConnectorError {
    fn from(err: Error) -> Self {
        ConnectorError::failed(err.to_string())
    }
}
