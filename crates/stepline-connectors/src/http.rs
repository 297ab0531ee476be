//! Remote-call connector.
//!
//! Operations: `get`, `post`, and `request` (with an explicit `method`).
//!
//! Params:
//! - `url` (string, required)
//! - `method` (string, `request` only, default `GET`)
//! - `headers` (object, optional)
//! - `query` (object, optional)
//! - `body` (optional): strings are sent verbatim, anything else as JSON
//!
//! The result is `{status, headers, body}`; a JSON response body is parsed,
//! anything else is returned as text. Non-2xx statuses are failures so the
//! step's retry policy applies.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{Map, Value};
use stepline_config::HttpConnectorSection;
use stepline_pipeline::{Connector, ConnectorContext, ConnectorError, ConnectorResult};

use crate::error::Result;
use crate::params;

/// Response bodies longer than this are cut in error messages.
const ERROR_BODY_LIMIT: usize = 512;

pub struct HttpConnector {
    client: Client,
}

impl HttpConnector {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    pub fn from_config(config: &HttpConnectorSection) -> Result<Self> {
        Self::new(Duration::from_secs(config.timeout_secs))
    }

    async fn send(&self, method: Method, params: &Map<String, Value>) -> ConnectorResult {
        let url = params::required_str(params, "url")?;
        let mut request = self.client.request(method.clone(), url);

        for (name, value) in params::string_pairs(params, "headers")? {
            request = request.header(name, value);
        }
        let query = params::string_pairs(params, "query")?;
        if !query.is_empty() {
            request = request.query(&query);
        }
        match params.get("body") {
            None | Some(Value::Null) => {}
            Some(Value::String(text)) => request = request.body(text.clone()),
            Some(other) => request = request.json(other),
        }

        tracing::debug!(method = %method, url, "http request");
        let response = request
            .send()
            .await
            .map_err(|e| ConnectorError::failed(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        let headers: Map<String, Value> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|v| (k.as_str().to_string(), Value::String(v.to_string())))
            })
            .collect();
        let is_json = headers
            .get("content-type")
            .and_then(Value::as_str)
            .is_some_and(|ct| ct.contains("json"));
        let text = response
            .text()
            .await
            .map_err(|e| ConnectorError::failed(format!("reading response failed: {e}")))?;

        if !status.is_success() {
            return Err(ConnectorError::failed(format!(
                "HTTP {}: {}",
                status.as_u16(),
                truncate(&text, ERROR_BODY_LIMIT)
            )));
        }

        let body = if is_json {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        } else {
            Value::String(text)
        };

        let mut out = Map::new();
        out.insert("status".into(), Value::from(status.as_u16()));
        out.insert("headers".into(), Value::Object(headers));
        out.insert("body".into(), body);
        Ok(Value::Object(out))
    }
}

fn parse_method(name: &str) -> std::result::Result<Method, ConnectorError> {
    Method::from_bytes(name.trim().to_ascii_uppercase().as_bytes())
        .map_err(|_| ConnectorError::invalid_params(format!("invalid HTTP method '{name}'")))
}

fn truncate(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((i, _)) => &text[..i],
        None => text,
    }
}

#[async_trait]
impl Connector for HttpConnector {
    fn name(&self) -> &str {
        "http"
    }

    fn description(&self) -> &str {
        "Call remote HTTP endpoints"
    }

    fn operations(&self) -> Vec<String> {
        vec!["get".into(), "post".into(), "request".into()]
    }

    async fn invoke(
        &self,
        operation: &str,
        params: &Map<String, Value>,
        _ctx: &ConnectorContext,
    ) -> ConnectorResult {
        let method = match operation {
            "get" => Method::GET,
            "post" => Method::POST,
            "request" => parse_method(params::optional_str(params, "method")?.unwrap_or("GET"))?,
            other => return Err(ConnectorError::unknown_operation(self.name(), other)),
        };
        self.send(method, params).await
    }
}
