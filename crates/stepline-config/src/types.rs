//! Configuration types.
//!
//! Every section is optional in the file; accessors on [`SteplineConfig`]
//! fall back to section defaults so callers never deal with `None`.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SteplineConfig {
    /// Workflow definitions and execution limits.
    pub workflows: Option<WorkflowsSection>,

    /// Tool catalog reload thresholds.
    pub catalog: Option<CatalogSection>,

    /// Connector settings.
    pub connectors: Option<ConnectorsSection>,

    /// Logging configuration.
    pub logging: Option<LoggingSection>,
}

impl SteplineConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> crate::Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> crate::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Sections replace wholesale; fields are not merged within a section.
    pub fn merge(&mut self, other: SteplineConfig) {
        if other.workflows.is_some() {
            self.workflows = other.workflows;
        }

        if other.catalog.is_some() {
            self.catalog = other.catalog;
        }

        if let Some(connectors) = other.connectors {
            let current = self.connectors.get_or_insert_with(Default::default);
            if connectors.llm.is_some() {
                current.llm = connectors.llm;
            }
            if connectors.http.is_some() {
                current.http = connectors.http;
            }
        }

        if other.logging.is_some() {
            self.logging = other.logging;
        }
    }

    /// Workflows section, or defaults.
    pub fn workflows(&self) -> WorkflowsSection {
        self.workflows.clone().unwrap_or_default()
    }

    /// Catalog section, or defaults.
    pub fn catalog(&self) -> CatalogSection {
        self.catalog.clone().unwrap_or_default()
    }

    /// LLM connector section, or defaults.
    pub fn llm(&self) -> LlmConnectorSection {
        self.connectors
            .as_ref()
            .and_then(|c| c.llm.clone())
            .unwrap_or_default()
    }

    /// HTTP connector section, or defaults.
    pub fn http(&self) -> HttpConnectorSection {
        self.connectors
            .as_ref()
            .and_then(|c| c.http.clone())
            .unwrap_or_default()
    }

    /// Logging section, or defaults.
    pub fn logging(&self) -> LoggingSection {
        self.logging.clone().unwrap_or_default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Workflows
// ─────────────────────────────────────────────────────────────────────────────

/// Workflow definition source and execution limits.
///
/// ```toml
/// [workflows]
/// dir = "workflows"
/// step_timeout_ceiling_secs = 300
/// watch = true
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowsSection {
    /// Directory containing workflow definition files (`.json` / `.toml`).
    pub dir: Option<PathBuf>,
    /// Upper bound on any single step attempt, in seconds.
    pub step_timeout_ceiling_secs: u64,
    /// Watch the directory and mark the catalog stale on change.
    pub watch: bool,
}

impl Default for WorkflowsSection {
    fn default() -> Self {
        Self {
            dir: None,
            step_timeout_ceiling_secs: 300,
            watch: false,
        }
    }
}

impl WorkflowsSection {
    /// The directory to load from, defaulting to `./workflows`.
    pub fn dir_or_default(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| PathBuf::from("workflows"))
    }

    /// Step timeout ceiling as a duration.
    pub fn step_timeout_ceiling(&self) -> Duration {
        Duration::from_secs(self.step_timeout_ceiling_secs)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Catalog
// ─────────────────────────────────────────────────────────────────────────────

/// Reload thresholds for the tool catalog.
///
/// A value of `0` disables the corresponding rule. Each `*_override` field,
/// when non-zero, wins over its base value.
///
/// ```toml
/// [catalog]
/// min_reload_interval_secs = 5
/// max_calls_before_reload = 100
/// change_check_interval_secs = 2
/// max_calls_before_reload_override = 10
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSection {
    pub min_reload_interval_secs: u64,
    pub max_calls_before_reload: u64,
    pub change_check_interval_secs: u64,
    pub min_reload_interval_override_secs: u64,
    pub max_calls_before_reload_override: u64,
    pub change_check_interval_override_secs: u64,
}

impl Default for CatalogSection {
    fn default() -> Self {
        Self {
            min_reload_interval_secs: 5,
            max_calls_before_reload: 100,
            change_check_interval_secs: 2,
            min_reload_interval_override_secs: 0,
            max_calls_before_reload_override: 0,
            change_check_interval_override_secs: 0,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connectors
// ─────────────────────────────────────────────────────────────────────────────

/// Connector settings, keyed by connector name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorsSection {
    pub llm: Option<LlmConnectorSection>,
    pub http: Option<HttpConnectorSection>,
}

/// OpenAI-compatible chat completion endpoint used by the `llm` connector.
///
/// ```toml
/// [connectors.llm]
/// base_url = "https://api.openai.com/v1"
/// model = "gpt-4o-mini"
/// api_key_env = "OPENAI_API_KEY"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConnectorSection {
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for LlmConnectorSection {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 120,
        }
    }
}

impl LlmConnectorSection {
    /// Resolve the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
    }
}

/// Settings for the `http` connector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConnectorSection {
    pub timeout_secs: u64,
}

impl Default for HttpConnectorSection {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging
// ─────────────────────────────────────────────────────────────────────────────

/// Logging configuration section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Enable debug-level output.
    pub verbose: bool,
    /// Directory for daily-rotated JSON log files. Disabled when unset or empty.
    pub json_dir: Option<PathBuf>,
}

impl LoggingSection {
    /// The JSON log directory, treating an empty path as unset.
    pub fn json_dir(&self) -> Option<&PathBuf> {
        self.json_dir
            .as_ref()
            .filter(|p| !p.as_os_str().is_empty())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
