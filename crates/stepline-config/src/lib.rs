//! Configuration system for the Stepline workflow engine.
//!
//! Provides TOML-based configuration with:
//! - Workflow directory and step timeout ceiling (`[workflows]`)
//! - Reload thresholds for the tool catalog (`[catalog]`)
//! - Connector settings (`[connectors.llm]`, `[connectors.http]`)
//! - Config file layering (user config dir + project-local overrides)

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    ConfigLayer, ConfigSource, LayerStatus, LoadedConfig, load_config, load_config_file, load_config_with_options,
    user_config_dir, user_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
