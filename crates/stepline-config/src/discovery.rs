//! Config discovery.
//!
//! Layers, lowest precedence first:
//! 1. user: `$STEPLINE_CONFIG_DIR/config.toml`, else `<platform config dir>/stepline/config.toml`
//! 2. project: `./stepline.toml`
//!
//! Command-line flags are applied on top by the binary. A layer that is
//! missing is skipped; a layer that cannot be read or parsed is skipped
//! with a warning so one bad file never blocks startup.

use std::path::{Path, PathBuf};

use crate::{ConfigError, Result, SteplineConfig};

const PROJECT_FILE: &str = "stepline.toml";
const USER_FILE: &str = "config.toml";
const CONFIG_DIR_ENV: &str = "STEPLINE_CONFIG_DIR";

/// Which layer a config file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLayer {
    User,
    Project,
    /// A file named on the command line, replacing discovery.
    Explicit,
}

/// What happened when a layer was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerStatus {
    Loaded,
    Missing,
    Invalid(String),
}

/// One config file that discovery looked at.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    pub layer: ConfigLayer,
    pub path: PathBuf,
    pub status: LayerStatus,
}

impl ConfigSource {
    pub fn is_loaded(&self) -> bool {
        self.status == LayerStatus::Loaded
    }
}

/// The merged configuration and the files it came from.
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    pub config: SteplineConfig,
    /// Every file considered, lowest precedence first.
    pub sources: Vec<ConfigSource>,
}

impl LoadedConfig {
    /// Load exactly one file, failing if it cannot be read or parsed.
    pub fn explicit(path: &Path) -> Result<Self> {
        Ok(Self {
            config: load_config_file(path)?,
            sources: vec![ConfigSource {
                layer: ConfigLayer::Explicit,
                path: path.to_path_buf(),
                status: LayerStatus::Loaded,
            }],
        })
    }

    /// Paths of the files that contributed.
    pub fn loaded_from(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .filter(|s| s.is_loaded())
            .map(|s| s.path.as_path())
            .collect()
    }

    /// One message per file that was present but unusable.
    pub fn warnings(&self) -> Vec<String> {
        self.sources
            .iter()
            .filter_map(|s| match &s.status {
                LayerStatus::Invalid(reason) => {
                    Some(format!("ignoring {}: {}", s.path.display(), reason))
                }
                _ => None,
            })
            .collect()
    }
}

/// Discover and merge the user and project layers.
///
/// `project_dir` defaults to the working directory.
pub fn load_config(project_dir: Option<&Path>) -> Result<LoadedConfig> {
    load_config_with_options(project_dir, None)
}

/// Like [`load_config`], with the user config directory given explicitly
/// instead of taken from the environment.
pub fn load_config_with_options(
    project_dir: Option<&Path>,
    user_dir: Option<&Path>,
) -> Result<LoadedConfig> {
    let user = user_dir
        .map(|d| d.join(USER_FILE))
        .or_else(user_config_path);
    let project = project_dir.unwrap_or(Path::new(".")).join(PROJECT_FILE);

    let layers = user
        .map(|p| (ConfigLayer::User, p))
        .into_iter()
        .chain(std::iter::once((ConfigLayer::Project, project)));

    let mut loaded = LoadedConfig::default();
    for (layer, path) in layers {
        let status = match read_layer(&path) {
            Ok(Some(config)) => {
                loaded.config.merge(config);
                LayerStatus::Loaded
            }
            Ok(None) => LayerStatus::Missing,
            Err(e) => LayerStatus::Invalid(e.to_string()),
        };
        loaded.sources.push(ConfigSource { layer, path, status });
    }
    Ok(loaded)
}

/// Parse one config file.
pub fn load_config_file(path: &Path) -> Result<SteplineConfig> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    SteplineConfig::from_toml(&text)
}

/// `Ok(None)` when the file does not exist.
fn read_layer(path: &Path) -> Result<Option<SteplineConfig>> {
    if !path.is_file() {
        return Ok(None);
    }
    load_config_file(path).map(Some)
}

/// The user-level config file.
pub fn user_config_path() -> Option<PathBuf> {
    user_config_dir().map(|d| d.join(USER_FILE))
}

/// `$STEPLINE_CONFIG_DIR`, else the platform config dir plus `stepline`.
pub fn user_config_dir() -> Option<PathBuf> {
    match std::env::var_os(CONFIG_DIR_ENV) {
        Some(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
        _ => dirs::config_dir().map(|d| d.join("stepline")),
    }
}
