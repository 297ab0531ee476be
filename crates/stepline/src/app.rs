//! Application wiring.
//!
//! [`Stepline`] is built once per process: it registers the connectors,
//! creates the workflow registry and engine, and puts the tool catalog in
//! front of the definition directory. Commands receive it by reference.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use stepline_config::{LoadedConfig, SteplineConfig};
use stepline_pipeline::{
    ConnectorRegistry, EngineConfig, WatcherHandle, WorkflowEngine, WorkflowLoader,
    WorkflowRegistry,
};
use stepline_tools::{ToolCatalog, reload_policy};

/// Load the discovered config layers, or a single explicit file.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    match explicit {
        Some(path) => LoadedConfig::explicit(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => {
            let cwd = std::env::current_dir().ok();
            Ok(stepline_config::load_config(cwd.as_deref())?)
        }
    }
}

/// Process-wide context object.
pub struct Stepline {
    pub config: SteplineConfig,
    pub engine: WorkflowEngine,
    pub catalog: ToolCatalog,
    watcher: Option<WatcherHandle>,
}

impl Stepline {
    /// Wire everything from configuration.
    ///
    /// `workflows_dir` overrides `[workflows].dir`.
    pub fn new(config: SteplineConfig, workflows_dir: Option<PathBuf>) -> Result<Self> {
        let workflows = config.workflows();
        let dir = workflows_dir.unwrap_or_else(|| workflows.dir_or_default());

        let mut connectors = ConnectorRegistry::new();
        stepline_connectors::register_builtin(&mut connectors, &config)
            .context("registering built-in connectors")?;

        let engine = WorkflowEngine::new(Arc::new(WorkflowRegistry::new()), Arc::new(connectors))
            .with_config(
                EngineConfig::default().with_step_timeout_ceiling(workflows.step_timeout_ceiling()),
            );

        let loader = WorkflowLoader::new(&dir)
            .with_context(|| format!("opening workflow directory {}", dir.display()))?;
        let catalog = ToolCatalog::new(loader, engine.clone(), reload_policy(&config.catalog()));

        let watcher = if workflows.watch {
            Some(catalog.watch().context("starting workflow watcher")?)
        } else {
            None
        };

        tracing::debug!(
            dir = %catalog.dir().display(),
            connectors = ?engine.connectors().names(),
            watch = workflows.watch,
            "stepline ready"
        );

        Ok(Self {
            config,
            engine,
            catalog,
            watcher,
        })
    }

    /// Whether a file watcher keeps the catalog fresh.
    pub fn is_watching(&self) -> bool {
        self.watcher.is_some()
    }
}
