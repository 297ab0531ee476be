//! Cached catalog of workflow tools.
//!
//! The catalog is derived from a definition directory. Rescanning the
//! directory is slow, so discovery goes through a [`CacheManager`] whose
//! change detector compares directory fingerprints. A reload replaces the
//! workflow registry's contents and rebuilds every tool's input schema.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use stepline_cache::{
    CacheError, CacheManager, CacheStats, Clock, ReloadPolicy, ReloadSource, SystemClock,
};
use stepline_config::CatalogSection;
use stepline_pipeline::{WatcherHandle, WorkflowEngine, WorkflowEvent, WorkflowLoader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{Result, ToolError};
use crate::response::{TOOL_PREFIX, ToolInfo, ToolResponse};
use crate::tool::WorkflowTool;

/// Cache name used in logs.
const CATALOG_CACHE: &str = "tool-catalog";

/// Build the catalog reload policy from configuration.
pub fn reload_policy(section: &CatalogSection) -> ReloadPolicy {
    let mut policy = ReloadPolicy::new()
        .with_min_reload_interval(Duration::from_secs(section.min_reload_interval_secs))
        .with_max_calls_before_reload(section.max_calls_before_reload)
        .with_change_check_interval(Duration::from_secs(section.change_check_interval_secs));
    if section.min_reload_interval_override_secs > 0 {
        policy = policy.with_min_reload_interval_override(Duration::from_secs(
            section.min_reload_interval_override_secs,
        ));
    }
    if section.max_calls_before_reload_override > 0 {
        policy = policy.with_max_calls_before_reload_override(section.max_calls_before_reload_override);
    }
    if section.change_check_interval_override_secs > 0 {
        policy = policy.with_change_check_interval_override(Duration::from_secs(
            section.change_check_interval_override_secs,
        ));
    }
    policy
}

/// One loaded generation of the catalog.
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    /// Tools sorted by name.
    pub tools: Vec<WorkflowTool>,
    /// Per-file load outcomes from the scan that built this snapshot.
    pub events: Vec<WorkflowEvent>,
    /// Directory fingerprint taken before the scan.
    pub fingerprint: String,
}

impl CatalogSnapshot {
    pub fn infos(&self) -> Vec<ToolInfo> {
        self.tools.iter().map(WorkflowTool::info).collect()
    }

    pub fn tool(&self, name: &str) -> Option<&WorkflowTool> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn errors(&self) -> impl Iterator<Item = &WorkflowEvent> {
        self.events
            .iter()
            .filter(|e| matches!(e, WorkflowEvent::Error { .. }))
    }
}

/// Scans the definition directory into a [`CatalogSnapshot`].
struct DirectorySource {
    loader: WorkflowLoader,
    engine: WorkflowEngine,
    last_fingerprint: Mutex<Option<String>>,
}

impl ReloadSource for DirectorySource {
    type Value = CatalogSnapshot;

    fn load(&self) -> stepline_cache::Result<CatalogSnapshot> {
        // Fingerprint first so edits made during the scan show up as a change
        let fingerprint = self.loader.fingerprint().map_err(CacheError::load)?;
        let report = self.loader.load_all().map_err(CacheError::load)?;

        self.engine
            .workflows()
            .replace_all(report.definitions.iter().cloned());

        let mut tools: Vec<WorkflowTool> = report
            .definitions
            .iter()
            .map(|def| WorkflowTool::new(Arc::clone(def), self.engine.clone()))
            .collect();
        tools.sort_by(|a, b| a.name().cmp(b.name()));

        info!(
            dir = %self.loader.dir().display(),
            tools = tools.len(),
            errors = report.errors().count(),
            "tool catalog rebuilt"
        );
        *self.last_fingerprint.lock() = Some(fingerprint.clone());
        Ok(CatalogSnapshot {
            tools,
            events: report.events,
            fingerprint,
        })
    }

    fn has_changed(&self) -> stepline_cache::Result<bool> {
        let current = self.loader.fingerprint().map_err(CacheError::change_check)?;
        Ok(self.last_fingerprint.lock().as_deref() != Some(current.as_str()))
    }
}

/// Workflow tools discovered from a definition directory.
pub struct ToolCatalog {
    cache: Arc<CacheManager<CatalogSnapshot>>,
    loader: WorkflowLoader,
}

impl ToolCatalog {
    /// Create a catalog over `loader`'s directory.
    ///
    /// Loading happens on first use. The engine's workflow registry is
    /// replaced wholesale on every reload.
    pub fn new(loader: WorkflowLoader, engine: WorkflowEngine, policy: ReloadPolicy) -> Self {
        Self::with_clock(loader, engine, policy, Arc::new(SystemClock))
    }

    pub fn with_clock(
        loader: WorkflowLoader,
        engine: WorkflowEngine,
        policy: ReloadPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let source = DirectorySource {
            loader: loader.clone(),
            engine,
            last_fingerprint: Mutex::new(None),
        };
        Self {
            cache: Arc::new(CacheManager::with_clock(CATALOG_CACHE, source, policy, clock)),
            loader,
        }
    }

    /// Current snapshot, reloading first if the policy says so.
    pub fn snapshot(&self) -> Result<Arc<CatalogSnapshot>> {
        Ok(self.cache.get()?)
    }

    /// Discovery: every tool with its input schema.
    pub fn list_tools(&self) -> Result<Vec<ToolInfo>> {
        Ok(self.snapshot()?.infos())
    }

    /// Input schema for one workflow id.
    pub fn schema(&self, workflow_id: &str) -> Result<Value> {
        let snapshot = self.snapshot()?;
        snapshot
            .tools
            .iter()
            .find(|t| t.definition().id == workflow_id)
            .map(|t| t.input_schema().clone())
            .ok_or_else(|| ToolError::WorkflowNotFound(workflow_id.to_string()))
    }

    /// Current snapshot, with any reload run on the blocking pool.
    ///
    /// A reload scans and parses the whole directory while holding the
    /// cache lock; async callers use this instead of [`ToolCatalog::snapshot`].
    pub async fn snapshot_async(&self) -> Result<Arc<CatalogSnapshot>> {
        let cache = Arc::clone(&self.cache);
        let snapshot = tokio::task::spawn_blocking(move || cache.get())
            .await
            .map_err(|e| CacheError::load(format!("catalog reload task failed: {e}")))??;
        Ok(snapshot)
    }

    /// Look up a tool by its `workflow_<id>` name.
    pub fn tool(&self, name: &str) -> Result<WorkflowTool> {
        let id = tool_id(name)?;
        find_tool(&*self.snapshot()?, name, id)
    }

    /// [`ToolCatalog::tool`] for async callers.
    pub async fn tool_async(&self, name: &str) -> Result<WorkflowTool> {
        let id = tool_id(name)?;
        find_tool(&*self.snapshot_async().await?, name, id)
    }

    /// Invoke a tool by name. Every failure is reported in the response.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: &Value,
        session_id: &str,
    ) -> ToolResponse {
        self.call_tool_with_cancel(name, arguments, session_id, &CancellationToken::new())
            .await
    }

    pub async fn call_tool_with_cancel(
        &self,
        name: &str,
        arguments: &Value,
        session_id: &str,
        cancel: &CancellationToken,
    ) -> ToolResponse {
        match self.tool_async(name).await {
            Ok(tool) => tool.call(arguments, session_id, cancel).await,
            Err(e) => {
                warn!(tool = %name, error = %e, "tool call rejected");
                ToolResponse::error(e)
            }
        }
    }

    /// Mark the catalog stale; the next access rescans the directory.
    pub fn notify_changed(&self) {
        self.cache.notify_changed();
    }

    /// Rescan the directory now.
    pub fn force_reload(&self) -> Result<Arc<CatalogSnapshot>> {
        Ok(self.cache.force_reload()?)
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn dir(&self) -> &Path {
        self.loader.dir()
    }

    /// Watch the directory and mark the catalog stale on every change.
    pub fn watch(&self) -> Result<WatcherHandle> {
        let cache = Arc::clone(&self.cache);
        let handle = self.loader.watch(move |_path| cache.notify_changed())?;
        Ok(handle)
    }
}

fn tool_id(name: &str) -> Result<&str> {
    name.strip_prefix(TOOL_PREFIX)
        .ok_or_else(|| ToolError::UnknownTool(name.to_string()))
}

fn find_tool(snapshot: &CatalogSnapshot, name: &str, id: &str) -> Result<WorkflowTool> {
    snapshot
        .tool(name)
        .cloned()
        .ok_or_else(|| ToolError::WorkflowNotFound(id.to_string()))
}

impl std::fmt::Debug for ToolCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolCatalog")
            .field("dir", &self.loader.dir())
            .field("stats", &self.cache.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepline_config::CatalogSection;

    #[test]
    fn test_reload_policy_from_config() {
        let policy = reload_policy(&CatalogSection::default());
        assert_eq!(policy.min_reload_interval(), Duration::from_secs(5));
        assert_eq!(policy.max_calls_before_reload(), 100);
        assert_eq!(policy.change_check_interval(), Duration::from_secs(2));

        let policy = reload_policy(&CatalogSection {
            max_calls_before_reload_override: 7,
            change_check_interval_override_secs: 30,
            ..CatalogSection::default()
        });
        assert_eq!(policy.max_calls_before_reload(), 7);
        assert_eq!(policy.change_check_interval(), Duration::from_secs(30));
        assert_eq!(policy.min_reload_interval(), Duration::from_secs(5));
    }
}
