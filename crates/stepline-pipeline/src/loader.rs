//! Workflow definition directory: loading, fingerprinting and watching.
//!
//! Scans a directory of `.json` / `.toml` definition files. Invalid files
//! are reported and skipped without affecting the rest. When two files
//! declare the same id, the later one in path order wins.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use notify_debouncer_mini::{DebounceEventResult, Debouncer, new_debouncer};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::definition::WorkflowDefinition;
use crate::error::{PipelineError, Result};

/// Debounce window for editor save patterns.
const WATCH_DEBOUNCE: Duration = Duration::from_millis(300);

/// Outcome for one definition file.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowEvent {
    /// A workflow was loaded.
    Loaded { id: String, path: PathBuf },
    /// A workflow was dropped because a later file declares the same id.
    Superseded {
        id: String,
        path: PathBuf,
        by: PathBuf,
    },
    /// A file failed to parse or validate.
    Error { path: PathBuf, error: String },
}

/// Result of scanning the directory.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Valid definitions, one per id.
    pub definitions: Vec<Arc<WorkflowDefinition>>,
    /// One or more events per file, in path order.
    pub events: Vec<WorkflowEvent>,
}

impl LoadReport {
    pub fn errors(&self) -> impl Iterator<Item = &WorkflowEvent> {
        self.events
            .iter()
            .filter(|e| matches!(e, WorkflowEvent::Error { .. }))
    }
}

/// Loads workflow definitions from a directory.
#[derive(Debug, Clone)]
pub struct WorkflowLoader {
    dir: PathBuf,
}

impl WorkflowLoader {
    /// Create a loader for the given directory, creating it if missing.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(|e| PipelineError::io(&dir, e))?;
        }
        // Watch events carry absolute paths
        let dir = std::fs::canonicalize(&dir).unwrap_or(dir);
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Definition files in the directory, sorted by path.
    pub fn workflow_files(&self) -> Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| PipelineError::io(&self.dir, e))?;
        let mut files: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && is_workflow_file(path))
            .collect();
        files.sort();
        Ok(files)
    }

    /// Load every definition file.
    ///
    /// Fails only when the directory itself cannot be read.
    pub fn load_all(&self) -> Result<LoadReport> {
        let mut report = LoadReport::default();
        let mut by_id: HashMap<String, (usize, PathBuf)> = HashMap::new();

        for path in self.workflow_files()? {
            let definition = match load_file(&path) {
                Ok(def) => def,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping workflow file");
                    report.events.push(WorkflowEvent::Error {
                        path,
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            let id = definition.id.clone();
            let definition = Arc::new(definition);
            match by_id.get_mut(&id) {
                Some((index, previous)) => {
                    warn!(
                        workflow = %id,
                        path = %path.display(),
                        previous = %previous.display(),
                        "duplicate workflow id, later file wins"
                    );
                    report.definitions[*index] = definition;
                    report.events.push(WorkflowEvent::Superseded {
                        id: id.clone(),
                        path: std::mem::replace(previous, path.clone()),
                        by: path.clone(),
                    });
                }
                None => {
                    by_id.insert(id.clone(), (report.definitions.len(), path.clone()));
                    report.definitions.push(definition);
                }
            }
            debug!(workflow = %id, path = %path.display(), "loaded workflow file");
            report.events.push(WorkflowEvent::Loaded { id, path });
        }

        info!(
            workflows = report.definitions.len(),
            errors = report.errors().count(),
            dir = %self.dir.display(),
            "loaded workflow directory"
        );
        Ok(report)
    }

    /// Digest of every definition file's path, size and modification time.
    ///
    /// Any added, removed, resized or touched file changes the digest.
    pub fn fingerprint(&self) -> Result<String> {
        let mut hasher = Sha256::new();
        for path in self.workflow_files()? {
            let meta = std::fs::metadata(&path).map_err(|e| PipelineError::io(&path, e))?;
            let modified = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_nanos())
                .unwrap_or_default();

            hasher.update(path.to_string_lossy().as_bytes());
            hasher.update([0u8]);
            hasher.update(meta.len().to_le_bytes());
            hasher.update(modified.to_le_bytes());
        }
        Ok(hex::encode(hasher.finalize()))
    }

    /// Watch the directory and call `on_change` for each changed definition file.
    ///
    /// Events are debounced over a 300ms window. Watching stops when the
    /// returned handle is dropped.
    pub fn watch<F>(&self, on_change: F) -> Result<WatcherHandle>
    where
        F: Fn(&Path) + Send + 'static,
    {
        let (tx, rx) = std::sync::mpsc::channel::<DebounceEventResult>();

        let mut debouncer = new_debouncer(WATCH_DEBOUNCE, tx)
            .map_err(|e| PipelineError::Watch(format!("Failed to create file watcher: {}", e)))?;
        debouncer
            .watcher()
            .watch(&self.dir, notify::RecursiveMode::NonRecursive)
            .map_err(|e| {
                PipelineError::Watch(format!("Failed to watch {}: {}", self.dir.display(), e))
            })?;

        let dir = self.dir.clone();
        let thread = std::thread::Builder::new()
            .name("stepline-watch".into())
            .spawn(move || {
                // Ends when the debouncer (and its sender) is dropped
                while let Ok(result) = rx.recv() {
                    match result {
                        Ok(events) => {
                            for path in relevant_paths(&dir, events.into_iter().map(|e| e.path)) {
                                debug!(path = %path.display(), "workflow file changed");
                                on_change(&path);
                            }
                        }
                        Err(e) => warn!(error = %e, "workflow watcher error"),
                    }
                }
            })
            .map_err(|e| PipelineError::Watch(format!("Failed to spawn watcher thread: {}", e)))?;

        info!(dir = %self.dir.display(), "watching workflow directory");
        Ok(WatcherHandle {
            _debouncer: debouncer,
            _thread: thread,
        })
    }
}

/// Load and validate a single definition file.
pub fn load_file(path: &Path) -> Result<WorkflowDefinition> {
    let definition = WorkflowDefinition::from_file(path)?;
    definition.validate()?;
    Ok(definition)
}

/// Whether a path has a definition file extension.
pub fn is_workflow_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("json") | Some("toml")
    )
}

/// Definition files under `dir`, deduplicated, in first-seen order.
fn relevant_paths(dir: &Path, paths: impl IntoIterator<Item = PathBuf>) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = Vec::new();
    for path in paths {
        if is_workflow_file(&path) && path.starts_with(dir) && !out.contains(&path) {
            out.push(path);
        }
    }
    out
}

/// Handle that keeps the file watcher alive.
///
/// Drop this to stop watching.
pub struct WatcherHandle {
    _debouncer: Debouncer<notify::RecommendedWatcher>,
    _thread: std::thread::JoinHandle<()>,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle").finish_non_exhaustive()
    }
}
