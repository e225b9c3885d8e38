//! Auto-update: watch the collection roots and report changed directories.
//!
//! Debounced `notify` events are reduced to the `file://` URI of the
//! directory that changed (the parent of a changed file, or a created
//! directory itself). Removed directories report their nearest surviving
//! ancestor. Dot entries below a root are ignored. The caller turns those
//! into NEW_FILES scans.
//!
//! ```rust,ignore
//! let (monitor, rx) = CollectionMonitor::new(&settings.music_uris)?;
//! while let Ok(MonitorEvent::Changed(dir)) = rx.recv() {
//!     scanner.update(ScanType::NewFiles, vec![dir]);
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded};
use notify::event::{CreateKind, ModifyKind};
use notify::{EventKind, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{DebounceEventResult, Debouncer, RecommendedCache, new_debouncer};
use parking_lot::RwLock;

use crate::uri;

const DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    /// Something under this directory URI was added, changed or removed
    Changed(String),
    Error(String),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum MonitorError {
    #[error("Failed to initialize monitor: {0}")]
    Init(String),
    #[error("Failed to watch {uri}: {message}")]
    Watch { uri: String, message: String },
}

/// Running monitor. Dropping it stops watching.
pub struct CollectionMonitor {
    debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
    roots: Arc<RwLock<Vec<PathBuf>>>,
    running: Arc<AtomicBool>,
}

impl CollectionMonitor {
    /// Watch every root (recursively). Roots are `file://` URIs.
    pub fn new(roots: &[String]) -> Result<(Self, Receiver<MonitorEvent>), MonitorError> {
        let (tx, rx) = bounded(256);
        let running = Arc::new(AtomicBool::new(true));
        let running_clone = Arc::clone(&running);
        let watched: Arc<RwLock<Vec<PathBuf>>> = Arc::default();
        let watched_clone = Arc::clone(&watched);

        let debouncer = new_debouncer(DEBOUNCE, None, move |result: DebounceEventResult| {
            if !running_clone.load(Ordering::Relaxed) {
                return;
            }
            Self::handle_events(result, &watched_clone.read(), &tx);
        })
        .map_err(|e| MonitorError::Init(e.to_string()))?;

        let mut monitor = Self {
            debouncer,
            roots: watched,
            running,
        };
        for root in roots {
            monitor.watch(root)?;
        }
        Ok((monitor, rx))
    }

    pub fn watch(&mut self, root: &str) -> Result<(), MonitorError> {
        let path = uri::to_path(root).map_err(|e| MonitorError::Watch {
            uri: root.to_string(),
            message: e.to_string(),
        })?;
        {
            // Backends may report canonical paths
            let mut roots = self.roots.write();
            if let Ok(canonical) = std::fs::canonicalize(&path)
                && canonical != path
            {
                roots.push(canonical);
            }
            roots.push(path.clone());
        }
        tracing::info!(target: "scanner::monitor", uri = %root, "Monitoring collection");
        self.debouncer
            .watch(&path, RecursiveMode::Recursive)
            .map_err(|e| MonitorError::Watch {
                uri: root.to_string(),
                message: e.to_string(),
            })
    }

    fn handle_events(result: DebounceEventResult, roots: &[PathBuf], tx: &Sender<MonitorEvent>) {
        match result {
            Ok(events) => {
                let mut changed: Vec<String> = Vec::new();
                for event in events {
                    for path in &event.paths {
                        let Some(dir) = changed_directory(&event.kind, path, roots) else {
                            continue;
                        };
                        match uri::from_path(&dir) {
                            Ok(dir_uri) if !changed.contains(&dir_uri) => changed.push(dir_uri),
                            Ok(_) => {}
                            Err(e) => {
                                tracing::debug!(target: "scanner::monitor", path = %dir.display(), error = %e, "Ignoring change");
                            }
                        }
                    }
                }
                for dir_uri in changed {
                    tracing::debug!(target: "scanner::monitor", uri = %dir_uri, "Directory changed");
                    let _ = tx.try_send(MonitorEvent::Changed(dir_uri));
                }
            }
            Err(errors) => {
                for error in errors {
                    tracing::warn!(target: "scanner::monitor", error = %error, "Monitor error");
                    let _ = tx.try_send(MonitorEvent::Error(error.to_string()));
                }
            }
        }
    }
}

impl Drop for CollectionMonitor {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        tracing::debug!(target: "scanner::monitor", "Monitor stopped");
    }
}

/// True if a component below the root starts with a dot.
fn is_hidden(relative: &Path) -> bool {
    relative.components().any(|c| {
        c.as_os_str()
            .to_str()
            .is_some_and(|s| s.starts_with('.') && s.len() > 1 && s != "..")
    })
}

/// Deepest watched root containing `path`.
fn root_of<'a>(path: &Path, roots: &'a [PathBuf]) -> Option<&'a Path> {
    roots
        .iter()
        .filter(|root| path.starts_with(root))
        .max_by_key(|root| root.components().count())
        .map(PathBuf::as_path)
}

/// Directory to rescan for an event on `path`, if any.
///
/// A directory that is gone (removed or renamed away) maps to its nearest
/// existing ancestor inside the root, so the rescan sees the removal.
fn changed_directory(kind: &EventKind, path: &Path, roots: &[PathBuf]) -> Option<PathBuf> {
    let root = root_of(path, roots)?;
    if is_hidden(path.strip_prefix(root).ok()?) {
        return None;
    }
    let dir = match kind {
        EventKind::Create(CreateKind::Folder) => path,
        EventKind::Create(_)
        | EventKind::Modify(ModifyKind::Data(_))
        | EventKind::Modify(ModifyKind::Name(_))
        | EventKind::Remove(_) => path.parent().filter(|p| p.starts_with(root)).unwrap_or(root),
        _ => return None,
    };
    let existing = dir
        .ancestors()
        .take_while(|a| a.starts_with(root))
        .find(|a| a.exists())
        .unwrap_or(root);
    Some(existing.to_path_buf())
}
