//! Debounced context-directory watcher.
//!
//! Watches the context root recursively for `.md` rule files and emits at
//! most one [`ContextEvent`] per logical change within the debounce window.
//! Add vs Change is decided against the set of files known at start (and
//! updated since); Delete is detected when a previously-known path no
//! longer stats as a file.
//!
//! The notify backend runs on its own thread; events fan out to any number
//! of subscribers over a broadcast channel, so a slow or panicking consumer
//! can never kill the watcher.

use crate::error::{ContextError, ContextResult};
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{DebounceEventResult, Debouncer, new_debouncer};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast;
use walkdir::WalkDir;

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Watcher tuning knobs.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Debounce window; rapid changes to one file collapse to one event.
    pub debounce: Duration,
    /// Broadcast channel capacity before slow subscribers start lagging.
    pub channel_capacity: usize,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(100),
            channel_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextEventKind {
    Add,
    Change,
    Delete,
}

/// A debounced change to one rule file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextEvent {
    pub kind: ContextEventKind,
    pub relative_path: PathBuf,
    pub absolute_path: PathBuf,
    pub timestamp: i64,
}

fn is_markdown(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("md")
}

/// Classify a debounced filesystem event against the known-file set,
/// updating the set. Returns `None` for events that carry no information
/// (e.g. deletion of a file we never knew about).
fn classify_event(
    known: &mut HashSet<PathBuf>,
    path: &Path,
    exists: bool,
) -> Option<ContextEventKind> {
    if exists {
        if known.contains(path) {
            Some(ContextEventKind::Change)
        } else {
            known.insert(path.to_path_buf());
            Some(ContextEventKind::Add)
        }
    } else if known.remove(path) {
        Some(ContextEventKind::Delete)
    } else {
        None
    }
}

/// Watches a context directory for rule-file changes.
pub struct ContextWatcher {
    root: PathBuf,
    config: WatcherConfig,
    tx: broadcast::Sender<ContextEvent>,
    known: Arc<Mutex<HashSet<PathBuf>>>,
    debouncer: Mutex<Option<Debouncer<RecommendedWatcher>>>,
}

impl std::fmt::Debug for ContextWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextWatcher")
            .field("root", &self.root)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl ContextWatcher {
    pub fn new(root: impl Into<PathBuf>, config: WatcherConfig) -> Self {
        let (tx, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            root: root.into(),
            config,
            tx,
            known: Arc::new(Mutex::new(HashSet::new())),
            debouncer: Mutex::new(None),
        }
    }

    /// Subscribe to debounced rule-file events. May be called before or
    /// after `start`; each receiver sees every event from its subscription
    /// point on.
    pub fn subscribe(&self) -> broadcast::Receiver<ContextEvent> {
        self.tx.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.debouncer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Walk the root to record the initial known-file set and install the
    /// filesystem subscription. Calling `start` while running is a no-op.
    pub fn start(&self) -> ContextResult<()> {
        let mut guard = self.debouncer.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_some() {
            return Ok(());
        }
        if !self.root.is_dir() {
            return Err(ContextError::RootUnreadable {
                path: self.root.clone(),
            });
        }

        {
            let mut known = self.known.lock().unwrap_or_else(|e| e.into_inner());
            known.clear();
            for entry in WalkDir::new(&self.root).into_iter().filter_map(|e| e.ok()) {
                if entry.file_type().is_file() && is_markdown(entry.path()) {
                    known.insert(entry.path().to_path_buf());
                }
            }
        }

        let tx = self.tx.clone();
        let known = Arc::clone(&self.known);
        let root = self.root.clone();
        let mut debouncer = new_debouncer(
            self.config.debounce,
            move |result: DebounceEventResult| match result {
                Ok(events) => {
                    for event in events {
                        if !is_markdown(&event.path) {
                            continue;
                        }
                        let exists = event.path.is_file();
                        let kind = {
                            let mut known = known.lock().unwrap_or_else(|e| e.into_inner());
                            classify_event(&mut known, &event.path, exists)
                        };
                        let Some(kind) = kind else { continue };
                        let relative_path = event
                            .path
                            .strip_prefix(&root)
                            .unwrap_or(&event.path)
                            .to_path_buf();
                        // Send fails only when no subscriber is listening.
                        let _ = tx.send(ContextEvent {
                            kind,
                            relative_path,
                            absolute_path: event.path.clone(),
                            timestamp: now_millis(),
                        });
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "context watcher backend error");
                }
            },
        )
        .map_err(|e| ContextError::Watch {
            message: e.to_string(),
        })?;

        debouncer
            .watcher()
            .watch(&self.root, RecursiveMode::Recursive)
            .map_err(|e| ContextError::Watch {
                message: e.to_string(),
            })?;

        *guard = Some(debouncer);
        tracing::debug!(root = %self.root.display(), "context watcher started");
        Ok(())
    }

    /// Cancel pending debounce timers and drop the filesystem subscription.
    /// Calling `stop` while stopped is a no-op.
    pub fn stop(&self) {
        let dropped = self
            .debouncer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if dropped.is_some() {
            tracing::debug!(root = %self.root.display(), "context watcher stopped");
        }
    }
}

impl Drop for ContextWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
