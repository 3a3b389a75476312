//! Hierarchical context resolution.
//!
//! For a source path like `src/a/b/c.ts` the resolver reads, in order,
//! `<root>/context.md`, `<root>/src/context.md`, `<root>/src/a/context.md`,
//! `<root>/src/a/b/context.md`, and `<root>/src/a/b/c.md` (all optional),
//! merges them coarsest-first, and caches the result keyed by source path
//! together with an mtime snapshot of the rule files involved. A cached
//! entry is served only while every recorded rule file still exists with an
//! unchanged mtime.

use crate::error::{ContextError, ContextResult};
use crate::fs::FileSystem;
use crate::merge::merge_contexts;
use crate::model::MergedRules;
use crate::parser::parse_context;
use crate::watcher::ContextEvent;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

struct CachedResolution {
    merged: Arc<MergedRules>,
    rule_file_mtimes: HashMap<PathBuf, SystemTime>,
    cached_at: i64,
}

/// Resolves the merged rule set for source paths, with caching and
/// watcher-driven invalidation.
pub struct ContextResolver {
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
    cache: RwLock<HashMap<PathBuf, CachedResolution>>,
}

impl std::fmt::Debug for ContextResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextResolver")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl ContextResolver {
    pub fn new(root: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            root: root.into(),
            fs,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// The context root directory this resolver reads from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve the merged rules for `source_path`.
    ///
    /// Individual rule files that cannot be read are logged and skipped;
    /// the resolve still succeeds. Only an inaccessible context root is an
    /// error.
    pub fn resolve(&self, source_path: &Path) -> ContextResult<Arc<MergedRules>> {
        if !self.fs.is_dir(&self.root) {
            return Err(ContextError::RootUnreadable {
                path: self.root.clone(),
            });
        }

        let key = source_path.to_path_buf();

        {
            let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
            if let Some(entry) = cache.get(&key) {
                if self.entry_fresh(entry) {
                    tracing::debug!(
                        source = %source_path.display(),
                        cached_at = entry.cached_at,
                        "context cache hit"
                    );
                    return Ok(Arc::clone(&entry.merged));
                }
            }
        }

        // Stale or missing: drop the old entry and resolve from disk.
        self.cache
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&key);

        let mut rule_file_mtimes = HashMap::new();
        let mut parsed = Vec::new();

        for candidate in self.candidate_rule_files(source_path) {
            if !self.fs.is_file(&candidate) {
                continue;
            }
            let mtime = match self.fs.modified(&candidate) {
                Ok(mtime) => mtime,
                Err(e) => {
                    tracing::warn!(file = %candidate.display(), error = %e, "skipping rule file: cannot stat");
                    continue;
                }
            };
            let content = match self.fs.read_file(&candidate) {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!(file = %candidate.display(), error = %e, "skipping unreadable rule file");
                    continue;
                }
            };
            rule_file_mtimes.insert(candidate.clone(), mtime);
            let rel = candidate
                .strip_prefix(&self.root)
                .unwrap_or(&candidate)
                .to_string_lossy()
                .replace('\\', "/");
            parsed.push(parse_context(&content, &rel));
        }

        let merged = Arc::new(merge_contexts(&parsed));
        self.cache.write().unwrap_or_else(|e| e.into_inner()).insert(
            key,
            CachedResolution {
                merged: Arc::clone(&merged),
                rule_file_mtimes,
                cached_at: now_millis(),
            },
        );

        Ok(merged)
    }

    /// Evict every cache entry that depends on `rule_path`.
    ///
    /// The global `<root>/context.md` participates in every resolve, so a
    /// change to it clears the whole cache.
    pub fn invalidate_rule_file(&self, rule_path: &Path) {
        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        if rule_path == self.root.join("context.md") {
            let dropped = cache.len();
            cache.clear();
            tracing::debug!(dropped, "global rule file changed, cleared context cache");
            return;
        }
        cache.retain(|_, entry| !entry.rule_file_mtimes.contains_key(rule_path));
    }

    /// Drop every cached resolution.
    pub fn clear(&self) {
        self.cache.write().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Number of cached source-path resolutions.
    pub fn cache_len(&self) -> usize {
        self.cache.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn entry_fresh(&self, entry: &CachedResolution) -> bool {
        entry.rule_file_mtimes.iter().all(|(path, recorded)| {
            self.fs.is_file(path)
                && self
                    .fs
                    .modified(path)
                    .map(|current| current == *recorded)
                    .unwrap_or(false)
        })
    }

    /// Ordered candidate rule files for a source path, global first, then
    /// one `context.md` per directory prefix, then the file-specific
    /// `<stem>.md`. Duplicates (e.g. for a top-level file) are removed.
    fn candidate_rule_files(&self, source_path: &Path) -> Vec<PathBuf> {
        let mut candidates = vec![self.root.join("context.md")];

        let components: Vec<&std::ffi::OsStr> = source_path
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part),
                _ => None,
            })
            .collect();

        let mut prefix = PathBuf::new();
        if let Some((filename, dirs)) = components.split_last() {
            for dir in dirs {
                prefix.push(dir);
                candidates.push(self.root.join(&prefix).join("context.md"));
            }
            let stem = Path::new(filename)
                .file_stem()
                .unwrap_or(filename.as_ref())
                .to_string_lossy()
                .into_owned();
            candidates.push(self.root.join(&prefix).join(format!("{stem}.md")));
        }

        let mut seen = std::collections::HashSet::new();
        candidates.retain(|c| seen.insert(c.clone()));
        candidates
    }
}

/// Drive resolver invalidation from watcher events.
///
/// Lagged receivers clear the whole cache: missed events could reference any
/// rule file, and re-resolving is cheap next to serving stale rules.
pub fn spawn_invalidation_task(
    resolver: Arc<ContextResolver>,
    mut events: broadcast::Receiver<ContextEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => resolver.invalidate_rule_file(&event.absolute_path),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "context watcher lagged, clearing cache");
                    resolver.clear();
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
