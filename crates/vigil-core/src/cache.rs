//! Content-hash-keyed memoization of validator results.
//!
//! The cache key is derived only from the validator id and the multiset of
//! `(path, content-hash)` pairs in the context, so session ids, timestamps,
//! and recent actions never affect hits. Entries expire after `max_age`,
//! the table is bounded (evicting the oldest ~10% when full), and a lookup
//! re-verifies every recorded per-file hash before serving a hit.

use crate::context::{ValidationContext, now_millis};
use crate::result::ValidatorResult;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ResultCacheConfig {
    /// Entries older than this are treated as misses and evicted.
    pub max_age: Duration,
    /// Maximum number of entries before the oldest ~10% are evicted.
    pub max_entries: usize,
}

impl Default for ResultCacheConfig {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(5 * 60),
            max_entries: 1000,
        }
    }
}

/// Counters exposed for observability; all monotonically increasing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    result: ValidatorResult,
    created_at: i64,
    file_hashes: HashMap<String, String>,
}

/// Thread-safe result cache. Mutations are atomic at entry granularity;
/// the eviction pass runs under the exclusive lock.
#[derive(Debug)]
pub struct ResultCache {
    config: ResultCacheConfig,
    entries: RwLock<HashMap<String, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Hash each file's content, keyed by path.
fn file_hashes(ctx: &ValidationContext) -> HashMap<String, String> {
    ctx.files
        .iter()
        .map(|f| (f.path.clone(), content_hash(&f.content)))
        .collect()
}

/// `validator_id:sha256(sorted "path:content_hash" lines)`.
fn cache_key(validator_id: &str, hashes: &HashMap<String, String>) -> String {
    let mut pairs: Vec<(&String, &String)> = hashes.iter().collect();
    pairs.sort();
    let mut hasher = Sha256::new();
    for (path, hash) in pairs {
        hasher.update(path.as_bytes());
        hasher.update(b":");
        hasher.update(hash.as_bytes());
        hasher.update(b"\n");
    }
    format!("{validator_id}:{}", hex::encode(hasher.finalize()))
}

impl ResultCache {
    pub fn new(config: ResultCacheConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Look up a cached result for this validator and file set.
    pub fn get(&self, validator_id: &str, ctx: &ValidationContext) -> Option<ValidatorResult> {
        let current_hashes = file_hashes(ctx);
        let key = cache_key(validator_id, &current_hashes);

        let (result, evict) = {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            match entries.get(&key) {
                None => (None, false),
                Some(entry) => {
                    let age_ms = now_millis().saturating_sub(entry.created_at);
                    if age_ms > self.config.max_age.as_millis() as i64 {
                        (None, true)
                    } else if entry
                        .file_hashes
                        .iter()
                        .all(|(path, hash)| current_hashes.get(path) == Some(hash))
                    {
                        (Some(entry.result.clone()), false)
                    } else {
                        // Key collided but content differs; drop the entry.
                        (None, true)
                    }
                }
            }
        };

        if evict {
            self.entries
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        match result {
            Some(result) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(result)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a result for this validator and file set.
    pub fn set(&self, validator_id: &str, ctx: &ValidationContext, result: &ValidatorResult) {
        let hashes = file_hashes(ctx);
        let key = cache_key(validator_id, &hashes);

        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if !entries.contains_key(&key) && entries.len() >= self.config.max_entries {
            self.evict_oldest_locked(&mut entries);
        }
        entries.insert(
            key,
            CacheEntry {
                result: result.clone(),
                created_at: now_millis(),
                file_hashes: hashes,
            },
        );
    }

    /// Evict the oldest ~10% of entries (at least one) by creation time.
    fn evict_oldest_locked(&self, entries: &mut HashMap<String, CacheEntry>) {
        let to_evict = (self.config.max_entries / 10).max(1);
        let mut by_age: Vec<(String, i64)> = entries
            .iter()
            .map(|(k, e)| (k.clone(), e.created_at))
            .collect();
        by_age.sort_by_key(|(_, created_at)| *created_at);
        for (key, _) in by_age.into_iter().take(to_evict) {
            entries.remove(&key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Drop every entry whose file set contains `path`.
    pub fn invalidate_by_file(&self, path: &str) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, entry| !entry.file_hashes.contains_key(path));
        let dropped = (before - entries.len()) as u64;
        if dropped > 0 {
            self.evictions.fetch_add(dropped, Ordering::Relaxed);
            tracing::debug!(path, dropped, "invalidated cached results for file");
        }
    }

    /// Drop every entry whose key contains `fragment` (keys start with the
    /// validator id, so passing an id invalidates one validator's results).
    pub fn invalidate_matching(&self, fragment: &str) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|key, _| !key.contains(fragment));
        self.evictions
            .fetch_add((before - entries.len()) as u64, Ordering::Relaxed);
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}
