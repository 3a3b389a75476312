//! # vigil-context
//!
//! Hierarchical markdown rule files for the vigil validation pipeline.
//!
//! A context directory mirrors the source tree it governs: a global
//! `context.md`, one optional `context.md` per directory prefix, and an
//! optional `<file>.md` next to the most specific level. Each file
//! contributes patterns, anti-patterns, conventions, architecture notes,
//! and override directives; this crate parses them, merges them
//! coarsest-first with override semantics, caches resolutions per source
//! path, and watches the directory for changes.
//!
//! ```ignore
//! let resolver = ContextResolver::new(".vigil/context", Arc::new(RealFileSystem));
//! let rules = resolver.resolve(Path::new("src/api/users.ts"))?;
//! for anti in &rules.anti_patterns {
//!     println!("avoid {} -> {}", anti.forbidden, anti.alternative);
//! }
//! ```

/// Error types for rule-file access and watching.
pub mod error;
/// Filesystem abstraction (real and mock).
pub mod fs;
/// Hierarchical merge with override semantics.
pub mod merge;
/// Typed rule model.
pub mod model;
/// Markdown rule-file parser.
pub mod parser;
/// Per-source-path resolution with mtime-validated caching.
pub mod resolver;
/// Debounced context-directory watcher.
pub mod watcher;

pub use error::{ContextError, ContextResult};
pub use fs::{FileSystem, RealFileSystem};
pub use merge::merge_contexts;
pub use model::{
    AntiPattern, Convention, MergedRules, OverrideDirective, OverrideKind, ParsedContext, Pattern,
};
pub use parser::parse_context;
pub use resolver::{ContextResolver, spawn_invalidation_task};
pub use watcher::{ContextEvent, ContextEventKind, ContextWatcher, WatcherConfig};
