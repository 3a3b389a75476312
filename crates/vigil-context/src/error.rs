//! Error types for rule-file access and watching.

use std::path::PathBuf;
use thiserror::Error;

pub type ContextResult<T> = Result<T, ContextError>;

/// Errors raised while reading rule files or watching the context directory.
///
/// Per-file parse problems are deliberately absent: the parser tolerates
/// malformed markdown, and the resolver logs and skips files it cannot read.
/// Only conditions that make an entire resolve meaningless (an inaccessible
/// context root) or that break the watcher surface here.
#[derive(Error, Debug)]
pub enum ContextError {
    #[error("Failed to read rule file: {path}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Refusing to read symlink: {path}")]
    FileSymlink { path: PathBuf },

    #[error("Rule file too large: {path} ({size} bytes, limit {limit} bytes)")]
    FileTooBig {
        path: PathBuf,
        size: u64,
        limit: u64,
    },

    #[error("Not a regular file: {path}")]
    FileNotRegular { path: PathBuf },

    #[error("Context root is not accessible: {path}")]
    RootUnreadable { path: PathBuf },

    #[error("Context watcher error: {message}")]
    Watch { message: String },
}
