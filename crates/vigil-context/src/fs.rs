//! Filesystem abstraction for rule-file access.
//!
//! The resolver and watcher only touch the filesystem through the
//! [`FileSystem`] trait, so cache-validation logic (which depends on file
//! mtimes) can be unit tested without sleeping between writes.
//!
//! Production code uses [`RealFileSystem`]; tests can use the in-memory
//! `MockFileSystem` and advance mtimes explicitly.

use crate::error::{ContextError, ContextResult};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Upper bound on a single rule file. Rule files are hand-written markdown;
/// anything above this is almost certainly a mistake (or an attack) and is
/// rejected rather than parsed.
pub const MAX_RULE_FILE_SIZE: u64 = 1024 * 1024;

/// Trait abstracting the filesystem operations the context layer needs.
///
/// `read_file` must uphold the same safety rules as [`RealFileSystem`]:
/// reject symlinks, reject non-regular files, and enforce
/// [`MAX_RULE_FILE_SIZE`].
pub trait FileSystem: Send + Sync + std::fmt::Debug {
    /// Read the contents of a rule file as a UTF-8 string.
    fn read_file(&self, path: &Path) -> ContextResult<String>;

    /// Check if a path exists (file or directory).
    fn exists(&self, path: &Path) -> bool;

    /// Check if a path is a regular file.
    fn is_file(&self, path: &Path) -> bool;

    /// Check if a path is a directory.
    fn is_dir(&self, path: &Path) -> bool;

    /// Last-modification time of a path.
    fn modified(&self, path: &Path) -> io::Result<SystemTime>;
}

/// Real filesystem implementation delegating to `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read_file(&self, path: &Path) -> ContextResult<String> {
        let meta = std::fs::symlink_metadata(path).map_err(|source| ContextError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;

        if meta.file_type().is_symlink() {
            return Err(ContextError::FileSymlink {
                path: path.to_path_buf(),
            });
        }
        if !meta.is_file() {
            return Err(ContextError::FileNotRegular {
                path: path.to_path_buf(),
            });
        }
        if meta.len() > MAX_RULE_FILE_SIZE {
            return Err(ContextError::FileTooBig {
                path: path.to_path_buf(),
                size: meta.len(),
                limit: MAX_RULE_FILE_SIZE,
            });
        }

        std::fs::read_to_string(path).map_err(|source| ContextError::FileRead {
            path: path.to_path_buf(),
            source,
        })
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn modified(&self, path: &Path) -> io::Result<SystemTime> {
        std::fs::metadata(path)?.modified()
    }
}

#[cfg(test)]
pub mod mock {
    //! In-memory filesystem with controllable mtimes.

    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug)]
    struct MockFile {
        content: String,
        mtime: SystemTime,
    }

    /// Mock filesystem for resolver tests.
    ///
    /// `touch` bumps a file's mtime without changing content, and
    /// `set_content` bumps it while replacing content, so cache
    /// invalidation paths can be exercised deterministically.
    #[derive(Debug, Default)]
    pub struct MockFileSystem {
        files: Mutex<HashMap<PathBuf, MockFile>>,
        dirs: Mutex<HashSet<PathBuf>>,
    }

    impl MockFileSystem {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<String>) {
            let path = path.as_ref().to_path_buf();
            if let Some(parent) = path.parent() {
                self.add_dir(parent);
            }
            self.files.lock().unwrap().insert(
                path,
                MockFile {
                    content: content.into(),
                    mtime: SystemTime::UNIX_EPOCH + Duration::from_secs(1_000),
                },
            );
        }

        pub fn add_dir(&self, path: impl AsRef<Path>) {
            let mut current = path.as_ref().to_path_buf();
            let mut dirs = self.dirs.lock().unwrap();
            loop {
                if current.as_os_str().is_empty() {
                    break;
                }
                dirs.insert(current.clone());
                match current.parent() {
                    Some(parent) => current = parent.to_path_buf(),
                    None => break,
                }
            }
        }

        pub fn remove_file(&self, path: impl AsRef<Path>) {
            self.files.lock().unwrap().remove(path.as_ref());
        }

        /// Bump the mtime of an existing file without touching its content.
        pub fn touch(&self, path: impl AsRef<Path>) {
            if let Some(file) = self.files.lock().unwrap().get_mut(path.as_ref()) {
                file.mtime += Duration::from_secs(1);
            }
        }

        /// Replace a file's content and bump its mtime.
        pub fn set_content(&self, path: impl AsRef<Path>, content: impl Into<String>) {
            if let Some(file) = self.files.lock().unwrap().get_mut(path.as_ref()) {
                file.content = content.into();
                file.mtime += Duration::from_secs(1);
            }
        }
    }

    impl FileSystem for MockFileSystem {
        fn read_file(&self, path: &Path) -> ContextResult<String> {
            self.files
                .lock()
                .unwrap()
                .get(path)
                .map(|f| f.content.clone())
                .ok_or_else(|| ContextError::FileRead {
                    path: path.to_path_buf(),
                    source: io::Error::new(io::ErrorKind::NotFound, "file not found in mock"),
                })
        }

        fn exists(&self, path: &Path) -> bool {
            self.is_file(path) || self.is_dir(path)
        }

        fn is_file(&self, path: &Path) -> bool {
            self.files.lock().unwrap().contains_key(path)
        }

        fn is_dir(&self, path: &Path) -> bool {
            self.dirs.lock().unwrap().contains(path)
        }

        fn modified(&self, path: &Path) -> io::Result<SystemTime> {
            self.files
                .lock()
                .unwrap()
                .get(path)
                .map(|f| f.mtime)
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such mock file"))
        }
    }
}
