//! Watcher error types.

use std::path::{Path, PathBuf};

/// Errors that can occur during file watching.
///
/// Apart from [`WatcherError::Notify`] returned by registration, these are
/// delivered on the watcher's error queue and are never fatal to the loop.
#[derive(thiserror::Error, Debug)]
pub enum WatcherError {
    /// Permission denied accessing file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// File shrank below the delivered offset.
    #[error("File truncated below offset {offset}: {path}")]
    FileTruncated { path: PathBuf, offset: u64 },

    /// Reading a tracked file failed.
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Notify watcher error.
    #[error("File watcher error: {0}")]
    Notify(#[from] notify::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The watcher has been closed.
    #[error("Watcher closed")]
    Closed,

    /// The tail loop task failed.
    #[error("Tail loop failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl WatcherError {
    /// The file this error concerns, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::PermissionDenied(path)
            | Self::FileTruncated { path, .. }
            | Self::Read { path, .. } => Some(path),
            _ => None,
        }
    }
}
