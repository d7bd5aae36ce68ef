//! Scanner error types.

use std::path::{Path, PathBuf};

/// Errors that can occur while scanning the projects tree.
///
/// Missing directories are not errors; they scan as empty.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// A directory or file exists but could not be read.
    #[error("Failed to scan {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl ScanError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
