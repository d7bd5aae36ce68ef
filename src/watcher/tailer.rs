//! Incremental log file tailer.
//!
//! Reads complete lines appended since the last read.

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};

use super::error::WatcherError;
use crate::transcript::RawRecord;

/// A decoded record and the offset just past its line terminator.
#[derive(Debug, Clone, PartialEq)]
pub struct TailedRecord {
    pub record: RawRecord,
    pub end_offset: u64,
}

/// Incremental reader that tracks how many bytes have been consumed.
///
/// Only newline-terminated lines are consumed. A partially written final
/// line is left in place and read in full once its terminator arrives.
#[derive(Debug, Clone)]
pub struct LogTailer {
    path: PathBuf,
    offset: u64,
}

impl LogTailer {
    /// Create a new tailer starting at the beginning of the file.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path, offset: 0 }
    }

    /// Create a new tailer starting at a specific offset.
    #[must_use]
    pub fn with_offset(path: PathBuf, offset: u64) -> Self {
        Self { path, offset }
    }

    /// Bytes consumed so far.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read records from complete lines appended since the last read.
    ///
    /// Blank and malformed lines are consumed without producing a record.
    /// A file that does not exist (yet) reads as empty.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be opened for a reason other than not existing
    /// - The file is shorter than the current offset (the offset is kept)
    /// - I/O errors occur during reading
    pub async fn read_new_records(&mut self) -> Result<Vec<TailedRecord>, WatcherError> {
        let file = match File::open(&self.path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(WatcherError::PermissionDenied(self.path.clone()));
            }
            Err(e) => return Err(self.read_error(e)),
        };

        let file_len = file.metadata().await.map_err(|e| self.read_error(e))?.len();

        if file_len < self.offset {
            return Err(WatcherError::FileTruncated {
                path: self.path.clone(),
                offset: self.offset,
            });
        }

        if file_len == self.offset {
            return Ok(Vec::new());
        }

        let mut file = file;
        file.seek(std::io::SeekFrom::Start(self.offset))
            .await
            .map_err(|e| self.read_error(e))?;

        let mut reader = BufReader::new(file);
        let mut records = Vec::new();
        let mut line = Vec::new();

        loop {
            line.clear();
            let bytes_read = reader
                .read_until(b'\n', &mut line)
                .await
                .map_err(|e| self.read_error(e))?;

            if bytes_read == 0 || line.last() != Some(&b'\n') {
                // EOF, or a line still being written
                break;
            }

            self.offset += bytes_read as u64;

            if let Some(record) = RawRecord::from_line(&line) {
                records.push(TailedRecord {
                    record,
                    end_offset: self.offset,
                });
            }
        }

        Ok(records)
    }

    fn read_error(&self, source: std::io::Error) -> WatcherError {
        WatcherError::Read {
            path: self.path.clone(),
            source,
        }
    }
}
