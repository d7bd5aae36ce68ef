//! Live tailing of session log files.
//!
//! [`LogTailer`] reads complete lines appended to one file;
//! [`SessionWatcher`] multiplexes many tailers behind a single event queue.

mod error;
mod session_watcher;
mod tailer;

pub use error::WatcherError;
pub use session_watcher::{SessionWatcher, WatchEvent, WatchReceivers};
pub use tailer::{LogTailer, TailedRecord};
