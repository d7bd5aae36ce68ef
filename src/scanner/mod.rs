//! Discovery of projects, sessions and subagent logs on disk.

mod discovery;
mod error;
mod summary;

pub use discovery::{
    default_projects_root, extract_agent_id, scan_projects, scan_sessions, scan_subagents,
    ProjectInfo, SessionInfo, LOG_EXTENSION, SUBAGENTS_DIR,
};
pub use error::ScanError;
pub use summary::{summarize_session, SessionSummary};
