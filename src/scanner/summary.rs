//! Per-session summaries for list views.

use chrono::{DateTime, Utc};

use super::discovery::SessionInfo;
use crate::transcript::{parse_file, ParseError, ParsedTranscript};

/// Maximum characters kept from the first prompt.
const TITLE_MAX_CHARS: usize = 80;

/// Headline figures for one session log.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub session_id: String,
    /// First line of the first user prompt.
    pub title: Option<String>,
    /// Model of the most recent assistant turn.
    pub model: Option<String>,
    pub turns: usize,
    pub tool_calls: usize,
    /// Tool calls with no logged result.
    pub pending_tool_calls: usize,
    pub total_cost_usd: f64,
    pub total_duration_ms: u64,
    pub last_activity: Option<DateTime<Utc>>,
}

impl SessionSummary {
    #[must_use]
    pub fn from_transcript(session_id: &str, transcript: &ParsedTranscript) -> Self {
        let title = transcript
            .first_prompt()
            .and_then(|p| p.lines().find(|l| !l.trim().is_empty()))
            .map(|line| line.trim().chars().take(TITLE_MAX_CHARS).collect());

        Self {
            session_id: session_id.to_string(),
            title,
            model: transcript.model().map(str::to_string),
            turns: transcript.turns.len(),
            tool_calls: transcript.tool_calls().count(),
            pending_tool_calls: transcript.tool_calls().filter(|c| !c.is_resolved()).count(),
            total_cost_usd: transcript.total_cost_usd,
            total_duration_ms: transcript.total_duration_ms,
            last_activity: transcript.last_activity,
        }
    }
}

/// Parse a session log and summarise it.
///
/// # Errors
///
/// Returns an error if the log exists but cannot be read.
pub fn summarize_session(session: &SessionInfo) -> Result<SessionSummary, ParseError> {
    let transcript = parse_file(&session.path)?;
    Ok(SessionSummary::from_transcript(&session.id, &transcript))
}
