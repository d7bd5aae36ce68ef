//! Turn reconstruction from session log records.
//!
//! Assistant turns are held until the next `user` or `assistant` record
//! arrives, because their tool results are logged in later `user` records.
//! Results are indexed by tool-call id for the whole parse.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::record::{ContentBlock, Message, RawRecord, RecordKind, Usage};

/// Errors returned by [`parse_file`].
#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    /// The log file could not be opened or read.
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// A tool invocation and, once logged, its result.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    /// Identifier assigned by the agent runtime.
    pub id: String,
    pub name: String,
    pub input: Value,
    /// `None` until a matching `tool_result` has been seen.
    pub result: Option<Value>,
    pub is_error: bool,
    /// Timestamp of the record that requested the call.
    pub timestamp: Option<DateTime<Utc>>,
    /// Time between the call and its result, when both were timestamped.
    pub duration: Option<Duration>,
}

impl ToolCall {
    fn new(id: String, name: String, input: Value, timestamp: Option<DateTime<Utc>>) -> Self {
        Self {
            id,
            name,
            input,
            result: None,
            is_error: false,
            timestamp,
            duration: None,
        }
    }

    /// Whether a result has been attached.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.result.is_some()
    }

    /// The result flattened to text.
    ///
    /// String results are returned as-is; arrays of content blocks have their
    /// `text` fields joined with newlines. Other shapes are rendered as JSON.
    #[must_use]
    pub fn result_text(&self) -> Option<String> {
        let result = self.result.as_ref()?;
        Some(match result {
            Value::String(s) => s.clone(),
            Value::Array(items) => items
                .iter()
                .filter_map(|item| item.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n"),
            Value::Null => String::new(),
            other => other.to_string(),
        })
    }

    /// Attach a result. A call that already has one keeps it.
    fn attach(&mut self, result: &ToolOutcome) {
        if self.result.is_some() {
            return;
        }
        self.result = Some(result.content.clone());
        self.is_error = result.is_error;
        if let (Some(started), Some(finished)) = (self.timestamp, result.timestamp) {
            self.duration = (finished - started).to_std().ok();
        }
    }
}

/// One role-attributed exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub role: Role,
    /// Text blocks joined with newlines.
    pub text: String,
    /// Thinking blocks joined with newlines.
    pub thinking: String,
    pub tool_calls: Vec<ToolCall>,
    /// Assistant turns only.
    pub model: Option<String>,
    /// Assistant turns only.
    pub usage: Option<Usage>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Turn {
    fn new(role: Role, timestamp: Option<DateTime<Utc>>) -> Self {
        Self {
            role,
            text: String::new(),
            thinking: String::new(),
            tool_calls: Vec::new(),
            model: None,
            usage: None,
            timestamp,
        }
    }
}

/// Reconstructed turns plus session-level accounting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedTranscript {
    /// Turns in the order their closing record was processed.
    pub turns: Vec<Turn>,
    /// Last reported total cost.
    pub total_cost_usd: f64,
    /// Sum of all reported turn durations.
    pub total_duration_ms: u64,
    /// Last reported turn counter.
    pub turn_count: u64,
    /// Latest timestamp seen on any decoded record.
    pub last_activity: Option<DateTime<Utc>>,
}

impl ParsedTranscript {
    fn last_assistant(&self) -> Option<&Turn> {
        self.turns.iter().rev().find(|t| t.role == Role::Assistant)
    }

    /// Model name of the most recent assistant turn.
    #[must_use]
    pub fn model(&self) -> Option<&str> {
        self.last_assistant()?.model.as_deref()
    }

    /// Token usage of the most recent assistant turn.
    #[must_use]
    pub fn latest_usage(&self) -> Option<Usage> {
        self.last_assistant()?.usage
    }

    /// Token usage summed across all assistant turns.
    #[must_use]
    pub fn total_usage(&self) -> Usage {
        let mut total = Usage::default();
        for usage in self.turns.iter().filter_map(|t| t.usage) {
            total += usage;
        }
        total
    }

    /// All tool calls in turn order.
    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCall> {
        self.turns.iter().flat_map(|t| t.tool_calls.iter())
    }

    /// Text of the first user turn.
    #[must_use]
    pub fn first_prompt(&self) -> Option<&str> {
        self.turns
            .iter()
            .find(|t| t.role == Role::User)
            .map(|t| t.text.as_str())
    }
}

/// A logged tool result waiting to be attached.
#[derive(Debug, Clone)]
struct ToolOutcome {
    content: Value,
    is_error: bool,
    timestamp: Option<DateTime<Utc>>,
}

/// The single-slot assistant turn buffer.
#[derive(Debug, Default)]
enum PendingTurn {
    #[default]
    Idle,
    Holding(Turn),
}

/// Incremental transcript parser.
///
/// Feed lines or records in file order, then call [`finish`](Self::finish).
/// All correlation state lives on the parser and is dropped with it.
#[derive(Debug, Default)]
pub struct TranscriptParser {
    outcomes: HashMap<String, ToolOutcome>,
    pending: PendingTurn,
    transcript: ParsedTranscript,
}

impl TranscriptParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an assistant turn is buffered awaiting its results.
    #[must_use]
    pub fn is_holding(&self) -> bool {
        matches!(self.pending, PendingTurn::Holding(_))
    }

    /// Turns emitted so far, excluding any buffered assistant turn.
    #[must_use]
    pub fn turns(&self) -> &[Turn] {
        &self.transcript.turns
    }

    /// Decode and process one raw line. Undecodable lines are ignored.
    pub fn feed_line(&mut self, line: &[u8]) {
        if let Some(record) = RawRecord::from_line(line) {
            self.feed_record(&record);
        }
    }

    /// Process one decoded record.
    ///
    /// User and assistant records whose `message` does not decode are
    /// skipped entirely, like undecodable lines.
    pub fn feed_record(&mut self, record: &RawRecord) {
        let message = match record.kind {
            RecordKind::User | RecordKind::Assistant => {
                let Some(message) = record.message() else {
                    tracing::trace!(kind = ?record.kind, "Skipping record with malformed message");
                    return;
                };
                Some(message)
            }
            RecordKind::System | RecordKind::Unknown => None,
        };

        if let Some(ts) = record.timestamp {
            if self.transcript.last_activity.map_or(true, |last| ts > last) {
                self.transcript.last_activity = Some(ts);
            }
        }

        match (record.kind, message) {
            (RecordKind::User, Some(message)) => self.on_user(record, message),
            (RecordKind::Assistant, Some(message)) => self.on_assistant(record, message),
            (RecordKind::System, _) => self.on_system(record),
            _ => {}
        }
    }

    /// Flush the buffered turn and return the transcript.
    ///
    /// Calls still unresolved at this point are matched once more against
    /// every result seen during the parse; anything left has `result: None`.
    #[must_use]
    pub fn finish(mut self) -> ParsedTranscript {
        self.flush();
        for turn in &mut self.transcript.turns {
            for call in turn.tool_calls.iter_mut().filter(|c| !c.is_resolved()) {
                if let Some(outcome) = self.outcomes.get(&call.id) {
                    call.attach(outcome);
                }
            }
        }
        self.transcript
    }

    fn on_user(&mut self, record: &RawRecord, message: Message) {
        let mut texts = Vec::new();

        for block in message.blocks() {
            match block {
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                } if !tool_use_id.is_empty() => {
                    // First result for an id wins.
                    self.outcomes.entry(tool_use_id).or_insert(ToolOutcome {
                        content,
                        is_error: is_error.unwrap_or(false),
                        timestamp: record.timestamp,
                    });
                }
                ContentBlock::Text { text } if !text.is_empty() => texts.push(text),
                _ => {}
            }
        }

        self.flush();

        if !texts.is_empty() {
            let mut turn = Turn::new(Role::User, record.timestamp);
            turn.text = texts.join("\n");
            self.transcript.turns.push(turn);
        }
    }

    fn on_assistant(&mut self, record: &RawRecord, message: Message) {
        self.flush();

        let mut turn = Turn::new(Role::Assistant, record.timestamp);
        turn.usage = message.usage;

        for block in message.blocks() {
            match block {
                ContentBlock::Text { text } => append_text(&mut turn.text, &text),
                ContentBlock::Thinking { thinking } => append_text(&mut turn.thinking, &thinking),
                ContentBlock::ToolUse { id, name, input } => {
                    turn.tool_calls
                        .push(ToolCall::new(id, name, input, record.timestamp));
                }
                ContentBlock::ToolResult { .. } | ContentBlock::Unknown => {}
            }
        }
        turn.model = message.model;

        self.pending = PendingTurn::Holding(turn);
    }

    fn on_system(&mut self, record: &RawRecord) {
        let Some(accounting) = record.accounting() else {
            return;
        };
        if let Some(cost) = accounting.total_cost_usd {
            self.transcript.total_cost_usd = cost;
        }
        if let Some(duration) = accounting.duration_ms {
            self.transcript.total_duration_ms =
                self.transcript.total_duration_ms.saturating_add(duration);
        }
        if let Some(turns) = accounting.num_turns {
            self.transcript.turn_count = turns;
        }
    }

    /// Holding -> Idle, emitting the held turn with whatever results are known.
    fn flush(&mut self) {
        if let PendingTurn::Holding(mut turn) = std::mem::take(&mut self.pending) {
            for call in &mut turn.tool_calls {
                if let Some(outcome) = self.outcomes.get(&call.id) {
                    call.attach(outcome);
                }
            }
            self.transcript.turns.push(turn);
        }
    }
}

fn append_text(buf: &mut String, text: &str) {
    if text.is_empty() {
        return;
    }
    if !buf.is_empty() {
        buf.push('\n');
    }
    buf.push_str(text);
}

/// Parse newline-delimited records from a reader.
///
/// # Errors
///
/// Returns an error only if reading from `reader` fails.
pub fn parse_reader<R: BufRead>(mut reader: R) -> io::Result<ParsedTranscript> {
    let mut parser = TranscriptParser::new();
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        parser.feed_line(&line);
    }
    Ok(parser.finish())
}

/// Parse records already held in memory.
#[must_use]
pub fn parse_str(content: &str) -> ParsedTranscript {
    let mut parser = TranscriptParser::new();
    for line in content.lines() {
        parser.feed_line(line.as_bytes());
    }
    parser.finish()
}

/// Parse a session log file.
///
/// A missing file parses to an empty transcript.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be opened or read.
pub fn parse_file(path: &Path) -> Result<ParsedTranscript, ParseError> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "Session log not found, treating as empty");
            return Ok(ParsedTranscript::default());
        }
        Err(source) => {
            return Err(ParseError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let transcript = parse_reader(BufReader::new(file)).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(
        path = %path.display(),
        turns = transcript.turns.len(),
        "Parsed session log"
    );
    Ok(transcript)
}
