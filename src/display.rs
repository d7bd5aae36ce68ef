//! Colored CLI display utilities for timeline output.

use std::io::{self, Write};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use owo_colors::OwoColorize;

use crate::scanner::{ProjectInfo, SessionSummary};
use crate::transcript::{
    ContentBlock, ParsedTranscript, RawRecord, RecordKind, Role, ToolCall, Turn,
};
use crate::watcher::WatchEvent;

/// Maximum length for truncated display strings.
const DEFAULT_MAX_LEN: usize = 80;

/// Truncate a string to a maximum number of characters, adding ellipsis if truncated.
#[must_use]
pub fn truncate(s: &str, max_len: usize, raw_mode: bool) -> String {
    if raw_mode || s.chars().count() <= max_len {
        return s.to_string();
    }
    if max_len <= 3 {
        return "...".to_string();
    }
    let head: String = s.chars().take(max_len - 3).collect();
    format!("{head}...")
}

/// Input keys that carry the gist of a tool call, in lookup order.
const PRIMARY_INPUT_KEYS: &[&str] = &[
    "command",
    "file_path",
    "path",
    "pattern",
    "url",
    "query",
    "description",
    "prompt",
];

/// One-line rendering of a tool call's input.
///
/// Shows the primary argument alone when the input has one, otherwise
/// `key=value` pairs.
#[must_use]
pub fn format_tool_input(input: &serde_json::Value, raw_mode: bool) -> String {
    let Some(map) = input.as_object() else {
        return truncate(&input.to_string(), DEFAULT_MAX_LEN, raw_mode);
    };
    if let Some(primary) = PRIMARY_INPUT_KEYS
        .iter()
        .find_map(|key| map.get(*key).and_then(serde_json::Value::as_str))
    {
        return truncate(primary, DEFAULT_MAX_LEN, raw_mode);
    }
    map.iter()
        .map(|(key, value)| {
            let value = value
                .as_str()
                .map_or_else(|| value.to_string(), str::to_string);
            format!("{key}={}", truncate(&value, 40, raw_mode))
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Compact human duration: `850ms`, `2.4s`, `3m12s`.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        format!("{millis}ms")
    } else if millis < 60_000 {
        format!("{:.1}s", duration.as_secs_f64())
    } else {
        let secs = duration.as_secs();
        format!("{}m{:02}s", secs / 60, secs % 60)
    }
}

fn format_timestamp(ts: Option<DateTime<Utc>>) -> String {
    ts.map_or_else(
        || "-".repeat(19),
        |ts| ts.format("%Y-%m-%dT%H:%M:%S").to_string(),
    )
}

fn format_system_time(time: SystemTime) -> String {
    format_timestamp(Some(DateTime::<Utc>::from(time)))
}

/// One-line description of a record, as shown by the follow view.
#[must_use]
pub fn record_summary(record: &RawRecord, raw_mode: bool) -> String {
    if record.kind == RecordKind::System {
        return record.subtype().unwrap_or("system").to_string();
    }
    let Some(message) = record.message() else {
        return String::new();
    };
    let parts: Vec<String> = message
        .blocks()
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } if !text.trim().is_empty() => {
                Some(truncate(text.trim(), DEFAULT_MAX_LEN, raw_mode))
            }
            ContentBlock::Thinking { .. } => Some("(thinking)".to_string()),
            ContentBlock::ToolUse { name, .. } => Some(format!("-> {name}")),
            ContentBlock::ToolResult {
                tool_use_id,
                is_error,
                ..
            } => Some(format!(
                "<- {}{}",
                truncate(tool_use_id, 12, raw_mode),
                if is_error.unwrap_or(false) { " (error)" } else { "" }
            )),
            _ => None,
        })
        .collect();
    parts.join(" | ")
}

/// Print a project line.
pub fn print_project(project: &ProjectInfo) {
    println!(
        "{} {} {}",
        format_system_time(project.last_activity).dimmed(),
        "[PROJECT]".blue().bold(),
        project.id.cyan()
    );
    let _ = io::stdout().flush();
}

/// Print a session summary line.
pub fn print_session_summary(summary: &SessionSummary, raw_mode: bool) {
    let pending = if summary.pending_tool_calls > 0 {
        format!(" ({} pending)", summary.pending_tool_calls)
    } else {
        String::new()
    };
    println!(
        "  {} {} turns={} tools={}{} {}",
        format_timestamp(summary.last_activity).dimmed(),
        truncate(&summary.session_id, 12, raw_mode).dimmed(),
        summary.turns,
        summary.tool_calls,
        pending.yellow(),
        truncate(summary.title.as_deref().unwrap_or(""), 60, raw_mode)
    );
    let _ = io::stdout().flush();
}

/// Print a tool call and its result.
pub fn print_tool_call(call: &ToolCall, raw_mode: bool) {
    println!(
        "  {} {} ({})",
        "[TOOL]".cyan().bold(),
        call.name.bold(),
        format_tool_input(&call.input, raw_mode).dimmed()
    );
    let Some(output) = call.result_text() else {
        println!("  {} {}", "[PENDING]".yellow().bold(), call.id.dimmed());
        return;
    };
    let took = call
        .duration
        .map(|d| format!(" [{}]", format_duration(d)))
        .unwrap_or_default();
    let content = truncate(output.trim(), 150, raw_mode);
    if call.is_error {
        println!("  {}{} {}", "[RESULT]".red().bold(), took.dimmed(), content);
    } else {
        println!("  {}{} {}", "[RESULT]".green().bold(), took.dimmed(), content);
    }
}

/// Print a reconstructed turn.
pub fn print_turn(turn: &Turn, raw_mode: bool) {
    let ts = format_timestamp(turn.timestamp);
    match turn.role {
        Role::User => println!("{} {}", ts.dimmed(), "[USER]".green().bold()),
        Role::Assistant => println!(
            "{} {} {}",
            ts.dimmed(),
            "[ASSISTANT]".magenta().bold(),
            turn.model.as_deref().unwrap_or("").dimmed()
        ),
    }
    if !turn.thinking.is_empty() {
        println!("  {}", truncate(turn.thinking.trim(), 200, raw_mode).dimmed());
    }
    if !turn.text.is_empty() {
        println!("  {}", truncate(turn.text.trim(), 400, raw_mode));
    }
    for call in &turn.tool_calls {
        print_tool_call(call, raw_mode);
    }
    let _ = io::stdout().flush();
}

/// Print session-level accounting.
pub fn print_totals(transcript: &ParsedTranscript) {
    let usage = transcript.total_usage();
    println!(
        "{} turns={} cost=${:.4} duration={} tokens={}",
        "[TOTAL]".blue().bold(),
        transcript.turns.len(),
        transcript.total_cost_usd,
        format_duration(Duration::from_millis(transcript.total_duration_ms)),
        usage.total()
    );
    let _ = io::stdout().flush();
}

/// Print a live watch event.
pub fn print_event(event: &WatchEvent, raw_mode: bool) {
    let tag = match event.record.kind {
        RecordKind::User => "[USER]".green().bold().to_string(),
        RecordKind::Assistant => "[ASSISTANT]".magenta().bold().to_string(),
        RecordKind::System => "[SYSTEM]".blue().bold().to_string(),
        RecordKind::Unknown => "[OTHER]".dimmed().to_string(),
    };
    let file = event
        .path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    println!(
        "{} {} {} {}",
        format_timestamp(event.record.timestamp).dimmed(),
        truncate(&file, 12, raw_mode).dimmed(),
        tag,
        record_summary(&event.record, raw_mode)
    );
    let _ = io::stdout().flush();
}

/// Print an error message.
pub fn print_error(message: &str) {
    eprintln!("{} {}", "[ERROR]".red().bold(), message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        let cases = [
            ("short", 10, "short"),
            ("exact", 5, "exact"),
            ("hello world", 8, "hello..."),
            ("hello", 3, "..."),
            ("hello", 0, "..."),
            ("héllo wörld", 8, "héllo..."),
            ("日本語テキスト", 5, "日本..."),
        ];
        for (input, max_len, expected) in cases {
            assert_eq!(truncate(input, max_len, false), expected, "input {input:?}");
        }
    }

    #[test]
    fn test_truncate_raw_mode_keeps_everything() {
        let long = "x".repeat(300);
        assert_eq!(truncate(&long, 10, true), long);
    }

    #[test]
    fn test_tool_input_primary_argument() {
        let input = serde_json::json!({
            "command": "cargo test --workspace",
            "timeout": 120000
        });
        assert_eq!(format_tool_input(&input, false), "cargo test --workspace");
    }

    #[test]
    fn test_tool_input_pairs_without_primary() {
        let input = serde_json::json!({ "limit": 5, "offset": "12" });
        assert_eq!(format_tool_input(&input, false), "limit=5 offset=12");
    }

    #[test]
    fn test_tool_input_long_value_truncated() {
        let input = serde_json::json!({ "file_path": format!("/src/{}", "d/".repeat(60)) });
        let formatted = format_tool_input(&input, false);
        assert_eq!(formatted.chars().count(), DEFAULT_MAX_LEN);
        assert!(formatted.ends_with("..."));
    }

    #[test]
    fn test_tool_input_scalar() {
        assert_eq!(format_tool_input(&serde_json::json!(42), false), "42");
        assert_eq!(format_tool_input(&serde_json::Value::Null, false), "null");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(850)), "850ms");
        assert_eq!(format_duration(Duration::from_millis(2400)), "2.4s");
        assert_eq!(format_duration(Duration::from_secs(192)), "3m12s");
    }

    #[test]
    fn test_record_summary_assistant_blocks() {
        let line = br#"{"type":"assistant","message":{"role":"assistant","content":[{"type":"text","text":"Running it"},{"type":"tool_use","id":"t1","name":"Bash","input":{}}]}}"#;
        let record = RawRecord::from_line(line).unwrap();
        assert_eq!(record_summary(&record, false), "Running it | -> Bash");
    }

    #[test]
    fn test_record_summary_tool_result_error() {
        let line = br#"{"type":"user","message":{"role":"user","content":[{"type":"tool_result","tool_use_id":"t1","content":"boom","is_error":true}]}}"#;
        let record = RawRecord::from_line(line).unwrap();
        assert_eq!(record_summary(&record, false), "<- t1 (error)");
    }

    #[test]
    fn test_record_summary_system_subtype() {
        let record = RawRecord::from_line(br#"{"type":"system","subtype":"turn_duration"}"#).unwrap();
        assert_eq!(record_summary(&record, false), "turn_duration");
    }

    #[test]
    fn test_record_summary_without_message() {
        let record = RawRecord::from_line(br#"{"type":"summary"}"#).unwrap();
        assert_eq!(record_summary(&record, false), "");
    }
}
