//! Record model for agent session log lines.
//!
//! One JSON object per line. Only the fields the timeline needs are typed;
//! everything else stays in [`RawRecord::extra`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// System subtypes that carry end-of-turn accounting.
pub const ACCOUNTING_SUBTYPES: &[&str] = &["result", "turn_duration"];

/// Top-level record kind, taken from the `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    User,
    Assistant,
    System,
    /// Missing or unrecognised `type` (forward compatibility)
    #[default]
    #[serde(other)]
    Unknown,
}

/// One decoded log line.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawRecord {
    #[serde(rename = "type", default)]
    pub kind: RecordKind,
    /// `None` when absent or unparseable.
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
    /// The nested `message` object; its shape depends on `kind`.
    #[serde(rename = "message", default)]
    pub payload: Value,
    /// Remaining top-level fields (`subtype`, accounting counters, ids).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RawRecord {
    /// Decode a single line.
    ///
    /// Returns `None` for blank lines and anything that is not a JSON object
    /// of the expected shape.
    #[must_use]
    pub fn from_line(line: &[u8]) -> Option<Self> {
        let trimmed = line.trim_ascii();
        if trimmed.is_empty() {
            return None;
        }
        match serde_json::from_slice::<Self>(trimmed) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::trace!(error = %e, "Skipping malformed record line");
                None
            }
        }
    }

    /// Decode the message payload.
    ///
    /// Returns `None` if the payload is missing or has the wrong shape.
    #[must_use]
    pub fn message(&self) -> Option<Message> {
        if self.payload.is_null() {
            return None;
        }
        Message::deserialize(&self.payload).ok()
    }

    /// The `subtype` field of system records.
    #[must_use]
    pub fn subtype(&self) -> Option<&str> {
        self.extra.get("subtype").and_then(Value::as_str)
    }

    /// End-of-turn accounting carried by a system record, if this is one.
    #[must_use]
    pub fn accounting(&self) -> Option<TurnAccounting> {
        if self.kind != RecordKind::System {
            return None;
        }
        let subtype = self.subtype()?;
        if !ACCOUNTING_SUBTYPES.contains(&subtype) {
            return None;
        }
        Some(TurnAccounting {
            total_cost_usd: self.field(&["total_cost_usd", "totalCostUsd"]).and_then(Value::as_f64),
            duration_ms: self.field(&["duration_ms", "durationMs"]).and_then(Value::as_u64),
            num_turns: self.field(&["num_turns", "numTurns"]).and_then(Value::as_u64),
        })
    }

    fn field(&self, keys: &[&str]) -> Option<&Value> {
        keys.iter().find_map(|key| self.extra.get(*key))
    }
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc)))
}

/// Accounting counters from a system record. Absent fields are `None`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TurnAccounting {
    pub total_cost_usd: Option<f64>,
    pub duration_ms: Option<u64>,
    pub num_turns: Option<u64>,
}

/// A message payload with role, content and (for assistant messages)
/// model and usage.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub content: Option<MessageContent>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl Message {
    /// Content blocks, with plain-string content presented as a single text block.
    #[must_use]
    pub fn blocks(&self) -> Vec<ContentBlock> {
        match &self.content {
            None => Vec::new(),
            Some(MessageContent::Text(text)) => vec![ContentBlock::Text { text: text.clone() }],
            Some(MessageContent::Blocks(blocks)) => blocks.clone(),
        }
    }
}

/// `message.content`: a bare string or an array of blocks.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl MessageContent {
    /// A bare string as-is, otherwise text blocks joined with newlines.
    #[must_use]
    pub fn as_text(&self) -> String {
        let blocks = match self {
            Self::Text(text) => return text.clone(),
            Self::Blocks(blocks) => blocks,
        };
        blocks
            .iter()
            .filter_map(ContentBlock::text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A content block within a message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    Thinking {
        #[serde(default)]
        thinking: String,
    },
    /// A tool invocation.
    ToolUse {
        #[serde(default)]
        id: String,
        #[serde(default)]
        name: String,
        #[serde(default)]
        input: Value,
    },
    /// Tool result, correlated to a `ToolUse` by `tool_use_id`
    ToolResult {
        #[serde(default)]
        tool_use_id: String,
        #[serde(default)]
        content: Value,
        #[serde(default)]
        is_error: Option<bool>,
    },
    /// Images, redacted thinking and future block types.
    #[serde(other)]
    Unknown,
}

impl ContentBlock {
    /// The text of a `text` block.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Token usage counters reported on assistant messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
}

impl Usage {
    /// Sum of all counters.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.input_tokens
            + self.output_tokens
            + self.cache_creation_input_tokens
            + self.cache_read_input_tokens
    }
}

impl std::ops::AddAssign for Usage {
    fn add_assign(&mut self, other: Self) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cache_creation_input_tokens += other.cache_creation_input_tokens;
        self.cache_read_input_tokens += other.cache_read_input_tokens;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_user_record() {
        let line = br#"{"type":"user","timestamp":"2026-01-29T10:00:00.123456789Z","message":{"role":"user","content":"Hello world"}}"#;
        let record = RawRecord::from_line(line).unwrap();

        assert_eq!(record.kind, RecordKind::User);
        let ts = record.timestamp.unwrap();
        assert_eq!(ts.timestamp_subsec_nanos(), 123_456_789);

        let message = record.message().unwrap();
        assert_eq!(message.role.as_deref(), Some("user"));
        assert_eq!(
            message.content,
            Some(MessageContent::Text("Hello world".to_string()))
        );
    }

    #[test]
    fn test_unparseable_timestamp_is_none() {
        let line = br#"{"type":"user","timestamp":"yesterday","message":{"content":"hi"}}"#;
        let record = RawRecord::from_line(line).unwrap();
        assert!(record.timestamp.is_none());

        let line = br#"{"type":"user","timestamp":42,"message":{"content":"hi"}}"#;
        let record = RawRecord::from_line(line).unwrap();
        assert!(record.timestamp.is_none());

        let line = br#"{"type":"user","message":{"content":"hi"}}"#;
        let record = RawRecord::from_line(line).unwrap();
        assert!(record.timestamp.is_none());
    }

    #[test]
    fn test_unknown_kind() {
        let record = RawRecord::from_line(br#"{"type":"file-history-snapshot","snapshot":{}}"#)
            .unwrap();
        assert_eq!(record.kind, RecordKind::Unknown);

        let record = RawRecord::from_line(br#"{"uuid":"no-type"}"#).unwrap();
        assert_eq!(record.kind, RecordKind::Unknown);
    }

    #[test]
    fn test_blank_and_malformed_lines() {
        assert!(RawRecord::from_line(b"").is_none());
        assert!(RawRecord::from_line(b"   \r").is_none());
        assert!(RawRecord::from_line(b"not json").is_none());
        assert!(RawRecord::from_line(br#"{"type":"user","message":"#).is_none());
        assert!(RawRecord::from_line(b"[1,2,3]").is_none());
    }

    #[test]
    fn test_assistant_blocks_and_usage() {
        let line = br#"{"type":"assistant","message":{"model":"claude-opus","usage":{"input_tokens":10,"output_tokens":5},"content":[{"type":"thinking","thinking":"hmm"},{"type":"text","text":"Reading"},{"type":"tool_use","id":"t1","name":"Read","input":{"path":"/a"}},{"type":"server_tool_use","id":"x"}]}}"#;
        let record = RawRecord::from_line(line).unwrap();
        let message = record.message().unwrap();

        assert_eq!(message.model.as_deref(), Some("claude-opus"));
        assert_eq!(message.usage.unwrap().total(), 15);

        let blocks = message.blocks();
        assert_eq!(blocks.len(), 4);
        assert!(matches!(&blocks[0], ContentBlock::Thinking { thinking } if thinking == "hmm"));
        assert!(matches!(&blocks[2], ContentBlock::ToolUse { id, name, .. } if id == "t1" && name == "Read"));
        assert_eq!(blocks[3], ContentBlock::Unknown);
    }

    #[test]
    fn test_tool_result_block_defaults() {
        let line = br#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"t1","content":"ok"}]}}"#;
        let message = RawRecord::from_line(line).unwrap().message().unwrap();

        match &message.blocks()[0] {
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => {
                assert_eq!(tool_use_id, "t1");
                assert_eq!(content, &Value::String("ok".to_string()));
                assert!(is_error.is_none());
            }
            other => panic!("Expected ToolResult block, got {other:?}"),
        }
    }

    #[test]
    fn test_null_content_is_empty() {
        let line = br#"{"type":"user","message":{"role":"user","content":null}}"#;
        let message = RawRecord::from_line(line).unwrap().message().unwrap();
        assert!(message.blocks().is_empty());
    }

    #[test]
    fn test_accounting_snake_and_camel_case() {
        let line = br#"{"type":"system","subtype":"result","total_cost_usd":0.25,"duration_ms":1200,"num_turns":3}"#;
        let accounting = RawRecord::from_line(line).unwrap().accounting().unwrap();
        assert_eq!(accounting.total_cost_usd, Some(0.25));
        assert_eq!(accounting.duration_ms, Some(1200));
        assert_eq!(accounting.num_turns, Some(3));

        let line = br#"{"type":"system","subtype":"turn_duration","durationMs":800}"#;
        let accounting = RawRecord::from_line(line).unwrap().accounting().unwrap();
        assert_eq!(accounting.total_cost_usd, None);
        assert_eq!(accounting.duration_ms, Some(800));
        assert_eq!(accounting.num_turns, None);
    }

    #[test]
    fn test_accounting_ignores_other_subtypes() {
        let line = br#"{"type":"system","subtype":"compact_boundary","duration_ms":5}"#;
        assert!(RawRecord::from_line(line).unwrap().accounting().is_none());

        let line = br#"{"type":"user","subtype":"result","duration_ms":5}"#;
        assert!(RawRecord::from_line(line).unwrap().accounting().is_none());
    }

    #[test]
    fn test_content_as_text_skips_non_text_blocks() {
        let line = br#"{"type":"user","message":{"content":[{"type":"text","text":"see"},{"type":"image","source":{}},{"type":"text","text":"this"}]}}"#;
        let content = RawRecord::from_line(line)
            .and_then(|r| r.message())
            .and_then(|m| m.content)
            .unwrap();
        assert_eq!(content.as_text(), "see\nthis");
        assert_eq!(MessageContent::Text("plain".into()).as_text(), "plain");
    }

    #[test]
    fn test_usage_add_assign() {
        let mut total = Usage::default();
        total += Usage {
            input_tokens: 1,
            output_tokens: 2,
            cache_creation_input_tokens: 3,
            cache_read_input_tokens: 4,
        };
        total += Usage {
            input_tokens: 1,
            ..Usage::default()
        };
        assert_eq!(total.input_tokens, 2);
        assert_eq!(total.total(), 11);
    }
}
