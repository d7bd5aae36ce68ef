//! Session log records and turn reconstruction.
//!
//! Parses `<project>/<session>.jsonl` logs into ordered [`Turn`]s with
//! correlated [`ToolCall`]s.

mod parser;
mod record;

pub use parser::{
    parse_file, parse_reader, parse_str, ParseError, ParsedTranscript, Role, ToolCall, Turn,
    TranscriptParser,
};
pub use record::{
    ContentBlock, Message, MessageContent, RawRecord, RecordKind, TurnAccounting, Usage,
    ACCOUNTING_SUBTYPES,
};
