//! Multi-value JSON stream parsing.
//!
//! The telemetry log is a sequence of pretty-printed JSON values written back
//! to back with no delimiter. Parsing walks the whole buffer and stops at the
//! first value that does not parse, reporting why it stopped.

use serde_json::{Deserializer, Value};

use super::record::TelemetryRecord;

/// How a parse walk ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    /// Every byte was consumed.
    Complete,
    /// The buffer ends inside a value; the producer is probably mid-write.
    Incomplete { offset: usize, message: String },
    /// A value is syntactically broken. Retrying will not help until the
    /// file changes.
    Malformed { offset: usize, message: String },
}

impl StreamEnd {
    pub fn is_complete(&self) -> bool {
        matches!(self, StreamEnd::Complete)
    }
}

/// Records parsed from one buffer, in stream order.
#[derive(Debug)]
pub struct ParsedLog {
    pub records: Vec<TelemetryRecord>,
    pub end: StreamEnd,
}

/// Parser for concatenated JSON values.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogParser;

impl LogParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse every complete value in `bytes`.
    pub fn parse(&self, bytes: &[u8]) -> ParsedLog {
        let mut stream = Deserializer::from_slice(bytes).into_iter::<Value>();
        let mut records = Vec::new();

        loop {
            let offset = stream.byte_offset();
            match stream.next() {
                None => {
                    return ParsedLog {
                        records,
                        end: StreamEnd::Complete,
                    }
                }
                Some(Ok(value)) => records.push(TelemetryRecord::new(value)),
                Some(Err(e)) => {
                    let message = e.to_string();
                    let end = if e.is_eof() {
                        StreamEnd::Incomplete { offset, message }
                    } else {
                        StreamEnd::Malformed { offset, message }
                    };
                    return ParsedLog { records, end };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_RECORDS: &str = r#"{
  "attributes": {
    "event.name": "gemini_cli.user_prompt",
    "session.id": "s1"
  }
}{
  "attributes": {
    "event.name": "gemini_cli.api_response",
    "session.id": "s1"
  }
}
"#;

    #[test]
    fn parses_concatenated_objects() {
        let parsed = LogParser::new().parse(TWO_RECORDS.as_bytes());
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.end, StreamEnd::Complete);
        assert_eq!(parsed.records[1].event_name(), "gemini_cli.api_response");
    }

    #[test]
    fn empty_input_is_complete() {
        let parsed = LogParser::new().parse(b"");
        assert!(parsed.records.is_empty());
        assert!(parsed.end.is_complete());

        let parsed = LogParser::new().parse(b"  \n\n");
        assert!(parsed.records.is_empty());
        assert!(parsed.end.is_complete());
    }

    #[test]
    fn truncated_tail_is_incomplete() {
        let mut input = TWO_RECORDS.to_string();
        input.push_str("{\n  \"attributes\": {\n    \"event.na");
        let parsed = LogParser::new().parse(input.as_bytes());
        assert_eq!(parsed.records.len(), 2);
        match parsed.end {
            StreamEnd::Incomplete { offset, .. } => assert_eq!(offset, TWO_RECORDS.len() - 1),
            other => panic!("expected incomplete, got {other:?}"),
        }
    }

    #[test]
    fn garbage_is_malformed() {
        let mut input = TWO_RECORDS.to_string();
        input.push_str("}{\"a\": 1}");
        let parsed = LogParser::new().parse(input.as_bytes());
        assert_eq!(parsed.records.len(), 2);
        assert!(matches!(parsed.end, StreamEnd::Malformed { .. }));
    }
}
