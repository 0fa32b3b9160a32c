//! Field extraction over loosely structured telemetry records.
//!
//! A record is whatever JSON value the producer emitted. Event fields live in
//! an `attributes` map; a handful of top-level keys act as fallbacks. Every
//! accessor returns a default instead of failing when a key is absent or has
//! an unexpected type.

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, Utc};
use serde_json::Value;

/// Session id used when a record carries none.
pub const UNKNOWN_SESSION: &str = "unknown";

/// Timestamp format for folder names and block headers.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// One parsed value from the telemetry stream.
#[derive(Debug, Clone)]
pub struct TelemetryRecord(Value);

impl TelemetryRecord {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Look up `key` in `attributes`, then each top-level fallback in order.
    /// Null and empty-string values count as absent at every step.
    fn field(&self, key: &str, fallbacks: &[&str]) -> Option<&Value> {
        self.0
            .get("attributes")
            .and_then(|attrs| attrs.get(key))
            .filter(|v| is_present(v))
            .or_else(|| {
                fallbacks
                    .iter()
                    .find_map(|k| self.0.get(*k).filter(|v| is_present(v)))
            })
    }

    fn attr(&self, key: &str) -> Option<&Value> {
        self.field(key, &[])
    }

    fn string_or(&self, key: &str, fallbacks: &[&str], default: &str) -> String {
        match self.field(key, fallbacks) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => default.to_string(),
        }
    }

    fn u64_field(&self, key: &str) -> Option<u64> {
        match self.attr(key)? {
            Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn event_name(&self) -> String {
        self.string_or("event.name", &["event", "name"], "")
    }

    pub fn session_id(&self) -> String {
        self.string_or("session.id", &["sessionId", "session_id"], UNKNOWN_SESSION)
    }

    pub fn timestamp(&self) -> Option<&Value> {
        self.field("event.timestamp", &["time"])
    }

    pub fn kind(&self) -> EventKind {
        EventKind::from_name(&self.event_name())
    }

    /// Normalize into an event with every field resolved.
    pub fn to_event(&self) -> TelemetryEvent {
        let payload = match self.kind() {
            EventKind::UserPrompt => EventPayload::UserPrompt {
                prompt: self.string_or("prompt", &[], ""),
            },
            EventKind::ApiResponse => EventPayload::ApiResponse {
                model: self.string_or("model", &[], ""),
                input_tokens: self.u64_field("input_token_count"),
                output_tokens: self.u64_field("output_token_count"),
                response_text: self.string_or("response_text", &[], ""),
            },
            EventKind::ToolCall => EventPayload::ToolCall {
                function_name: self.string_or("function_name", &[], ""),
                args: render_args(self.attr("function_args")),
                success: self.attr("success").map(truthy),
                duration_ms: self.u64_field("duration_ms"),
            },
            EventKind::Other => EventPayload::Other,
        };

        TelemetryEvent {
            name: self.event_name(),
            timestamp: resolve_timestamp(self.timestamp()),
            session_id: self.session_id(),
            payload,
        }
    }
}

/// Which session log an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    UserPrompt,
    ApiResponse,
    ToolCall,
    Other,
}

impl EventKind {
    /// Classify by the last dotted segment, so `gemini_cli.tool_call` and
    /// `tool_call` are the same kind.
    pub fn from_name(name: &str) -> Self {
        match name.rsplit('.').next().unwrap_or_default() {
            "user_prompt" => Self::UserPrompt,
            "api_response" => Self::ApiResponse,
            "tool_call" => Self::ToolCall,
            _ => Self::Other,
        }
    }
}

/// A record with all fields resolved to concrete values.
#[derive(Debug, Clone)]
pub struct TelemetryEvent {
    pub name: String,
    pub timestamp: DateTime<FixedOffset>,
    pub session_id: String,
    pub payload: EventPayload,
}

impl TelemetryEvent {
    pub fn stamp(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }
}

#[derive(Debug, Clone)]
pub enum EventPayload {
    UserPrompt {
        prompt: String,
    },
    ApiResponse {
        model: String,
        input_tokens: Option<u64>,
        output_tokens: Option<u64>,
        response_text: String,
    },
    ToolCall {
        function_name: String,
        args: String,
        success: Option<bool>,
        duration_ms: Option<u64>,
    },
    Other,
}

/// Numbers above this are epoch milliseconds, below it epoch seconds.
const EPOCH_MILLIS_THRESHOLD: f64 = 1e12;

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// RFC 3339 strings keep their own offset and offset-less ISO strings keep
/// their wall-clock fields. Numbers are epoch seconds or milliseconds, read
/// as UTC. Anything else falls back to the current local time.
fn resolve_timestamp(value: Option<&Value>) -> DateTime<FixedOffset> {
    let parsed = match value {
        Some(Value::String(s)) => parse_timestamp_str(s.trim()),
        Some(Value::Number(n)) => n.as_f64().and_then(from_epoch),
        _ => None,
    };
    parsed.unwrap_or_else(|| Local::now().fixed_offset())
}

fn parse_timestamp_str(s: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(s).ok().or_else(|| {
        NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
            .map(|naive| naive.and_utc().fixed_offset())
    })
}

fn from_epoch(value: f64) -> Option<DateTime<FixedOffset>> {
    if !value.is_finite() {
        return None;
    }
    let millis = if value > EPOCH_MILLIS_THRESHOLD {
        value
    } else {
        value * 1000.0
    };
    DateTime::<Utc>::from_timestamp_millis(millis.round() as i64).map(|dt| dt.fixed_offset())
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => false,
    }
}

/// Tool arguments as compact JSON. String arguments that hold encoded JSON
/// are decoded first.
fn render_args(value: Option<&Value>) -> String {
    let Some(value) = value else {
        return "{}".to_string();
    };
    let decoded;
    let value = match value {
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(inner) => {
                decoded = inner;
                &decoded
            }
            Err(_) => return s.clone(),
        },
        other => other,
    };
    serde_json::to_string(value).unwrap_or_else(|_| format!("{value:?}"))
}
