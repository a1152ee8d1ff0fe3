use serde::Serialize;
use serde_json::{Map, Value};

/// Placeholder used when a parseable record carries no message field.
pub const DEFAULT_MESSAGE: &str = "Unknown Error";

/// One observed log record, normalized from any of the on-disk layouts.
///
/// `message`, `severity` and `timestamp` are lifted out of the raw record
/// (wire names `msg`, `level`, `time`); every other field is preserved
/// untouched in `extra` and travels with the entry into the report.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    #[serde(rename = "msg")]
    pub message: String,
    #[serde(rename = "level", skip_serializing_if = "Option::is_none")]
    pub severity: Option<i64>,
    #[serde(rename = "time", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LogEntry {
    /// Build an entry from a parsed JSON value. Returns `None` for anything
    /// that is not a JSON object; field extraction itself never fails.
    pub fn from_value(value: Value) -> Option<LogEntry> {
        let Value::Object(mut map) = value else {
            return None;
        };

        let message = match map.remove("msg") {
            Some(Value::String(s)) => s,
            Some(Value::Null) | None => DEFAULT_MESSAGE.to_string(),
            Some(other) => other.to_string(),
        };

        // A non-integer level is not a severity; leave it in the open map.
        let severity = match map.get("level").and_then(Value::as_i64) {
            Some(level) => {
                map.remove("level");
                Some(level)
            }
            None => None,
        };

        let timestamp = match map.get("time") {
            Some(Value::String(_)) | Some(Value::Number(_)) => match map.remove("time") {
                Some(Value::String(s)) => Some(s),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            },
            Some(Value::Null) => {
                map.remove("time");
                None
            }
            _ => None,
        };

        Some(LogEntry {
            message,
            severity,
            timestamp,
            extra: map,
        })
    }

    /// Minimal entry synthesized from a raw text line that was not JSON.
    pub fn plain_text(line: &str) -> LogEntry {
        LogEntry {
            message: line.to_string(),
            severity: None,
            timestamp: None,
            extra: Map::new(),
        }
    }
}
