use crate::entry::LogEntry;
use serde_json::Value;

/// Outcome of one parse strategy applied to the whole artifact.
///
/// Format detection is an ordered sequence of attempts, each reporting
/// applicability as a value; only a strategy that declares itself
/// `NotApplicable` lets the next one run. A strategy that applies owns the
/// whole input, even when it produced zero entries.
enum ParseAttempt {
    Parsed(Vec<LogEntry>),
    NotApplicable,
}

/// Normalize raw artifact text into an ordered sequence of log entries.
///
/// Strategies, in order:
/// 1. a single JSON document with a `queue` array whose items wrap one
///    JSON-encoded log line each inside a `string` field;
/// 2. line-oriented parsing: JSON-Lines with a plain-text fallback for
///    lines that do not look like JSON objects.
///
/// Empty input yields an empty sequence. Malformed nested records are
/// skipped individually and never abort the pass.
pub fn normalize(raw: &str) -> Vec<LogEntry> {
    match parse_queue_document(raw) {
        ParseAttempt::Parsed(entries) => entries,
        ParseAttempt::NotApplicable => parse_lines(raw),
    }
}

/// Whole-document layout: `{"queue": [{"string": "{...escaped log...}"}]}`.
///
/// A document that parses as JSON but has no `queue` array still counts as
/// this layout (with zero entries); only a syntax error on the document
/// falls through to line parsing.
fn parse_queue_document(raw: &str) -> ParseAttempt {
    let doc: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(_) => return ParseAttempt::NotApplicable,
    };

    let mut entries = Vec::new();
    if let Some(queue) = doc.get("queue").and_then(Value::as_array) {
        for item in queue {
            let Some(wrapped) = item.get("string").and_then(Value::as_str) else {
                continue;
            };
            match serde_json::from_str::<Value>(wrapped) {
                Ok(inner) => match LogEntry::from_value(inner) {
                    Some(entry) => entries.push(entry),
                    None => tracing::debug!("skipping queue item with non-object payload"),
                },
                Err(err) => tracing::debug!(%err, "skipping queue item with malformed payload"),
            }
        }
    } else {
        tracing::debug!("document parsed as JSON but carries no queue array");
    }
    ParseAttempt::Parsed(entries)
}

fn parse_lines(raw: &str) -> Vec<LogEntry> {
    let mut entries = Vec::new();
    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(value @ Value::Object(_)) => {
                if let Some(entry) = LogEntry::from_value(value) {
                    entries.push(entry);
                }
            }
            _ if !trimmed.starts_with('{') => entries.push(LogEntry::plain_text(trimmed)),
            _ => tracing::warn!(line = trimmed, "skipping malformed log line"),
        }
    }
    entries
}
