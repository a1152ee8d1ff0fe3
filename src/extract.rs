use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs;
use std::path::Path;

const SENSITIVE_SUBSTRINGS: [&str; 3] = ["password", "secret", "token"];
const REDACTED: &str = "REDACTED";

/// One workspace/omnichannel setting, post-redaction.
#[derive(Debug, Clone, Serialize)]
pub struct SettingRow {
    pub setting: String,
    pub value: String,
}

/// One installed app/extension.
#[derive(Debug, Clone, Serialize)]
pub struct AppRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// One server statistic.
#[derive(Debug, Clone, Serialize)]
pub struct StatRow {
    pub statistic: String,
    pub value: String,
}

/// The two shapes a settings artifact is observed in: a map of id to value,
/// or a list of `{_id, value}` objects. Normalized to the list shape before
/// redaction.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SettingsDocument {
    List(Vec<Value>),
    Map(Map<String, Value>),
}

impl SettingsDocument {
    fn into_items(self) -> Vec<Value> {
        match self {
            SettingsDocument::List(items) => items,
            SettingsDocument::Map(map) => map
                .into_iter()
                .map(|(key, value)| json!({ "_id": key, "value": value }))
                .collect(),
        }
    }
}

fn read_json(path: &Path) -> Option<Value> {
    let data = match fs::read(path) {
        Ok(d) => d,
        Err(err) => {
            tracing::error!(path = %path.display(), %err, "failed to read artifact");
            return None;
        }
    };
    match serde_json::from_slice(&data) {
        Ok(v) => Some(v),
        Err(err) => {
            tracing::error!(path = %path.display(), %err, "failed to parse artifact");
            None
        }
    }
}

/// Format a setting value for display: structures as pretty JSON, null as
/// the empty string, scalars verbatim.
fn format_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(v @ Value::Object(_)) | Some(v @ Value::Array(_)) => {
            serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string())
        }
        Some(other) => other.to_string(),
    }
}

fn is_sensitive(key: &str) -> bool {
    let lower = key.to_lowercase();
    SENSITIVE_SUBSTRINGS.iter().any(|s| lower.contains(s))
}

/// Turn a normalized settings list into rows, redacting values whose key
/// names credentials. Items that are not objects or lack `_id` are skipped.
fn process_settings_items(items: Vec<Value>) -> Vec<SettingRow> {
    let mut rows = Vec::new();
    for item in items {
        let Value::Object(map) = item else { continue };
        let Some(key) = map.get("_id").and_then(Value::as_str) else {
            continue;
        };
        let value = if is_sensitive(key) {
            REDACTED.to_string()
        } else {
            format_value(map.get("value"))
        };
        rows.push(SettingRow {
            setting: key.to_string(),
            value,
        });
    }
    rows
}

/// Parse the main settings artifact, handling both map and list layouts.
pub fn analyze_settings(path: &Path) -> Vec<SettingRow> {
    let Some(doc) = read_json(path) else {
        return Vec::new();
    };
    match serde_json::from_value::<SettingsDocument>(doc) {
        Ok(document) => process_settings_items(document.into_items()),
        Err(err) => {
            tracing::warn!(path = %path.display(), %err, "settings artifact has unexpected shape");
            Vec::new()
        }
    }
}

fn non_empty(value: &Value) -> bool {
    match value {
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        _ => false,
    }
}

/// Parse omnichannel settings from any of the observed layouts: the list
/// under `config.settings`, under `settings`, or the document root itself.
pub fn analyze_omnichannel(path: &Path) -> Vec<SettingRow> {
    let Some(doc) = read_json(path) else {
        return Vec::new();
    };

    let located = match &doc {
        Value::Array(_) => Some(doc.clone()),
        Value::Object(map) => map
            .get("config")
            .and_then(|c| c.get("settings"))
            .filter(|v| non_empty(v))
            .or_else(|| map.get("settings").filter(|v| non_empty(v)))
            .cloned()
            .or_else(|| Some(doc.clone())),
        _ => None,
    };

    let items = match located {
        Some(Value::Array(items)) => items,
        Some(Value::Object(map)) => map
            .into_iter()
            .map(|(key, value)| json!({ "_id": key, "value": value }))
            .collect(),
        _ => Vec::new(),
    };

    if items.is_empty() {
        tracing::warn!(path = %path.display(), "no settings list found in omnichannel artifact");
        return Vec::new();
    }
    process_settings_items(items)
}

/// Parse the installed-apps artifact: `{apps: [...]}` or a bare array.
pub fn analyze_apps(path: &Path) -> Vec<AppRow> {
    let Some(doc) = read_json(path) else {
        return Vec::new();
    };
    let apps = match doc {
        Value::Object(map) => match map.get("apps").and_then(Value::as_array) {
            Some(items) => items.clone(),
            None => Vec::new(),
        },
        Value::Array(items) => items,
        _ => Vec::new(),
    };
    if apps.is_empty() {
        tracing::info!(path = %path.display(), "no apps found in apps artifact");
    }

    apps.iter()
        .map(|app| AppRow {
            name: app.get("name").and_then(Value::as_str).map(String::from),
            version: app.get("version").and_then(Value::as_str).map(String::from),
            status: app.get("status").and_then(Value::as_str).map(String::from),
        })
        .collect()
}

/// Project the server-statistics artifact into labeled rows, dropping
/// absent values.
pub fn analyze_statistics(path: &Path) -> Vec<StatRow> {
    let Some(doc) = read_json(path) else {
        return Vec::new();
    };

    let fields: [(&str, Option<&Value>); 8] = [
        ("Version", doc.get("version")),
        ("Total Users", doc.get("totalUsers")),
        ("Active Users", doc.get("activeUsers")),
        ("Total Rooms", doc.get("totalRooms")),
        ("Omnichannel Enabled", doc.get("livechatEnabled")),
        ("OS Type", doc.get("os").and_then(|os| os.get("type"))),
        (
            "Node Version",
            doc.get("process").and_then(|p| p.get("nodeVersion")),
        ),
        ("MongoDB Version", doc.get("mongoVersion")),
    ];

    fields
        .into_iter()
        .filter_map(|(label, value)| match value {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some((label, s.clone())),
            Some(other) => Some((label, other.to_string())),
        })
        .map(|(label, value)| StatRow {
            statistic: label.to_string(),
            value,
        })
        .collect()
}
