use crate::analysis::{self, AnalysisReport, AnalysisStatus};
use crate::dump;
use crate::entry::LogEntry;
use crate::extract::{self, AppRow, SettingRow, StatRow};
use crate::kb::KnowledgeBase;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;

/// Everything one rendered report is built from. Serializes to JSON for
/// API consumers; `render_html` turns it into the standalone document.
#[derive(Debug, Clone, Serialize)]
pub struct ReportData {
    pub generated_at: String,
    pub min_severity: i64,
    pub analysis: AnalysisReport,
    pub statistics: Vec<StatRow>,
    pub settings: Vec<SettingRow>,
    pub omnichannel: Vec<SettingRow>,
    pub apps: Vec<AppRow>,
}

/// Human name for the canonical severity tiers; other values render as the
/// bare number.
pub fn level_name(level: i64) -> String {
    match level {
        10 => "DEBUG".to_string(),
        20 => "INFO".to_string(),
        30 => "WARNING".to_string(),
        40 => "ERROR".to_string(),
        50 => "CRITICAL".to_string(),
        other => other.to_string(),
    }
}

/// Analyze every artifact found in `dir` and assemble the report payload.
/// A missing artifact leaves its section empty; a failing section analyzer
/// never fails the report as a whole.
pub fn build_report(dir: &Path, min_severity: i64, kb: &KnowledgeBase) -> ReportData {
    let artifacts = dump::locate_artifacts(dir);

    let analysis = match &artifacts.log {
        Some(path) => analysis::analyze_log_artifact(path, min_severity, kb),
        None => {
            tracing::info!(dir = %dir.display(), "no log artifact found in dump");
            AnalysisReport::empty()
        }
    };

    ReportData {
        generated_at: Utc::now().to_rfc3339(),
        min_severity,
        analysis,
        statistics: artifacts
            .statistics
            .as_deref()
            .map(extract::analyze_statistics)
            .unwrap_or_default(),
        settings: artifacts
            .settings
            .as_deref()
            .map(extract::analyze_settings)
            .unwrap_or_default(),
        omnichannel: artifacts
            .omnichannel
            .as_deref()
            .map(extract::analyze_omnichannel)
            .unwrap_or_default(),
        apps: artifacts
            .apps
            .as_deref()
            .map(extract::analyze_apps)
            .unwrap_or_default(),
    }
}

const STYLE: &str = "body{margin:0;background:#f7fafc;color:#111827;font-family:system-ui,-apple-system,Segoe UI,Arial,sans-serif} .container{max-width:1100px;margin:0 auto;padding:24px} .header{display:flex;align-items:baseline;justify-content:space-between;gap:12px;margin-bottom:16px} .title{font-size:20px;font-weight:600} .sub{color:#6b7280;font-size:13px} .grid{display:grid;grid-template-columns:repeat(4,minmax(0,1fr));gap:12px} .card{background:#ffffff;border:1px solid #e5e7eb;border-radius:10px;padding:14px} .metric{display:flex;align-items:center;justify-content:space-between} .metric .label{color:#6b7280;font-size:12px} .metric .value{font-size:22px;font-weight:700} .value.err{color:#dc2626} .section{margin-top:18px} .section h3{margin:0 0 10px 0;font-size:16px;font-weight:600} .table{width:100%;border-collapse:separate;border-spacing:0;background:#ffffff;border:1px solid #e5e7eb;border-radius:10px;overflow:hidden} .table th{background:#f3f4f6;text-align:left;font-weight:600;padding:10px;border-bottom:1px solid #e5e7eb} .table td{padding:10px;border-bottom:1px solid #e5e7eb;vertical-align:top} .chip{display:inline-block;border-radius:999px;padding:3px 10px;font-size:12px;border:1px solid #e5e7eb} .sev-high{background:#fee2e2;color:#7f1d1d} .sev-medium{background:#fde68a;color:#854d0e} .sev-low{background:#dbeafe;color:#1e3a8a} .code{font-family:Consolas,Monaco,monospace;font-size:12px;white-space:pre-wrap} .empty{color:#6b7280;font-style:italic} .banner{background:#fee2e2;color:#7f1d1d;border:1px solid #fecaca;border-radius:10px;padding:12px;margin-bottom:14px} .footer{margin-top:22px;color:#6b7280;font-size:12px} @media (max-width:800px){.grid{grid-template-columns:repeat(2,minmax(0,1fr))}}";

/// Render the report payload into one self-contained HTML document.
pub fn render_html(report: &ReportData) -> String {
    let mut s = String::new();
    s.push_str("<!DOCTYPE html><html lang=\"en\"><head><meta charset=\"utf-8\"><meta name=\"viewport\" content=\"width=device-width, initial-scale=1\"><title>Support Dump Analysis</title><style>");
    s.push_str(STYLE);
    s.push_str("</style></head><body><div class=\"container\">");

    s.push_str("<div class=\"header\"><div class=\"title\">Support Dump Analysis</div>");
    s.push_str(&format!(
        "<div class=\"sub\">{} | minimum level {}</div></div>",
        html_escape(&report.generated_at),
        html_escape(&level_name(report.min_severity)),
    ));

    if report.analysis.status == AnalysisStatus::Failed {
        let reason = report.analysis.error.as_deref().unwrap_or("unknown error");
        s.push_str(&format!(
            "<div class=\"banner\">Log analysis failed: {}</div>",
            html_escape(reason)
        ));
    }

    s.push_str("<div class=\"grid\">");
    metric(&mut s, "Log Entries", &report.analysis.total_error_count.to_string(), report.analysis.total_error_count > 0);
    metric(&mut s, "Distinct Messages", &report.analysis.summary.len().to_string(), false);
    metric(&mut s, "Recommendations", &report.analysis.recommendations.len().to_string(), false);
    metric(&mut s, "Installed Apps", &report.apps.len().to_string(), false);
    s.push_str("</div>");

    render_recommendations(&mut s, report);
    render_summary(&mut s, report);
    render_statistics(&mut s, report);
    render_settings(&mut s, "Workspace Settings", &report.settings);
    render_settings(&mut s, "Omnichannel Settings", &report.omnichannel);
    render_apps(&mut s, report);
    render_log_entries(&mut s, report);

    s.push_str("<div class=\"footer\">Generated by dumpscope ");
    s.push_str(env!("CARGO_PKG_VERSION"));
    s.push_str("</div></div></body></html>");
    s
}

fn metric(s: &mut String, label: &str, value: &str, highlight: bool) {
    let class = if highlight { "value err" } else { "value" };
    s.push_str(&format!(
        "<div class=\"card metric\"><div class=\"label\">{}</div><div class=\"{}\">{}</div></div>",
        html_escape(label),
        class,
        html_escape(value)
    ));
}

fn section_open(s: &mut String, title: &str) {
    s.push_str(&format!(
        "<div class=\"section\"><h3>{}</h3>",
        html_escape(title)
    ));
}

fn empty_section(s: &mut String, title: &str) {
    section_open(s, title);
    s.push_str("<div class=\"card empty\">No data</div></div>");
}

fn render_recommendations(s: &mut String, report: &ReportData) {
    if report.analysis.recommendations.is_empty() {
        empty_section(s, "Recommendations");
        return;
    }
    section_open(s, "Recommendations");
    s.push_str("<table class=\"table\"><thead><tr><th>Severity</th><th>Rule</th><th>Recommendation</th></tr></thead><tbody>");
    for rule in &report.analysis.recommendations {
        let severity = rule.severity.as_deref().unwrap_or("medium");
        let chip = match severity {
            "high" => "chip sev-high",
            "low" => "chip sev-low",
            _ => "chip sev-medium",
        };
        s.push_str(&format!(
            "<tr><td><span class=\"{}\">{}</span></td><td>{}</td><td>{}</td></tr>",
            chip,
            html_escape(severity),
            html_escape(&rule.title),
            html_escape(&rule.recommendation)
        ));
    }
    s.push_str("</tbody></table></div>");
}

fn render_summary(s: &mut String, report: &ReportData) {
    if report.analysis.summary.is_empty() {
        empty_section(s, "Error Summary");
        return;
    }
    section_open(s, "Error Summary");
    s.push_str("<table class=\"table\"><thead><tr><th>Message</th><th>Count</th><th>Last Seen</th></tr></thead><tbody>");
    for row in &report.analysis.summary {
        s.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td class=\"sub\">{}</td></tr>",
            html_escape(&row.message),
            row.count,
            html_escape(&row.last_seen)
        ));
    }
    s.push_str("</tbody></table></div>");
}

fn render_statistics(s: &mut String, report: &ReportData) {
    if report.statistics.is_empty() {
        empty_section(s, "Server Statistics");
        return;
    }
    section_open(s, "Server Statistics");
    s.push_str("<table class=\"table\"><thead><tr><th>Statistic</th><th>Value</th></tr></thead><tbody>");
    for row in &report.statistics {
        s.push_str(&format!(
            "<tr><td>{}</td><td>{}</td></tr>",
            html_escape(&row.statistic),
            html_escape(&row.value)
        ));
    }
    s.push_str("</tbody></table></div>");
}

fn render_settings(s: &mut String, title: &str, rows: &[SettingRow]) {
    if rows.is_empty() {
        empty_section(s, title);
        return;
    }
    section_open(s, title);
    s.push_str("<table class=\"table\"><thead><tr><th>Setting</th><th>Value</th></tr></thead><tbody>");
    for row in rows {
        s.push_str(&format!(
            "<tr><td>{}</td><td class=\"code\">{}</td></tr>",
            html_escape(&row.setting),
            html_escape(&row.value)
        ));
    }
    s.push_str("</tbody></table></div>");
}

fn render_apps(s: &mut String, report: &ReportData) {
    if report.apps.is_empty() {
        empty_section(s, "Installed Apps");
        return;
    }
    section_open(s, "Installed Apps");
    s.push_str("<table class=\"table\"><thead><tr><th>Name</th><th>Version</th><th>Status</th></tr></thead><tbody>");
    for app in &report.apps {
        s.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
            html_escape(app.name.as_deref().unwrap_or("")),
            html_escape(app.version.as_deref().unwrap_or("")),
            html_escape(app.status.as_deref().unwrap_or(""))
        ));
    }
    s.push_str("</tbody></table></div>");
}

fn render_log_entries(s: &mut String, report: &ReportData) {
    if report.analysis.all_errors.is_empty() {
        empty_section(s, "All Log Entries");
        return;
    }
    section_open(s, "All Log Entries");
    s.push_str("<table class=\"table\"><thead><tr><th>Level</th><th>Time</th><th>Message</th><th>Details</th></tr></thead><tbody>");
    for entry in &report.analysis.all_errors {
        s.push_str(&format!(
            "<tr><td>{}</td><td class=\"sub\">{}</td><td>{}</td><td class=\"code\">{}</td></tr>",
            html_escape(&entry.severity.map(level_name).unwrap_or_default()),
            html_escape(entry.timestamp.as_deref().unwrap_or("")),
            html_escape(&entry.message),
            html_escape(&entry_details(entry))
        ));
    }
    s.push_str("</tbody></table>");

    let shown = report.analysis.all_errors.len() as u64;
    if report.analysis.total_error_count > shown {
        s.push_str(&format!(
            "<div class=\"sub\">{} more entries not shown</div>",
            report.analysis.total_error_count - shown
        ));
    }
    s.push_str("</div>");
}

/// Compact `key=value` rendering of an entry's passthrough fields.
fn entry_details(entry: &LogEntry) -> String {
    entry
        .extra
        .iter()
        .map(|(key, value)| match value {
            Value::String(v) => format!("{key}={v}"),
            other => format!("{key}={other}"),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
