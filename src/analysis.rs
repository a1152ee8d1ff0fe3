use crate::entry::LogEntry;
use crate::ingest;
use crate::kb::{KbRule, KnowledgeBase};
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Cap on raw entries carried into the report; the total count is taken
/// before the cap so consumers can say "N more not shown".
pub const MAX_RAW_ENTRIES: usize = 500;

/// Threshold at or below which severity-less entries are kept.
pub const SEVERITY_INFO: i64 = 20;

/// Aggregate of all filtered entries sharing identical message text.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryRow {
    pub message: String,
    pub count: u64,
    /// Timestamp of the most recently processed occurrence, in input order.
    /// Overwritten on every occurrence, including by an empty string when
    /// that occurrence had no timestamp.
    pub last_seen: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Complete,
    Failed,
}

/// Output contract of one log analysis pass. Serializes losslessly to JSON;
/// the API layer emits it verbatim.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub status: AnalysisStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub summary: Vec<SummaryRow>,
    pub all_errors: Vec<LogEntry>,
    pub total_error_count: u64,
    pub recommendations: Vec<KbRule>,
}

impl AnalysisReport {
    /// Well-formed result with no data, e.g. when the dump carries no log
    /// artifact at all.
    pub fn empty() -> AnalysisReport {
        AnalysisReport {
            status: AnalysisStatus::Complete,
            error: None,
            summary: Vec::new(),
            all_errors: Vec::new(),
            total_error_count: 0,
            recommendations: Vec::new(),
        }
    }

    /// Empty result that records why the analysis could not run.
    pub fn failed(reason: String) -> AnalysisReport {
        AnalysisReport {
            status: AnalysisStatus::Failed,
            error: Some(reason),
            ..AnalysisReport::empty()
        }
    }
}

/// Keep an entry iff its severity clears the threshold, or it has no
/// severity and the threshold is at or below the informational tier. The
/// second clause is what lets plain-text fallback lines (which never carry
/// a severity) surface in low-threshold reports while staying out of
/// error-only ones.
pub fn filter_by_severity(entries: Vec<LogEntry>, min_severity: i64) -> Vec<LogEntry> {
    entries
        .into_iter()
        .filter(|entry| match entry.severity {
            Some(level) => level >= min_severity,
            None => min_severity <= SEVERITY_INFO,
        })
        .collect()
}

/// Single pass over the filtered entries: group by exact message text,
/// count occurrences, track the last-seen timestamp, then sort by count
/// descending (stable, so equal counts keep first-encounter order).
pub fn aggregate(filtered: &[LogEntry]) -> Vec<SummaryRow> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut rows: Vec<SummaryRow> = Vec::new();

    for entry in filtered {
        let slot = match index.get(entry.message.as_str()) {
            Some(&slot) => slot,
            None => {
                rows.push(SummaryRow {
                    message: entry.message.clone(),
                    count: 0,
                    last_seen: String::new(),
                });
                index.insert(entry.message.as_str(), rows.len() - 1);
                rows.len() - 1
            }
        };
        rows[slot].count += 1;
        rows[slot].last_seen = entry.timestamp.clone().unwrap_or_default();
    }

    rows.sort_by(|a, b| b.count.cmp(&a.count));
    rows
}

/// Run the full pipeline over already-normalized entries.
pub fn analyze_entries(
    entries: Vec<LogEntry>,
    min_severity: i64,
    kb: &KnowledgeBase,
) -> AnalysisReport {
    let filtered = filter_by_severity(entries, min_severity);
    let total_error_count = filtered.len() as u64;
    if filtered.is_empty() {
        tracing::info!(min_severity, "no log entries at or above threshold");
    }

    let summary = aggregate(&filtered);
    let recommendations = kb.match_entries(&filtered);

    // Cap applies after total accounting, keeping the most recent entries.
    let skip = filtered.len().saturating_sub(MAX_RAW_ENTRIES);
    let all_errors: Vec<LogEntry> = filtered.into_iter().skip(skip).collect();

    AnalysisReport {
        status: AnalysisStatus::Complete,
        error: None,
        summary,
        all_errors,
        total_error_count,
        recommendations,
    }
}

/// Outer boundary of one analysis invocation: read the artifact, normalize,
/// filter, aggregate and match. Any failure here (missing file, undecodable
/// bytes) is reported in the result's status instead of propagating, so a
/// report covering several independent sections can always be assembled.
pub fn analyze_log_artifact(path: &Path, min_severity: i64, kb: &KnowledgeBase) -> AnalysisReport {
    match fs::read_to_string(path) {
        Ok(raw) => analyze_entries(ingest::normalize(&raw), min_severity, kb),
        Err(err) => {
            tracing::error!(path = %path.display(), %err, "log analysis failed");
            AnalysisReport::failed(format!("failed to read {}: {err}", path.display()))
        }
    }
}
