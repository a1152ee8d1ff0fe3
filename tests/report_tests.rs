use dumpscope::analysis::AnalysisStatus;
use dumpscope::dump::{find_dump_root, locate_artifacts};
use dumpscope::kb::KnowledgeBase;
use dumpscope::report::{build_report, level_name, render_html};
use std::fs;
use std::path::Path;

fn write_dump_fixture(dir: &Path) {
    fs::write(
        dir.join("log.json"),
        r#"{"queue":[
            {"string":"{\"msg\":\"MongoTimeoutException: pool drained\",\"level\":50,\"time\":\"2024-03-01T10:00:00Z\"}"},
            {"string":"{\"msg\":\"MongoTimeoutException: pool drained\",\"level\":50,\"time\":\"2024-03-01T10:05:00Z\"}"},
            {"string":"{\"msg\":\"login ok\",\"level\":20}"}
        ]}"#,
    )
    .unwrap();
    fs::write(
        dir.join("server-statistics.json"),
        r#"{"version": "6.5.0", "totalUsers": 42}"#,
    )
    .unwrap();
    fs::write(
        dir.join("settings.json"),
        r#"[{"_id": "Site_Url", "value": "https://chat.example.com"},
            {"_id": "SMTP_Password", "value": "x"}]"#,
    )
    .unwrap();
    fs::write(
        dir.join("omnichannel-settings.json"),
        r#"{"settings": [{"_id": "Livechat_enabled", "value": true}]}"#,
    )
    .unwrap();
    fs::write(
        dir.join("apps-installed.json"),
        r#"{"apps": [{"name": "Jitsi", "version": "1.0.0", "status": "enabled"}]}"#,
    )
    .unwrap();
}

#[test]
fn build_report_populates_every_section() {
    let dir = tempfile::tempdir().unwrap();
    write_dump_fixture(dir.path());

    let data = build_report(dir.path(), 40, &KnowledgeBase::builtin());
    assert_eq!(data.analysis.status, AnalysisStatus::Complete);
    assert_eq!(data.analysis.total_error_count, 2);
    assert_eq!(data.analysis.summary.len(), 1);
    assert_eq!(data.analysis.summary[0].count, 2);
    assert_eq!(data.analysis.summary[0].last_seen, "2024-03-01T10:05:00Z");
    assert_eq!(data.analysis.recommendations.len(), 1);
    assert_eq!(data.analysis.recommendations[0].title, "mongo-timeout");
    assert_eq!(data.statistics.len(), 2);
    assert_eq!(data.settings.len(), 2);
    assert_eq!(data.settings[1].value, "REDACTED");
    assert_eq!(data.omnichannel.len(), 1);
    assert_eq!(data.apps.len(), 1);
}

#[test]
fn build_report_with_missing_artifacts_yields_empty_sections() {
    let dir = tempfile::tempdir().unwrap();
    let data = build_report(dir.path(), 40, &KnowledgeBase::empty());
    assert_eq!(data.analysis.status, AnalysisStatus::Complete);
    assert_eq!(data.analysis.total_error_count, 0);
    assert!(data.statistics.is_empty());
    assert!(data.settings.is_empty());
    assert!(data.apps.is_empty());
}

#[test]
fn report_data_serializes_for_api_consumers() {
    let dir = tempfile::tempdir().unwrap();
    write_dump_fixture(dir.path());
    let data = build_report(dir.path(), 40, &KnowledgeBase::builtin());

    let value = serde_json::to_value(&data).unwrap();
    assert_eq!(value["min_severity"], 40);
    assert_eq!(value["analysis"]["status"], "complete");
    assert_eq!(value["analysis"]["total_error_count"], 2);
    assert_eq!(value["statistics"][0]["statistic"], "Version");
    assert_eq!(value["apps"][0]["name"], "Jitsi");
}

#[test]
fn html_report_escapes_untrusted_text() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("log.json"),
        "{\"msg\":\"<script>alert(1)</script>\",\"level\":50}\n{\"msg\":\"second\",\"level\":50}\n",
    )
    .unwrap();

    let data = build_report(dir.path(), 40, &KnowledgeBase::empty());
    let html = render_html(&data);
    assert!(html.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
    assert!(!html.contains("<script>alert(1)</script>"));
}

#[test]
fn html_report_mentions_entries_beyond_the_cap() {
    let dir = tempfile::tempdir().unwrap();
    let lines: String = (0..501)
        .map(|i| format!("{{\"msg\":\"e{i}\",\"level\":50}}\n"))
        .collect();
    fs::write(dir.path().join("log.json"), lines).unwrap();

    let data = build_report(dir.path(), 40, &KnowledgeBase::empty());
    assert_eq!(data.analysis.total_error_count, 501);
    assert_eq!(data.analysis.all_errors.len(), 500);

    let html = render_html(&data);
    assert!(html.contains("1 more entries not shown"));
}

#[test]
fn html_report_renders_empty_sections_as_no_data() {
    let dir = tempfile::tempdir().unwrap();
    let data = build_report(dir.path(), 40, &KnowledgeBase::empty());
    let html = render_html(&data);
    assert!(html.contains("Support Dump Analysis"));
    assert!(html.contains("No data"));
    assert!(html.contains("minimum level ERROR"));
}

#[test]
fn level_names_cover_the_canonical_tiers() {
    assert_eq!(level_name(10), "DEBUG");
    assert_eq!(level_name(20), "INFO");
    assert_eq!(level_name(30), "WARNING");
    assert_eq!(level_name(40), "ERROR");
    assert_eq!(level_name(50), "CRITICAL");
    assert_eq!(level_name(45), "45");
}

#[test]
fn dump_root_is_found_by_the_statistics_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("bundle").join("support-dump");
    fs::create_dir_all(&nested).unwrap();
    fs::write(nested.join("2024-server-statistics.json"), "{}").unwrap();

    assert_eq!(find_dump_root(dir.path()).unwrap(), nested);
}

#[test]
fn dump_root_falls_back_to_a_log_artifact_at_the_base() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("workspace-log.json"), "{}").unwrap();
    assert_eq!(find_dump_root(dir.path()).unwrap(), dir.path());

    let empty = tempfile::tempdir().unwrap();
    assert!(find_dump_root(empty.path()).is_none());
}

#[test]
fn settings_artifact_excludes_the_omnichannel_file() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("omnichannel-settings.json"), "[]").unwrap();
    fs::write(dir.path().join("workspace-settings.json"), "[]").unwrap();

    let artifacts = locate_artifacts(dir.path());
    let settings = artifacts.settings.unwrap();
    assert!(settings.ends_with("workspace-settings.json"));
    let omnichannel = artifacts.omnichannel.unwrap();
    assert!(omnichannel.ends_with("omnichannel-settings.json"));
}
