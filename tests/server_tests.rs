use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use dumpscope::config::Config;
use dumpscope::kb::KnowledgeBase;
use dumpscope::server::{build_router, AppState};
use http_body_util::BodyExt;
use serde_json::Value;
use std::io::Write;
use tower::ServiceExt;
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;

const BOUNDARY: &str = "dumpscope-test-boundary";

fn test_app() -> (Router, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        upload_dir: dir.path().join("uploads"),
        ..Config::default()
    };
    let state = AppState::new(config, KnowledgeBase::builtin());
    (build_router(state), dir)
}

fn dump_zip_bytes() -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        writer
            .start_file("support-dump/log.json", options)
            .unwrap();
        writer
            .write_all(
                br#"{"queue":[
                    {"string":"{\"msg\":\"MongoTimeoutException: pool drained\",\"level\":50}"},
                    {"string":"{\"msg\":\"MongoTimeoutException: pool drained\",\"level\":50}"},
                    {"string":"{\"msg\":\"login ok\",\"level\":20}"}
                ]}"#,
            )
            .unwrap();
        writer
            .start_file("support-dump/server-statistics.json", options)
            .unwrap();
        writer
            .write_all(br#"{"version":"6.5.0","totalUsers":42}"#)
            .unwrap();
        writer.finish().unwrap();
    }
    cursor.into_inner()
}

fn multipart_upload(filename: &str, bytes: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"support_dump\"; filename=\"{filename}\"\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/zip\r\n\r\n");
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_service_identity() {
    let (app, _dir) = test_app();
    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "dumpscope-server");
}

#[tokio::test]
async fn root_lists_endpoints() {
    let (app, _dir) = test_app();
    let response = app
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["name"], "dumpscope");
    assert!(body["endpoints"]["upload"].is_string());
}

#[tokio::test]
async fn unknown_session_is_404() {
    let (app, _dir) = test_app();
    for uri in [
        "/api/results/nope",
        "/api/report/nope",
    ] {
        let response = app
            .clone()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
    }

    let response = app
        .oneshot(
            Request::post("/api/analyze/nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn upload_without_a_file_part_is_rejected() {
    let (app, _dir) = test_app();
    let response = app
        .oneshot(
            Request::post("/api/upload")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .body(Body::from(format!("--{BOUNDARY}--\r\n")))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn upload_rejects_non_zip_files() {
    let (app, _dir) = test_app();
    let response = app
        .oneshot(multipart_upload("notes.txt", b"plain text"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().contains("zip"));
}

#[tokio::test]
async fn upload_rejects_invalid_archives_and_cleans_up() {
    let (app, _dir) = test_app();
    let response = app
        .clone()
        .oneshot(multipart_upload("dump.zip", b"not actually a zip"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(Request::get("/api/sessions").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["active_sessions"], 0);
}

#[tokio::test]
async fn invalid_log_level_name_is_rejected() {
    let (app, _dir) = test_app();
    let response = app
        .oneshot(
            Request::post("/api/analyze/whatever")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"log_level":"bogus"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn upload_analyze_results_report_and_cleanup_flow() {
    let (app, _dir) = test_app();

    let response = app
        .clone()
        .oneshot(multipart_upload("dump.zip", &dump_zip_bytes()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "success");
    let session_id = body["session_id"].as_str().unwrap().to_string();

    // Analysis is not complete yet.
    let response = app
        .clone()
        .oneshot(
            Request::get(format!("/api/results/{session_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(
            Request::post(format!("/api/analyze/{session_id}"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"log_level":"critical"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["total_error_count"], 2);

    let response = app
        .clone()
        .oneshot(
            Request::get(format!("/api/results/{session_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["analysis"]["status"], "complete");
    assert_eq!(body["analysis"]["total_error_count"], 2);
    assert_eq!(body["analysis"]["summary"][0]["count"], 2);
    assert_eq!(
        body["analysis"]["recommendations"][0]["title"],
        "mongo-timeout"
    );
    assert_eq!(body["statistics"][0]["statistic"], "Version");

    let response = app
        .clone()
        .oneshot(
            Request::get(format!("/api/report/{session_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let html = String::from_utf8(
        response
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec(),
    )
    .unwrap();
    assert!(html.contains("Support Dump Analysis"));
    assert!(html.contains("MongoTimeoutException"));

    let response = app
        .clone()
        .oneshot(
            Request::delete(format!("/api/sessions/{session_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::get(format!("/api/results/{session_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn sessions_listing_tracks_uploads() {
    let (app, _dir) = test_app();

    let response = app
        .clone()
        .oneshot(multipart_upload("dump.zip", &dump_zip_bytes()))
        .await
        .unwrap();
    let session_id = json_body(response).await["session_id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .oneshot(Request::get("/api/sessions").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["active_sessions"], 1);
    assert_eq!(body["sessions"][&session_id]["status"], "uploaded");
    assert_eq!(body["sessions"][&session_id]["has_error"], false);
}
