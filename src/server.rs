use crate::archive;
use crate::config::Config;
use crate::dump;
use crate::kb::KnowledgeBase;
use crate::report::{self, ReportData};
use crate::session::{SessionStatus, SessionStore};
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::{delete, get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

const DEFAULT_MIN_LEVEL: i64 = 40;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Shared state injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub kb: Arc<KnowledgeBase>,
    pub sessions: Arc<SessionStore>,
}

impl AppState {
    pub fn new(config: Config, kb: KnowledgeBase) -> AppState {
        AppState {
            config: Arc::new(config),
            kb: Arc::new(kb),
            sessions: Arc::new(SessionStore::new()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("analysis failed: {0}")]
    AnalysisFailed(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::SessionNotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::AnalysisFailed(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            // Internal details are logged, never surfaced to the client.
            ApiError::Internal(err) => {
                tracing::error!(%err, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub fn build_router(state: AppState) -> Router {
    let body_limit = usize::try_from(state.config.max_upload_size).unwrap_or(usize::MAX);

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/api/upload", post(upload_handler))
        .route("/api/analyze/{session_id}", post(analyze_handler))
        .route("/api/results/{session_id}", get(results_handler))
        .route("/api/report/{session_id}", get(report_handler))
        .route("/api/sessions", get(list_sessions_handler))
        .route("/api/sessions/{session_id}", delete(delete_session_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
                .layer(DefaultBodyLimit::max(body_limit))
                .layer(CorsLayer::new()),
        )
        .with_state(state)
}

/// Periodically remove sessions past their TTL along with their working
/// directories.
pub fn spawn_session_purge(state: AppState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let ttl = Duration::from_secs(state.config.session_ttl_secs);
        let mut interval = tokio::time::interval(ttl.min(Duration::from_secs(60)));
        loop {
            interval.tick().await;
            for session in state.sessions.purge_expired(ttl) {
                info!(id = %session.id, "purging expired session");
                remove_work_dir(&session.work_dir).await;
            }
        }
    })
}

async fn remove_work_dir(dir: &std::path::Path) {
    if let Err(err) = tokio::fs::remove_dir_all(dir).await {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!(dir = %dir.display(), %err, "failed to remove session directory");
        }
    }
}

async fn root_handler() -> Json<serde_json::Value> {
    Json(json!({
        "name": "dumpscope",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "/health",
            "upload": "/api/upload",
            "analyze": "/api/analyze/{session_id}",
            "results": "/api/results/{session_id}",
            "report": "/api/report/{session_id}",
            "sessions": "/api/sessions"
        }
    }))
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "dumpscope-server",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Keep only the final path component and replace anything that is not a
/// conservative filename character.
fn sanitize_filename(name: &str) -> String {
    let base = std::path::Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    base.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

async fn upload_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut upload: Option<(String, Bytes)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::BadRequest(format!("invalid multipart body: {err}")))?
    {
        if field.name() == Some("support_dump") {
            let filename = field.file_name().unwrap_or_default().to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|err| ApiError::BadRequest(format!("failed to read upload: {err}")))?;
            upload = Some((filename, bytes));
        }
    }

    let Some((filename, bytes)) = upload else {
        return Err(ApiError::BadRequest(
            "no support_dump file in request".to_string(),
        ));
    };
    if filename.is_empty() {
        return Err(ApiError::BadRequest("no file selected".to_string()));
    }
    let safe_name = sanitize_filename(&filename);
    if !safe_name.to_lowercase().ends_with(".zip") {
        return Err(ApiError::BadRequest(
            "file type not allowed, upload a zip bundle".to_string(),
        ));
    }

    let session = state
        .sessions
        .create(safe_name, &state.config.upload_dir);
    tokio::fs::create_dir_all(&session.work_dir)
        .await
        .map_err(|err| ApiError::Internal(err.into()))?;
    tokio::fs::write(&session.archive_path, &bytes)
        .await
        .map_err(|err| ApiError::Internal(err.into()))?;

    let archive_path = session.archive_path.clone();
    let (max_size, max_extracted) = (
        state.config.max_upload_size,
        state.config.max_extracted_size,
    );
    let validation = tokio::task::spawn_blocking(move || {
        archive::validate_archive(&archive_path, max_size, max_extracted)
    })
    .await
    .map_err(|err| ApiError::Internal(err.into()))?;

    if let Err(err) = validation {
        state.sessions.remove(&session.id);
        remove_work_dir(&session.work_dir).await;
        return Err(ApiError::BadRequest(format!(
            "upload validation failed: {err}"
        )));
    }

    info!(id = %session.id, filename = %session.filename, "upload accepted");
    Ok(Json(json!({
        "session_id": session.id,
        "status": "success",
        "message": "file uploaded and validated",
        "filename": session.filename
    })))
}

#[derive(Debug, Deserialize)]
struct AnalyzeRequest {
    #[serde(default)]
    log_level: Option<LogLevelParam>,
}

/// Accepted as either a numeric tier or a canonical name.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LogLevelParam {
    Tier(i64),
    Name(String),
}

fn resolve_min_level(param: Option<LogLevelParam>) -> Result<i64, ApiError> {
    match param {
        None => Ok(DEFAULT_MIN_LEVEL),
        Some(LogLevelParam::Tier(level)) => Ok(level),
        Some(LogLevelParam::Name(name)) => match name.to_lowercase().as_str() {
            "debug" => Ok(10),
            "info" => Ok(20),
            "warning" | "warn" => Ok(30),
            "error" => Ok(40),
            "critical" => Ok(50),
            other => Err(ApiError::BadRequest(format!(
                "invalid log level '{other}', expected a number or one of debug/info/warning/error/critical"
            ))),
        },
    }
}

async fn analyze_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    body: Option<Json<AnalyzeRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let min_level = resolve_min_level(body.and_then(|Json(req)| req.log_level))?;

    let session = state
        .sessions
        .get(&session_id)
        .ok_or_else(|| ApiError::SessionNotFound(session_id.clone()))?;
    if session.status != SessionStatus::Uploaded {
        return Err(ApiError::BadRequest(format!(
            "file not ready for analysis (status {})",
            session.status.as_str()
        )));
    }

    state
        .sessions
        .update_with(&session_id, |s| s.status = SessionStatus::Analyzing);
    info!(id = %session_id, min_level, "starting analysis");

    let archive_path = session.archive_path.clone();
    let extract_dir = session.work_dir.join("extracted");
    let max_single = state.config.max_single_file_size;
    let kb = state.kb.clone();
    let outcome: Result<ReportData, String> = tokio::task::spawn_blocking(move || {
        archive::extract_archive(&archive_path, &extract_dir, max_single)
            .map_err(|err| err.to_string())?;
        let root = dump::find_dump_root(&extract_dir)
            .ok_or_else(|| "could not find a support dump layout in the archive".to_string())?;
        Ok(report::build_report(&root, min_level, &kb))
    })
    .await
    .map_err(|err| ApiError::Internal(err.into()))?;

    match outcome {
        Ok(data) => {
            let summary_rows = data.analysis.summary.len();
            let total_error_count = data.analysis.total_error_count;
            state.sessions.update_with(&session_id, |s| {
                s.status = SessionStatus::Completed;
                s.results = Some(data);
            });
            Ok(Json(json!({
                "status": "success",
                "message": "analysis completed",
                "session_id": session_id,
                "summary_rows": summary_rows,
                "total_error_count": total_error_count
            })))
        }
        Err(reason) => {
            tracing::error!(id = %session_id, %reason, "analysis failed");
            state.sessions.update_with(&session_id, |s| {
                s.status = SessionStatus::Error;
                s.error = Some(reason.clone());
            });
            Err(ApiError::AnalysisFailed(reason))
        }
    }
}

fn completed_results(state: &AppState, session_id: &str) -> Result<ReportData, ApiError> {
    let session = state
        .sessions
        .get(session_id)
        .ok_or_else(|| ApiError::SessionNotFound(session_id.to_string()))?;
    match session.status {
        SessionStatus::Completed => session
            .results
            .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("completed session has no results"))),
        SessionStatus::Error => Err(ApiError::AnalysisFailed(
            session.error.unwrap_or_else(|| "unknown error".to_string()),
        )),
        other => Err(ApiError::BadRequest(format!(
            "analysis not complete (status {})",
            other.as_str()
        ))),
    }
}

async fn results_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ReportData>, ApiError> {
    completed_results(&state, &session_id).map(Json)
}

async fn report_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Html<String>, ApiError> {
    completed_results(&state, &session_id).map(|data| Html(report::render_html(&data)))
}

async fn list_sessions_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let sessions = state.sessions.list();
    let mut info = serde_json::Map::new();
    for session in &sessions {
        info.insert(
            session.id.clone(),
            json!({
                "status": session.status.as_str(),
                "filename": session.filename,
                "created_at": session.created_at.to_rfc3339(),
                "has_error": session.error.is_some()
            }),
        );
    }
    Json(json!({
        "active_sessions": sessions.len(),
        "sessions": info
    }))
}

async fn delete_session_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .sessions
        .remove(&session_id)
        .ok_or_else(|| ApiError::SessionNotFound(session_id.clone()))?;
    remove_work_dir(&session.work_dir).await;
    info!(id = %session_id, "session cleaned up");
    Ok(Json(json!({ "message": "session cleaned up" })))
}
