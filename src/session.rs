use crate::report::ReportData;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Uploaded,
    Analyzing,
    Completed,
    Error,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Uploaded => "uploaded",
            SessionStatus::Analyzing => "analyzing",
            SessionStatus::Completed => "completed",
            SessionStatus::Error => "error",
        }
    }
}

/// One upload's lifecycle record: created on upload, mutated through
/// analysis, removed on explicit cleanup or TTL expiry.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub filename: String,
    /// Per-session working directory holding the archive and its extraction.
    pub work_dir: PathBuf,
    pub archive_path: PathBuf,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub error: Option<String>,
    pub results: Option<ReportData>,
}

/// Keyed session store owned by the serving process and injected into
/// handlers. All mutation goes through the store; sessions handed out are
/// snapshots.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<String, Session>,
    counter: AtomicU64,
}

impl SessionStore {
    pub fn new() -> SessionStore {
        SessionStore::default()
    }

    /// Unique within the process: creation time plus a monotonic counter.
    fn next_id(&self) -> String {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{:x}-{:04x}", Utc::now().timestamp_micros(), seq)
    }

    /// Register a new upload. The session's working directory is a
    /// subdirectory of `upload_root` named after the session id; the caller
    /// creates it and writes the archive there.
    pub fn create(&self, filename: String, upload_root: &Path) -> Session {
        let id = self.next_id();
        let work_dir = upload_root.join(&id);
        let archive_path = work_dir.join(&filename);
        let session = Session {
            id,
            filename,
            work_dir,
            archive_path,
            status: SessionStatus::Uploaded,
            created_at: Utc::now(),
            error: None,
            results: None,
        };
        self.sessions.insert(session.id.clone(), session.clone());
        session
    }

    pub fn get(&self, id: &str) -> Option<Session> {
        self.sessions.get(id).map(|entry| entry.clone())
    }

    /// Apply a mutation to a session in place; returns false for unknown ids.
    pub fn update_with(&self, id: &str, mutate: impl FnOnce(&mut Session)) -> bool {
        match self.sessions.get_mut(id) {
            Some(mut entry) => {
                mutate(&mut entry);
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, id: &str) -> Option<Session> {
        self.sessions.remove(id).map(|(_, session)| session)
    }

    pub fn list(&self) -> Vec<Session> {
        self.sessions.iter().map(|entry| entry.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Remove every session older than `ttl`, returning the removed records
    /// so the caller can delete their working directories.
    pub fn purge_expired(&self, ttl: Duration) -> Vec<Session> {
        let cutoff = Utc::now() - chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero());
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| entry.created_at <= cutoff)
            .map(|entry| entry.id.clone())
            .collect();
        expired
            .iter()
            .filter_map(|id| self.remove(id))
            .collect()
    }
}
