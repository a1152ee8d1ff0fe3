use crate::kb::KnowledgeBase;
use anyhow::{bail, Context, Result};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

const MIB: u64 = 1024 * 1024;

/// Runtime limits and locations, loaded from the environment with
/// compile-time defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum accepted upload/archive size in bytes.
    pub max_upload_size: u64,
    /// Maximum total declared extracted size in bytes.
    pub max_extracted_size: u64,
    /// Maximum size for any single extracted file in bytes.
    pub max_single_file_size: u64,
    /// Working directory for uploaded sessions.
    pub upload_dir: PathBuf,
    /// Output directory for CLI-generated reports.
    pub reports_dir: PathBuf,
    /// Bind address for the HTTP server.
    pub bind_addr: String,
    /// Sessions older than this are purged by the server.
    pub session_ttl_secs: u64,
    /// Optional knowledge-base file overriding the builtin rules.
    pub kb_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_upload_size: 100 * MIB,
            max_extracted_size: 500 * MIB,
            max_single_file_size: 50 * MIB,
            upload_dir: PathBuf::from("temp"),
            reports_dir: PathBuf::from("reports"),
            bind_addr: "0.0.0.0:8080".to_string(),
            session_ttl_secs: 3600,
            kb_path: None,
        }
    }
}

impl Config {
    /// Load from `DUMPSCOPE_*` environment variables, falling back to the
    /// defaults for anything unset.
    pub fn from_env() -> Result<Config> {
        let defaults = Config::default();
        Ok(Config {
            max_upload_size: env_u64("DUMPSCOPE_MAX_UPLOAD_SIZE", defaults.max_upload_size)?,
            max_extracted_size: env_u64("DUMPSCOPE_MAX_EXTRACTED_SIZE", defaults.max_extracted_size)?,
            max_single_file_size: env_u64(
                "DUMPSCOPE_MAX_SINGLE_FILE_SIZE",
                defaults.max_single_file_size,
            )?,
            upload_dir: env_path("DUMPSCOPE_UPLOAD_DIR", defaults.upload_dir),
            reports_dir: env_path("DUMPSCOPE_REPORTS_DIR", defaults.reports_dir),
            bind_addr: env::var("DUMPSCOPE_BIND_ADDR").unwrap_or(defaults.bind_addr),
            session_ttl_secs: env_u64("DUMPSCOPE_SESSION_TTL_SECS", defaults.session_ttl_secs)?,
            kb_path: env::var("DUMPSCOPE_KB_PATH").ok().map(PathBuf::from),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_upload_size == 0 || self.max_extracted_size == 0 || self.max_single_file_size == 0
        {
            bail!("size limits must be nonzero");
        }
        if self.session_ttl_secs == 0 {
            bail!("session TTL must be nonzero");
        }
        self.bind_addr
            .parse::<SocketAddr>()
            .with_context(|| format!("invalid bind address '{}'", self.bind_addr))?;
        Ok(())
    }

    /// The knowledge base this process should match against.
    pub fn knowledge_base(&self) -> KnowledgeBase {
        match &self.kb_path {
            Some(path) => KnowledgeBase::load(path),
            None => KnowledgeBase::builtin(),
        }
    }
}

fn env_u64(key: &str, default: u64) -> Result<u64> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<u64>()
            .with_context(|| format!("{key} must be an integer, got '{raw}'")),
        Err(_) => Ok(default),
    }
}

fn env_path(key: &str, default: PathBuf) -> PathBuf {
    env::var(key).map(PathBuf::from).unwrap_or(default)
}
