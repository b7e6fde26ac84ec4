//! Installation session: identity, log locations, and teardown.
//!
//! Layout under the environment root:
//!
//! ```text
//! <root>/
//!   prefix/                    isolated runtime environment
//!   .checkpoints/              resume markers (see `checkpoint`)
//!   logs/<session_id>/         main, warning, error, debug, process, process.raw
//!   tmp/<session_id>/          scratch space, removed at teardown
//! ```

use chrono::{DateTime, Utc};
use pfx_common::SessionId;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::runtime::RuntimeCandidate;

const LOGS_DIR: &str = "logs";
const TMP_DIR: &str = "tmp";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<SessionError> for pfx_common::Error {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Io { source, .. } => pfx_common::Error::Io(source),
        }
    }
}

/// Paths of the per-session log files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogPaths {
    pub dir: PathBuf,
    pub main: PathBuf,
    pub warning: PathBuf,
    pub error: PathBuf,
    pub debug: PathBuf,
    /// Child output after line filtering.
    pub process: PathBuf,
    /// Unfiltered child output.
    pub process_raw: PathBuf,
}

impl LogPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            main: dir.join("main.log"),
            warning: dir.join("warning.log"),
            error: dir.join("error.log"),
            debug: dir.join("debug.log"),
            process: dir.join("process.log"),
            process_raw: dir.join("process.raw.log"),
        }
    }
}

/// One orchestration run.
#[derive(Debug, Clone, Serialize)]
pub struct InstallationSession {
    pub session_id: SessionId,
    pub started_at: DateTime<Utc>,
    /// Set once the runtime has been selected.
    pub selected_runtime: Option<RuntimeCandidate>,
    pub environment_root: PathBuf,
    pub log_paths: LogPaths,
    pub temp_dir: PathBuf,
}

impl InstallationSession {
    /// Create the session directories under `environment_root`.
    pub fn begin(environment_root: &Path) -> Result<Self, SessionError> {
        let session_id = SessionId::new();
        let log_dir = environment_root.join(LOGS_DIR).join(session_id.as_str());
        let temp_dir = environment_root.join(TMP_DIR).join(session_id.as_str());

        for dir in [&log_dir, &temp_dir] {
            std::fs::create_dir_all(dir).map_err(|e| SessionError::Io {
                path: dir.clone(),
                source: e,
            })?;
        }

        Ok(Self {
            session_id,
            started_at: Utc::now(),
            selected_runtime: None,
            environment_root: environment_root.to_path_buf(),
            log_paths: LogPaths::in_dir(&log_dir),
            temp_dir,
        })
    }

    /// Prefix directory inside the environment root.
    pub fn prefix_dir(&self) -> PathBuf {
        self.environment_root.join("prefix")
    }

    /// Remove scratch state and prune old session logs.
    ///
    /// Runs at the end of every run regardless of outcome. Failures are logged,
    /// never propagated.
    pub fn teardown(&self, retain_sessions: usize) {
        if self.temp_dir.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.temp_dir) {
                warn!(path = %self.temp_dir.display(), error = %e, "failed to remove session temp dir");
            }
        }
        if let Some(tmp_root) = self.temp_dir.parent() {
            // Only succeeds when empty.
            let _ = std::fs::remove_dir(tmp_root);
        }
        let logs_root = self.environment_root.join(LOGS_DIR);
        match prune_sessions(&logs_root, retain_sessions, &self.session_id) {
            Ok(removed) if removed > 0 => debug!(removed, "pruned old session logs"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "failed to prune old session logs"),
        }
    }
}

/// Remove the oldest session log directories, keeping `keep` of them.
///
/// Only directories whose names parse as session IDs are considered, and the
/// current session is never removed. Session IDs sort chronologically.
pub fn prune_sessions(logs_root: &Path, keep: usize, current: &SessionId) -> std::io::Result<usize> {
    let mut sessions: Vec<(SessionId, PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(logs_root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if let Some(id) = entry.file_name().to_str().and_then(SessionId::parse) {
            sessions.push((id, entry.path()));
        }
    }
    sessions.sort_by(|a, b| a.0.cmp(&b.0));

    let keep = keep.max(1);
    let excess = sessions.len().saturating_sub(keep);
    let mut removed = 0;
    for (id, path) in sessions.into_iter().take(excess) {
        if &id == current {
            continue;
        }
        std::fs::remove_dir_all(&path)?;
        removed += 1;
    }
    Ok(removed)
}
