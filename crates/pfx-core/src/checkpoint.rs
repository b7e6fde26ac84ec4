//! Durable milestone markers for resumable runs.
//!
//! One file per milestone under `<root>/.checkpoints/`, content is the RFC
//! 3339 creation time. Presence of the file is the only completion signal.
//!
//! Invariants:
//! - Write-once: a second `create` leaves the first timestamp untouched
//! - Ordered: a milestone is only created when all its predecessors exist
//! - Durable: file and directory are fsync'd before `create` returns

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::install::ComponentSpec;
use crate::logging::event_names;

pub const CHECKPOINT_DIR: &str = ".checkpoints";

/// First milestone: the prefix exists and finished initializing.
pub const PREFIX_INITIALIZED: &str = "prefix-initialized";

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("unknown milestone '{0}'")]
    UnknownMilestone(String),

    #[error("milestone '{name}' requested before '{missing}'")]
    OutOfOrder { name: String, missing: String },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<CheckpointError> for pfx_common::Error {
    fn from(err: CheckpointError) -> Self {
        match err {
            CheckpointError::Io { source, .. } => pfx_common::Error::Io(source),
            // The milestone list is built by the orchestrator, so these are bugs.
            other => pfx_common::Error::Internal(other.to_string()),
        }
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> CheckpointError + '_ {
    move |source| CheckpointError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// A completed milestone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Checkpoint {
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Canonical milestones: prefix initialization, then each fatal component.
pub fn milestones_for(components: &[ComponentSpec]) -> Vec<String> {
    std::iter::once(PREFIX_INITIALIZED.to_string())
        .chain(components.iter().filter(|c| c.fatal).map(|c| c.name.clone()))
        .collect()
}

/// Checkpoint store for one environment root.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    dir: PathBuf,
    milestones: Vec<String>,
}

impl CheckpointManager {
    pub fn new(environment_root: &Path, milestones: Vec<String>) -> Self {
        Self {
            dir: environment_root.join(CHECKPOINT_DIR),
            milestones,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn milestones(&self) -> &[String] {
        &self.milestones
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path_for(name).is_file()
    }

    /// Record `name` as completed.
    ///
    /// Returns the stored checkpoint, which is the original one if `name`
    /// already existed.
    pub fn create(&self, name: &str) -> Result<Checkpoint, CheckpointError> {
        let index = self
            .milestones
            .iter()
            .position(|m| m == name)
            .ok_or_else(|| CheckpointError::UnknownMilestone(name.to_string()))?;
        if let Some(missing) = self.milestones[..index].iter().find(|m| !self.exists(m)) {
            return Err(CheckpointError::OutOfOrder {
                name: name.to_string(),
                missing: missing.clone(),
            });
        }

        std::fs::create_dir_all(&self.dir).map_err(io_err(&self.dir))?;
        let path = self.path_for(name);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!(checkpoint = name, "checkpoint already present");
                return self.read(name);
            }
            Err(e) => return Err(io_err(&path)(e)),
        };

        let created_at = Utc::now();
        file.write_all(created_at.to_rfc3339_opts(SecondsFormat::Millis, true).as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(io_err(&path))?;
        sync_dir(&self.dir)?;

        info!(
            target: event_names::CHECKPOINT_CREATED,
            checkpoint = name,
            position = index + 1,
            total = self.milestones.len(),
            "checkpoint created"
        );
        Ok(Checkpoint {
            name: name.to_string(),
            created_at,
        })
    }

    fn read(&self, name: &str) -> Result<Checkpoint, CheckpointError> {
        let path = self.path_for(name);
        let content = std::fs::read_to_string(&path).map_err(io_err(&path))?;
        let created_at = match DateTime::parse_from_rfc3339(content.trim()) {
            Ok(ts) => ts.with_timezone(&Utc),
            // Unreadable content still marks completion; fall back to mtime.
            Err(_) => std::fs::metadata(&path)
                .and_then(|m| m.modified())
                .map(DateTime::<Utc>::from)
                .map_err(io_err(&path))?,
        };
        Ok(Checkpoint {
            name: name.to_string(),
            created_at,
        })
    }

    /// Existing checkpoints in milestone order.
    pub fn list(&self) -> Result<Vec<Checkpoint>, CheckpointError> {
        self.milestones
            .iter()
            .filter(|m| self.exists(m))
            .map(|m| self.read(m))
            .collect()
    }

    /// Last milestone of the unbroken completed prefix of the sequence.
    pub fn last_completed(&self) -> Option<&str> {
        self.milestones
            .iter()
            .take_while(|m| self.exists(m))
            .last()
            .map(String::as_str)
    }

    /// Remove every checkpoint, newest first, then the directory.
    pub fn reset_all(&self) -> Result<usize, CheckpointError> {
        let mut removed = 0;
        for name in self.milestones.iter().rev() {
            let path = self.path_for(name);
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(io_err(&path)(e)),
            }
        }
        if self.dir.exists() {
            std::fs::remove_dir_all(&self.dir).map_err(io_err(&self.dir))?;
        }
        info!(target: event_names::CHECKPOINT_RESET, removed, "checkpoints reset");
        Ok(removed)
    }
}

fn sync_dir(dir: &Path) -> Result<(), CheckpointError> {
    File::open(dir)
        .and_then(|d| d.sync_all())
        .map_err(io_err(dir))
}
