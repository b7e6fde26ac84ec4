//! External command execution.
//!
//! Every child process the orchestrator starts goes through
//! [`ProcessRunner::run`]: runtime probes, prefix initialization, component
//! installers and registry writes.

pub mod filter;
pub mod runner;
pub mod sink;

pub use filter::LineFilter;
pub use runner::ProcessRunner;
pub use sink::{OutputSink, SharedBuffer};

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Most recent output lines kept in [`RunOutcome::lines`].
pub const MAX_CAPTURED_LINES: usize = 10_000;

/// Errors from starting or supervising a child.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error supervising {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl ProcessError {
    /// The program does not exist or is not executable.
    pub fn is_not_found(&self) -> bool {
        match self {
            ProcessError::Spawn { source, .. } => matches!(
                source.kind(),
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied
            ),
            ProcessError::Io { .. } => false,
        }
    }
}

impl From<ProcessError> for pfx_common::Error {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::Spawn { source, .. } | ProcessError::Io { source, .. } => {
                pfx_common::Error::Io(source)
            }
        }
    }
}

/// Regular file with any execute bit set.
pub fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Resolve `name` through `PATH`. Names containing `/` are checked as given.
pub fn find_program(name: &str) -> Option<PathBuf> {
    if name.contains('/') {
        let path = PathBuf::from(name);
        return is_executable(&path).then_some(path);
    }
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

/// What to run. The environment is an overlay on the inherited one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
    /// Tag used in the process logs.
    pub label: String,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        let program = program.into();
        let label = program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| program.display().to_string());
        Self {
            program,
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
            label,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add or replace an overlay variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.env.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.env.push((key, value)),
        }
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Human-readable command line for logs.
    pub fn display_command(&self) -> String {
        let mut out = self.program.display().to_string();
        for arg in &self.args {
            out.push(' ');
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                out.push_str(&format!("{:?}", arg));
            } else {
                out.push_str(arg);
            }
        }
        out
    }
}

/// Result of a supervised run.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    /// `None` when the child was killed by a signal.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub cancelled: bool,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
    /// Most recent output lines, unfiltered.
    #[serde(skip)]
    pub lines: Vec<String>,
}

impl RunOutcome {
    pub fn success(&self) -> bool {
        !self.timed_out && !self.cancelled && self.exit_code == Some(0)
    }
}

mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }
}
