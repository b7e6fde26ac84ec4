//! End-of-run summary.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use pfx_common::{Error, SessionId, StructuredError};
use serde::Serialize;

use super::state::State;
use crate::exit_codes::ExitCode;
use crate::install::InstallOutcome;
use crate::runtime::RuntimeCandidate;
use crate::version::VersionSignal;

/// How the run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Done,
    Aborted,
    Cancelled,
}

/// A recovered problem; the run continued.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryWarning {
    pub step: State,
    pub code: u32,
    pub message: String,
}

impl SummaryWarning {
    pub fn new(step: State, err: &Error) -> Self {
        Self {
            step,
            code: err.code(),
            message: err.to_string(),
        }
    }
}

/// The error that ended an aborted or cancelled run.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryFailure {
    pub step: State,
    pub error: StructuredError,
    pub headline: String,
    pub remediation: String,
    /// Log file to inspect first.
    pub log_path: PathBuf,
    #[serde(skip)]
    exit: ExitCode,
}

impl SummaryFailure {
    pub fn new(step: State, err: &Error, log_path: PathBuf) -> Self {
        Self {
            step,
            error: StructuredError::from(err).with_context("step", step),
            headline: err.headline().to_string(),
            remediation: err.remediation().to_string(),
            log_path,
            exit: ExitCode::for_error(err),
        }
    }
}

/// Per-component result.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentRecord {
    pub name: String,
    /// `None` when skipped because its checkpoint already existed.
    pub outcome: Option<InstallOutcome>,
    pub fatal: bool,
}

/// Everything the user needs after a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub session_id: SessionId,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub passed_steps: Vec<State>,
    pub warnings: Vec<SummaryWarning>,
    pub failure: Option<SummaryFailure>,
    pub runtime: Option<RuntimeCandidate>,
    pub version: Option<VersionSignal>,
    pub components: Vec<ComponentRecord>,
    pub log_dir: PathBuf,
}

impl RunSummary {
    pub fn exit_code(&self) -> ExitCode {
        match (&self.status, &self.failure) {
            (RunStatus::Done, _) if self.warnings.is_empty() => ExitCode::Clean,
            (RunStatus::Done, _) => ExitCode::CompletedWithWarnings,
            (RunStatus::Cancelled, _) => ExitCode::Cancelled,
            (RunStatus::Aborted, Some(failure)) => failure.exit,
            (RunStatus::Aborted, None) => ExitCode::InternalError,
        }
    }

    /// JSON document for `--format json`, including the exit code.
    pub fn to_json_value(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_else(|e| {
            serde_json::json!({ "session_id": self.session_id, "error": e.to_string() })
        });
        if let Some(map) = value.as_object_mut() {
            let code = self.exit_code();
            map.insert("exit_code".to_string(), serde_json::json!(code.as_i32()));
            map.insert("exit_code_name".to_string(), serde_json::json!(code.code_name()));
        }
        value
    }

    /// Plain-text summary for the terminal.
    pub fn render_human(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("prefixer install, session {}\n", self.session_id));

        if let Some(runtime) = &self.runtime {
            out.push_str(&format!("  Runtime:  {}\n", runtime));
        }
        if let Some(version) = &self.version {
            out.push_str(&format!(
                "  Version:  {} ({}, confidence {})\n",
                version.bucket, version.method, version.confidence
            ));
        }
        if !self.passed_steps.is_empty() {
            let steps: Vec<&str> = self.passed_steps.iter().map(State::as_str).collect();
            out.push_str(&format!("  Passed:   {}\n", steps.join(", ")));
        }
        let resumed: Vec<&str> = self
            .components
            .iter()
            .filter(|c| c.outcome.is_none())
            .map(|c| c.name.as_str())
            .collect();
        if !resumed.is_empty() {
            out.push_str(&format!("  Resumed:  {} already installed\n", resumed.join(", ")));
        }

        if !self.warnings.is_empty() {
            out.push_str(&format!("\nWarnings ({}):\n", self.warnings.len()));
            for warning in &self.warnings {
                out.push_str(&format!("  ! [{}] {}\n", warning.step, warning.message));
            }
        }

        out.push('\n');
        match (&self.status, &self.failure) {
            (RunStatus::Done, _) if self.warnings.is_empty() => out.push_str("Result: completed\n"),
            (RunStatus::Done, _) => out.push_str("Result: completed with warnings\n"),
            (RunStatus::Cancelled, failure) => {
                let step = failure.as_ref().map(|f| f.step.as_str()).unwrap_or("unknown");
                out.push_str(&format!(
                    "Result: cancelled during {}\n  Run 'prefixer install' again to resume from the last checkpoint.\n",
                    step
                ));
            }
            (RunStatus::Aborted, Some(failure)) => {
                out.push_str(&format!("Result: aborted at {}\n", failure.step));
                out.push_str(&format!("  {}\n", failure.headline));
                out.push_str(&format!("  Reason: {}\n", failure.error.message));
                out.push_str(&format!("  Fix: {}\n", failure.remediation));
                out.push_str(&format!("  Inspect: {}\n", failure.log_path.display()));
            }
            (RunStatus::Aborted, None) => out.push_str("Result: aborted\n"),
        }
        out.push_str(&format!("Logs: {}\n", self.log_dir.display()));
        out
    }
}
