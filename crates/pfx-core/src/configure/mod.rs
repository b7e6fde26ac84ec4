//! Post-install configuration.
//!
//! Every entry is attempted; failures are collected into the report and
//! never abort the run.

pub mod entries;
pub mod registry;

pub use entries::{default_entries, ConfigEntry, ConfigValue};
pub use registry::{ConfigWriter, RegistryWriter};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::cancel::CancellationToken;
use crate::logging::event_names;
use crate::process::ProcessError;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("write of '{key}' exited with code {}", fmt_exit_code(.exit_code))]
    Rejected { key: String, exit_code: Option<i32> },

    #[error("write of '{key}' timed out after {timeout_secs}s")]
    TimedOut { key: String, timeout_secs: u64 },

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("cancelled")]
    Cancelled,
}

fn fmt_exit_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "none".to_string(),
    }
}

/// An entry that could not be written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedEntry {
    pub key: String,
    pub reason: String,
    pub required: bool,
}

/// Result of applying a batch of entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub applied: Vec<String>,
    /// Already at the desired value; not rewritten.
    pub unchanged: Vec<String>,
    pub failed: Vec<FailedEntry>,
    /// Stopped early; remaining entries were not attempted.
    pub cancelled: bool,
}

impl ApplyReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && !self.cancelled
    }
}

/// Applies entries through a [`ConfigWriter`].
pub struct ConfigurationApplier<'a> {
    writer: &'a dyn ConfigWriter,
}

impl<'a> ConfigurationApplier<'a> {
    pub fn new(writer: &'a dyn ConfigWriter) -> Self {
        Self { writer }
    }

    pub fn apply(&self, entries: &[ConfigEntry], cancel: &CancellationToken) -> ApplyReport {
        let mut report = ApplyReport::default();

        for entry in entries {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let key = entry.key();

            match self.writer.current(entry) {
                Ok(Some(current)) if current == entry.value => {
                    debug!(key = %key, value = %current, "configuration already set");
                    report.unchanged.push(key);
                    continue;
                }
                Ok(_) => {}
                Err(ConfigError::Cancelled) => {
                    report.cancelled = true;
                    break;
                }
                // Unreadable state is not fatal; the write below decides.
                Err(e) => debug!(key = %key, error = %e, "configuration query failed"),
            }

            match self.writer.write(entry) {
                Ok(()) => {
                    info!(target: event_names::CONFIG_APPLIED, key = %key, value = %entry.value, "configuration applied");
                    report.applied.push(key);
                }
                Err(ConfigError::Cancelled) => {
                    report.cancelled = true;
                    break;
                }
                Err(e) => {
                    let reason = e.to_string();
                    if entry.required {
                        error!(target: event_names::CONFIG_WRITE_FAILED, key = %key, reason = %reason, required = true, "configuration write failed");
                    } else {
                        warn!(target: event_names::CONFIG_WRITE_FAILED, key = %key, reason = %reason, required = false, "configuration write failed");
                    }
                    report.failed.push(FailedEntry {
                        key,
                        reason,
                        required: entry.required,
                    });
                }
            }
        }

        report
    }
}
