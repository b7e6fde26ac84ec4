//! Event vocabulary for session logs.
//!
//! Log lines carry a category. Events emitted with an explicit `target:` from
//! [`event_names`] use it verbatim; everything else is categorized by module.

use serde::{Deserialize, Serialize};

/// Log levels for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    /// Upper-case label used in log lines.
    pub fn label(&self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Level::Trace,
            tracing::Level::DEBUG => Level::Debug,
            tracing::Level::INFO => Level::Info,
            tracing::Level::WARN => Level::Warn,
            tracing::Level::ERROR => Level::Error,
        }
    }
}

/// Standard event names used as tracing targets.
pub mod event_names {
    // Run lifecycle
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_FINISHED: &str = "run.finished";
    pub const STATE_TRANSITION: &str = "state.transition";

    // Runtime detection
    pub const RUNTIME_FOUND: &str = "runtime.found";
    pub const RUNTIME_COMPAT_WARNING: &str = "runtime.compat_warning";
    pub const RUNTIME_SELECTED: &str = "runtime.selected";

    // Prefix initialization
    pub const INIT_ATTEMPT: &str = "init.attempt";
    pub const INIT_READY: &str = "init.ready";
    pub const INIT_TIMEOUT: &str = "init.timeout";

    // Components
    pub const COMPONENT_ATTEMPT: &str = "component.attempt";
    pub const COMPONENT_RESULT: &str = "component.result";
    pub const COMPONENT_SKIPPED: &str = "component.skipped";

    // Checkpoints
    pub const CHECKPOINT_CREATED: &str = "checkpoint.created";
    pub const CHECKPOINT_RESET: &str = "checkpoint.reset";

    // Version detection
    pub const VERSION_DETECTED: &str = "version.detected";
    pub const VERSION_AMBIGUOUS: &str = "version.ambiguous";

    // Post-install configuration
    pub const CONFIG_APPLIED: &str = "config.applied";
    pub const CONFIG_WRITE_FAILED: &str = "config.write_failed";

    // Config/init events
    pub const CONFIG_LOADED: &str = "config.loaded";

    // Cancellation
    pub const CANCELLED: &str = "run.cancelled";
}

/// Category shown in log lines for a tracing target.
///
/// Module paths are shortened (`pfx_core::install::retry` → `install.retry`).
pub fn category_for_target(target: &str) -> String {
    let trimmed = target
        .strip_prefix("pfx_core::")
        .or_else(|| target.strip_prefix("prefixer::"))
        .unwrap_or(target);
    trimmed.replace("::", ".")
}
