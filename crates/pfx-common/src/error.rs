//! Error types for Prefixer.
//!
//! This module provides structured error handling with:
//! - Stable error codes for machine parsing
//! - Category classification for error grouping
//! - Severity hints (which errors abort a run and which are collected)
//! - Remediation suggestions for humans
//!
//! # Human-Facing Output
//!
//! ```text
//! ✗ Prefix Initialization Timed Out
//!   Reason: prefix initialization did not settle after 2 attempts (timeout 60s)
//!   Fix: Kill stale wineserver processes ('wineserver -k') and retry.
//! ```
//!
//! # Machine-Facing Output
//!
//! ```json
//! {
//!   "code": 30,
//!   "category": "environment",
//!   "message": "prefix initialization did not settle after 2 attempts (timeout 60s)",
//!   "fatal": true,
//!   "context": { "attempts": 2 }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for Prefixer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Configuration file or CLI argument errors.
    Config,
    /// Runtime discovery errors.
    Runtime,
    /// Isolated environment (prefix) errors.
    Environment,
    /// Component installation errors.
    Install,
    /// Version detection and post-install configuration.
    PostInstall,
    /// File I/O and serialization errors.
    Io,
    /// User interruption.
    Cancelled,
    /// Bugs.
    Internal,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Runtime => write!(f, "runtime"),
            ErrorCategory::Environment => write!(f, "environment"),
            ErrorCategory::Install => write!(f, "install"),
            ErrorCategory::PostInstall => write!(f, "post_install"),
            ErrorCategory::Io => write!(f, "io"),
            ErrorCategory::Cancelled => write!(f, "cancelled"),
            ErrorCategory::Internal => write!(f, "internal"),
        }
    }
}

/// Unified error type for Prefixer.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    // Runtime errors (20-29)
    #[error("no runtime candidate found (searched: {searched})")]
    EnvironmentNotFound { searched: String },

    // Environment errors (30-39)
    #[error("prefix initialization did not settle after {attempts} attempts (timeout {timeout_secs}s)")]
    InitializationTimeout { attempts: u32, timeout_secs: u64 },

    // Install errors (40-49)
    #[error("component '{component}' failed after {attempts} attempts (last exit code: {})", fmt_exit_code(.exit_code))]
    ComponentInstallFailure {
        component: String,
        attempts: u32,
        exit_code: Option<i32>,
    },

    // Post-install errors (50-59)
    #[error("installed version could not be determined, using default bucket '{fallback}'")]
    VersionDetectionAmbiguous { fallback: String },

    #[error("configuration write failed for '{key}': {reason}")]
    ConfigurationWriteFailure { key: String, reason: String },

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Cancellation (90)
    #[error("cancelled by user during {step}")]
    UserCancelled { step: String },

    // Internal (99)
    #[error("internal error: {0}")]
    Internal(String),
}

fn fmt_exit_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "none".to_string(),
    }
}

impl Error {
    /// Returns the error code for this error type.
    ///
    /// Error codes are stable and grouped by category:
    /// - 10-19: Configuration errors
    /// - 20-29: Runtime errors
    /// - 30-39: Environment errors
    /// - 40-49: Install errors
    /// - 50-59: Post-install errors
    /// - 60-69: I/O errors
    /// - 90: Cancellation
    /// - 99: Internal
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::InvalidArgument(_) => 11,
            Error::EnvironmentNotFound { .. } => 20,
            Error::InitializationTimeout { .. } => 30,
            Error::ComponentInstallFailure { .. } => 40,
            Error::VersionDetectionAmbiguous { .. } => 50,
            Error::ConfigurationWriteFailure { .. } => 51,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
            Error::UserCancelled { .. } => 90,
            Error::Internal(_) => 99,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) | Error::InvalidArgument(_) => ErrorCategory::Config,
            Error::EnvironmentNotFound { .. } => ErrorCategory::Runtime,
            Error::InitializationTimeout { .. } => ErrorCategory::Environment,
            Error::ComponentInstallFailure { .. } => ErrorCategory::Install,
            Error::VersionDetectionAmbiguous { .. } | Error::ConfigurationWriteFailure { .. } => {
                ErrorCategory::PostInstall
            }
            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
            Error::UserCancelled { .. } => ErrorCategory::Cancelled,
            Error::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Returns whether this error aborts an install run.
    ///
    /// Recovered errors (version ambiguity, configuration writes) are
    /// collected into the run summary instead.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::VersionDetectionAmbiguous { .. } | Error::ConfigurationWriteFailure { .. }
        )
    }

    /// Returns whether this is the user-cancellation terminal path rather than a failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::UserCancelled { .. })
    }

    /// Returns a human-readable remediation hint.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::Config(_) => {
                "Check prefixer.toml syntax, or run 'prefixer config show' to inspect the resolved configuration."
            }
            Error::InvalidArgument(_) => "Run 'prefixer --help' for usage.",
            Error::EnvironmentNotFound { .. } => {
                "Install Wine (wine, wine-stable or wine-staging) or set PREFIXER_RUNTIME_PREFIX to its installation prefix."
            }
            Error::InitializationTimeout { .. } => {
                "Kill stale wineserver processes ('wineserver -k') and retry. Slow runtimes may need a larger readiness timeout."
            }
            Error::ComponentInstallFailure { .. } => {
                "Inspect process.log in the session log directory. Re-running resumes from the last checkpoint."
            }
            Error::VersionDetectionAmbiguous { .. } => {
                "Verify the installer source contains its product descriptor files."
            }
            Error::ConfigurationWriteFailure { .. } => {
                "Apply the setting manually with 'wine reg add' or 'winecfg'."
            }
            Error::Io(_) => {
                "Check disk space and permissions on the environment root. Retry the operation."
            }
            Error::Json(_) => "Invalid JSON content. Check the file syntax.",
            Error::UserCancelled { .. } => {
                "Run 'prefixer install' again to resume from the last checkpoint."
            }
            Error::Internal(_) => "This is a bug. Please report it with the session logs attached.",
        }
    }

    /// Returns a short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self {
            Error::Config(_) => "Configuration Error",
            Error::InvalidArgument(_) => "Invalid Argument",
            Error::EnvironmentNotFound { .. } => "No Runtime Found",
            Error::InitializationTimeout { .. } => "Prefix Initialization Timed Out",
            Error::ComponentInstallFailure { .. } => "Component Install Failed",
            Error::VersionDetectionAmbiguous { .. } => "Version Detection Ambiguous",
            Error::ConfigurationWriteFailure { .. } => "Configuration Write Failed",
            Error::Io(_) => "I/O Error",
            Error::Json(_) => "JSON Error",
            Error::UserCancelled { .. } => "Cancelled",
            Error::Internal(_) => "Internal Error",
        }
    }
}

/// Structured error response for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Stable error code.
    pub code: u32,

    /// Error category for grouping.
    pub category: ErrorCategory,

    /// Human-readable error message.
    pub message: String,

    /// Whether the error aborted the run.
    pub fatal: bool,

    /// Additional structured context (e.g., component name).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        let mut context = HashMap::new();

        match err {
            Error::InitializationTimeout {
                attempts,
                timeout_secs,
            } => {
                context.insert("attempts".to_string(), serde_json::json!(attempts));
                context.insert("timeout_seconds".to_string(), serde_json::json!(timeout_secs));
            }
            Error::ComponentInstallFailure {
                component,
                attempts,
                exit_code,
            } => {
                context.insert("component".to_string(), serde_json::json!(component));
                context.insert("attempts".to_string(), serde_json::json!(attempts));
                context.insert("exit_code".to_string(), serde_json::json!(exit_code));
            }
            Error::ConfigurationWriteFailure { key, .. } => {
                context.insert("key".to_string(), serde_json::json!(key));
            }
            Error::UserCancelled { step } => {
                context.insert("step".to_string(), serde_json::json!(step));
            }
            _ => {}
        }

        StructuredError {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            fatal: err.is_fatal(),
            context,
        }
    }
}

impl StructuredError {
    /// Add additional context to the error.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":{},"error":"serialization_failed"}}"#, self.code)
        })
    }
}

/// Format an error for human-readable stderr output.
///
/// Output format:
/// ```text
/// ✗ [Headline]
///   Reason: [Error message]
///   Fix: [Remediation hint]
/// ```
pub fn format_error_human(err: &Error, use_color: bool) -> String {
    let (red, cyan, reset) = if use_color {
        ("\x1b[31m", "\x1b[36m", "\x1b[0m")
    } else {
        ("", "", "")
    };

    format!(
        "{red}✗{reset} {headline}\n  Reason: {message}\n  {cyan}Fix:{reset} {remediation}",
        red = red,
        cyan = cyan,
        reset = reset,
        headline = err.headline(),
        message = err,
        remediation = err.remediation()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        assert_eq!(Error::Config("bad".into()).code(), 10);
        assert_eq!(
            Error::EnvironmentNotFound {
                searched: "/usr/bin".into()
            }
            .code(),
            20
        );
        assert_eq!(
            Error::UserCancelled {
                step: "install_components".into()
            }
            .code(),
            90
        );
    }

    #[test]
    fn test_error_category() {
        let err = Error::InitializationTimeout {
            attempts: 2,
            timeout_secs: 60,
        };
        assert_eq!(err.category(), ErrorCategory::Environment);
        assert_eq!(err.category().to_string(), "environment");
    }

    #[test]
    fn test_recovered_errors_are_not_fatal() {
        assert!(!Error::VersionDetectionAmbiguous {
            fallback: "latest".into()
        }
        .is_fatal());
        assert!(!Error::ConfigurationWriteFailure {
            key: "HKCU\\Software\\Wine\\Direct3D\\csmt".into(),
            reason: "exit 1".into()
        }
        .is_fatal());
        assert!(Error::ComponentInstallFailure {
            component: "vcrun2019".into(),
            attempts: 3,
            exit_code: Some(1)
        }
        .is_fatal());
    }

    #[test]
    fn test_component_failure_message_without_exit_code() {
        let err = Error::ComponentInstallFailure {
            component: "gdiplus".into(),
            attempts: 2,
            exit_code: None,
        };
        assert_eq!(
            err.to_string(),
            "component 'gdiplus' failed after 2 attempts (last exit code: none)"
        );
    }

    #[test]
    fn test_cancellation_is_distinct() {
        let err = Error::UserCancelled {
            step: "await_ready".into(),
        };
        assert!(err.is_cancellation());
        assert_eq!(err.category(), ErrorCategory::Cancelled);
    }

    #[test]
    fn test_structured_error_context() {
        let err = Error::ComponentInstallFailure {
            component: "msxml6".into(),
            attempts: 3,
            exit_code: Some(5),
        };
        let structured = StructuredError::from(&err);
        assert_eq!(structured.code, 40);
        assert!(structured.fatal);
        assert_eq!(structured.context["component"], "msxml6");
        assert_eq!(structured.context["exit_code"], 5);

        let json = structured.to_json();
        assert!(json.contains("\"category\":\"install\""));
    }

    #[test]
    fn test_format_error_human_plain() {
        let err = Error::EnvironmentNotFound {
            searched: "/usr/bin".into(),
        };
        let out = format_error_human(&err, false);
        assert!(out.starts_with("✗ No Runtime Found"));
        assert!(out.contains("Reason: no runtime candidate found"));
        assert!(out.contains("Fix: Install Wine"));
        assert!(!out.contains("\x1b["));
    }
}
