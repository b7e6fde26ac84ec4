//! Exit codes for the prefixer CLI.
//!
//! Exit codes communicate the run outcome without requiring output parsing.
//!
//! Exit code ranges:
//! - 0-6: Operational outcomes (completed, completed with warnings, cancelled)
//! - 10-19: User/environment errors (recoverable by user action)
//! - 20-29: Internal errors (bugs, should be reported)

use pfx_common::Error;

/// Exit codes for prefixer operations.
///
/// These codes are a stable contract for automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    // ========================================================================
    // Operational Outcomes (0-6)
    // ========================================================================
    /// Run completed with no warnings
    Clean = 0,

    /// Run completed; the summary lists recovered warnings
    CompletedWithWarnings = 1,

    /// Cancelled by the user; checkpoints left in place for resume
    Cancelled = 6,

    // ========================================================================
    // User / Environment Errors (10-19)
    // ========================================================================
    /// Invalid arguments
    ArgsError = 10,

    /// No runtime candidate found
    EnvironmentNotFound = 11,

    /// Prefix initialization never became ready
    InitTimeout = 12,

    /// A fatal component failed all attempts
    ComponentFailure = 13,

    /// Configuration file or value error
    ConfigError = 14,

    // ========================================================================
    // Internal Errors (20-29)
    // ========================================================================
    /// Internal error (bug - please report)
    InternalError = 20,

    /// I/O error
    IoError = 21,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Check if this exit code indicates a completed run (codes 0-1).
    pub fn is_success(self) -> bool {
        matches!(self, ExitCode::Clean | ExitCode::CompletedWithWarnings)
    }

    /// Check if this exit code indicates operational outcome (codes 0-6).
    pub fn is_operational(self) -> bool {
        (self as i32) < 10
    }

    /// Check if this exit code is a user/environment error (codes 10-19).
    pub fn is_user_error(self) -> bool {
        let code = self as i32;
        (10..20).contains(&code)
    }

    /// Check if this exit code is an internal error (codes 20-29).
    pub fn is_internal_error(self) -> bool {
        let code = self as i32;
        code >= 20
    }

    /// Get the code name as a string constant (for JSON output).
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK_CLEAN",
            ExitCode::CompletedWithWarnings => "OK_WARNINGS",
            ExitCode::Cancelled => "ERR_CANCELLED",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::EnvironmentNotFound => "ERR_ENV_NOT_FOUND",
            ExitCode::InitTimeout => "ERR_INIT_TIMEOUT",
            ExitCode::ComponentFailure => "ERR_COMPONENT",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
        }
    }

    /// Map an error to the exit code the binary terminates with.
    pub fn for_error(err: &Error) -> Self {
        match err {
            Error::InvalidArgument(_) => ExitCode::ArgsError,
            Error::Config(_) => ExitCode::ConfigError,
            Error::EnvironmentNotFound { .. } => ExitCode::EnvironmentNotFound,
            Error::InitializationTimeout { .. } => ExitCode::InitTimeout,
            Error::ComponentInstallFailure { .. } => ExitCode::ComponentFailure,
            Error::UserCancelled { .. } => ExitCode::Cancelled,
            Error::Io(_) => ExitCode::IoError,
            Error::Json(_)
            | Error::Internal(_)
            | Error::VersionDetectionAmbiguous { .. }
            | Error::ConfigurationWriteFailure { .. } => ExitCode::InternalError,
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranges() {
        assert!(ExitCode::Clean.is_success());
        assert!(ExitCode::CompletedWithWarnings.is_success());
        assert!(!ExitCode::Cancelled.is_success());
        assert!(ExitCode::Cancelled.is_operational());
        assert!(ExitCode::InitTimeout.is_user_error());
        assert!(ExitCode::IoError.is_internal_error());
    }

    #[test]
    fn test_cancellation_has_dedicated_code() {
        let err = Error::UserCancelled {
            step: "install_components".into(),
        };
        assert_eq!(ExitCode::for_error(&err).as_i32(), 6);
        assert_ne!(
            ExitCode::for_error(&err),
            ExitCode::for_error(&Error::Config("x".into()))
        );
    }

    #[test]
    fn test_fatal_errors_map_to_distinct_codes() {
        let codes = [
            ExitCode::for_error(&Error::EnvironmentNotFound {
                searched: String::new(),
            }),
            ExitCode::for_error(&Error::InitializationTimeout {
                attempts: 2,
                timeout_secs: 1,
            }),
            ExitCode::for_error(&Error::ComponentInstallFailure {
                component: "x".into(),
                attempts: 1,
                exit_code: None,
            }),
        ];
        assert_eq!(codes.map(|c| c.as_i32()), [11, 12, 13]);
    }

    #[test]
    fn test_display() {
        assert_eq!(ExitCode::Cancelled.to_string(), "ERR_CANCELLED (6)");
    }
}
