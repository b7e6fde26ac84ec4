//! Logging configuration.
//!
//! Supports configuration via:
//! - Environment variables (PREFIXER_LOG, RUST_LOG)
//! - The `[logging]` section of prefixer.toml
//! - CLI flags (-q, -v, -vv)
//!
//! These only govern the console. Session log files always receive every level.

use serde::{Deserialize, Serialize};

/// Log level filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose.
    Trace,
    /// Debug information.
    Debug,
    /// Standard operational info (default).
    #[default]
    Info,
    /// Warnings only.
    Warn,
    /// Errors only.
    Error,
    /// Completely silent.
    Off,
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "off" | "none" | "quiet" => Ok(LogLevel::Off),
            _ => Err(format!("unknown log level: {}", s)),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
            LogLevel::Off => write!(f, "off"),
        }
    }
}

impl From<LogLevel> for tracing_subscriber::filter::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing_subscriber::filter::LevelFilter::TRACE,
            LogLevel::Debug => tracing_subscriber::filter::LevelFilter::DEBUG,
            LogLevel::Info => tracing_subscriber::filter::LevelFilter::INFO,
            LogLevel::Warn => tracing_subscriber::filter::LevelFilter::WARN,
            LogLevel::Error => tracing_subscriber::filter::LevelFilter::ERROR,
            LogLevel::Off => tracing_subscriber::filter::LevelFilter::OFF,
        }
    }
}

/// Console logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum console level.
    pub level: LogLevel,
    /// Raw filter directive from the environment, used verbatim when present.
    pub directive: Option<String>,
    /// Whether to include timestamps in console output.
    pub timestamps: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: LogLevel::Info,
            directive: None,
            timestamps: false,
        }
    }
}

impl LogConfig {
    /// Create config from the environment and CLI flags.
    ///
    /// Precedence: `-q`/`-v` flags, then `PREFIXER_LOG`, then `RUST_LOG`,
    /// then the configured default.
    pub fn from_env(default_level: Option<LogLevel>, verbose: u8, quiet: bool) -> Self {
        Self::from_lookup(|key| std::env::var(key).ok(), default_level, verbose, quiet)
    }

    pub(crate) fn from_lookup<F>(
        lookup: F,
        default_level: Option<LogLevel>,
        verbose: u8,
        quiet: bool,
    ) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = LogConfig::default();
        if let Some(level) = default_level {
            config.level = level;
        }

        // PREFIXER_LOG takes precedence over RUST_LOG
        if let Some(val) = lookup("PREFIXER_LOG") {
            match val.parse::<LogLevel>() {
                Ok(level) => config.level = level,
                Err(_) => config.directive = Some(val),
            }
        } else if let Some(val) = lookup("RUST_LOG") {
            config.directive = Some(val);
        }

        // CLI flags take final precedence
        if quiet {
            config.level = LogLevel::Off;
            config.directive = None;
        } else if verbose > 0 {
            config.level = if verbose >= 2 {
                LogLevel::Trace
            } else {
                LogLevel::Debug
            };
            config.directive = None;
        }

        config
    }

    /// Set log level.
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Enable timestamps in console output.
    pub fn with_timestamps(mut self, enabled: bool) -> Self {
        self.timestamps = enabled;
        self
    }

    /// Whether console progress output is suppressed.
    pub fn is_quiet(&self) -> bool {
        self.level == LogLevel::Off && self.directive.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_log_level_parse() {
        assert_eq!("trace".parse::<LogLevel>().unwrap(), LogLevel::Trace);
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("quiet".parse::<LogLevel>().unwrap(), LogLevel::Off);
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_env_level_beats_default() {
        let config =
            LogConfig::from_lookup(lookup(&[("PREFIXER_LOG", "warn")]), Some(LogLevel::Debug), 0, false);
        assert_eq!(config.level, LogLevel::Warn);
        assert!(config.directive.is_none());
    }

    #[test]
    fn test_prefixer_log_beats_rust_log() {
        let config = LogConfig::from_lookup(
            lookup(&[("PREFIXER_LOG", "error"), ("RUST_LOG", "pfx_core=trace")]),
            None,
            0,
            false,
        );
        assert_eq!(config.level, LogLevel::Error);
        assert!(config.directive.is_none());
    }

    #[test]
    fn test_rust_log_kept_as_directive() {
        let config =
            LogConfig::from_lookup(lookup(&[("RUST_LOG", "pfx_core::process=debug")]), None, 0, false);
        assert_eq!(config.directive.as_deref(), Some("pfx_core::process=debug"));
    }

    #[test]
    fn test_flags_override_environment() {
        let quiet = LogConfig::from_lookup(lookup(&[("PREFIXER_LOG", "debug")]), None, 0, true);
        assert!(quiet.is_quiet());

        let verbose = LogConfig::from_lookup(lookup(&[("RUST_LOG", "warn")]), None, 1, false);
        assert_eq!(verbose.level, LogLevel::Debug);
        assert!(verbose.directive.is_none());

        let very = LogConfig::from_lookup(lookup(&[]), None, 3, false);
        assert_eq!(very.level, LogLevel::Trace);
    }
}
