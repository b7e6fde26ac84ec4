//! Structured logging foundation for prefixer.
//!
//! Two sinks share one `tracing` registry:
//! - Human-readable console output on stderr, filtered by [`LogConfig`]
//! - Level-split session files (`main`, `warning`, `error`, `debug`) that
//!   receive every event regardless of quiet/verbose
//!
//! # Usage
//!
//! ```ignore
//! use pfx_core::logging::{init_logging, LogConfig, event_names};
//!
//! let config = LogConfig::from_env(None, 0, false);
//! let files = init_logging(&config, Some(&session.log_paths))?;
//!
//! tracing::info!(target: event_names::RUN_STARTED, session = %session.session_id, "install run started");
//! ```
//!
//! stdout is reserved for command payloads (summaries, JSON documents).

pub mod config;
pub mod events;
pub mod layer;

pub use config::{LogConfig, LogLevel};
pub use events::{event_names, Level};
pub use layer::{SessionFileLayer, SessionLogFiles};

use std::io::IsTerminal;
use std::sync::Arc;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::session::LogPaths;

/// Build the console filter from the config.
fn console_filter(config: &LogConfig) -> EnvFilter {
    if let Some(directive) = &config.directive {
        if let Ok(filter) = EnvFilter::try_new(directive) {
            return filter;
        }
    }
    EnvFilter::new(config.level.to_string())
}

/// Initialize the logging subsystem.
///
/// Must be called once at startup before any logging occurs. When `log_paths`
/// is given, the session files are opened and their shared handle returned so
/// the caller can flush it at teardown.
pub fn init_logging(
    config: &LogConfig,
    log_paths: Option<&LogPaths>,
) -> std::io::Result<Option<Arc<SessionLogFiles>>> {
    let files = match log_paths {
        Some(paths) => Some(Arc::new(SessionLogFiles::create(paths)?)),
        None => None,
    };

    let use_ansi = std::io::stderr().is_terminal();
    let timed = config.timestamps.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_ansi(use_ansi)
            .with_filter(console_filter(config))
    });
    let untimed = (!config.timestamps).then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_ansi(use_ansi)
            .without_time()
            .with_filter(console_filter(config))
    });
    let file_layer = files
        .clone()
        .map(|f| SessionFileLayer::new(f).with_filter(LevelFilter::TRACE));

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(timed)
        .with(untimed)
        .with(file_layer)
        .try_init();

    Ok(files)
}
