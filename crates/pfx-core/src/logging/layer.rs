//! Custom tracing layer writing the per-session log files.
//!
//! Every event becomes one line `[ISO-8601] [LEVEL] [CATEGORY] message` and
//! is routed by level:
//! - `main.log`: INFO, WARN and ERROR
//! - `warning.log`: WARN only
//! - `error.log`: ERROR only
//! - `debug.log`: DEBUG and TRACE
//!
//! Files are opened unbuffered in append mode, so a line is on disk as soon
//! as the event returns.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use super::events::{category_for_target, Level};
use crate::session::LogPaths;

/// Which session files a line at a given level lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Routing {
    pub main: bool,
    pub warning: bool,
    pub error: bool,
    pub debug: bool,
}

/// Route a level to its session files.
pub fn route(level: Level) -> Routing {
    match level {
        Level::Trace | Level::Debug => Routing {
            debug: true,
            ..Routing::default()
        },
        Level::Info => Routing {
            main: true,
            ..Routing::default()
        },
        Level::Warn => Routing {
            main: true,
            warning: true,
            ..Routing::default()
        },
        Level::Error => Routing {
            main: true,
            error: true,
            ..Routing::default()
        },
    }
}

/// Format one log line (without the trailing newline).
pub fn format_line(ts: DateTime<Utc>, level: Level, category: &str, message: &str) -> String {
    format!(
        "[{}] [{}] [{}] {}",
        ts.to_rfc3339_opts(SecondsFormat::Millis, true),
        level.label(),
        category,
        message
    )
}

/// The four level-split session log handles.
pub struct SessionLogFiles<W = File> {
    main: Mutex<W>,
    warning: Mutex<W>,
    error: Mutex<W>,
    debug: Mutex<W>,
}

impl SessionLogFiles<File> {
    /// Open (create or append) the session log files.
    pub fn create(paths: &LogPaths) -> io::Result<Self> {
        Ok(Self::new(
            open_append(&paths.main)?,
            open_append(&paths.warning)?,
            open_append(&paths.error)?,
            open_append(&paths.debug)?,
        ))
    }
}

impl<W: Write> SessionLogFiles<W> {
    pub fn new(main: W, warning: W, error: W, debug: W) -> Self {
        Self {
            main: Mutex::new(main),
            warning: Mutex::new(warning),
            error: Mutex::new(error),
            debug: Mutex::new(debug),
        }
    }

    /// Write a formatted line to every file the level routes to.
    pub fn write_line(&self, level: Level, line: &str) {
        let routing = route(level);
        let targets = [
            (routing.main, &self.main),
            (routing.warning, &self.warning),
            (routing.error, &self.error),
            (routing.debug, &self.debug),
        ];
        for (enabled, file) in targets {
            if !enabled {
                continue;
            }
            if let Ok(mut writer) = file.lock() {
                let _ = writeln!(writer, "{}", line);
            }
        }
    }

    /// Flush all handles.
    pub fn flush(&self) {
        for file in [&self.main, &self.warning, &self.error, &self.debug] {
            if let Ok(mut writer) = file.lock() {
                let _ = writer.flush();
            }
        }
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// A visitor that renders event fields into a single message.
struct LineVisitor {
    message: Option<String>,
    fields: Vec<String>,
}

impl LineVisitor {
    fn new() -> Self {
        LineVisitor {
            message: None,
            fields: Vec::new(),
        }
    }

    fn push(&mut self, name: &str, rendered: String) {
        if name == "message" {
            self.message = Some(rendered);
        } else {
            self.fields.push(format!("{}={}", name, rendered));
        }
    }

    fn finish(self) -> String {
        let mut out = self.message.unwrap_or_default();
        for field in self.fields {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(&field);
        }
        out
    }
}

impl tracing::field::Visit for LineVisitor {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.push(field.name(), value.to_string());
        } else if value.contains(char::is_whitespace) {
            self.push(field.name(), format!("{:?}", value));
        } else {
            self.push(field.name(), value.to_string());
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.push(field.name(), format!("{:?}", value));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.push(field.name(), value.to_string());
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.push(field.name(), value.to_string());
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.push(field.name(), value.to_string());
    }
}

/// Tracing layer writing level-split session files.
pub struct SessionFileLayer<W = File> {
    files: Arc<SessionLogFiles<W>>,
}

impl<W: Write> SessionFileLayer<W> {
    pub fn new(files: Arc<SessionLogFiles<W>>) -> Self {
        Self { files }
    }
}

impl<S, W> Layer<S> for SessionFileLayer<W>
where
    S: Subscriber,
    W: Write + Send + 'static,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let ts = Utc::now();
        let level: Level = (*event.metadata().level()).into();
        let category = category_for_target(event.metadata().target());

        let mut visitor = LineVisitor::new();
        event.record(&mut visitor);

        let line = format_line(ts, level, &category, &visitor.finish());
        self.files.write_line(level, &line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    #[derive(Clone, Default)]
    struct BufWriter(Arc<Mutex<Vec<u8>>>);

    impl Write for BufWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl BufWriter {
        fn lines(&self) -> Vec<String> {
            String::from_utf8_lossy(&self.0.lock().unwrap())
                .lines()
                .map(|l| l.to_string())
                .collect()
        }
    }

    struct Buffers {
        main: BufWriter,
        warning: BufWriter,
        error: BufWriter,
        debug: BufWriter,
    }

    fn make_layer() -> (Buffers, SessionFileLayer<BufWriter>) {
        let buffers = Buffers {
            main: BufWriter::default(),
            warning: BufWriter::default(),
            error: BufWriter::default(),
            debug: BufWriter::default(),
        };
        let files = SessionLogFiles::new(
            buffers.main.clone(),
            buffers.warning.clone(),
            buffers.error.clone(),
            buffers.debug.clone(),
        );
        (buffers, SessionFileLayer::new(Arc::new(files)))
    }

    #[test]
    fn test_route_levels() {
        assert_eq!(
            route(Level::Warn),
            Routing {
                main: true,
                warning: true,
                error: false,
                debug: false
            }
        );
        assert!(route(Level::Trace).debug);
        assert!(!route(Level::Info).debug);
        assert!(route(Level::Error).error && route(Level::Error).main);
    }

    #[test]
    fn test_format_line_shape() {
        let ts = DateTime::parse_from_rfc3339("2026-01-15T14:30:22.123Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            format_line(ts, Level::Info, "install", "msxml6 done"),
            "[2026-01-15T14:30:22.123Z] [INFO] [install] msxml6 done"
        );
    }

    #[test]
    fn test_layer_splits_by_level() {
        let (buffers, layer) = make_layer();
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "run.started", "starting");
            tracing::warn!(target: "component.result", component = "corefonts", "failed");
            tracing::error!(target: "init.timeout", "never ready");
            tracing::debug!(target: "pfx_core::readiness", size = 42, "poll");
        });

        let main = buffers.main.lines();
        assert_eq!(main.len(), 3);
        assert!(main[0].contains("[INFO] [run.started] starting"));
        assert!(main[1].contains("[WARN] [component.result] failed component=corefonts"));

        let warning = buffers.warning.lines();
        assert_eq!(warning.len(), 1);
        assert!(warning[0].contains("corefonts"));

        let error = buffers.error.lines();
        assert_eq!(error.len(), 1);
        assert!(error[0].contains("[ERROR] [init.timeout] never ready"));

        let debug = buffers.debug.lines();
        assert_eq!(debug.len(), 1);
        assert!(debug[0].contains("[DEBUG] [readiness] poll size=42"));
    }

    #[test]
    fn test_fields_with_spaces_are_quoted() {
        let (buffers, layer) = make_layer();
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(path = "/tmp/Program Files", "scanning");
        });

        let main = buffers.main.lines();
        assert!(main[0].ends_with("scanning path=\"/tmp/Program Files\""));
    }
}
