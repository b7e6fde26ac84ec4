//! Destinations for child process output.
//!
//! Every line goes to the raw writer; lines the [`LineFilter`] keeps also go
//! to the filtered writer. Markers (attempt headers, exec and exit lines) go
//! to both.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};

use super::filter::LineFilter;

type BoxedWriter = Box<dyn Write + Send>;

/// Filtered and raw process log pair.
pub struct OutputSink {
    filter: LineFilter,
    filtered: Mutex<BoxedWriter>,
    raw: Mutex<BoxedWriter>,
}

impl OutputSink {
    pub fn new<F, R>(filtered: F, raw: R, filter: LineFilter) -> Self
    where
        F: Write + Send + 'static,
        R: Write + Send + 'static,
    {
        Self {
            filter,
            filtered: Mutex::new(Box::new(filtered)),
            raw: Mutex::new(Box::new(raw)),
        }
    }

    /// Append to the session's `process.log` and `process.raw.log`.
    pub fn files(filtered: &Path, raw: &Path, filter: LineFilter) -> io::Result<Self> {
        Ok(Self::new(open_append(filtered)?, open_append(raw)?, filter))
    }

    /// Sink that drops everything. Captured lines are still returned by the runner.
    pub fn discard() -> Self {
        Self::new(io::sink(), io::sink(), LineFilter::passthrough())
    }

    /// In-memory sink; returns the filtered and raw buffers.
    pub fn memory(filter: LineFilter) -> (Self, SharedBuffer, SharedBuffer) {
        let filtered = SharedBuffer::default();
        let raw = SharedBuffer::default();
        (Self::new(filtered.clone(), raw.clone(), filter), filtered, raw)
    }

    /// Record one line of child output.
    pub fn write_line(&self, label: &str, line: &str) {
        let formatted = format_process_line(label, line);
        write_to(&self.raw, &formatted);
        if self.filter.keep(line) {
            write_to(&self.filtered, &formatted);
        }
    }

    /// Record a supervisor marker in both logs.
    pub fn write_marker(&self, label: &str, text: &str) {
        let formatted = format_process_line(label, text);
        write_to(&self.raw, &formatted);
        write_to(&self.filtered, &formatted);
    }

    pub fn flush(&self) {
        for writer in [&self.filtered, &self.raw] {
            if let Ok(mut w) = writer.lock() {
                let _ = w.flush();
            }
        }
    }
}

impl std::fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputSink")
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

fn format_process_line(label: &str, text: &str) -> String {
    format!(
        "[{}] [{}] {}",
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        label,
        text
    )
}

fn write_to(writer: &Mutex<BoxedWriter>, line: &str) {
    if let Ok(mut w) = writer.lock() {
        let _ = writeln!(w, "{}", line);
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Cloneable in-memory writer.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        self.0
            .lock()
            .map(|buf| String::from_utf8_lossy(&buf).into_owned())
            .unwrap_or_default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.0.lock() {
            Ok(mut inner) => inner.write(buf),
            Err(_) => Err(io::Error::new(io::ErrorKind::Other, "buffer poisoned")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_keeps_everything_filtered_drops_denied() {
        let (sink, filtered, raw) = OutputSink::memory(LineFilter::with_defaults());
        sink.write_line("msxml6", "0024:fixme:ntdll:stub");
        sink.write_line("msxml6", "Executing load_msxml6");

        let raw_lines = raw.lines();
        assert_eq!(raw_lines.len(), 2);
        assert!(raw_lines[0].contains("[msxml6] 0024:fixme:ntdll:stub"));

        let filtered_lines = filtered.lines();
        assert_eq!(filtered_lines.len(), 1);
        assert!(filtered_lines[0].ends_with("[msxml6] Executing load_msxml6"));
    }

    #[test]
    fn test_markers_bypass_filter() {
        let deny_all = LineFilter::new(&[], &[".*".to_string()]).unwrap();
        let (sink, filtered, raw) = OutputSink::memory(deny_all);
        sink.write_marker("gdiplus", "attempt gdiplus#1/3");
        sink.write_line("gdiplus", "noise");

        assert_eq!(filtered.lines().len(), 1);
        assert!(filtered.contents().contains("attempt gdiplus#1/3"));
        assert_eq!(raw.lines().len(), 2);
    }

    #[test]
    fn test_files_append() {
        let dir = tempfile::tempdir().unwrap();
        let filtered = dir.path().join("process.log");
        let raw = dir.path().join("process.raw.log");
        {
            let sink = OutputSink::files(&filtered, &raw, LineFilter::passthrough()).unwrap();
            sink.write_line("a", "first");
        }
        {
            let sink = OutputSink::files(&filtered, &raw, LineFilter::passthrough()).unwrap();
            sink.write_line("a", "second");
            sink.flush();
        }
        let content = std::fs::read_to_string(&raw).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains("first") && content.contains("second"));
    }
}
