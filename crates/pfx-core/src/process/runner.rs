//! Supervised child execution with timeout and process-group termination.
//!
//! - Each child leads its own process group, so helpers it spawns (installer
//!   stubs, `wineserver`) are signalled together
//! - Timeout or cancellation sends SIGTERM to the group, then SIGKILL after
//!   the grace period
//! - stdout/stderr are read non-blocking in a polling loop; the loop is a
//!   cancellation point

use std::collections::VecDeque;
use std::io::{ErrorKind, Read};
use std::os::unix::io::AsRawFd;
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use super::sink::OutputSink;
use super::{CommandSpec, ProcessError, RunOutcome, MAX_CAPTURED_LINES};
use crate::cancel::CancellationToken;

/// Default grace period between SIGTERM and SIGKILL.
pub const DEFAULT_TERM_GRACE: Duration = Duration::from_secs(3);

const IDLE_SLEEP: Duration = Duration::from_millis(10);
const READ_CHUNK: usize = 8192;
/// Longest partial line held before it is emitted unterminated.
const MAX_PENDING_LINE: usize = 64 * 1024;

/// Runs one child at a time under supervision.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    term_grace: Duration,
    max_captured_lines: usize,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(DEFAULT_TERM_GRACE)
    }
}

impl ProcessRunner {
    pub fn new(term_grace: Duration) -> Self {
        Self {
            term_grace,
            max_captured_lines: MAX_CAPTURED_LINES,
        }
    }

    pub fn with_max_captured_lines(mut self, max: usize) -> Self {
        self.max_captured_lines = max;
        self
    }

    /// Run `spec` to completion, timeout, or cancellation.
    ///
    /// Only a spawn failure or a supervision I/O error is an `Err`; a
    /// non-zero exit, timeout, or cancellation is reported in [`RunOutcome`].
    pub fn run(
        &self,
        spec: &CommandSpec,
        timeout: Duration,
        sink: &OutputSink,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, ProcessError> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0);
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }

        sink.write_marker(&spec.label, &format!("exec {}", spec.display_command()));
        let start = Instant::now();
        let mut child = command.spawn().map_err(|e| {
            sink.write_marker(&spec.label, &format!("spawn failed: {}", e));
            ProcessError::Spawn {
                program: spec.program.display().to_string(),
                source: e,
            }
        })?;
        let pgid = child.id() as i32;
        debug!(label = %spec.label, pgid, timeout_ms = timeout.as_millis() as u64, "child spawned");

        let result = self.supervise(&mut child, pgid, spec, timeout, sink, cancel, start);
        sink.flush();

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                // Never leave the group behind on a supervision error.
                signal_group(pgid, libc::SIGKILL);
                let _ = child.wait();
                return Err(ProcessError::Io {
                    program: spec.program.display().to_string(),
                    source: e,
                });
            }
        };

        let status = if outcome.cancelled {
            "cancelled".to_string()
        } else if outcome.timed_out {
            "timeout".to_string()
        } else {
            match outcome.exit_code {
                Some(code) => format!("code={}", code),
                None => "signal".to_string(),
            }
        };
        sink.write_marker(
            &spec.label,
            &format!("exit {} duration_ms={}", status, outcome.duration.as_millis()),
        );
        sink.flush();
        Ok(outcome)
    }

    #[allow(clippy::too_many_arguments)]
    fn supervise(
        &self,
        child: &mut Child,
        pgid: i32,
        spec: &CommandSpec,
        timeout: Duration,
        sink: &OutputSink,
        cancel: &CancellationToken,
        start: Instant,
    ) -> std::io::Result<RunOutcome> {
        let deadline = start + timeout;
        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();
        for fd in [
            stdout.as_ref().map(|s| s.as_raw_fd()),
            stderr.as_ref().map(|s| s.as_raw_fd()),
        ]
        .into_iter()
        .flatten()
        {
            set_nonblocking(fd)?;
        }

        let mut captured = Captured::new(self.max_captured_lines);
        let mut out_lines = LineSplitter::default();
        let mut err_lines = LineSplitter::default();
        let mut chunk = vec![0u8; READ_CHUNK];
        let mut timed_out = false;
        let mut cancelled = false;

        let status: Option<ExitStatus> = loop {
            let mut did_read = false;
            if let Some(ref mut out) = stdout {
                did_read |= pump(out, &mut chunk, &mut out_lines, |line| {
                    emit(sink, &spec.label, line, &mut captured)
                })?;
            }
            if let Some(ref mut err) = stderr {
                did_read |= pump(err, &mut chunk, &mut err_lines, |line| {
                    emit(sink, &spec.label, line, &mut captured)
                })?;
            }

            if let Some(status) = child.try_wait()? {
                trace!(label = %spec.label, code = ?status.code(), "child exited");
                break Some(status);
            }

            if cancel.is_cancelled() {
                cancelled = true;
                warn!(label = %spec.label, pgid, "cancellation requested, terminating process group");
                break self.terminate_group(child, pgid);
            }
            if Instant::now() >= deadline {
                timed_out = true;
                warn!(
                    label = %spec.label,
                    pgid,
                    timeout_ms = timeout.as_millis() as u64,
                    "child timed out, terminating process group"
                );
                break self.terminate_group(child, pgid);
            }

            if !did_read {
                thread::sleep(IDLE_SLEEP);
            }
        };

        // Drain what is immediately available. Group members that outlive the
        // leader may keep writing to the inherited pipes; the drain is bounded
        // by the grace period, the deadline and cancellation.
        let drain_deadline = deadline.min(Instant::now() + self.term_grace);
        loop {
            let mut did_read = false;
            if let Some(ref mut out) = stdout {
                did_read |= pump(out, &mut chunk, &mut out_lines, |line| {
                    emit(sink, &spec.label, line, &mut captured)
                })?;
            }
            if let Some(ref mut err) = stderr {
                did_read |= pump(err, &mut chunk, &mut err_lines, |line| {
                    emit(sink, &spec.label, line, &mut captured)
                })?;
            }
            if !did_read {
                break;
            }
            if cancel.is_cancelled() || Instant::now() >= drain_deadline {
                cancelled |= cancel.is_cancelled();
                warn!(
                    label = %spec.label,
                    pgid,
                    "process group still writing after the child exited, sent SIGKILL"
                );
                signal_group(pgid, libc::SIGKILL);
                break;
            }
        }
        for splitter in [&mut out_lines, &mut err_lines] {
            if let Some(rest) = splitter.finish() {
                emit(sink, &spec.label, &rest, &mut captured);
            }
        }

        Ok(RunOutcome {
            exit_code: status.and_then(|s| s.code()),
            timed_out,
            cancelled,
            duration: start.elapsed(),
            lines: captured.into_vec(),
        })
    }

    /// SIGTERM the group, wait out the grace period, then SIGKILL whatever is left.
    fn terminate_group(&self, child: &mut Child, pgid: i32) -> Option<ExitStatus> {
        signal_group(pgid, libc::SIGTERM);
        debug!(pgid, "sent SIGTERM to process group");

        let grace_deadline = Instant::now() + self.term_grace;
        let mut status = None;
        while Instant::now() < grace_deadline {
            match child.try_wait() {
                Ok(Some(s)) => {
                    status = Some(s);
                    break;
                }
                Ok(None) => thread::sleep(IDLE_SLEEP),
                Err(_) => break,
            }
        }

        // Group members may outlive the leader.
        signal_group(pgid, libc::SIGKILL);
        if status.is_none() {
            warn!(pgid, "process group did not exit after SIGTERM, sent SIGKILL");
        }
        match status {
            Some(s) => Some(s),
            None => child.wait().ok(),
        }
    }
}

fn emit(sink: &OutputSink, label: &str, line: &str, captured: &mut Captured) {
    sink.write_line(label, line);
    captured.push(line);
}

/// Signal every process in a group. A vanished group is not an error.
fn signal_group(pgid: i32, signal: libc::c_int) {
    if pgid <= 0 {
        return;
    }
    let rc = unsafe { libc::killpg(pgid, signal) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            warn!(pgid, signal, error = %err, "killpg failed");
        }
    }
}

fn set_nonblocking(fd: std::os::unix::io::RawFd) -> std::io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(std::io::Error::last_os_error());
    }
    if flags & libc::O_NONBLOCK == 0 {
        let rc = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
        if rc < 0 {
            return Err(std::io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Read one chunk if available and feed complete lines to `on_line`.
///
/// Returns whether any bytes were read. EOF and would-block both read nothing.
fn pump<R, F>(
    stream: &mut R,
    chunk: &mut [u8],
    splitter: &mut LineSplitter,
    mut on_line: F,
) -> std::io::Result<bool>
where
    R: Read,
    F: FnMut(&str),
{
    match stream.read(chunk) {
        Ok(0) => Ok(false),
        Ok(n) => {
            splitter.push(&chunk[..n], &mut on_line);
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::Interrupted => {
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// Splits a byte stream into lines, tolerating CRLF and invalid UTF-8.
#[derive(Debug, Default)]
struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    fn push<F: FnMut(&str)>(&mut self, bytes: &[u8], on_line: &mut F) {
        for &b in bytes {
            if b == b'\n' {
                self.emit_pending(on_line);
            } else {
                self.pending.push(b);
                if self.pending.len() >= MAX_PENDING_LINE {
                    self.emit_pending(on_line);
                }
            }
        }
    }

    fn emit_pending<F: FnMut(&str)>(&mut self, on_line: &mut F) {
        if self.pending.last() == Some(&b'\r') {
            self.pending.pop();
        }
        let line = String::from_utf8_lossy(&self.pending);
        on_line(&line);
        self.pending.clear();
    }

    fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(line)
    }
}

/// Most recent lines of output, bounded.
struct Captured {
    lines: VecDeque<String>,
    max: usize,
}

impl Captured {
    fn new(max: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            max,
        }
    }

    fn push(&mut self, line: &str) {
        if self.max == 0 {
            return;
        }
        if self.lines.len() == self.max {
            self.lines.pop_front();
        }
        self.lines.push_back(line.to_string());
    }

    fn into_vec(self) -> Vec<String> {
        self.lines.into()
    }
}
