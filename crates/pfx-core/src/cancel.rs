//! Cancellation token threaded through every suspension point.
//!
//! SIGINT/SIGTERM handlers only flip a process-wide flag; nothing else runs in
//! signal context. Poll loops observe the flag through a [`CancellationToken`],
//! which also carries its own flag so tests can cancel a run without signals.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

static SIGNAL_RECEIVED: AtomicBool = AtomicBool::new(false);
static SIGNAL_NUMBER: AtomicI32 = AtomicI32::new(0);

/// Upper bound on a single sleep slice inside [`CancellationToken::sleep`].
const SLEEP_SLICE: Duration = Duration::from_millis(20);

#[cfg(unix)]
extern "C" fn on_termination_signal(signum: libc::c_int) {
    SIGNAL_NUMBER.store(signum, Ordering::SeqCst);
    SIGNAL_RECEIVED.store(true, Ordering::SeqCst);
}

/// Install SIGINT and SIGTERM handlers that request cancellation.
///
/// Call once at startup, before the first child is spawned.
#[cfg(unix)]
pub fn install_signal_handlers() -> std::io::Result<()> {
    let handler = on_termination_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
    for signum in [libc::SIGINT, libc::SIGTERM] {
        let previous = unsafe { libc::signal(signum, handler) };
        if previous == libc::SIG_ERR {
            return Err(std::io::Error::last_os_error());
        }
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn install_signal_handlers() -> std::io::Result<()> {
    Ok(())
}

/// The signal that requested cancellation, if any.
pub fn received_signal() -> Option<i32> {
    if SIGNAL_RECEIVED.load(Ordering::SeqCst) {
        Some(SIGNAL_NUMBER.load(Ordering::SeqCst))
    } else {
        None
    }
}

/// Cooperative cancellation handle.
///
/// Clones share the same flag.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
    follow_signals: bool,
}

impl CancellationToken {
    /// Token that is also cancelled by SIGINT/SIGTERM.
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            follow_signals: true,
        }
    }

    /// Token that only responds to [`cancel`](Self::cancel).
    pub fn detached() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            follow_signals: false,
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || (self.follow_signals && SIGNAL_RECEIVED.load(Ordering::SeqCst))
    }

    /// Sleep for `duration`, waking early on cancellation.
    ///
    /// Returns `true` if the full duration elapsed, `false` if cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_flag() {
        let token = CancellationToken::detached();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_sleep_completes_when_not_cancelled() {
        let token = CancellationToken::detached();
        let start = Instant::now();
        assert!(token.sleep(Duration::from_millis(50)));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_sleep_wakes_on_cancel() {
        let token = CancellationToken::detached();
        let remote = token.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            remote.cancel();
        });

        let start = Instant::now();
        assert!(!token.sleep(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
    }

    #[test]
    fn test_already_cancelled_sleep_returns_immediately() {
        let token = CancellationToken::detached();
        token.cancel();
        assert!(!token.sleep(Duration::from_secs(10)));
    }
}
