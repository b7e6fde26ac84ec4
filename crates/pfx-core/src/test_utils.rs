//! Test utilities for pfx-core.
//!
//! - Executable shell-script fixtures standing in for runtimes and helpers
//! - Process state helpers for termination assertions

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

// ============================================================================
// Script fixtures
// ============================================================================

/// Write an executable script `dir/name` and return its path.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    {
        let mut file = std::fs::File::create(&path).expect("create script");
        file.write_all(body.as_bytes()).expect("write script");
        file.sync_all().expect("sync script");
    }
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod script");
    path
}

// ============================================================================
// Process State Helpers
// ============================================================================

/// Process state character from `/proc/<pid>/stat`.
#[cfg(target_os = "linux")]
pub fn get_process_state(pid: u32) -> Option<char> {
    let stat = std::fs::read_to_string(format!("/proc/{}/stat", pid)).ok()?;
    let comm_end = stat.rfind(')')?;
    stat.get(comm_end + 2..)?.chars().next()
}

/// Whether `pid` has exited (gone, or a zombie awaiting reaping).
pub fn process_gone(pid: u32) -> bool {
    if let Some(state) = proc_state(pid) {
        return matches!(state, 'Z' | 'X');
    }
    let rc = unsafe { libc::kill(pid as libc::pid_t, 0) };
    rc != 0 && std::io::Error::last_os_error().raw_os_error() == Some(libc::ESRCH)
}

#[cfg(target_os = "linux")]
fn proc_state(pid: u32) -> Option<char> {
    get_process_state(pid)
}

#[cfg(not(target_os = "linux"))]
fn proc_state(_pid: u32) -> Option<char> {
    None
}

/// Poll `condition` every 20ms until it holds or `timeout` elapses.
pub fn wait_until<F: FnMut() -> bool>(timeout: Duration, mut condition: F) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

/// Lines of `text` containing `needle`.
pub fn lines_containing<'a>(text: &'a str, needle: &str) -> Vec<&'a str> {
    text.lines().filter(|l| l.contains(needle)).collect()
}
