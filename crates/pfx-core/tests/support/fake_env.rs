//! Fake runtime environment for end-to-end install tests.
//!
//! Shell scripts stand in for the compatibility runtime and the component
//! helper so a complete install run executes real child processes without
//! Wine being installed:
//!
//! - `fakewine --version` prints `wine-8.0`
//! - `fakewine wineboot --init` logs the call and writes
//!   `$WINEPREFIX/system.reg` (unless the environment was made never-ready)
//! - `fakewine reg query|add` keeps values under `$WINEPREFIX/.fake-registry`
//! - `fakewine <installer>` creates the installed product tree
//! - `winetricks -q <verb>` logs the verb, fails for configured verbs, and
//!   for the hang verb starts a long-lived grandchild and waits on it

#![allow(dead_code)]
// Test support provides more helpers than any single test uses.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use pfx_config::PrefixerConfig;
use pfx_core::orchestrator::{InstallOptions, Orchestrator};
use pfx_core::runtime::RuntimeDetector;
use pfx_core::session::InstallationSession;
use pfx_core::version::NoProbe;
use tempfile::TempDir;

pub const RUNTIME_NAME: &str = "fakewine";

/// Installed product directory created by the fake installer.
pub const INSTALLED_PRODUCT: &str = "drive_c/Program Files/Adobe/Adobe Photoshop 2021";

pub struct FakeEnv {
    _dir: TempDir,
    pub root: PathBuf,
    pub bin: PathBuf,
    pub installer: PathBuf,
    pub wine: PathBuf,
    pub winetricks: PathBuf,
}

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).expect("write script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod script");
    path
}

impl FakeEnv {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("root");
        let bin = dir.path().join("bin");
        let installer = dir.path().join("installer");
        for d in [&root, &bin, &installer] {
            std::fs::create_dir_all(d).expect("create fixture dir");
        }
        std::fs::write(installer.join("Set-up.exe"), b"MZ").expect("write installer");

        let wine = write_script(
            &bin,
            RUNTIME_NAME,
            &format!(
                r#"#!/bin/sh
case "$1" in
  --version)
    echo "wine-8.0"
    ;;
  wineboot)
    echo "$2" >> '{bin}/wineboot.calls'
    mkdir -p "$WINEPREFIX"
    [ -f '{bin}/never-ready' ] && exit 0
    printf 'WINE REGISTRY Version 2\n;; All keys relative to \\Machine\n' > "$WINEPREFIX/system.reg"
    ;;
  reg)
    store="$WINEPREFIX/.fake-registry"
    mkdir -p "$store"
    case "$2" in
      query)
        [ -f "$store/$5" ] || exit 1
        printf '%s\n' "$3"
        echo "    $5    $(cat "$store/$5.type")    $(cat "$store/$5")"
        ;;
      add)
        printf '%s' "$9" > "$store/$5"
        printf '%s' "$7" > "$store/$5.type"
        ;;
    esac
    ;;
  *)
    [ -f "$1" ] || exit 3
    echo "fixme:ole:CoInitializeSecurity stub"
    mkdir -p "$WINEPREFIX/{product}"
    echo "installed from $1"
    ;;
esac
exit 0
"#,
                bin = bin.display(),
                product = INSTALLED_PRODUCT,
            ),
        );

        let winetricks = write_script(
            &bin,
            "winetricks",
            &format!(
                r#"#!/bin/sh
verb="$2"
echo "$verb" >> '{bin}/winetricks.calls'
if [ -f '{bin}/hang-verb' ] && [ "$verb" = "$(cat '{bin}/hang-verb')" ]; then
  sleep 300 &
  echo $! > '{bin}/grandchild.pid'
  wait
fi
if [ -f '{bin}/fail-verbs' ] && grep -qx "$verb" '{bin}/fail-verbs'; then
  echo "err:module:import_dll Library MSVCR120.dll not found" >&2
  exit 1
fi
echo "Executing w_do_call $verb"
exit 0
"#,
                bin = bin.display(),
            ),
        );

        Self {
            _dir: dir,
            root,
            bin,
            installer,
            wine,
            winetricks,
        }
    }

    /// `wineboot` never writes the readiness artifact.
    pub fn never_ready(&self) {
        std::fs::write(self.bin.join("never-ready"), b"").expect("write marker");
    }

    /// Every attempt of `verb` exits 1.
    pub fn fail_verb(&self, verb: &str) {
        let path = self.bin.join("fail-verbs");
        let mut verbs = std::fs::read_to_string(&path).unwrap_or_default();
        verbs.push_str(verb);
        verbs.push('\n');
        std::fs::write(path, verbs).expect("write fail-verbs");
    }

    /// `verb` starts a grandchild and blocks until killed.
    pub fn hang_verb(&self, verb: &str) {
        std::fs::write(self.bin.join("hang-verb"), verb).expect("write hang-verb");
    }

    /// Verbs in invocation order, one entry per attempt.
    pub fn winetricks_calls(&self) -> Vec<String> {
        std::fs::read_to_string(self.bin.join("winetricks.calls"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Number of `wineboot` invocations so far.
    pub fn wineboot_runs(&self) -> usize {
        std::fs::read_to_string(self.bin.join("wineboot.calls"))
            .unwrap_or_default()
            .lines()
            .count()
    }

    pub fn grandchild_pid(&self) -> Option<u32> {
        std::fs::read_to_string(self.bin.join("grandchild.pid"))
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }

    pub fn prefix(&self) -> PathBuf {
        self.root.join("prefix")
    }

    pub fn checkpoint_dir(&self) -> PathBuf {
        self.root.join(".checkpoints")
    }

    /// Configuration with short timings pointing at the fakes.
    pub fn config(&self) -> PrefixerConfig {
        let mut config = PrefixerConfig::default();
        config.paths.root = Some(self.root.clone());
        config.paths.installer_source = Some(self.installer.clone());
        config.runtime.names = vec![RUNTIME_NAME.to_string()];
        config.readiness.timeout_ms = 400;
        config.readiness.poll_interval_ms = 50;
        config.install.retry_delay_ms = 10;
        config.install.component_timeout_ms = 30_000;
        config.install.term_grace_ms = 200;
        config.install.winetricks = self.winetricks.display().to_string();
        config.version.resource_tool = "prefixer-test-no-exiftool".to_string();
        config
    }

    /// The config as a TOML file, with the runtime found via `runtime_prefix`.
    pub fn write_config_file(&self) -> PathBuf {
        let mut config = self.config();
        let runtime_prefix = self.root.parent().expect("fixture parent").to_path_buf();
        config.paths.runtime_prefix = Some(runtime_prefix);
        let path = self.root.parent().expect("fixture parent").join("prefixer.toml");
        std::fs::write(&path, config.to_toml_string().expect("render config")).expect("write config");
        path
    }

    pub fn orchestrator(&self, config: PrefixerConfig) -> Orchestrator {
        let session = InstallationSession::begin(&self.root).expect("begin session");
        let detector = RuntimeDetector::from_settings(&config.runtime, None).with_search_dirs(vec![self.bin.clone()]);
        Orchestrator::new(config, session, InstallOptions::default())
            .with_detector(detector)
            .with_resource_probe(Box::new(NoProbe))
    }
}

/// Process exited, or is a zombie awaiting reaping.
pub fn process_gone(pid: u32) -> bool {
    if let Ok(stat) = std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        let state = stat
            .rfind(')')
            .and_then(|idx| stat[idx + 1..].split_whitespace().next())
            .and_then(|s| s.chars().next());
        return matches!(state, Some('Z') | Some('X'));
    }
    let rc = unsafe { libc::kill(pid as libc::pid_t, 0) };
    rc != 0 && std::io::Error::last_os_error().raw_os_error() == Some(libc::ESRCH)
}

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
