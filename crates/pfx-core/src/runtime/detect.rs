//! Runtime candidate detection.
//!
//! Pure discovery: probes each known binary with `--version` and ranks the
//! results. Nothing is selected or configured here.

use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use pfx_config::RuntimeSettings;
use regex::Regex;
use tracing::{debug, info, warn};

use super::{RuntimeCandidate, RuntimeTier};
use crate::cancel::CancellationToken;
use crate::logging::event_names;
use crate::process::{is_executable, CommandSpec, OutputSink, ProcessRunner};

/// Finds and ranks runtime executables.
#[derive(Debug, Clone)]
pub struct RuntimeDetector {
    names: Vec<String>,
    search_dirs: Vec<PathBuf>,
    stable_threshold: u32,
    experimental_threshold: u32,
    probe_timeout: Duration,
    runner: ProcessRunner,
}

impl RuntimeDetector {
    /// Detector searching `<runtime_prefix>/bin` then `$PATH`.
    pub fn from_settings(settings: &RuntimeSettings, runtime_prefix: Option<&Path>) -> Self {
        Self {
            names: settings.names.clone(),
            search_dirs: search_path(runtime_prefix, std::env::var_os("PATH")),
            stable_threshold: settings.stable_threshold,
            experimental_threshold: settings.experimental_threshold,
            probe_timeout: settings.probe_timeout(),
            runner: ProcessRunner::new(Duration::from_millis(200)),
        }
    }

    pub fn with_search_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.search_dirs = dirs;
        self
    }

    pub fn search_dirs(&self) -> &[PathBuf] {
        &self.search_dirs
    }

    /// Ranked candidates; empty when nothing usable was found.
    pub fn detect(&self, cancel: &CancellationToken) -> Vec<RuntimeCandidate> {
        let mut seen = HashSet::new();
        let mut found: Vec<Discovered> = Vec::new();

        for name in &self.names {
            for dir in &self.search_dirs {
                if cancel.is_cancelled() {
                    return Vec::new();
                }
                let path = dir.join(name);
                if !is_executable(&path) {
                    continue;
                }
                let canonical = path.canonicalize().unwrap_or_else(|_| path.clone());
                if !seen.insert(canonical) {
                    debug!(path = %path.display(), "duplicate runtime executable skipped");
                    continue;
                }
                if let Some(version) = self.probe(&path, cancel) {
                    found.push(Discovered {
                        path,
                        version,
                        order: found.len(),
                    });
                }
            }
        }

        let candidates = rank(found, self.stable_threshold, self.experimental_threshold);
        for candidate in &candidates {
            info!(
                target: event_names::RUNTIME_FOUND,
                id = candidate.id,
                path = %candidate.executable_path.display(),
                version = %candidate.reported_version,
                tier = %candidate.tier,
                recommended = candidate.is_recommended,
                "runtime candidate"
            );
            if candidate.tier == RuntimeTier::Fallback {
                warn!(
                    target: event_names::RUNTIME_COMPAT_WARNING,
                    path = %candidate.executable_path.display(),
                    version = %candidate.reported_version,
                    "runtime version is outside the tested range; initialization may be slow or fail"
                );
            }
        }
        candidates
    }

    /// Run `<path> --version`; `None` when the binary cannot be started.
    fn probe(&self, path: &Path, cancel: &CancellationToken) -> Option<String> {
        let spec = CommandSpec::new(path).arg("--version").label("probe");
        let sink = OutputSink::discard();
        match self.runner.run(&spec, self.probe_timeout, &sink, cancel) {
            Ok(outcome) => {
                let first = outcome
                    .lines
                    .iter()
                    .map(|l| l.trim())
                    .find(|l| !l.is_empty())
                    .unwrap_or("");
                let version = parse_version(first).unwrap_or_else(|| {
                    if first.is_empty() {
                        "unknown".to_string()
                    } else {
                        first.to_string()
                    }
                });
                debug!(path = %path.display(), raw = first, version = %version, "runtime probed");
                Some(version)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "runtime probe failed");
                None
            }
        }
    }
}

#[derive(Debug)]
struct Discovered {
    path: PathBuf,
    version: String,
    order: usize,
}

/// `<runtime_prefix>/bin` first, then each `PATH` entry.
pub fn search_path(runtime_prefix: Option<&Path>, path_var: Option<OsString>) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(prefix) = runtime_prefix {
        dirs.push(prefix.join("bin"));
    }
    if let Some(path_var) = path_var {
        dirs.extend(std::env::split_paths(&path_var).filter(|p| !p.as_os_str().is_empty()));
    }
    dirs
}

fn version_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(\d+(?:\.\d+)+)").ok())
        .as_ref()
}

/// Extract a dotted version from `--version` output.
///
/// `wine-9.0 (Staging)` → `9.0`.
pub fn parse_version(raw: &str) -> Option<String> {
    version_pattern()?
        .captures(raw)
        .map(|caps| caps[1].to_string())
}

fn version_key(version: &str) -> Vec<u32> {
    version
        .split('.')
        .map_while(|part| part.parse::<u32>().ok())
        .collect()
}

/// Tier for a reported version.
pub fn classify(version: &str, stable_threshold: u32, experimental_threshold: u32) -> RuntimeTier {
    match version_key(version).first() {
        Some(&major) if major < stable_threshold => RuntimeTier::Preferred,
        Some(&major) if major < experimental_threshold => RuntimeTier::Standard,
        _ => RuntimeTier::Fallback,
    }
}

/// Sort by tier, then newer version, then discovery order; assign ids 1..n.
fn rank(found: Vec<Discovered>, stable: u32, experimental: u32) -> Vec<RuntimeCandidate> {
    let mut tiered: Vec<(RuntimeTier, Vec<u32>, Discovered)> = found
        .into_iter()
        .map(|d| (classify(&d.version, stable, experimental), version_key(&d.version), d))
        .collect();
    tiered.sort_by(|a, b| {
        a.0.cmp(&b.0)
            .then_with(|| b.1.cmp(&a.1))
            .then_with(|| a.2.order.cmp(&b.2.order))
    });
    tiered
        .into_iter()
        .enumerate()
        .map(|(i, (tier, _, d))| RuntimeCandidate {
            id: i as u32 + 1,
            executable_path: d.path,
            reported_version: d.version,
            tier,
            is_recommended: i == 0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::write_script;
    use proptest::prelude::*;

    fn fake_runtime(dir: &Path, name: &str, version_line: &str) -> PathBuf {
        write_script(dir, name, &format!("#!/bin/sh\necho '{}'\n", version_line))
    }

    fn detector(dirs: Vec<PathBuf>, names: &[&str]) -> RuntimeDetector {
        let settings = RuntimeSettings {
            names: names.iter().map(|s| s.to_string()).collect(),
            ..RuntimeSettings::default()
        };
        RuntimeDetector::from_settings(&settings, None).with_search_dirs(dirs)
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("wine-9.0 (Staging)").as_deref(), Some("9.0"));
        assert_eq!(parse_version("wine-8.0.2").as_deref(), Some("8.0.2"));
        assert_eq!(parse_version("wine-10.0-rc3").as_deref(), Some("10.0"));
        assert_eq!(parse_version("wine"), None);
    }

    #[test]
    fn test_classify_thresholds() {
        assert_eq!(classify("8.0", 9, 10), RuntimeTier::Preferred);
        assert_eq!(classify("9.21", 9, 10), RuntimeTier::Standard);
        assert_eq!(classify("10.0", 9, 10), RuntimeTier::Fallback);
        assert_eq!(classify("unknown", 9, 10), RuntimeTier::Fallback);
    }

    #[test]
    fn test_search_path_prefers_runtime_prefix() {
        let dirs = search_path(
            Some(Path::new("/opt/wine")),
            Some(OsString::from("/usr/local/bin::/usr/bin")),
        );
        assert_eq!(
            dirs,
            vec![
                PathBuf::from("/opt/wine/bin"),
                PathBuf::from("/usr/local/bin"),
                PathBuf::from("/usr/bin"),
            ]
        );
    }

    #[test]
    fn test_detect_empty_when_nothing_installed() {
        let dir = tempfile::tempdir().unwrap();
        let found = detector(vec![dir.path().to_path_buf()], &["wine", "wine64"])
            .detect(&CancellationToken::detached());
        assert!(found.is_empty());
    }

    #[test]
    fn test_detect_ranks_and_recommends_one() {
        let dir = tempfile::tempdir().unwrap();
        fake_runtime(dir.path(), "wine", "wine-10.1");
        fake_runtime(dir.path(), "wine64", "wine-8.0.1");
        fake_runtime(dir.path(), "wine-stable", "wine-8.21");

        let found = detector(vec![dir.path().to_path_buf()], &["wine", "wine64", "wine-stable"])
            .detect(&CancellationToken::detached());

        let names: Vec<_> = found.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["wine-stable", "wine64", "wine"]);
        assert_eq!(found.iter().filter(|c| c.is_recommended).count(), 1);
        assert!(found[0].is_recommended);
        assert_eq!(found[2].tier, RuntimeTier::Fallback);
        assert_eq!(found.iter().map(|c| c.id).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_detect_deduplicates_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let real = fake_runtime(dir.path(), "wine64", "wine-8.0");
        std::os::unix::fs::symlink(&real, dir.path().join("wine")).unwrap();

        let found = detector(vec![dir.path().to_path_buf()], &["wine", "wine64"])
            .detect(&CancellationToken::detached());
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_non_executable_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("wine"), "not a program").unwrap();
        let found = detector(vec![dir.path().to_path_buf()], &["wine"])
            .detect(&CancellationToken::detached());
        assert!(found.is_empty());
    }

    #[test]
    fn test_unparseable_version_is_fallback() {
        let dir = tempfile::tempdir().unwrap();
        fake_runtime(dir.path(), "wine", "custom build");
        let found = detector(vec![dir.path().to_path_buf()], &["wine"])
            .detect(&CancellationToken::detached());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].tier, RuntimeTier::Fallback);
        assert_eq!(found[0].reported_version, "custom build");
    }

    proptest! {
        #[test]
        fn prop_rank_recommends_exactly_one(versions in proptest::collection::vec((0u32..15, 0u32..30), 1..8)) {
            let found: Vec<Discovered> = versions
                .iter()
                .enumerate()
                .map(|(i, (major, minor))| Discovered {
                    path: PathBuf::from(format!("/bin/wine{}", i)),
                    version: format!("{}.{}", major, minor),
                    order: i,
                })
                .collect();
            let ranked = rank(found, 9, 10);
            prop_assert_eq!(ranked.iter().filter(|c| c.is_recommended).count(), 1);
            prop_assert!(ranked.windows(2).all(|w| w[0].tier <= w[1].tier));
        }
    }
}
