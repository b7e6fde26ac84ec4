//! Compatibility runtime discovery, ranking and selection.

pub mod detect;

pub use detect::{classify, parse_version, RuntimeDetector};

use std::fmt;
use std::path::{Path, PathBuf};

use pfx_common::Error;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::logging::event_names;
use crate::process::CommandSpec;

/// Known stability class of a runtime version.
///
/// Ordering is preference: `Preferred < Standard < Fallback`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeTier {
    Preferred,
    Standard,
    /// Experimental or unrecognized; slower to initialize and flagged.
    Fallback,
}

impl fmt::Display for RuntimeTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeTier::Preferred => write!(f, "preferred"),
            RuntimeTier::Standard => write!(f, "standard"),
            RuntimeTier::Fallback => write!(f, "fallback"),
        }
    }
}

/// A discovered runtime executable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeCandidate {
    /// 1-based rank.
    pub id: u32,
    pub executable_path: PathBuf,
    pub reported_version: String,
    pub tier: RuntimeTier,
    pub is_recommended: bool,
}

impl RuntimeCandidate {
    /// Binary name, e.g. `wine64`.
    pub fn name(&self) -> String {
        self.executable_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

impl fmt::Display for RuntimeCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {})",
            self.executable_path.display(),
            self.reported_version,
            self.tier
        )
    }
}

/// The selected runtime bound to a prefix.
///
/// Every command run inside the prefix carries the same overlay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeEnv {
    pub runtime: PathBuf,
    pub prefix: PathBuf,
    /// `win32` or `win64`.
    pub arch: String,
}

impl RuntimeEnv {
    pub fn new(runtime: impl Into<PathBuf>, prefix: impl Into<PathBuf>, arch: impl Into<String>) -> Self {
        Self {
            runtime: runtime.into(),
            prefix: prefix.into(),
            arch: arch.into(),
        }
    }

    /// `WINEPREFIX`, `WINEARCH`, and `WINE` (for helper scripts).
    pub fn env_overlay(&self) -> Vec<(String, String)> {
        vec![
            ("WINEPREFIX".to_string(), self.prefix.display().to_string()),
            ("WINEARCH".to_string(), self.arch.clone()),
            ("WINE".to_string(), self.runtime.display().to_string()),
        ]
    }

    /// Apply the overlay to a command.
    pub fn apply(&self, mut spec: CommandSpec) -> CommandSpec {
        for (key, value) in self.env_overlay() {
            spec = spec.env(key, value);
        }
        spec
    }

    /// `<runtime> <args...>` inside the prefix.
    pub fn command<I, S>(&self, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.apply(CommandSpec::new(&self.runtime).args(args))
    }
}

/// Pick a candidate from a ranked list.
///
/// `choice` may be a candidate id, a binary name, or a path. Without one the
/// recommended candidate is used; a single candidate is used as-is.
pub fn select(candidates: &[RuntimeCandidate], choice: Option<&str>) -> Result<RuntimeCandidate, Error> {
    if candidates.is_empty() {
        return Err(Error::EnvironmentNotFound {
            searched: "no candidates to select from".to_string(),
        });
    }

    let selected = match choice.map(str::trim).filter(|c| !c.is_empty()) {
        None if candidates.len() == 1 => Some(&candidates[0]),
        None => candidates
            .iter()
            .find(|c| c.is_recommended)
            .or_else(|| candidates.first()),
        Some(choice) => find_choice(candidates, choice),
    };

    match selected {
        Some(candidate) => {
            info!(
                target: event_names::RUNTIME_SELECTED,
                id = candidate.id,
                path = %candidate.executable_path.display(),
                version = %candidate.reported_version,
                tier = %candidate.tier,
                "runtime selected"
            );
            Ok(candidate.clone())
        }
        None => Err(Error::InvalidArgument(format!(
            "runtime '{}' is not among the detected candidates ({})",
            choice.unwrap_or_default(),
            candidates
                .iter()
                .map(|c| format!("{}={}", c.id, c.name()))
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

fn find_choice<'a>(candidates: &'a [RuntimeCandidate], choice: &str) -> Option<&'a RuntimeCandidate> {
    if let Ok(id) = choice.parse::<u32>() {
        return candidates.iter().find(|c| c.id == id);
    }
    if choice.contains('/') {
        let wanted = Path::new(choice);
        let canonical = wanted.canonicalize().ok();
        return candidates.iter().find(|c| {
            c.executable_path == wanted || canonical.as_deref() == Some(c.executable_path.as_path())
        });
    }
    candidates.iter().find(|c| c.name() == choice)
}
