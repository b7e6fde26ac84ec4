//! Binary resource inspection for the version cascade.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::cancel::CancellationToken;
use crate::process::{find_program, CommandSpec, OutputSink, ProcessRunner};

/// Reads the embedded product version of an executable.
pub trait ResourceProbe: Send + Sync {
    /// `None` when the resource is absent or the probe is unavailable.
    fn product_version(&self, executable: &Path) -> Option<String>;
}

/// Probe that never finds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProbe;

impl ResourceProbe for NoProbe {
    fn product_version(&self, _executable: &Path) -> Option<String> {
        None
    }
}

/// `exiftool -s3 -ProductVersion <exe>`.
#[derive(Debug, Clone)]
pub struct ExifToolProbe {
    tool: Option<PathBuf>,
    runner: ProcessRunner,
    timeout: Duration,
    cancel: CancellationToken,
}

impl ExifToolProbe {
    /// Resolve `tool` through `PATH`; the probe is inert if it is missing.
    pub fn locate(tool: &str) -> Self {
        let resolved = find_program(tool);
        if resolved.is_none() {
            debug!(tool, "resource tool not on PATH; binary resource method disabled");
        }
        Self {
            tool: resolved,
            runner: ProcessRunner::default(),
            timeout: Duration::from_secs(30),
            cancel: CancellationToken::new(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.tool.is_some()
    }
}

impl ResourceProbe for ExifToolProbe {
    fn product_version(&self, executable: &Path) -> Option<String> {
        let tool = self.tool.as_ref()?;
        let spec = CommandSpec::new(tool)
            .args(["-s3", "-ProductVersion"])
            .arg(executable.display().to_string())
            .label("exiftool");
        let outcome = self
            .runner
            .run(&spec, self.timeout, &OutputSink::discard(), &self.cancel)
            .ok()?;
        if !outcome.success() {
            debug!(exit_code = ?outcome.exit_code, "resource probe returned no version");
            return None;
        }
        outcome
            .lines
            .iter()
            .map(|l| l.trim())
            .find(|l| !l.is_empty())
            .map(str::to_string)
    }
}
