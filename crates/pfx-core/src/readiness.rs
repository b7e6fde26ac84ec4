//! Waiting for the prefix to finish background initialization.
//!
//! `wineboot --init` returns before the runtime has finished writing the
//! registry hives. The prefix is ready once the artifact (by default
//! `system.reg`) exists, is non-empty, and its size is unchanged across two
//! consecutive polls.

use std::path::Path;
use std::time::{Duration, Instant};

use pfx_config::ReadinessSettings;
use serde::Serialize;
use tracing::{debug, trace};

use crate::cancel::CancellationToken;
use crate::runtime::RuntimeTier;

/// Outcome of a readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    Ready,
    TimedOut,
    Cancelled,
}

/// Timeouts per runtime tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessPolicy {
    pub base_timeout: Duration,
    pub poll_interval: Duration,
    pub slow_tier_multiplier: u32,
}

impl ReadinessPolicy {
    pub fn from_settings(settings: &ReadinessSettings) -> Self {
        Self {
            base_timeout: settings.timeout(),
            poll_interval: settings.poll_interval(),
            slow_tier_multiplier: settings.slow_tier_multiplier.max(1),
        }
    }

    /// Fallback runtimes initialize markedly slower and get a longer budget.
    pub fn timeout_for_tier(&self, tier: RuntimeTier) -> Duration {
        match tier {
            RuntimeTier::Preferred | RuntimeTier::Standard => self.base_timeout,
            RuntimeTier::Fallback => self.base_timeout * self.slow_tier_multiplier,
        }
    }
}

/// Artifact size if it exists and is non-empty.
fn sample(path: &Path) -> Option<u64> {
    std::fs::metadata(path)
        .ok()
        .filter(|m| m.is_file())
        .map(|m| m.len())
        .filter(|&len| len > 0)
}

/// Poll until `path` is stable, the timeout elapses, or `cancel` fires.
///
/// Returns within `timeout + poll_interval` (plus sampling overhead). After
/// the deadline one final pair of samples, one interval apart, may still
/// report [`Readiness::Ready`].
pub fn wait_for_stable_artifact(
    path: &Path,
    timeout: Duration,
    poll_interval: Duration,
    cancel: &CancellationToken,
) -> Readiness {
    let start = Instant::now();
    let deadline = start + timeout;
    let mut previous: Option<u64> = None;
    let mut polls = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Readiness::Cancelled;
        }
        let current = sample(path);
        polls += 1;
        trace!(path = %path.display(), size = ?current, polls, "readiness poll");
        if let (Some(prev), Some(cur)) = (previous, current) {
            if prev == cur {
                debug!(path = %path.display(), size = cur, polls, elapsed_ms = start.elapsed().as_millis() as u64, "artifact stable");
                return Readiness::Ready;
            }
        }
        previous = current;

        let now = Instant::now();
        if now >= deadline {
            break;
        }
        if !cancel.sleep(poll_interval.min(deadline - now)) {
            return Readiness::Cancelled;
        }
    }

    // Final check straddling the deadline.
    let Some(at_deadline) = previous else {
        debug!(path = %path.display(), polls, "artifact absent at deadline");
        return Readiness::TimedOut;
    };
    if !cancel.sleep(poll_interval) {
        return Readiness::Cancelled;
    }
    if sample(path) == Some(at_deadline) {
        debug!(path = %path.display(), size = at_deadline, "artifact stable on final check");
        Readiness::Ready
    } else {
        Readiness::TimedOut
    }
}
