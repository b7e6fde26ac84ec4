//! Retrying component installer.

use serde::Serialize;
use tracing::{info, warn};

use super::component::{CommandContext, ComponentSpec};
use crate::cancel::CancellationToken;
use crate::logging::event_names;
use crate::process::{OutputSink, ProcessRunner};

/// Result of installing one component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InstallOutcome {
    Success {
        attempts: u32,
    },
    Failed {
        last_exit_code: Option<i32>,
        attempts: u32,
        /// The last attempt hit the component timeout.
        timed_out: bool,
    },
    Cancelled,
}

/// Shared per-run state for component installs.
pub struct InstallContext<'a> {
    pub commands: &'a CommandContext,
    pub sink: &'a OutputSink,
    pub cancel: &'a CancellationToken,
}

/// Runs a component's command up to `max_retries` times.
#[derive(Debug, Clone, Default)]
pub struct RetryingInstaller {
    runner: ProcessRunner,
}

impl RetryingInstaller {
    pub fn new(runner: ProcessRunner) -> Self {
        Self { runner }
    }

    /// Install `spec`, stopping at the first successful attempt.
    ///
    /// Each attempt writes `attempt <name>#<n>/<max>` to the process log. A
    /// command that cannot be spawned counts as a failed attempt.
    pub fn install_component(&self, spec: &ComponentSpec, ctx: &InstallContext<'_>) -> InstallOutcome {
        let max = spec.max_retries.max(1);
        let mut last_exit_code = None;
        let mut timed_out = false;

        for attempt in 1..=max {
            if ctx.cancel.is_cancelled() {
                return InstallOutcome::Cancelled;
            }

            ctx.sink
                .write_marker(&spec.name, &format!("attempt {}#{}/{}", spec.name, attempt, max));
            info!(
                target: event_names::COMPONENT_ATTEMPT,
                component = %spec.name,
                attempt,
                max_attempts = max,
                "installing component"
            );

            let command = spec.install_command.render(ctx.commands).label(&spec.name);
            match self.runner.run(&command, spec.timeout, ctx.sink, ctx.cancel) {
                Ok(outcome) if outcome.cancelled => return InstallOutcome::Cancelled,
                Ok(outcome) if outcome.success() => {
                    info!(
                        target: event_names::COMPONENT_RESULT,
                        component = %spec.name,
                        attempts = attempt,
                        duration_ms = outcome.duration.as_millis() as u64,
                        "component installed"
                    );
                    return InstallOutcome::Success { attempts: attempt };
                }
                Ok(outcome) => {
                    last_exit_code = outcome.exit_code;
                    timed_out = outcome.timed_out;
                    warn!(
                        component = %spec.name,
                        attempt,
                        exit_code = ?outcome.exit_code,
                        timed_out = outcome.timed_out,
                        "component attempt failed"
                    );
                }
                Err(e) => {
                    last_exit_code = None;
                    timed_out = false;
                    warn!(component = %spec.name, attempt, error = %e, "component command could not be started");
                }
            }

            if attempt < max && !ctx.cancel.sleep(spec.retry_delay) {
                return InstallOutcome::Cancelled;
            }
        }

        warn!(
            target: event_names::COMPONENT_RESULT,
            component = %spec.name,
            attempts = max,
            exit_code = ?last_exit_code,
            fatal = spec.fatal,
            "component failed after all attempts"
        );
        InstallOutcome::Failed {
            last_exit_code,
            attempts: max,
            timed_out,
        }
    }
}
