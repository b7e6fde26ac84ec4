//! The installation state machine.
//!
//! ```text
//! Init → DetectRuntime → SelectRuntime → InitEnvironment → AwaitReady
//!      → InstallComponents → DetectVersion → ApplyConfig → Finalize → Done
//!                      (any non-terminal state) → Aborted
//! ```
//!
//! Only three things abort a run: no runtime, a prefix that never becomes
//! ready, and a fatal component failure. Everything else is collected as a
//! warning in the [`RunSummary`]. Cancellation is checked between every step
//! and inside every blocking wait; it aborts without touching checkpoints so
//! the next run resumes.

pub mod state;
pub mod summary;

pub use state::{State, StateMachine, TransitionError};
pub use summary::{ComponentRecord, RunStatus, RunSummary, SummaryFailure, SummaryWarning};

use std::path::{Path, PathBuf};

use chrono::Utc;
use pfx_common::Error;
use pfx_config::PrefixerConfig;
use tracing::{error, info, warn};

use crate::cancel::{received_signal, CancellationToken};
use crate::checkpoint::{milestones_for, CheckpointManager, PREFIX_INITIALIZED};
use crate::configure::{default_entries, ConfigWriter, ConfigurationApplier, RegistryWriter};
use crate::install::{
    default_components, CommandContext, ComponentSpec, InstallContext, InstallOutcome, RetryingInstaller,
};
use crate::logging::event_names;
use crate::process::{find_program, LineFilter, OutputSink, ProcessRunner};
use crate::readiness::{wait_for_stable_artifact, Readiness, ReadinessPolicy};
use crate::runtime::{self, RuntimeCandidate, RuntimeDetector, RuntimeEnv};
use crate::session::InstallationSession;
use crate::version::{reconcile, ResourceProbe, VersionDetector, VersionSignal};

/// Prefix initialization is attempted at most this many times.
pub const INIT_ATTEMPTS: u32 = 2;

/// Per-run choices from the command line.
#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    /// Candidate id, binary name or path; `None` takes the recommended one.
    pub runtime_choice: Option<String>,
    /// Overrides the configured installer source.
    pub installer_source: Option<PathBuf>,
}

/// Mutable bookkeeping for one run.
struct Progress {
    machine: StateMachine,
    warnings: Vec<SummaryWarning>,
    components: Vec<ComponentRecord>,
    runtime: Option<RuntimeCandidate>,
    pre_version: Option<VersionSignal>,
    version: Option<VersionSignal>,
}

impl Progress {
    fn new() -> Self {
        Self {
            machine: StateMachine::new(),
            warnings: Vec::new(),
            components: Vec::new(),
            runtime: None,
            pre_version: None,
            version: None,
        }
    }

    fn step(&self) -> State {
        self.machine.current()
    }

    fn cancelled(&self) -> Error {
        Error::UserCancelled {
            step: self.step().to_string(),
        }
    }

    fn check(&self, cancel: &CancellationToken) -> Result<(), Error> {
        if cancel.is_cancelled() {
            return Err(self.cancelled());
        }
        Ok(())
    }

    /// Move to the next state unless cancelled.
    fn advance(&mut self, cancel: &CancellationToken) -> Result<(), Error> {
        self.check(cancel)?;
        self.machine
            .advance()
            .map(|_| ())
            .map_err(|e| Error::Internal(e.to_string()))
    }

    fn warn(&mut self, err: &Error) {
        self.warnings.push(SummaryWarning::new(self.step(), err));
    }
}

/// Drives one install run from detection to summary.
pub struct Orchestrator {
    config: PrefixerConfig,
    session: InstallationSession,
    options: InstallOptions,
    detector: RuntimeDetector,
    version_detector: VersionDetector,
    components: Vec<ComponentSpec>,
    config_writer: Option<Box<dyn ConfigWriter>>,
    runner: ProcessRunner,
}

impl Orchestrator {
    pub fn new(config: PrefixerConfig, session: InstallationSession, options: InstallOptions) -> Self {
        let detector = RuntimeDetector::from_settings(&config.runtime, config.paths.runtime_prefix.as_deref());
        let version_detector = VersionDetector::from_settings(&config.version);
        let components = default_components(&config.install);
        let runner = ProcessRunner::new(config.install.term_grace());
        Self {
            config,
            session,
            options,
            detector,
            version_detector,
            components,
            config_writer: None,
            runner,
        }
    }

    pub fn with_detector(mut self, detector: RuntimeDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_resource_probe(mut self, probe: Box<dyn ResourceProbe>) -> Self {
        self.version_detector = VersionDetector::with_probe(&self.config.version, probe);
        self
    }

    /// Replace the registry writer used in `ApplyConfig`.
    pub fn with_config_writer(mut self, writer: Box<dyn ConfigWriter>) -> Self {
        self.config_writer = Some(writer);
        self
    }

    pub fn with_components(mut self, components: Vec<ComponentSpec>) -> Self {
        self.components = components;
        self
    }

    pub fn session(&self) -> &InstallationSession {
        &self.session
    }

    fn installer_source(&self) -> PathBuf {
        self.options
            .installer_source
            .clone()
            .unwrap_or_else(|| self.config.installer_source())
    }

    fn winetricks(&self) -> PathBuf {
        let name = &self.config.install.winetricks;
        find_program(name).unwrap_or_else(|| PathBuf::from(name))
    }

    fn checkpoints(&self) -> CheckpointManager {
        CheckpointManager::new(&self.session.environment_root, milestones_for(&self.components))
    }

    fn open_sink(&self) -> Result<OutputSink, Error> {
        let filter = LineFilter::from_settings(&self.config.filter)
            .map_err(|e| Error::Config(format!("invalid filter pattern: {}", e)))?;
        let paths = &self.session.log_paths;
        Ok(OutputSink::files(&paths.process, &paths.process_raw, filter)?)
    }

    /// Execute the run. Always returns a summary; session teardown happens here.
    pub fn run(&mut self, cancel: &CancellationToken) -> RunSummary {
        info!(
            target: event_names::RUN_STARTED,
            session = %self.session.session_id,
            root = %self.session.environment_root.display(),
            installer_source = %self.installer_source().display(),
            "install run started"
        );

        let mut progress = Progress::new();
        let result = match self.open_sink() {
            Ok(sink) => {
                let result = self.drive(&mut progress, &sink, cancel);
                sink.flush();
                result
            }
            Err(e) => Err(e),
        };
        self.finish(progress, result)
    }

    fn drive(&mut self, progress: &mut Progress, sink: &OutputSink, cancel: &CancellationToken) -> Result<(), Error> {
        let checkpoints = self.checkpoints();
        if let Some(last) = checkpoints.last_completed() {
            info!(last_checkpoint = last, "resuming from checkpoint");
        }

        // Init: first version guess from the installer source.
        progress.pre_version = Some(self.version_detector.detect(&self.installer_source()));

        progress.advance(cancel)?;
        let candidates = self.detector.detect(cancel);
        progress.check(cancel)?;
        if candidates.is_empty() {
            let searched = self
                .detector
                .search_dirs()
                .iter()
                .map(|d| d.display().to_string())
                .collect::<Vec<_>>()
                .join(":");
            return Err(Error::EnvironmentNotFound { searched });
        }

        progress.advance(cancel)?;
        let selected = runtime::select(&candidates, self.options.runtime_choice.as_deref())?;
        self.session.selected_runtime = Some(selected.clone());
        progress.runtime = Some(selected.clone());
        let env = RuntimeEnv::new(
            &selected.executable_path,
            self.session.prefix_dir(),
            &self.config.runtime.arch,
        );

        progress.advance(cancel)?;
        self.initialize_prefix(progress, &env, &selected, &checkpoints, sink, cancel)?;

        progress.advance(cancel)?;
        self.install_components(progress, &env, &checkpoints, sink, cancel)?;

        progress.advance(cancel)?;
        self.detect_version(progress, &env);

        progress.advance(cancel)?;
        self.apply_config(progress, &env, sink, cancel)?;

        progress.advance(cancel)?;
        if let Err(e) = checkpoints.reset_all() {
            warn!(error = %e, "failed to reset checkpoints");
            let err: Error = e.into();
            progress.warn(&err);
        }
        progress.advance(cancel)?;
        Ok(())
    }

    /// `InitEnvironment` and `AwaitReady`. Leaves the machine in `AwaitReady`.
    fn initialize_prefix(
        &self,
        progress: &mut Progress,
        env: &RuntimeEnv,
        selected: &RuntimeCandidate,
        checkpoints: &CheckpointManager,
        sink: &OutputSink,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        let artifact = env.prefix.join(&self.config.readiness.artifact);
        if checkpoints.exists(PREFIX_INITIALIZED) {
            if artifact.is_file() {
                info!(prefix = %env.prefix.display(), "prefix already initialized; skipping init");
                return progress.advance(cancel);
            }
            // Later milestones describe a prefix that no longer exists.
            warn!(
                prefix = %env.prefix.display(),
                artifact = %artifact.display(),
                "checkpoints present but prefix artifact missing; resetting checkpoints"
            );
            checkpoints.reset_all()?;
        }

        let policy = ReadinessPolicy::from_settings(&self.config.readiness);
        let timeout = policy.timeout_for_tier(selected.tier);

        let mut attempt = 1;
        self.run_init(progress, env, attempt, sink, cancel)?;
        progress.advance(cancel)?;

        loop {
            match wait_for_stable_artifact(&artifact, timeout, policy.poll_interval, cancel) {
                Readiness::Ready => {
                    info!(target: event_names::INIT_READY, artifact = %artifact.display(), attempt, "prefix ready");
                    break;
                }
                Readiness::Cancelled => return Err(progress.cancelled()),
                Readiness::TimedOut if attempt < INIT_ATTEMPTS => {
                    warn!(
                        target: event_names::INIT_TIMEOUT,
                        attempt,
                        timeout_ms = timeout.as_millis() as u64,
                        "prefix not ready; re-running init"
                    );
                    attempt += 1;
                    self.run_init(progress, env, attempt, sink, cancel)?;
                }
                Readiness::TimedOut => {
                    error!(
                        target: event_names::INIT_TIMEOUT,
                        attempt,
                        timeout_ms = timeout.as_millis() as u64,
                        "prefix never became ready"
                    );
                    return Err(Error::InitializationTimeout {
                        attempts: attempt,
                        timeout_secs: timeout.as_secs(),
                    });
                }
            }
        }

        checkpoints.create(PREFIX_INITIALIZED)?;
        Ok(())
    }

    /// One `wineboot --init`. Its exit status is advisory; the artifact decides.
    fn run_init(
        &self,
        progress: &Progress,
        env: &RuntimeEnv,
        attempt: u32,
        sink: &OutputSink,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        sink.write_marker(
            "wineboot",
            &format!("attempt wineboot-init#{}/{}", attempt, INIT_ATTEMPTS),
        );
        info!(
            target: event_names::INIT_ATTEMPT,
            attempt,
            max_attempts = INIT_ATTEMPTS,
            prefix = %env.prefix.display(),
            "initializing prefix"
        );
        let command = env.command(["wineboot", "--init"]).label("wineboot");
        match self.runner.run(&command, self.config.install.init_timeout(), sink, cancel) {
            Ok(outcome) if outcome.cancelled => Err(progress.cancelled()),
            Ok(outcome) if !outcome.success() => {
                warn!(exit_code = ?outcome.exit_code, timed_out = outcome.timed_out, "prefix init command did not exit cleanly");
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(error = %e, "prefix init command could not be started");
                Ok(())
            }
        }
    }

    fn install_components(
        &self,
        progress: &mut Progress,
        env: &RuntimeEnv,
        checkpoints: &CheckpointManager,
        sink: &OutputSink,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        let commands = CommandContext {
            runtime: env.clone(),
            winetricks: self.winetricks(),
            installer_source: self.installer_source(),
        };
        let ctx = InstallContext {
            commands: &commands,
            sink,
            cancel,
        };
        let installer = RetryingInstaller::new(self.runner.clone());

        for spec in &self.components {
            progress.check(cancel)?;
            if spec.fatal && checkpoints.exists(&spec.name) {
                info!(target: event_names::COMPONENT_SKIPPED, component = %spec.name, "component already installed");
                progress.components.push(ComponentRecord {
                    name: spec.name.clone(),
                    outcome: None,
                    fatal: spec.fatal,
                });
                continue;
            }

            let outcome = installer.install_component(spec, &ctx);
            progress.components.push(ComponentRecord {
                name: spec.name.clone(),
                outcome: Some(outcome.clone()),
                fatal: spec.fatal,
            });

            match outcome {
                InstallOutcome::Success { .. } => {
                    if spec.fatal {
                        checkpoints.create(&spec.name)?;
                    }
                }
                InstallOutcome::Failed {
                    last_exit_code,
                    attempts,
                    ..
                } => {
                    let err = Error::ComponentInstallFailure {
                        component: spec.name.clone(),
                        attempts,
                        exit_code: last_exit_code,
                    };
                    if spec.fatal {
                        return Err(err);
                    }
                    warn!(component = %spec.name, error = %err, "optional component failed; continuing");
                    progress.warn(&err);
                }
                InstallOutcome::Cancelled => return Err(progress.cancelled()),
            }
        }
        Ok(())
    }

    fn detect_version(&self, progress: &mut Progress, env: &RuntimeEnv) {
        let installed = env.prefix.join(&self.config.version.installed_subdir);
        let post = self.version_detector.detect(&installed);
        let signal = match &progress.pre_version {
            Some(pre) => reconcile(pre, &post),
            None => post,
        };
        if signal.is_default() {
            let err = Error::VersionDetectionAmbiguous {
                fallback: signal.bucket.to_string(),
            };
            warn!(target: event_names::VERSION_AMBIGUOUS, bucket = %signal.bucket, "no version evidence found; using default bucket");
            progress.warn(&err);
        }
        progress.version = Some(signal);
    }

    fn apply_config(
        &self,
        progress: &mut Progress,
        env: &RuntimeEnv,
        sink: &OutputSink,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        let registry;
        let writer: &dyn ConfigWriter = match &self.config_writer {
            Some(writer) => writer.as_ref(),
            None => {
                registry = RegistryWriter::new(env.clone(), sink, cancel).with_timeout(self.config.configure.reg_timeout());
                &registry
            }
        };

        let entries = default_entries(&self.config.configure);
        let report = ConfigurationApplier::new(writer).apply(&entries, cancel);
        if report.cancelled {
            return Err(progress.cancelled());
        }
        for failed in &report.failed {
            progress.warn(&Error::ConfigurationWriteFailure {
                key: failed.key.clone(),
                reason: failed.reason.clone(),
            });
        }
        info!(
            applied = report.applied.len(),
            unchanged = report.unchanged.len(),
            failed = report.failed.len(),
            "configuration step finished"
        );
        Ok(())
    }

    fn finish(&self, mut progress: Progress, result: Result<(), Error>) -> RunSummary {
        let log_dir = self.session.log_paths.dir.clone();
        let (status, failure) = match result {
            Ok(()) => (RunStatus::Done, None),
            Err(err) => {
                let step = progress.step();
                let status = if err.is_cancellation() {
                    warn!(
                        target: event_names::CANCELLED,
                        step = %step,
                        signal = ?received_signal(),
                        "run cancelled; checkpoints kept"
                    );
                    RunStatus::Cancelled
                } else {
                    error!(step = %step, code = err.code(), error = %err, "run aborted");
                    RunStatus::Aborted
                };
                let failure = SummaryFailure::new(step, &err, self.log_for(&err));
                if let Err(e) = progress.machine.transition(State::Aborted) {
                    error!(error = %e, "state machine refused abort");
                }
                (status, Some(failure))
            }
        };

        self.session.teardown(self.config.logging.retain_sessions);

        let summary = RunSummary {
            session_id: self.session.session_id.clone(),
            status,
            started_at: self.session.started_at,
            finished_at: Utc::now(),
            passed_steps: progress.machine.passed().to_vec(),
            warnings: progress.warnings,
            failure,
            runtime: progress.runtime,
            version: progress.version.or(progress.pre_version),
            components: progress.components,
            log_dir,
        };
        info!(
            target: event_names::RUN_FINISHED,
            status = ?summary.status,
            exit_code = summary.exit_code().as_i32(),
            warnings = summary.warnings.len(),
            "install run finished"
        );
        summary
    }

    /// Log file most likely to explain `err`.
    fn log_for(&self, err: &Error) -> PathBuf {
        let paths = &self.session.log_paths;
        let path: &Path = match err {
            Error::ComponentInstallFailure { .. } | Error::InitializationTimeout { .. } => &paths.process,
            _ => &paths.error,
        };
        path.to_path_buf()
    }
}
