//! End-to-end install runs against a scripted fake runtime.

mod support;

use std::time::Duration;

use pfx_common::VersionBucket;
use pfx_core::cancel::CancellationToken;
use pfx_core::checkpoint::PREFIX_INITIALIZED;
use pfx_core::exit_codes::ExitCode;
use pfx_core::orchestrator::{RunStatus, State};
use pfx_core::version::DetectionMethod;
use support::fake_env::{process_gone, wait_until, FakeEnv, INSTALLED_PRODUCT};

#[test]
fn clean_run_completes_and_clears_checkpoints() {
    let env = FakeEnv::new();
    let mut orchestrator = env.orchestrator(env.config());

    let summary = orchestrator.run(&CancellationToken::detached());

    assert_eq!(summary.status, RunStatus::Done, "{}", summary.render_human());
    assert_eq!(summary.exit_code(), ExitCode::Clean);
    assert!(summary.warnings.is_empty(), "{:?}", summary.warnings);
    assert_eq!(summary.passed_steps.len(), 9);
    assert_eq!(summary.passed_steps.last(), Some(&State::Finalize));

    let version = summary.version.expect("version signal");
    assert_eq!(version.bucket, VersionBucket::Mid);
    assert_eq!(version.method, DetectionMethod::DirectoryName);

    assert!(env.prefix().join("system.reg").is_file());
    assert!(env.prefix().join(INSTALLED_PRODUCT).is_dir());
    assert!(!env.checkpoint_dir().exists() || std::fs::read_dir(env.checkpoint_dir()).unwrap().count() == 0);

    // Every helper ran exactly once.
    let calls = env.winetricks_calls();
    assert_eq!(calls.len(), 11, "{:?}", calls);
    assert_eq!(calls[0], "msxml3");
    assert!(calls.contains(&"fontsmooth=rgb".to_string()));

    let registry = env.prefix().join(".fake-registry");
    assert_eq!(std::fs::read_to_string(registry.join("csmt")).unwrap(), "0");
    assert_eq!(std::fs::read_to_string(registry.join("csmt.type")).unwrap(), "REG_DWORD");
    assert_eq!(
        std::fs::read_to_string(registry.join("OffscreenRenderingMode")).unwrap(),
        "backbuffer"
    );
    assert_eq!(std::fs::read_to_string(registry.join("gdiplus")).unwrap(), "native,builtin");
}

#[test]
fn prefix_that_never_becomes_ready_aborts_after_two_attempts() {
    let env = FakeEnv::new();
    env.never_ready();
    let mut orchestrator = env.orchestrator(env.config());

    let summary = orchestrator.run(&CancellationToken::detached());

    assert_eq!(summary.status, RunStatus::Aborted);
    assert_eq!(summary.exit_code(), ExitCode::InitTimeout);
    let failure = summary.failure.as_ref().expect("failure");
    assert_eq!(failure.step, State::AwaitReady);
    assert_eq!(failure.error.code, 30);
    assert!(failure.error.message.contains("2 attempt"), "{}", failure.error.message);

    let process_log = orchestrator.session().log_paths.process.clone();
    let log = std::fs::read_to_string(process_log).unwrap();
    let attempts: Vec<&str> = log.lines().filter(|l| l.contains("attempt wineboot-init#")).collect();
    assert_eq!(attempts.len(), 2, "{}", log);
    assert!(attempts[0].contains("wineboot-init#1/2"), "{}", log);
    assert!(attempts[1].contains("wineboot-init#2/2"), "{}", log);
    assert_eq!(env.wineboot_runs(), 2);

    assert!(env.winetricks_calls().is_empty());
    assert!(!env.checkpoint_dir().join(PREFIX_INITIALIZED).exists());
}

#[test]
fn optional_component_failure_is_a_warning() {
    let env = FakeEnv::new();
    env.fail_verb("corefonts");
    let mut orchestrator = env.orchestrator(env.config());

    let summary = orchestrator.run(&CancellationToken::detached());

    assert_eq!(summary.status, RunStatus::Done, "{}", summary.render_human());
    assert_eq!(summary.exit_code(), ExitCode::CompletedWithWarnings);
    assert_eq!(summary.warnings.len(), 1, "{:?}", summary.warnings);
    assert_eq!(summary.warnings[0].step, State::InstallComponents);
    assert!(summary.warnings[0].message.contains("corefonts"));

    // Retried up to the configured limit, then moved on.
    let corefonts_attempts = env.winetricks_calls().iter().filter(|v| *v == "corefonts").count();
    assert_eq!(corefonts_attempts, 3);
    assert!(env.prefix().join(INSTALLED_PRODUCT).is_dir());
}

#[test]
fn fatal_component_failure_keeps_checkpoints_for_resume() {
    let env = FakeEnv::new();
    env.fail_verb("gdiplus");
    let mut orchestrator = env.orchestrator(env.config());

    let summary = orchestrator.run(&CancellationToken::detached());

    assert_eq!(summary.status, RunStatus::Aborted);
    assert_eq!(summary.exit_code(), ExitCode::ComponentFailure);
    let failure = summary.failure.as_ref().expect("failure");
    assert_eq!(failure.step, State::InstallComponents);
    assert!(failure.log_path.ends_with("process.log"));

    for name in [PREFIX_INITIALIZED, "msxml3", "msxml6", "atmlib"] {
        assert!(env.checkpoint_dir().join(name).is_file(), "missing checkpoint {}", name);
    }
    assert!(!env.checkpoint_dir().join("gdiplus").exists());

    // Second run resumes after the completed milestones.
    std::fs::remove_file(env.bin.join("fail-verbs")).unwrap();
    let before = env.winetricks_calls().len();
    let mut rerun = env.orchestrator(env.config());
    let summary = rerun.run(&CancellationToken::detached());
    assert_eq!(summary.status, RunStatus::Done, "{}", summary.render_human());

    let rerun_calls: Vec<String> = env.winetricks_calls().split_off(before);
    assert!(!rerun_calls.contains(&"msxml3".to_string()), "{:?}", rerun_calls);
    assert!(!rerun_calls.contains(&"atmlib".to_string()));
    assert!(rerun_calls.contains(&"gdiplus".to_string()));
    // Optional components have no checkpoint and run again.
    assert!(rerun_calls.contains(&"corefonts".to_string()));

    let resumed: Vec<&str> = summary
        .components
        .iter()
        .filter(|c| c.outcome.is_none())
        .map(|c| c.name.as_str())
        .collect();
    assert_eq!(resumed, vec!["msxml3", "msxml6", "atmlib"]);
}

#[test]
fn cancellation_mid_component_kills_the_process_group() {
    let env = FakeEnv::new();
    env.hang_verb("atmlib");
    let mut orchestrator = env.orchestrator(env.config());

    let cancel = CancellationToken::detached();
    let watcher = {
        let cancel = cancel.clone();
        let pid_file = env.bin.join("grandchild.pid");
        std::thread::spawn(move || {
            let appeared = wait_until(Duration::from_secs(20), || pid_file.is_file());
            cancel.cancel();
            appeared
        })
    };

    let summary = orchestrator.run(&cancel);
    assert!(watcher.join().unwrap(), "hanging helper never started");

    assert_eq!(summary.status, RunStatus::Cancelled);
    assert_eq!(summary.exit_code(), ExitCode::Cancelled);
    assert_eq!(summary.failure.as_ref().map(|f| f.step), Some(State::InstallComponents));

    let grandchild = env.grandchild_pid().expect("grandchild pid");
    assert!(
        wait_until(Duration::from_secs(5), || process_gone(grandchild)),
        "grandchild {} survived cancellation",
        grandchild
    );

    for name in [PREFIX_INITIALIZED, "msxml3", "msxml6"] {
        assert!(env.checkpoint_dir().join(name).is_file(), "missing checkpoint {}", name);
    }
    assert!(!env.checkpoint_dir().join("atmlib").exists());
    assert!(!env.checkpoint_dir().join("gdiplus").exists());
}

#[test]
fn summary_json_reports_exit_code() {
    let env = FakeEnv::new();
    env.fail_verb("corefonts");
    let mut orchestrator = env.orchestrator(env.config());

    let json = orchestrator.run(&CancellationToken::detached()).to_json_value();

    assert_eq!(json["status"], "done");
    assert_eq!(json["exit_code"], 1);
    assert_eq!(json["exit_code_name"], "OK_WARNINGS");
    assert_eq!(json["runtime"]["reported_version"], "8.0");
    assert_eq!(json["version"]["bucket"], "mid");
}
