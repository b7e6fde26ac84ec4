//! CLI tests for the prefixer binary.
//!
//! These run the built binary with an explicit `--config` so no user or
//! system configuration leaks in.

mod support;

use assert_cmd::Command;
use predicates::prelude::*;
use support::fake_env::FakeEnv;

/// Get a Command for the prefixer binary with a clean environment.
fn prefixer() -> Command {
    let mut cmd = Command::cargo_bin("prefixer").expect("prefixer binary should exist");
    for var in [
        "PREFIXER_CONFIG",
        "PREFIXER_ROOT",
        "PREFIXER_RUNTIME_PREFIX",
        "PREFIXER_ARCH",
        "PREFIXER_LOG",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

// ============================================================================
// Argument handling
// ============================================================================

mod args {
    use super::*;

    #[test]
    fn unknown_command_fails() {
        prefixer()
            .arg("nonexistent-command")
            .assert()
            .failure()
            .stderr(predicate::str::contains("error"));
    }

    #[test]
    fn help_lists_commands() {
        prefixer()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("install"))
            .stdout(predicate::str::contains("checkpoints"));
    }

    #[test]
    fn missing_config_file_is_a_config_error() {
        prefixer()
            .args(["--config", "/nonexistent/prefixer.toml", "detect"])
            .assert()
            .code(14)
            .stderr(predicate::str::contains("Configuration Error"));
    }
}

// ============================================================================
// Read-only commands
// ============================================================================

mod commands {
    use super::*;

    #[test]
    fn detect_lists_fake_runtime_as_recommended() {
        let env = FakeEnv::new();
        let config = env.write_config_file();
        prefixer()
            .arg("--config")
            .arg(&config)
            .arg("detect")
            .assert()
            .success()
            .stdout(predicate::str::contains("Runtime candidates:"))
            .stdout(predicate::str::contains("fakewine"))
            .stdout(predicate::str::contains("(recommended)"));
    }

    #[test]
    fn detect_without_runtime_exits_not_found() {
        let env = FakeEnv::new();
        let mut config = env.config();
        config.runtime.names = vec!["prefixer-no-such-runtime".to_string()];
        let path = env.root.join("empty.toml");
        std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();

        prefixer()
            .arg("--config")
            .arg(&path)
            .env("PATH", &env.installer)
            .arg("detect")
            .assert()
            .code(11)
            .stderr(predicate::str::contains("No Runtime Found"));
    }

    #[test]
    fn detect_json_error_goes_to_stdout() {
        let env = FakeEnv::new();
        let mut config = env.config();
        config.runtime.names = vec!["prefixer-no-such-runtime".to_string()];
        let path = env.root.join("empty.toml");
        std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();

        let output = prefixer()
            .arg("--config")
            .arg(&path)
            .args(["--format", "json", "detect"])
            .env("PATH", &env.installer)
            .output()
            .unwrap();
        assert_eq!(output.status.code(), Some(11));
        let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(json["code"], 20);
    }

    #[test]
    fn config_show_names_source() {
        let env = FakeEnv::new();
        let config = env.write_config_file();
        prefixer()
            .arg("--config")
            .arg(&config)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("# source: CLI argument"))
            .stdout(predicate::str::contains("[readiness]"));
    }

    #[test]
    fn config_show_json() {
        let env = FakeEnv::new();
        let config = env.write_config_file();
        let output = prefixer()
            .arg("--config")
            .arg(&config)
            .args(["--format", "json", "config", "show"])
            .output()
            .unwrap();
        assert!(output.status.success());
        let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(json["config"]["schema_version"], "1");
        assert_eq!(json["environment_root"], env.root.display().to_string());
    }

    #[test]
    fn root_flag_overrides_config() {
        let env = FakeEnv::new();
        let config = env.write_config_file();
        let other = env.root.join("elsewhere");
        let output = prefixer()
            .arg("--config")
            .arg(&config)
            .arg("--root")
            .arg(&other)
            .args(["--format", "json", "config", "show"])
            .output()
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(json["environment_root"], other.display().to_string());
    }

    #[test]
    fn version_reads_directory_names() {
        let env = FakeEnv::new();
        let config = env.write_config_file();
        let tree = env.root.join("media");
        std::fs::create_dir_all(tree.join("Adobe Photoshop 2022")).unwrap();
        prefixer()
            .arg("--config")
            .arg(&config)
            .arg("version")
            .arg(&tree)
            .assert()
            .success()
            .stdout(predicate::str::contains("Bucket:     latest"))
            .stdout(predicate::str::contains("directory_name"));
    }

    #[test]
    fn checkpoints_on_fresh_root() {
        let env = FakeEnv::new();
        let config = env.write_config_file();
        prefixer()
            .arg("--config")
            .arg(&config)
            .arg("checkpoints")
            .assert()
            .success()
            .stdout(predicate::str::contains("0 of 11 milestones complete."));
    }

    #[test]
    fn checkpoints_reset_removes_files() {
        let env = FakeEnv::new();
        let config = env.write_config_file();
        let dir = env.checkpoint_dir();
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("prefix-initialized"), "2026-01-01T00:00:00Z\n").unwrap();
        std::fs::write(dir.join("msxml3"), "2026-01-01T00:00:01Z\n").unwrap();

        prefixer()
            .arg("--config")
            .arg(&config)
            .arg("checkpoints")
            .assert()
            .success()
            .stdout(predicate::str::contains("2 of 11 milestones complete."));

        prefixer()
            .arg("--config")
            .arg(&config)
            .args(["checkpoints", "--reset"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Removed 2 checkpoint(s)."));
        assert!(!dir.join("msxml3").exists());
    }
}

// ============================================================================
// Full install
// ============================================================================

mod install {
    use super::*;

    #[test]
    fn install_completes_and_writes_session_logs() {
        let env = FakeEnv::new();
        let config = env.write_config_file();
        prefixer()
            .arg("--config")
            .arg(&config)
            .args(["--quiet", "install"])
            .assert()
            .code(0)
            .stdout(predicate::str::contains("Result: completed"))
            .stdout(predicate::str::contains("Passed:   init, detect_runtime"));

        let logs = env.root.join("logs");
        let sessions: Vec<_> = std::fs::read_dir(&logs).unwrap().flatten().collect();
        assert_eq!(sessions.len(), 1);
        let session = sessions[0].path();
        let main_log = std::fs::read_to_string(session.join("main.log")).unwrap();
        assert!(main_log.contains("install run finished"), "{}", main_log);
        assert!(session.join("process.log").is_file());
        assert!(!env.root.join("tmp").exists());
    }

    #[test]
    fn install_json_summary_on_missing_runtime() {
        let env = FakeEnv::new();
        let mut config = env.config();
        config.runtime.names = vec!["prefixer-no-such-runtime".to_string()];
        let path = env.root.join("empty.toml");
        std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();

        let output = prefixer()
            .arg("--config")
            .arg(&path)
            .args(["--quiet", "--format", "json", "install"])
            .env("PATH", &env.installer)
            .output()
            .unwrap();
        assert_eq!(output.status.code(), Some(11));
        let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(json["status"], "aborted");
        assert_eq!(json["failure"]["step"], "detect_runtime");
        assert_eq!(json["exit_code_name"], "ERR_ENV_NOT_FOUND");
    }
}
