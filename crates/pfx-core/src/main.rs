//! Prefixer - Windows creative-suite installer for Wine prefixes
//!
//! The main entry point, handling:
//! - Full install runs (detect → init prefix → components → version → config)
//! - Runtime candidate listing
//! - Checkpoint inspection and reset
//! - Standalone version detection
//! - Configuration display

use std::io::IsTerminal;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use pfx_common::{format_error_human, Error, OutputFormat, StructuredError};
use pfx_config::{load_config, LoadedConfig};
use pfx_core::cancel::{install_signal_handlers, CancellationToken};
use pfx_core::checkpoint::{milestones_for, CheckpointManager};
use pfx_core::exit_codes::ExitCode;
use pfx_core::install::default_components;
use pfx_core::logging::{init_logging, LogConfig, LogLevel};
use pfx_core::orchestrator::{InstallOptions, Orchestrator};
use pfx_core::runtime::RuntimeDetector;
use pfx_core::session::InstallationSession;
use pfx_core::version::VersionDetector;

/// Prefixer - install Photoshop into an isolated Wine prefix
#[derive(Parser)]
#[command(name = "prefixer")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Path to prefixer.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Environment root (prefix, checkpoints, logs)
    #[arg(long, global = true, env = "PREFIXER_ROOT")]
    root: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "human")]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress console progress (session log files are still written)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full installation
    Install(InstallArgs),

    /// List ranked runtime candidates
    Detect,

    /// List or reset resume checkpoints
    Checkpoints(CheckpointArgs),

    /// Detect the product version bucket of a directory tree
    Version(VersionArgs),

    /// Configuration management
    Config(ConfigArgs),
}

#[derive(Args, Debug)]
struct InstallArgs {
    /// Runtime to use: candidate id, binary name or path
    #[arg(long)]
    runtime: Option<String>,

    /// Directory containing the product installer
    #[arg(long)]
    installer_source: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct CheckpointArgs {
    /// Remove all checkpoints (next install starts from scratch)
    #[arg(long)]
    reset: bool,
}

#[derive(Args, Debug)]
struct VersionArgs {
    /// Tree to inspect; defaults to the installer source
    path: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Print the resolved configuration
    Show,
}

fn main() {
    let cli = Cli::parse();

    let exit_code = match &cli.command {
        Commands::Install(args) => run_install(&cli.global, args),
        Commands::Detect => run_detect(&cli.global),
        Commands::Checkpoints(args) => run_checkpoints(&cli.global, args),
        Commands::Version(args) => run_version(&cli.global, args),
        Commands::Config(args) => match args.command {
            ConfigCommands::Show => run_config_show(&cli.global),
        },
    };

    std::process::exit(exit_code.as_i32());
}

// ============================================================================
// Shared helpers
// ============================================================================

fn log_config(global: &GlobalOpts, loaded: Option<&LoadedConfig>) -> LogConfig {
    let default_level = loaded.and_then(|l| l.config.logging.console_level.parse::<LogLevel>().ok());
    LogConfig::from_env(default_level, global.verbose, global.quiet)
}

/// Load configuration with `--root` applied on top.
fn load(global: &GlobalOpts) -> Result<LoadedConfig, Error> {
    let mut loaded = load_config(global.config.as_deref())?;
    if let Some(root) = &global.root {
        loaded.config.paths.root = Some(root.clone());
    }
    Ok(loaded)
}

fn output_error(global: &GlobalOpts, err: &Error) -> ExitCode {
    match global.format {
        OutputFormat::Json => println!("{}", StructuredError::from(err).to_json()),
        OutputFormat::Human => eprintln!("{}", format_error_human(err, std::io::stderr().is_terminal())),
    }
    ExitCode::for_error(err)
}

fn output_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("failed to render JSON: {}", e),
    }
}

// ============================================================================
// Command implementations
// ============================================================================

fn run_install(global: &GlobalOpts, args: &InstallArgs) -> ExitCode {
    let loaded = match load(global) {
        Ok(l) => l,
        Err(e) => {
            let _ = init_logging(&log_config(global, None), None);
            return output_error(global, &e);
        }
    };
    let config = loaded.config;

    let root = config.environment_root();
    let session = match InstallationSession::begin(&root) {
        Ok(s) => s,
        Err(e) => {
            let _ = init_logging(&log_config(global, None), None);
            return output_error(global, &e.into());
        }
    };

    let log_cfg = LogConfig::from_env(
        config.logging.console_level.parse::<LogLevel>().ok(),
        global.verbose,
        global.quiet,
    );
    let files = match init_logging(&log_cfg, Some(&session.log_paths)) {
        Ok(files) => files,
        Err(e) => return output_error(global, &Error::Io(e)),
    };
    tracing::info!(
        source = %loaded.paths.source,
        path = ?loaded.paths.config,
        "configuration loaded"
    );

    if let Err(e) = install_signal_handlers() {
        tracing::warn!(error = %e, "signal handlers not installed; Ctrl-C will not cancel cleanly");
    }
    let cancel = CancellationToken::new();

    let options = InstallOptions {
        runtime_choice: args.runtime.clone(),
        installer_source: args.installer_source.clone(),
    };
    let summary = Orchestrator::new(config, session, options).run(&cancel);

    if let Some(files) = files {
        files.flush();
    }

    match global.format {
        OutputFormat::Json => output_json(&summary.to_json_value()),
        OutputFormat::Human => print!("{}", summary.render_human()),
    }
    summary.exit_code()
}

fn run_detect(global: &GlobalOpts) -> ExitCode {
    let loaded = match load(global) {
        Ok(l) => l,
        Err(e) => return output_error(global, &e),
    };
    let _ = init_logging(&log_config(global, Some(&loaded)), None);
    let config = loaded.config;

    let detector = RuntimeDetector::from_settings(&config.runtime, config.paths.runtime_prefix.as_deref());
    let candidates = detector.detect(&CancellationToken::new());

    if candidates.is_empty() {
        let searched = detector
            .search_dirs()
            .iter()
            .map(|d| d.display().to_string())
            .collect::<Vec<_>>()
            .join(":");
        return output_error(global, &Error::EnvironmentNotFound { searched });
    }

    match global.format {
        OutputFormat::Json => output_json(&serde_json::json!({ "candidates": candidates })),
        OutputFormat::Human => {
            println!("Runtime candidates:");
            for c in &candidates {
                println!(
                    "  [{}] {:<16} {:<10} {:<10} {}{}",
                    c.id,
                    c.name(),
                    c.reported_version,
                    c.tier.to_string(),
                    c.executable_path.display(),
                    if c.is_recommended { "  (recommended)" } else { "" }
                );
            }
        }
    }
    ExitCode::Clean
}

fn run_checkpoints(global: &GlobalOpts, args: &CheckpointArgs) -> ExitCode {
    let loaded = match load(global) {
        Ok(l) => l,
        Err(e) => return output_error(global, &e),
    };
    let _ = init_logging(&log_config(global, Some(&loaded)), None);
    let config = loaded.config;

    let root = config.environment_root();
    let manager = CheckpointManager::new(&root, milestones_for(&default_components(&config.install)));

    if args.reset {
        return match manager.reset_all() {
            Ok(removed) => {
                match global.format {
                    OutputFormat::Json => output_json(&serde_json::json!({ "removed": removed })),
                    OutputFormat::Human => println!("Removed {} checkpoint(s).", removed),
                }
                ExitCode::Clean
            }
            Err(e) => output_error(global, &e.into()),
        };
    }

    let existing = match manager.list() {
        Ok(list) => list,
        Err(e) => return output_error(global, &e.into()),
    };
    match global.format {
        OutputFormat::Json => output_json(&serde_json::json!({
            "root": root.display().to_string(),
            "checkpoints": existing,
            "last_completed": manager.last_completed(),
            "milestones": manager.milestones(),
        })),
        OutputFormat::Human => {
            if existing.is_empty() {
                println!("No checkpoints under {}.", manager.dir().display());
            }
            for checkpoint in &existing {
                println!("  {:<20} {}", checkpoint.name, checkpoint.created_at.to_rfc3339());
            }
            println!(
                "{} of {} milestones complete.",
                existing.len(),
                manager.milestones().len()
            );
        }
    }
    ExitCode::Clean
}

fn run_version(global: &GlobalOpts, args: &VersionArgs) -> ExitCode {
    let loaded = match load(global) {
        Ok(l) => l,
        Err(e) => return output_error(global, &e),
    };
    let _ = init_logging(&log_config(global, Some(&loaded)), None);
    let config = loaded.config;

    let path = args.path.clone().unwrap_or_else(|| config.installer_source());
    let signal = VersionDetector::from_settings(&config.version).detect(&path);

    match global.format {
        OutputFormat::Json => output_json(&serde_json::json!({
            "path": path.display().to_string(),
            "signal": signal,
        })),
        OutputFormat::Human => {
            println!("Bucket:     {}", signal.bucket);
            println!("Method:     {} (confidence {})", signal.method, signal.confidence);
            if let Some(value) = &signal.detected_value {
                println!("Value:      {}", value);
            }
            if let Some(source) = &signal.source {
                println!("Evidence:   {}", source.display());
            }
        }
    }
    ExitCode::Clean
}

fn run_config_show(global: &GlobalOpts) -> ExitCode {
    let loaded = match load(global) {
        Ok(l) => l,
        Err(e) => return output_error(global, &e),
    };

    match global.format {
        OutputFormat::Json => output_json(&serde_json::json!({
            "source": loaded.paths.source.to_string(),
            "path": loaded.paths.config.as_ref().map(|p| p.display().to_string()),
            "environment_root": loaded.config.environment_root().display().to_string(),
            "config": loaded.config,
        })),
        OutputFormat::Human => match loaded.config.to_toml_string() {
            Ok(text) => {
                println!("# source: {}", loaded.paths.source);
                if let Some(path) = &loaded.paths.config {
                    println!("# path: {}", path.display());
                }
                print!("{}", text);
            }
            Err(e) => return output_error(global, &e.into()),
        },
    }
    ExitCode::Clean
}
