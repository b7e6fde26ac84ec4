//! Configuration resolution and path discovery.
//!
//! Resolution order: CLI argument → environment variable → XDG path →
//! system path → built-in defaults. Environment overrides for individual
//! settings (`PREFIXER_ROOT` and friends) are applied after the file loads.

use std::path::{Path, PathBuf};

use crate::settings::{PrefixerConfig, APP_NAME};
use crate::validate::{ValidationError, ValidationResult};

/// Discovered configuration file path.
#[derive(Debug, Clone, Default)]
pub struct ConfigPaths {
    /// Path to prefixer.toml (or None if not found).
    pub config: Option<PathBuf>,

    /// Source of the config (for diagnostics).
    pub source: ConfigSource,
}

/// Where a configuration file was found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Explicitly provided via CLI argument.
    CliArgument,

    /// Set via environment variable.
    Environment,

    /// Found in XDG config directory.
    XdgConfig,

    /// Found in /etc/prefixer/.
    SystemConfig,

    /// Using built-in defaults.
    #[default]
    BuiltinDefault,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::CliArgument => write!(f, "CLI argument"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::XdgConfig => write!(f, "XDG config"),
            ConfigSource::SystemConfig => write!(f, "system config"),
            ConfigSource::BuiltinDefault => write!(f, "builtin default"),
        }
    }
}

/// Environment variable naming the config file.
pub const ENV_CONFIG_PATH: &str = "PREFIXER_CONFIG";

/// Standard config file name.
pub const CONFIG_FILENAME: &str = "prefixer.toml";

/// A loaded, overridden and validated configuration.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: PrefixerConfig,
    pub paths: ConfigPaths,
}

/// Resolve the configuration path using the standard resolution order.
///
/// Resolution order:
/// 1. Explicit CLI path (if it exists)
/// 2. Environment variable (PREFIXER_CONFIG)
/// 3. XDG config directory (~/.config/prefixer/prefixer.toml)
/// 4. System config (/etc/prefixer/prefixer.toml)
/// 5. Built-in defaults (None)
pub fn resolve_config(cli_config: Option<&Path>) -> ConfigPaths {
    let mut paths = ConfigPaths::default();

    // 1. CLI argument
    if let Some(path) = cli_config {
        if path.exists() {
            paths.source = ConfigSource::CliArgument;
            paths.config = Some(path.to_path_buf());
            return paths;
        }
    }

    // 2. Environment variable
    if let Ok(env_path) = std::env::var(ENV_CONFIG_PATH) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            paths.source = ConfigSource::Environment;
            paths.config = Some(path);
            return paths;
        }
    }

    // 3. XDG config directory
    if let Some(dir) = xdg_config_dir() {
        let path = dir.join(CONFIG_FILENAME);
        if path.exists() {
            paths.source = ConfigSource::XdgConfig;
            paths.config = Some(path);
            return paths;
        }
    }

    // 4. System config
    let system_path = system_config_dir().join(CONFIG_FILENAME);
    if system_path.exists() {
        paths.source = ConfigSource::SystemConfig;
        paths.config = Some(system_path);
        return paths;
    }

    // 5. Built-in default
    paths.source = ConfigSource::BuiltinDefault;
    paths
}

/// Resolve, load, override from the environment and validate.
///
/// An explicit CLI path that does not exist is an error rather than a
/// silent fall-through to the next source.
pub fn load_config(cli_config: Option<&Path>) -> ValidationResult<LoadedConfig> {
    if let Some(path) = cli_config {
        if !path.exists() {
            return Err(ValidationError::NotFound(path.display().to_string()));
        }
    }

    let paths = resolve_config(cli_config);
    let mut config = match &paths.config {
        Some(path) => PrefixerConfig::from_file(path)?,
        None => PrefixerConfig::default(),
    };
    config.apply_env_overrides();
    config.validate()?;

    Ok(LoadedConfig { config, paths })
}

/// Get the XDG config directory for prefixer.
pub fn xdg_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Get the system config directory.
pub fn system_config_dir() -> PathBuf {
    PathBuf::from("/etc").join(APP_NAME)
}
