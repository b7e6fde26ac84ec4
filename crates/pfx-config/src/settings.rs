//! Typed configuration for `prefixer.toml`.
//!
//! Every section and field is optional in the file; missing values take the
//! defaults below. Durations are stored as integer milliseconds so the file
//! stays plain TOML.

use pfx_common::VersionBucket;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::validate::ValidationError;

/// Environment variable overriding the environment root.
pub const ENV_ROOT: &str = "PREFIXER_ROOT";
/// Environment variable naming the runtime installation prefix.
pub const ENV_RUNTIME_PREFIX: &str = "PREFIXER_RUNTIME_PREFIX";
/// Environment variable selecting the prefix architecture (`WINEARCH`).
pub const ENV_ARCH: &str = "PREFIXER_ARCH";

/// Application name for data and config directories.
pub const APP_NAME: &str = "prefixer";

/// Top-level configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PrefixerConfig {
    pub schema_version: String,
    pub paths: PathSettings,
    pub runtime: RuntimeSettings,
    pub readiness: ReadinessSettings,
    pub install: InstallSettings,
    pub version: VersionSettings,
    pub configure: ConfigureSettings,
    pub logging: LoggingSettings,
    pub filter: FilterSettings,
}

impl Default for PrefixerConfig {
    fn default() -> Self {
        Self {
            schema_version: crate::CONFIG_SCHEMA_VERSION.to_string(),
            paths: PathSettings::default(),
            runtime: RuntimeSettings::default(),
            readiness: ReadinessSettings::default(),
            install: InstallSettings::default(),
            version: VersionSettings::default(),
            configure: ConfigureSettings::default(),
            logging: LoggingSettings::default(),
            filter: FilterSettings::default(),
        }
    }
}

/// Filesystem locations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathSettings {
    /// Environment root holding the prefix, checkpoints and logs.
    pub root: Option<PathBuf>,
    /// Installer source directory (contains `Set-up.exe` and descriptors).
    pub installer_source: Option<PathBuf>,
    /// Runtime installation prefix; `<prefix>/bin` is searched before `PATH`.
    pub runtime_prefix: Option<PathBuf>,
}

/// Runtime discovery and tiering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeSettings {
    /// Binary names probed in the search path, in discovery order.
    pub names: Vec<String>,
    /// Majors below this are Preferred.
    pub stable_threshold: u32,
    /// Majors at or above this are Fallback (known slow or incompatible).
    pub experimental_threshold: u32,
    pub probe_timeout_ms: u64,
    /// Architecture passed as `WINEARCH` to the prefix initializer.
    pub arch: String,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            names: ["wine", "wine64", "wine-stable", "wine-staging", "wine-development"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            stable_threshold: 9,
            experimental_threshold: 10,
            probe_timeout_ms: 5_000,
            arch: "win64".to_string(),
        }
    }
}

impl RuntimeSettings {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// Readiness polling for the prefix initialization artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReadinessSettings {
    /// Artifact path relative to the prefix.
    pub artifact: String,
    /// Base timeout for Preferred and Standard runtimes.
    pub timeout_ms: u64,
    pub poll_interval_ms: u64,
    /// Timeout multiplier for Fallback runtimes.
    pub slow_tier_multiplier: u32,
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        Self {
            artifact: "system.reg".to_string(),
            timeout_ms: 60_000,
            poll_interval_ms: 1_000,
            slow_tier_multiplier: 3,
        }
    }
}

impl ReadinessSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Component installation policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InstallSettings {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    /// Per-attempt timeout for redistributable components.
    pub component_timeout_ms: u64,
    /// Per-attempt timeout for the product installer.
    pub installer_timeout_ms: u64,
    /// Timeout for the prefix initialization command itself.
    pub init_timeout_ms: u64,
    /// Grace period between SIGTERM and SIGKILL.
    pub term_grace_ms: u64,
    /// Component installer helper, resolved through `PATH` unless absolute.
    pub winetricks: String,
    /// Product installer executable, relative to the installer source.
    pub installer_exe: String,
    /// Component names to leave out of the run.
    pub skip_components: Vec<String>,
}

impl Default for InstallSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 5_000,
            component_timeout_ms: 900_000,
            installer_timeout_ms: 7_200_000,
            init_timeout_ms: 300_000,
            term_grace_ms: 3_000,
            winetricks: "winetricks".to_string(),
            installer_exe: "Set-up.exe".to_string(),
            skip_components: Vec::new(),
        }
    }
}

impl InstallSettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn component_timeout(&self) -> Duration {
        Duration::from_millis(self.component_timeout_ms)
    }

    pub fn installer_timeout(&self) -> Duration {
        Duration::from_millis(self.installer_timeout_ms)
    }

    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }

    pub fn term_grace(&self) -> Duration {
        Duration::from_millis(self.term_grace_ms)
    }
}

/// Version detection cascade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VersionSettings {
    /// Product majors at or above this map to `latest`.
    pub latest_major: u32,
    /// Product majors at or above this (and below `latest_major`) map to `mid`.
    pub mid_major: u32,
    /// Release years at or above this map to `latest`.
    pub latest_year: u32,
    /// Release years at or above this (and below `latest_year`) map to `mid`.
    pub mid_year: u32,
    /// Bucket used when the cascade finds nothing.
    pub default_bucket: VersionBucket,
    /// Descriptor file names, matched by relative path suffix.
    pub descriptor_files: Vec<String>,
    pub metadata_depth: usize,
    pub directory_depth: usize,
    /// Candidate main executables for resource and content inspection,
    /// matched by file name.
    pub executables: Vec<String>,
    /// Product name tokens for the content scan.
    pub product_tokens: Vec<String>,
    pub scan_cap_bytes: u64,
    /// Maximum distance between a product token and a version token.
    pub proximity_bytes: usize,
    /// Binary resource inspection tool.
    pub resource_tool: String,
    /// Installed product tree, relative to the prefix.
    pub installed_subdir: String,
}

impl Default for VersionSettings {
    fn default() -> Self {
        Self {
            latest_major: 23,
            mid_major: 22,
            latest_year: 2022,
            mid_year: 2021,
            default_bucket: VersionBucket::Latest,
            descriptor_files: ["products/driver.xml", "application.json", "version.json"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            metadata_depth: 3,
            directory_depth: 4,
            executables: vec!["Set-up.exe".to_string(), "Photoshop.exe".to_string()],
            product_tokens: vec!["Photoshop".to_string()],
            scan_cap_bytes: 64 * 1024 * 1024,
            proximity_bytes: 64,
            resource_tool: "exiftool".to_string(),
            installed_subdir: "drive_c/Program Files/Adobe".to_string(),
        }
    }
}

/// Post-install configuration entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigureSettings {
    /// Libraries resolved `native,builtin`.
    pub dll_overrides: Vec<String>,
    pub log_pixels: u32,
    pub font_smoothing: bool,
    /// Per `reg query`/`reg add` invocation.
    pub reg_timeout_ms: u64,
}

impl Default for ConfigureSettings {
    fn default() -> Self {
        Self {
            dll_overrides: ["msxml3", "msxml6", "gdiplus", "atmlib", "vcomp140"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            log_pixels: 96,
            font_smoothing: true,
            reg_timeout_ms: 60_000,
        }
    }
}

impl ConfigureSettings {
    pub fn reg_timeout(&self) -> Duration {
        Duration::from_millis(self.reg_timeout_ms)
    }
}

/// Logging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
    /// Console level when neither `PREFIXER_LOG` nor `RUST_LOG` is set.
    pub console_level: String,
    /// Number of session log directories kept under `<root>/logs`.
    pub retain_sessions: usize,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            console_level: "info".to_string(),
            retain_sessions: 10,
        }
    }
}

/// Process output line filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilterSettings {
    /// Include the built-in deny patterns for benign runtime chatter.
    pub use_default_deny: bool,
    /// Lines matching any of these are always kept.
    pub allow: Vec<String>,
    /// Lines matching any of these are dropped from the filtered log.
    pub deny: Vec<String>,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            use_default_deny: true,
            allow: Vec::new(),
            deny: Vec::new(),
        }
    }
}

impl PrefixerConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ValidationError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ValidationError::IoError(format!("Failed to read {}: {}", path.display(), e))
        })?;

        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ValidationError> {
        toml::from_str(content)
            .map_err(|e| ValidationError::ParseError(format!("Invalid TOML: {}", e)))
    }

    /// Render as TOML (for `config show`).
    pub fn to_toml_string(&self) -> Result<String, ValidationError> {
        toml::to_string_pretty(self)
            .map_err(|e| ValidationError::ParseError(format!("Failed to render TOML: {}", e)))
    }

    /// Apply environment overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply environment overrides using the given lookup.
    ///
    /// Empty values are ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(root) = get(ENV_ROOT) {
            self.paths.root = Some(PathBuf::from(root));
        }
        if let Some(prefix) = get(ENV_RUNTIME_PREFIX) {
            self.paths.runtime_prefix = Some(PathBuf::from(prefix));
        }
        if let Some(arch) = get(ENV_ARCH) {
            self.runtime.arch = arch;
        }
    }

    /// Environment root, defaulting to the user data directory.
    pub fn environment_root(&self) -> PathBuf {
        if let Some(root) = &self.paths.root {
            return root.clone();
        }
        dirs::data_dir()
            .map(|d| d.join(APP_NAME))
            .unwrap_or_else(|| PathBuf::from(".").join(APP_NAME))
    }

    /// Prefix directory inside the environment root.
    pub fn prefix_dir(&self) -> PathBuf {
        self.environment_root().join("prefix")
    }

    /// Installer source directory, defaulting to `<root>/installer`.
    pub fn installer_source(&self) -> PathBuf {
        self.paths
            .installer_source
            .clone()
            .unwrap_or_else(|| self.environment_root().join("installer"))
    }

    /// Validate semantic constraints.
    pub fn validate(&self) -> Result<(), ValidationError> {
        crate::validate::validate_config(self)
    }
}
