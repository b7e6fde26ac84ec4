//! Prefixer configuration loading and validation.
//!
//! This crate provides:
//! - Typed Rust structs for `prefixer.toml`
//! - Config resolution (CLI → env → XDG → /etc → defaults)
//! - Semantic validation
//! - Environment variable overrides applied after the file is loaded

pub mod resolve;
pub mod settings;
pub mod validate;

pub use resolve::{load_config, resolve_config, ConfigPaths, ConfigSource, LoadedConfig};
pub use settings::{
    ConfigureSettings, FilterSettings, InstallSettings, LoggingSettings, PathSettings,
    PrefixerConfig, ReadinessSettings, RuntimeSettings, VersionSettings,
};
pub use validate::{ValidationError, ValidationResult};

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = "1";
