//! Configuration validation errors and semantic validation.

use regex::Regex;
use thiserror::Error;

use crate::settings::PrefixerConfig;

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Configuration validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Semantic validation failed: {0}")]
    SemanticError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },
}

impl ValidationError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ValidationError::IoError(_) => 60,
            ValidationError::ParseError(_) => 61,
            ValidationError::NotFound(_) => 62,
            ValidationError::SemanticError(_) => 63,
            ValidationError::InvalidValue { .. } => 65,
            ValidationError::VersionMismatch { .. } => 66,
        }
    }
}

impl From<ValidationError> for pfx_common::Error {
    fn from(err: ValidationError) -> Self {
        pfx_common::Error::Config(err.to_string())
    }
}

/// Validate the whole configuration semantically.
pub fn validate_config(config: &PrefixerConfig) -> ValidationResult<()> {
    if config.schema_version != crate::CONFIG_SCHEMA_VERSION {
        return Err(ValidationError::VersionMismatch {
            expected: crate::CONFIG_SCHEMA_VERSION.to_string(),
            actual: config.schema_version.clone(),
        });
    }

    validate_runtime(config)?;
    validate_readiness(config)?;
    validate_install(config)?;
    validate_version(config)?;
    require_positive("configure.reg_timeout_ms", config.configure.reg_timeout_ms)?;
    validate_patterns("filter.allow", &config.filter.allow)?;
    validate_patterns("filter.deny", &config.filter.deny)?;

    Ok(())
}

fn validate_runtime(config: &PrefixerConfig) -> ValidationResult<()> {
    let runtime = &config.runtime;
    if runtime.names.is_empty() {
        return Err(ValidationError::InvalidValue {
            field: "runtime.names".to_string(),
            message: "must list at least one runtime binary".to_string(),
        });
    }
    if runtime.names.iter().any(|n| n.trim().is_empty() || n.contains('/')) {
        return Err(ValidationError::InvalidValue {
            field: "runtime.names".to_string(),
            message: "entries must be bare binary names".to_string(),
        });
    }
    if runtime.stable_threshold > runtime.experimental_threshold {
        return Err(ValidationError::SemanticError(format!(
            "runtime.stable_threshold ({}) must not exceed runtime.experimental_threshold ({})",
            runtime.stable_threshold, runtime.experimental_threshold
        )));
    }
    if !matches!(runtime.arch.as_str(), "win32" | "win64") {
        return Err(ValidationError::InvalidValue {
            field: "runtime.arch".to_string(),
            message: format!("must be win32 or win64, got {}", runtime.arch),
        });
    }
    require_positive("runtime.probe_timeout_ms", runtime.probe_timeout_ms)
}

fn validate_readiness(config: &PrefixerConfig) -> ValidationResult<()> {
    let readiness = &config.readiness;
    if readiness.artifact.trim().is_empty() {
        return Err(ValidationError::InvalidValue {
            field: "readiness.artifact".to_string(),
            message: "must not be empty".to_string(),
        });
    }
    require_positive("readiness.timeout_ms", readiness.timeout_ms)?;
    require_positive("readiness.poll_interval_ms", readiness.poll_interval_ms)?;
    if readiness.poll_interval_ms > readiness.timeout_ms {
        return Err(ValidationError::SemanticError(format!(
            "readiness.poll_interval_ms ({}) must not exceed readiness.timeout_ms ({})",
            readiness.poll_interval_ms, readiness.timeout_ms
        )));
    }
    if readiness.slow_tier_multiplier == 0 {
        return Err(ValidationError::InvalidValue {
            field: "readiness.slow_tier_multiplier".to_string(),
            message: "must be at least 1".to_string(),
        });
    }
    Ok(())
}

fn validate_install(config: &PrefixerConfig) -> ValidationResult<()> {
    let install = &config.install;
    if install.max_retries == 0 {
        return Err(ValidationError::InvalidValue {
            field: "install.max_retries".to_string(),
            message: "must be at least 1".to_string(),
        });
    }
    require_positive("install.component_timeout_ms", install.component_timeout_ms)?;
    require_positive("install.installer_timeout_ms", install.installer_timeout_ms)?;
    require_positive("install.init_timeout_ms", install.init_timeout_ms)?;
    if install.installer_exe.trim().is_empty() {
        return Err(ValidationError::InvalidValue {
            field: "install.installer_exe".to_string(),
            message: "must not be empty".to_string(),
        });
    }
    Ok(())
}

fn validate_version(config: &PrefixerConfig) -> ValidationResult<()> {
    let version = &config.version;
    if version.mid_major > version.latest_major {
        return Err(ValidationError::SemanticError(format!(
            "version.mid_major ({}) must not exceed version.latest_major ({})",
            version.mid_major, version.latest_major
        )));
    }
    if version.mid_year > version.latest_year {
        return Err(ValidationError::SemanticError(format!(
            "version.mid_year ({}) must not exceed version.latest_year ({})",
            version.mid_year, version.latest_year
        )));
    }
    if version.product_tokens.iter().any(|t| t.is_empty()) {
        return Err(ValidationError::InvalidValue {
            field: "version.product_tokens".to_string(),
            message: "tokens must not be empty".to_string(),
        });
    }
    require_positive("version.scan_cap_bytes", version.scan_cap_bytes)
}

fn validate_patterns(field: &str, patterns: &[String]) -> ValidationResult<()> {
    for pattern in patterns {
        if let Err(e) = Regex::new(pattern) {
            return Err(ValidationError::InvalidValue {
                field: field.to_string(),
                message: format!("invalid regex '{}': {}", pattern, e),
            });
        }
    }
    Ok(())
}

fn require_positive(field: &str, value: u64) -> ValidationResult<()> {
    if value == 0 {
        return Err(ValidationError::InvalidValue {
            field: field.to_string(),
            message: "must be positive".to_string(),
        });
    }
    Ok(())
}
