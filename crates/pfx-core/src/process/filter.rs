//! Line filter for child process output.
//!
//! A pure function over lines: the raw log keeps everything, the filtered log
//! keeps what [`LineFilter::keep`] accepts. An allow match always wins over a
//! deny match.

use std::sync::OnceLock;

use pfx_config::FilterSettings;
use regex::Regex;

/// Benign runtime chatter dropped from the filtered process log.
pub const DEFAULT_DENY: &[&str] = &[
    // Unimplemented-stub notices, e.g. `0024:fixme:ntdll:NtQuerySystemInformation ...`
    r"(?:^|:)fixme:",
    // Debug-channel warnings
    r"^\s*(?:[0-9a-f]{4}:)?warn:",
    // Desktop integration and hardware diagnostics that do not affect installs
    r"^\s*(?:[0-9a-f]{4}:)?err:(?:winediag|menubuilder|wineusb|hid|ole):",
    r"winemenubuilder",
    r"Could not find Wine (?:Gecko|Mono)",
    r"^wine: configuration in .* has been updated",
    r"^\s*(?:ALSA|alsa) lib ",
    r"^Executing cd /",
];

fn default_deny() -> &'static [Regex] {
    static DEFAULT: OnceLock<Vec<Regex>> = OnceLock::new();
    DEFAULT.get_or_init(|| {
        DEFAULT_DENY
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect()
    })
}

/// Allow/deny pattern filter.
#[derive(Debug, Clone, Default)]
pub struct LineFilter {
    allow: Vec<Regex>,
    deny: Vec<Regex>,
}

impl LineFilter {
    /// Build a filter from pattern strings.
    pub fn new(allow: &[String], deny: &[String]) -> Result<Self, regex::Error> {
        Ok(Self {
            allow: compile(allow)?,
            deny: compile(deny)?,
        })
    }

    /// Filter that keeps every line.
    pub fn passthrough() -> Self {
        Self::default()
    }

    /// Filter with only the built-in deny list.
    pub fn with_defaults() -> Self {
        Self {
            allow: Vec::new(),
            deny: default_deny().to_vec(),
        }
    }

    /// Build from the `[filter]` config section.
    pub fn from_settings(settings: &FilterSettings) -> Result<Self, regex::Error> {
        let mut filter = Self::new(&settings.allow, &settings.deny)?;
        if settings.use_default_deny {
            filter.deny.extend(default_deny().iter().cloned());
        }
        Ok(filter)
    }

    /// Whether a line belongs in the filtered log.
    pub fn keep(&self, line: &str) -> bool {
        if self.allow.iter().any(|re| re.is_match(line)) {
            return true;
        }
        !self.deny.iter().any(|re| re.is_match(line))
    }
}

fn compile(patterns: &[String]) -> Result<Vec<Regex>, regex::Error> {
    patterns.iter().map(|p| Regex::new(p)).collect()
}
