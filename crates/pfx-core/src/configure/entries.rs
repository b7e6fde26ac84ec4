//! Post-install registry settings.

use std::fmt;

use pfx_config::ConfigureSettings;
use serde::Serialize;

pub const DIRECT3D_KEY: &str = r"HKCU\Software\Wine\Direct3D";
pub const DESKTOP_KEY: &str = r"HKCU\Control Panel\Desktop";
pub const DLL_OVERRIDES_KEY: &str = r"HKCU\Software\Wine\DllOverrides";

/// A typed registry value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ConfigValue {
    Str(String),
    Dword(u32),
}

impl ConfigValue {
    /// `reg add /t` argument.
    pub fn reg_type(&self) -> &'static str {
        match self {
            ConfigValue::Str(_) => "REG_SZ",
            ConfigValue::Dword(_) => "REG_DWORD",
        }
    }

    /// `reg add /d` argument.
    pub fn reg_data(&self) -> String {
        match self {
            ConfigValue::Str(s) => s.clone(),
            ConfigValue::Dword(n) => n.to_string(),
        }
    }

    /// Parse a `reg query` value column.
    pub fn parse(reg_type: &str, data: &str) -> Option<Self> {
        match reg_type {
            "REG_DWORD" => {
                let data = data.trim();
                let parsed = match data.strip_prefix("0x").or_else(|| data.strip_prefix("0X")) {
                    Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                    None => data.parse().ok()?,
                };
                Some(ConfigValue::Dword(parsed))
            }
            "REG_SZ" | "REG_EXPAND_SZ" => Some(ConfigValue::Str(data.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Str(s) => write!(f, "\"{}\"", s),
            ConfigValue::Dword(n) => write!(f, "dword:{}", n),
        }
    }
}

/// One setting to write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigEntry {
    /// Registry key path, e.g. `HKCU\Software\Wine\Direct3D`.
    pub path: String,
    /// Value name under the key.
    pub name: String,
    pub value: ConfigValue,
    /// Failure is logged at error level rather than warn.
    pub required: bool,
}

impl ConfigEntry {
    pub fn new(path: &str, name: &str, value: ConfigValue, required: bool) -> Self {
        Self {
            path: path.to_string(),
            name: name.to_string(),
            value,
            required,
        }
    }

    /// `path\name`.
    pub fn key(&self) -> String {
        format!("{}\\{}", self.path, self.name)
    }
}

/// Rendering, display scaling and library override settings.
pub fn default_entries(settings: &ConfigureSettings) -> Vec<ConfigEntry> {
    let mut entries = vec![
        // Hardware-accelerated canvas paths.
        ConfigEntry::new(DIRECT3D_KEY, "csmt", ConfigValue::Dword(0), true),
        ConfigEntry::new(
            DIRECT3D_KEY,
            "OffscreenRenderingMode",
            ConfigValue::Str("backbuffer".to_string()),
            true,
        ),
        ConfigEntry::new(DESKTOP_KEY, "LogPixels", ConfigValue::Dword(settings.log_pixels), false),
    ];

    if settings.font_smoothing {
        entries.extend([
            ConfigEntry::new(DESKTOP_KEY, "FontSmoothing", ConfigValue::Str("2".to_string()), false),
            ConfigEntry::new(DESKTOP_KEY, "FontSmoothingType", ConfigValue::Dword(2), false),
            ConfigEntry::new(DESKTOP_KEY, "FontSmoothingGamma", ConfigValue::Dword(1400), false),
            ConfigEntry::new(DESKTOP_KEY, "FontSmoothingOrientation", ConfigValue::Dword(1), false),
        ]);
    }

    entries.extend(settings.dll_overrides.iter().map(|dll| {
        ConfigEntry::new(
            DLL_OVERRIDES_KEY,
            dll,
            ConfigValue::Str("native,builtin".to_string()),
            true,
        )
    }));
    entries
}
