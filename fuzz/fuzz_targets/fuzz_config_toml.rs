//! Fuzz target for prefixer.toml parsing.
//!
//! Parsing and validation must return an error, never panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pfx_config::PrefixerConfig;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(config) = PrefixerConfig::from_toml_str(s) {
            let _ = config.validate();
        }
    }
});
