//! Fuzz target for `--version` output parsing and tier classification.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pfx_core::runtime::detect::{classify, parse_version};

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let version = parse_version(s).unwrap_or_else(|| s.to_string());
        let _ = classify(&version, 9, 10);
    }
});
