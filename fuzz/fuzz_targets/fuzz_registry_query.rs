//! Fuzz target for `reg query` output parsing.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pfx_core::configure::registry::parse_query_output;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let lines: Vec<String> = s.lines().map(str::to_string).collect();
        let _ = parse_query_output(&lines, "csmt");
        let _ = parse_query_output(&lines, "OffscreenRenderingMode");
    }
});
