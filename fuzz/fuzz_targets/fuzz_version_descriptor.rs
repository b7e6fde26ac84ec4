//! Fuzz target for descriptor-file version extraction.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pfx_core::version::methods::{version_from_descriptor, year_in_name};

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = version_from_descriptor(s);
        let _ = year_in_name(s);
    }
});
