//! Fuzz target for the executable content scan.
//!
//! Arbitrary bytes stand in for an installer binary; string extraction and
//! the proximity search must never panic or index out of bounds.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pfx_core::version::methods::{extract_strings, version_near_product};

fuzz_target!(|data: &[u8]| {
    let strings = extract_strings(data);
    for s in &strings {
        assert!(s.offset + s.text.len() * s.width <= data.len());
    }
    let tokens = vec!["Photoshop".to_string()];
    let _ = version_near_product(&strings, &tokens, 64);
});
