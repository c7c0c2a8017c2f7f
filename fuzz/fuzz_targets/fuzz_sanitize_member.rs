//! Fuzz target for archive member name sanitization.
//!
//! Whatever a zip entry calls itself, the sanitized name must stay relative,
//! contain no parent components and never splice in a virtual path separator.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sift_vfs::{sanitize_member_name, SEPARATOR};

fuzz_target!(|data: &str| {
    let sanitized = sanitize_member_name(data);
    assert!(!sanitized.starts_with('/'));
    assert!(!sanitized.contains('\\'));
    assert!(!sanitized.contains(SEPARATOR));
    assert!(sanitized.split('/').all(|c| c != ".." && c != "."));
    assert_eq!(sanitize_member_name(&sanitized), sanitized);
});
