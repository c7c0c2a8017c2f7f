//! Fuzz target for virtual path parsing.
//!
//! Parsing must never panic, every `::` must become one nesting level, and
//! no parsed member may carry the separator or a parent component.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sift_vfs::{VirtualPath, SEPARATOR};

fuzz_target!(|data: &str| {
    let parsed = VirtualPath::parse(data);
    assert_eq!(parsed.depth(), data.matches(SEPARATOR).count());
    let _ = parsed.file_name();
    let _ = parsed.root();

    let mut current = Some(&parsed);
    while let Some(path) = current {
        if let Some(member) = path.member() {
            assert!(!member.contains(SEPARATOR));
            assert!(member.split('/').all(|c| c != ".."));
        }
        current = path.container();
    }
});
