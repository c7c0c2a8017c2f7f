//! Fuzz target for analyzer definition parsing.
//!
//! Definition files are user supplied. Parsing and validation (which
//! compiles every pattern) should never panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sift_core::analyzer::AnalyzerDefinition;
use std::path::Path;

fuzz_target!(|data: &str| {
    if let Ok(definition) = AnalyzerDefinition::parse(data, Path::new("fuzz.toml")) {
        let _ = definition.validate();
        let _ = definition.file_filter().compile();
    }
});
