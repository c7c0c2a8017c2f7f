//! Built-in reference analyzer: crash detection in Android bug reports.

use super::{
    run_definition, Analyzer, AnalyzerDefinition, AnalyzerInfo, AnalyzerOutput, AnalyzerScope,
    AnalyzerSource,
};
use async_trait::async_trait;
use serde_json::json;
use sift_common::Error;
use std::path::Path;

pub const CRASH_DETECTOR_ID: &str = "builtin.crash_detector";

const CRASH_DETECTOR_TOML: &str = r#"
[analyzer]
name = "Crash detector"
description = "Fatal exceptions, ANRs, native crashes and dying processes"
file_patterns = ["^dumpstate-", "^bugreport-", "logcat"]

[[insights]]
id = "fatal_exception"
name = "Fatal exceptions"
pattern = "FATAL EXCEPTION"
ignore_case = true

[[insights]]
id = "anr"
name = "Application not responding"
pattern = "\\bANR in "

[[insights]]
id = "native_crash"
name = "Native crashes"
pattern = "Fatal signal \\d+|\\*\\*\\* \\*\\*\\* \\*\\*\\*|>>> .+ <<<"
mode = "chunk"

[[insights]]
id = "process_died"
name = "Processes that died"
pattern = "Process \\S+ \\(pid \\d+\\) has died|am_proc_died"
"#;

/// Runs the crash definition, then rolls per-insight counts into a summary.
#[derive(Debug, Clone)]
pub struct CrashDetector {
    definition: AnalyzerDefinition,
}

impl CrashDetector {
    pub fn new() -> Result<Self, Error> {
        let definition = AnalyzerDefinition::parse(CRASH_DETECTOR_TOML, Path::new("<builtin>"))?;
        Ok(Self { definition })
    }
}

#[async_trait]
impl Analyzer for CrashDetector {
    fn id(&self) -> &str {
        CRASH_DETECTOR_ID
    }

    fn info(&self) -> AnalyzerInfo {
        AnalyzerInfo::from_definition(CRASH_DETECTOR_ID, AnalyzerSource::Builtin, &self.definition)
    }

    async fn run(
        &self,
        scope: &AnalyzerScope<'_>,
        output: &mut AnalyzerOutput,
    ) -> Result<(), Error> {
        let outcome = run_definition(&self.definition, scope, output).await;

        let counts: serde_json::Map<String, serde_json::Value> = output
            .insights
            .iter()
            .map(|i| (i.id.clone(), json!(i.total_matches)))
            .collect();
        let crashes = output.total_matches();
        output.summary = Some(json!({
            "crash_count": crashes,
            "has_crashes": crashes > 0,
            "by_insight": counts,
        }));
        outcome
    }
}
