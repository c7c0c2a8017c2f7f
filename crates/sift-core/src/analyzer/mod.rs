//! Analyzers: named trees of file and line filters.
//!
//! Most analyzers are declarative TOML definitions ([`definition`]); code
//! based ones implement [`Analyzer`] directly. Both run through
//! [`run_definition`], which narrows the inputs once and then scans every
//! insight in order, emitting progress as it goes.

pub mod builtin;
pub mod definition;
pub mod registry;

pub use builtin::CrashDetector;
pub use definition::{AnalyzerDefinition, AnalyzerMeta, DefinitionError, InsightDefinition};
pub use registry::{AnalyzerRegistry, LoadError, RegistryReport};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sift_common::{Error, TaskContext};
use sift_filter::{
    ExecutionMethod, FileNarrower, FilterEngine, FilterError, FilterResult, ReadingMode, ScanScope,
};
use sift_vfs::VirtualPath;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::events::{EventType, InsightEmitter, ProgressEmitter, ProgressEvent};

/// Where an analyzer came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalyzerSource {
    Builtin,
    File { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsightInfo {
    pub id: String,
    pub name: String,
    pub pattern: String,
    pub mode: ReadingMode,
}

/// Analyzer metadata for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub source: AnalyzerSource,
    pub file_patterns: Vec<String>,
    pub insights: Vec<InsightInfo>,
}

impl AnalyzerInfo {
    pub fn from_definition(id: &str, source: AnalyzerSource, def: &AnalyzerDefinition) -> Self {
        Self {
            id: id.to_string(),
            name: def.analyzer.name.clone(),
            description: def.analyzer.description.clone(),
            source,
            file_patterns: def.analyzer.file_patterns.clone(),
            insights: def
                .insights
                .iter()
                .map(|i| InsightInfo {
                    id: i.id.clone(),
                    name: i.display_name().to_string(),
                    pattern: i.filter.pattern.clone(),
                    mode: i.filter.mode,
                })
                .collect(),
        }
    }

    /// Whether any insight may extract archive members for ripgrep.
    pub fn uses_ripgrep(&self) -> bool {
        self.insights.iter().any(|i| i.mode == ReadingMode::Ripgrep)
    }
}

/// Everything an analyzer run may touch.
pub struct AnalyzerScope<'a> {
    pub ctx: &'a TaskContext,
    pub paths: &'a [VirtualPath],
    pub engine: &'a FilterEngine,
    pub cancel: CancellationToken,
    pub temp_dir: Option<PathBuf>,
    pub progress: &'a dyn ProgressEmitter,
}

impl AnalyzerScope<'_> {
    fn cancelled(&self) -> Error {
        Error::Cancelled {
            task_id: self.ctx.task_id.to_string(),
        }
    }

    async fn emit(&self, event: ProgressEvent) {
        self.progress.emit(event).await;
    }
}

/// Matches for one insight.
#[derive(Debug, Clone, Serialize)]
pub struct InsightReport {
    pub id: String,
    pub name: String,
    pub execution_method: Option<ExecutionMethod>,
    pub total_matches: usize,
    pub matched_paths: usize,
    pub result: FilterResult,
}

impl InsightReport {
    fn new(insight: &InsightDefinition, result: FilterResult) -> Self {
        Self {
            id: insight.id.clone(),
            name: insight.display_name().to_string(),
            execution_method: result.execution_method,
            total_matches: result.total_matches(),
            matched_paths: result.matched_paths(),
            result,
        }
    }
}

/// What a run produced. Filled in place so a cancelled run keeps what it
/// finished.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalyzerOutput {
    pub files: Vec<VirtualPath>,
    pub skipped: Vec<VirtualPath>,
    pub insights: Vec<InsightReport>,
    /// Analyzer-specific roll-up.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<Value>,
}

impl AnalyzerOutput {
    pub fn total_matches(&self) -> usize {
        self.insights.iter().map(|i| i.total_matches).sum()
    }
}

#[async_trait]
pub trait Analyzer: Send + Sync {
    fn id(&self) -> &str;

    fn info(&self) -> AnalyzerInfo;

    /// Run against `scope.paths`, recording into `output` as insights finish.
    async fn run(&self, scope: &AnalyzerScope<'_>, output: &mut AnalyzerOutput)
        -> Result<(), Error>;
}

/// Analyzer backed by a parsed definition file.
#[derive(Debug, Clone)]
pub struct DeclarativeAnalyzer {
    id: String,
    source: AnalyzerSource,
    definition: AnalyzerDefinition,
}

impl DeclarativeAnalyzer {
    pub fn new(id: impl Into<String>, source: AnalyzerSource, definition: AnalyzerDefinition) -> Self {
        Self {
            id: id.into(),
            source,
            definition,
        }
    }

    pub fn definition(&self) -> &AnalyzerDefinition {
        &self.definition
    }
}

#[async_trait]
impl Analyzer for DeclarativeAnalyzer {
    fn id(&self) -> &str {
        &self.id
    }

    fn info(&self) -> AnalyzerInfo {
        AnalyzerInfo::from_definition(&self.id, self.source.clone(), &self.definition)
    }

    async fn run(
        &self,
        scope: &AnalyzerScope<'_>,
        output: &mut AnalyzerOutput,
    ) -> Result<(), Error> {
        run_definition(&self.definition, scope, output).await
    }
}

/// Narrow the inputs, then scan each insight in definition order.
pub async fn run_definition(
    definition: &AnalyzerDefinition,
    scope: &AnalyzerScope<'_>,
    output: &mut AnalyzerOutput,
) -> Result<(), Error> {
    let task_id = &scope.ctx.task_id;
    if scope.cancel.is_cancelled() {
        return Err(scope.cancelled());
    }

    let vfs = scope.engine.vfs().clone();
    let inputs = scope.paths.to_vec();
    let file_filter = definition.file_filter();
    let narrowed = tokio::task::spawn_blocking(move || {
        FileNarrower::new(vfs, inputs, &file_filter).map(|n| n.narrow().clone())
    })
    .await
    .map_err(|e| Error::Scan(format!("narrowing worker failed: {e}")))?
    .map_err(Error::from)?;

    output.files = narrowed.files;
    output.skipped = narrowed.missing;
    let total = output.files.len();
    info!(task_id = %task_id, files = total, skipped = output.skipped.len(), "inputs verified");

    let skipped: Vec<String> = output.skipped.iter().map(ToString::to_string).collect();
    scope
        .emit(
            ProgressEvent::new(
                EventType::FileVerification,
                task_id,
                format!("{total} files to scan, {} skipped", skipped.len()),
            )
            .with_total_files(total)
            .with_data(serde_json::json!({
                "files": output.files.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "skipped": skipped,
            })),
        )
        .await;

    for insight in &definition.insights {
        if scope.cancel.is_cancelled() {
            return Err(scope.cancelled());
        }
        scope
            .emit(
                ProgressEvent::new(
                    EventType::InsightStart,
                    task_id,
                    format!("Running {}", insight.display_name()),
                )
                .with_insight(insight.id.clone())
                .with_total_files(total)
                .with_data(serde_json::json!({
                    "pattern": insight.filter.pattern,
                    "mode": insight.filter.mode,
                })),
            )
            .await;

        let observer = InsightEmitter::new(task_id, insight.id.clone(), scope.progress);
        let mut scan_scope = ScanScope::new(scope.cancel.clone(), &observer);
        if let Some(dir) = &scope.temp_dir {
            scan_scope = scan_scope.with_temp_dir(dir);
        }

        let mut result = FilterResult::new();
        let outcome = scope
            .engine
            .filter_into(&insight.filter, &output.files, &mut result, &scan_scope)
            .await;
        let report = InsightReport::new(insight, result);
        let complete = ProgressEvent::new(
            EventType::InsightComplete,
            task_id,
            format!(
                "{}: {} matches in {} files",
                report.name, report.total_matches, report.matched_paths
            ),
        )
        .with_insight(insight.id.clone())
        .with_data(serde_json::json!({
            "total_matches": report.total_matches,
            "matched_paths": report.matched_paths,
            "execution_method": report.execution_method,
        }));
        output.insights.push(report);

        match outcome {
            Ok(()) => scope.emit(complete).await,
            Err(FilterError::Cancelled) => {
                debug!(task_id = %task_id, insight = %insight.id, "insight interrupted");
                return Err(scope.cancelled());
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
