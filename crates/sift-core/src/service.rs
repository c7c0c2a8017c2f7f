//! Scan orchestration.
//!
//! [`AnalysisService::start`] creates a task, spawns the producer that runs
//! the analyzer, and hands back the consumer half of the event queue. The
//! producer always emits exactly one terminal event, records the final task
//! status and removes the task's temp dir before it returns its report.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use serde_json::{Map, Value};
use sift_common::{Error, StructuredError, TaskContext, TaskId};
use sift_filter::{FilterEngine, RipgrepRunner};
use sift_vfs::{Vfs, VirtualPath};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Instrument};

use crate::analyzer::{Analyzer, AnalyzerOutput, AnalyzerRegistry, AnalyzerScope, InsightReport};
use crate::config::SiftConfig;
use crate::events::{EventBus, EventSender, EventType, ProgressEmitter, ProgressEvent};
use crate::sse::{EventStream, StreamSettings};
use crate::task::{TaskRegistry, TaskStatus};

/// Final payload of one analysis, carried by the `result` event.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub task_id: TaskId,
    pub analyzer_id: String,
    pub status: TaskStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub total_files: usize,
    pub total_matches: usize,
    pub files: Vec<VirtualPath>,
    /// Inputs dropped during verification.
    pub skipped: Vec<VirtualPath>,
    pub insights: Vec<InsightReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StructuredError>,
}

/// A started analysis: its id, the event queue and the producer task.
pub struct AnalysisHandle {
    pub task_id: TaskId,
    pub events: mpsc::Receiver<ProgressEvent>,
    pub producer: JoinHandle<AnalysisReport>,
    cancel: CancellationToken,
    tasks: Arc<TaskRegistry>,
}

impl AnalysisHandle {
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wrap the queue in the ordered consumer used by SSE and the CLI.
    pub fn into_stream(self, settings: StreamSettings) -> EventStream {
        EventStream::new(self.task_id, self.events, self.producer, settings).with_tasks(self.tasks)
    }
}

/// Ties analyzers, tasks and the filter engine together.
pub struct AnalysisService {
    analyzers: Arc<AnalyzerRegistry>,
    tasks: Arc<TaskRegistry>,
    engine: FilterEngine,
    queue_capacity: usize,
}

impl AnalysisService {
    pub fn new(config: &SiftConfig, analyzers: AnalyzerRegistry, tasks: Arc<TaskRegistry>) -> Self {
        let engine = FilterEngine::new(
            Vfs::new(config.archive.clone()),
            RipgrepRunner::new(&config.filter.ripgrep()),
            config.filter.engine(),
        );
        Self::from_parts(
            Arc::new(analyzers),
            tasks,
            engine,
            config.server.queue_capacity,
        )
    }

    pub fn from_parts(
        analyzers: Arc<AnalyzerRegistry>,
        tasks: Arc<TaskRegistry>,
        engine: FilterEngine,
        queue_capacity: usize,
    ) -> Self {
        Self {
            analyzers,
            tasks,
            engine,
            queue_capacity: queue_capacity.max(1),
        }
    }

    pub fn analyzers(&self) -> &AnalyzerRegistry {
        &self.analyzers
    }

    pub fn tasks(&self) -> &Arc<TaskRegistry> {
        &self.tasks
    }

    pub fn engine(&self) -> &FilterEngine {
        &self.engine
    }

    /// Start a registered analyzer. Fails before any task exists when the
    /// id is unknown.
    pub fn start(
        &self,
        analyzer_id: &str,
        paths: Vec<VirtualPath>,
        params: Map<String, Value>,
    ) -> Result<AnalysisHandle, Error> {
        let analyzer = self
            .analyzers
            .get(analyzer_id)
            .ok_or_else(|| Error::AnalyzerNotFound {
                id: analyzer_id.to_string(),
            })?;
        Ok(self.start_analyzer(analyzer, paths, params))
    }

    /// Start an analyzer that need not be registered (ad-hoc scans).
    pub fn start_analyzer(
        &self,
        analyzer: Arc<dyn Analyzer>,
        paths: Vec<VirtualPath>,
        params: Map<String, Value>,
    ) -> AnalysisHandle {
        let task_id = self.tasks.create_task(Some(analyzer.id()), params);
        let ctx = self
            .tasks
            .context(&task_id)
            .unwrap_or_else(|| TaskContext::new(task_id.clone()).with_analyzer(analyzer.id()));
        let cancel = self.tasks.token(&task_id).unwrap_or_default();
        let (sender, events) = EventBus::bounded(self.queue_capacity);

        let job = ProducerJob {
            analyzer,
            ctx,
            paths,
            engine: self.engine.clone(),
            tasks: Arc::clone(&self.tasks),
            cancel: cancel.clone(),
            sender,
        };
        let span = tracing::info_span!(
            "analysis",
            task_id = %task_id,
            analyzer = %job.analyzer.id(),
            inputs = job.paths.len()
        );
        let producer = tokio::spawn(job.run().instrument(span));

        AnalysisHandle {
            task_id,
            events,
            producer,
            cancel,
            tasks: Arc::clone(&self.tasks),
        }
    }
}

struct ProducerJob {
    analyzer: Arc<dyn Analyzer>,
    ctx: TaskContext,
    paths: Vec<VirtualPath>,
    engine: FilterEngine,
    tasks: Arc<TaskRegistry>,
    cancel: CancellationToken,
    sender: EventSender,
}

impl ProducerJob {
    async fn run(self) -> AnalysisReport {
        let task_id = self.ctx.task_id.clone();
        let analyzer_id = self.analyzer.id().to_string();
        let info = self.analyzer.info();
        let started_at = Utc::now();
        let clock = Instant::now();

        self.sender
            .emit(
                ProgressEvent::new(
                    EventType::AnalysisStarted,
                    &task_id,
                    format!("Starting {}", info.name),
                )
                .with_total_files(self.paths.len())
                .with_data(serde_json::json!({
                    "analyzer_id": analyzer_id,
                    "paths": self.paths.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    "context": self.ctx.to_map(),
                })),
            )
            .await;

        let temp_dir = if info.uses_ripgrep() {
            match self.tasks.get_or_create_temp_dir(&task_id) {
                Ok(dir) => Some(dir),
                Err(e) => {
                    warn!(error = %e, "no temp dir, archived members will use line mode");
                    None
                }
            }
        } else {
            None
        };

        let scope = AnalyzerScope {
            ctx: &self.ctx,
            paths: &self.paths,
            engine: &self.engine,
            cancel: self.cancel.clone(),
            temp_dir,
            progress: &self.sender,
        };
        let mut output = AnalyzerOutput::default();
        let outcome = AssertUnwindSafe(self.analyzer.run(&scope, &mut output))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(Error::Scan("analyzer panicked".into())));

        let (requested, failure) = match outcome {
            Ok(()) => (TaskStatus::Completed, None),
            Err(e) if e.is_cancellation() => (TaskStatus::Cancelled, None),
            Err(e) => {
                error!(error = %e, "analysis failed");
                (TaskStatus::Error, Some(e))
            }
        };
        self.tasks.update_status(&task_id, requested);
        // A cancel through the registry may have landed first.
        let status = self.tasks.status(&task_id).unwrap_or(requested);
        self.tasks.cleanup_temp_dir(&task_id);

        let total_matches = output.total_matches();
        let finished_at = Utc::now();
        let duration_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);
        let error = failure.as_ref().map(StructuredError::from);

        let terminal = match status {
            TaskStatus::Cancelled => ProgressEvent::new(
                EventType::Cancelled,
                &task_id,
                "Analysis cancelled",
            ),
            TaskStatus::Error => {
                let message = failure
                    .as_ref()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "analysis failed".into());
                let mut event = ProgressEvent::new(EventType::Error, &task_id, message);
                if let Some(err) = &error {
                    event = event.with_error(err.clone());
                }
                event
            }
            TaskStatus::Completed | TaskStatus::Running => ProgressEvent::new(
                EventType::AnalysisComplete,
                &task_id,
                format!("{total_matches} matches in {} files", output.files.len()),
            ),
        }
        .with_total_files(output.files.len())
        .with_data(serde_json::json!({
            "total_matches": total_matches,
            "duration_ms": duration_ms,
        }));
        self.sender.emit(terminal).await;

        info!(status = %status, total_matches, duration_ms, "analysis finished");
        AnalysisReport {
            task_id,
            analyzer_id,
            status,
            started_at,
            finished_at,
            duration_ms,
            total_files: output.files.len(),
            total_matches,
            files: output.files,
            skipped: output.skipped,
            insights: output.insights,
            summary: output.summary,
            error,
        }
    }
}
