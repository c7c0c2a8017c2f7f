//! Ordered event consumer and its SSE rendering.
//!
//! [`EventStream`] drains a task's queue, polling with a short timeout so
//! a producer that finished without closing cleanly is still noticed. After
//! the terminal event it waits (bounded) for the producer's report and
//! yields exactly one `result` event, then ends.
//!
//! A producer that dies (panic, abort, timeout) never sends its terminal
//! event. The stream then emits one in its place, marks the task failed and
//! removes its temp dir, so consumers still see `terminal -> result`.

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use sift_common::{StructuredError, TaskId};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::ServerSettings;
use crate::events::{EventType, ProgressEvent};
use crate::service::AnalysisReport;
use crate::task::{TaskRegistry, TaskStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSettings {
    /// Queue wait before re-checking the producer.
    pub poll_interval: Duration,
    /// Bound on waiting for the producer after the terminal event.
    pub result_wait: Duration,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self::from(&ServerSettings::default())
    }
}

impl From<&ServerSettings> for StreamSettings {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            poll_interval: Duration::from_millis(settings.poll_interval_ms.max(1)),
            result_wait: Duration::from_millis(settings.result_wait_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Progress,
    Result,
    Closed,
}

pub struct EventStream {
    task_id: TaskId,
    rx: mpsc::Receiver<ProgressEvent>,
    producer: Option<JoinHandle<AnalysisReport>>,
    settings: StreamSettings,
    phase: Phase,
    terminal_seen: bool,
    tasks: Option<Arc<TaskRegistry>>,
    pending: Option<ProgressEvent>,
    report: Option<AnalysisReport>,
}

impl EventStream {
    pub fn new(
        task_id: TaskId,
        rx: mpsc::Receiver<ProgressEvent>,
        producer: JoinHandle<AnalysisReport>,
        settings: StreamSettings,
    ) -> Self {
        Self {
            task_id,
            rx,
            producer: Some(producer),
            settings,
            phase: Phase::Progress,
            terminal_seen: false,
            tasks: None,
            pending: None,
            report: None,
        }
    }

    /// Registry that owns the task, updated when the producer dies.
    pub fn with_tasks(mut self, tasks: Arc<TaskRegistry>) -> Self {
        self.tasks = Some(tasks);
        self
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// The producer's report, once the `result` event has been yielded.
    pub fn report(&self) -> Option<&AnalysisReport> {
        self.report.as_ref()
    }

    pub fn into_report(self) -> Option<AnalysisReport> {
        self.report
    }

    /// Next event in stream order, `None` after `result`.
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        loop {
            match self.phase {
                Phase::Progress => {
                    match tokio::time::timeout(self.settings.poll_interval, self.rx.recv()).await {
                        Ok(Some(event)) => {
                            if event.is_terminal() {
                                self.terminal_seen = true;
                                self.phase = Phase::Result;
                            }
                            return Some(event);
                        }
                        Ok(None) => {
                            debug!(task_id = %self.task_id, "event queue closed without terminal event");
                            self.phase = Phase::Result;
                        }
                        Err(_) => {
                            let done = self.producer.as_ref().map_or(true, |p| p.is_finished());
                            if done && self.rx.is_empty() {
                                self.phase = Phase::Result;
                            }
                        }
                    }
                }
                Phase::Result => {
                    self.phase = Phase::Closed;
                    let (result, status) = self.result_event().await;
                    if self.terminal_seen {
                        return Some(result);
                    }
                    self.terminal_seen = true;
                    let terminal = self.stand_in_terminal(&result, status);
                    self.pending = Some(result);
                    return Some(terminal);
                }
                Phase::Closed => return self.pending.take(),
            }
        }
    }

    async fn result_event(&mut self) -> (ProgressEvent, TaskStatus) {
        let Some(producer) = self.producer.take() else {
            return self.producer_failed(StructuredError::scan("analysis producer missing"));
        };
        let abort = producer.abort_handle();

        match tokio::time::timeout(self.settings.result_wait, producer).await {
            Ok(Ok(report)) => {
                let status = report.status;
                let message = match status {
                    TaskStatus::Completed => "Analysis complete",
                    TaskStatus::Cancelled => "Analysis cancelled",
                    TaskStatus::Error => "Analysis failed",
                    TaskStatus::Running => "Analysis finished",
                };
                let mut event = ProgressEvent::new(EventType::Result, &self.task_id, message)
                    .with_total_files(report.total_files)
                    .with_data(&report);
                if status == TaskStatus::Error {
                    if let Some(err) = &report.error {
                        event = event.with_error(err.clone());
                    }
                }
                self.report = Some(report);
                (event, status)
            }
            Ok(Err(join_error)) => {
                warn!(task_id = %self.task_id, error = %join_error, "analysis producer failed");
                self.producer_failed(StructuredError::scan(format!(
                    "analysis task failed: {join_error}"
                )))
            }
            Err(_) => {
                abort.abort();
                warn!(
                    task_id = %self.task_id,
                    wait = ?self.settings.result_wait,
                    "timed out waiting for analysis result"
                );
                self.producer_failed(StructuredError::scan("timed out waiting for analysis result"))
            }
        }
    }

    /// The producer never reported: settle the task ourselves. A cancel that
    /// already landed in the registry keeps its status and surfaces no error.
    fn producer_failed(&self, error: StructuredError) -> (ProgressEvent, TaskStatus) {
        let status = match &self.tasks {
            Some(tasks) => {
                tasks.update_status(&self.task_id, TaskStatus::Error);
                tasks.cleanup_temp_dir(&self.task_id);
                tasks.status(&self.task_id).unwrap_or(TaskStatus::Error)
            }
            None => TaskStatus::Error,
        };
        let event = if status == TaskStatus::Cancelled {
            ProgressEvent::new(EventType::Result, &self.task_id, "Analysis cancelled")
        } else {
            ProgressEvent::new(EventType::Result, &self.task_id, "Analysis failed")
                .with_error(error)
        };
        (event, status)
    }

    /// Terminal event for a queue that closed without one.
    fn stand_in_terminal(&self, result: &ProgressEvent, status: TaskStatus) -> ProgressEvent {
        debug!(task_id = %self.task_id, status = %status, "emitting terminal event for producer");
        match status {
            TaskStatus::Cancelled => {
                ProgressEvent::new(EventType::Cancelled, &self.task_id, "Analysis cancelled")
            }
            TaskStatus::Error => {
                let message = result
                    .error
                    .as_ref()
                    .map_or_else(|| "Analysis failed".to_string(), |e| e.message.clone());
                let event = ProgressEvent::new(EventType::Error, &self.task_id, message);
                match &result.error {
                    Some(err) => event.with_error(err.clone()),
                    None => event,
                }
            }
            TaskStatus::Completed | TaskStatus::Running => {
                ProgressEvent::new(EventType::AnalysisComplete, &self.task_id, "Analysis complete")
            }
        }
    }

    /// Adapt into a `futures` stream of events.
    pub fn into_stream(self) -> impl Stream<Item = ProgressEvent> + Send {
        futures::stream::unfold(self, |mut stream| async move {
            stream.next_event().await.map(|event| (event, stream))
        })
    }
}

/// Render the stream as a server-sent-events response, one
/// `data: <json>` frame per event.
pub fn sse_response(
    stream: EventStream,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send> {
    use futures::StreamExt;

    let frames = stream
        .into_stream()
        .map(|event| Ok(Event::default().data(event.to_json())));
    Sse::new(frames).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::Value;
    use tempfile::tempdir;

    fn settings() -> StreamSettings {
        StreamSettings {
            poll_interval: Duration::from_millis(10),
            result_wait: Duration::from_millis(200),
        }
    }

    fn report(task_id: &TaskId, status: TaskStatus) -> AnalysisReport {
        AnalysisReport {
            task_id: task_id.clone(),
            analyzer_id: "test".into(),
            status,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            duration_ms: 1,
            total_files: 0,
            total_matches: 0,
            files: vec![],
            skipped: vec![],
            insights: vec![],
            summary: None,
            error: match status {
                TaskStatus::Error => Some(StructuredError::scan("boom")),
                _ => None,
            },
        }
    }

    async fn collect(mut stream: EventStream) -> Vec<ProgressEvent> {
        let mut out = Vec::new();
        while let Some(event) = stream.next_event().await {
            out.push(event);
        }
        out
    }

    #[tokio::test]
    async fn test_result_follows_terminal_event() {
        let task_id = TaskId::new();
        let (tx, rx) = mpsc::channel(4);
        let id = task_id.clone();
        let producer = tokio::spawn(async move {
            tx.send(ProgressEvent::new(EventType::AnalysisStarted, &id, "s"))
                .await
                .unwrap();
            tx.send(ProgressEvent::new(EventType::AnalysisComplete, &id, "c"))
                .await
                .unwrap();
            report(&id, TaskStatus::Completed)
        });

        let events = collect(EventStream::new(task_id, rx, producer, settings())).await;
        let kinds: Vec<EventType> = events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventType::AnalysisStarted,
                EventType::AnalysisComplete,
                EventType::Result
            ]
        );
        let result = events.last().unwrap();
        assert!(result.error.is_none());
        assert_eq!(result.data.as_ref().unwrap()["status"], "completed");
    }

    #[tokio::test]
    async fn test_cancelled_result_has_no_error() {
        let task_id = TaskId::new();
        let (tx, rx) = mpsc::channel(4);
        let id = task_id.clone();
        let producer = tokio::spawn(async move {
            tx.send(ProgressEvent::new(EventType::Cancelled, &id, "x"))
                .await
                .unwrap();
            report(&id, TaskStatus::Cancelled)
        });
        let events = collect(EventStream::new(task_id, rx, producer, settings())).await;
        assert_eq!(events.len(), 2);
        assert!(events[1].error.is_none());
        assert_eq!(events[1].message, "Analysis cancelled");
    }

    #[tokio::test]
    async fn test_error_result_carries_error_field() {
        let task_id = TaskId::new();
        let (tx, rx) = mpsc::channel(4);
        let id = task_id.clone();
        let producer = tokio::spawn(async move {
            tx.send(ProgressEvent::new(EventType::Error, &id, "boom"))
                .await
                .unwrap();
            report(&id, TaskStatus::Error)
        });
        let mut stream = EventStream::new(task_id, rx, producer, settings());
        let mut last = None;
        while let Some(event) = stream.next_event().await {
            last = Some(event);
        }
        let result = last.unwrap();
        assert_eq!(result.kind, EventType::Result);
        assert_eq!(result.error.unwrap().message, "scan failed: boom");
        assert_eq!(stream.report().unwrap().status, TaskStatus::Error);
    }

    #[tokio::test]
    async fn test_panicking_producer_gets_error_terminal_then_result() {
        let root = tempdir().unwrap();
        let tasks = Arc::new(TaskRegistry::default().with_temp_root(root.path()));
        let task_id = tasks.create_task(None, Vec::<(String, Value)>::new());
        let temp_dir = tasks.get_or_create_temp_dir(&task_id).unwrap();
        assert!(temp_dir.exists());

        let (tx, rx) = mpsc::channel::<ProgressEvent>(1);
        let producer = tokio::spawn(async move {
            drop(tx);
            panic!("producer blew up");
        });
        let stream = EventStream::new(task_id.clone(), rx, producer, settings())
            .with_tasks(Arc::clone(&tasks));
        let events = collect(stream).await;

        let kinds: Vec<EventType> = events.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventType::Error, EventType::Result]);
        assert!(events[0].error.is_some());
        assert!(events[1].error.is_some());

        let snapshot = tasks.get(&task_id).unwrap();
        assert_eq!(snapshot.status, TaskStatus::Error);
        assert!(snapshot.finished_at.is_some());
        assert!(!temp_dir.exists());
    }

    #[tokio::test]
    async fn test_dead_producer_after_cancel_reports_cancelled() {
        let root = tempdir().unwrap();
        let tasks = Arc::new(TaskRegistry::default().with_temp_root(root.path()));
        let task_id = tasks.create_task(None, Vec::<(String, Value)>::new());
        assert!(tasks.cancel(&task_id));

        let (tx, rx) = mpsc::channel::<ProgressEvent>(1);
        let producer = tokio::spawn(async move {
            drop(tx);
            panic!("gone");
        });
        let stream = EventStream::new(task_id.clone(), rx, producer, settings())
            .with_tasks(Arc::clone(&tasks));
        let events = collect(stream).await;

        let kinds: Vec<EventType> = events.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventType::Cancelled, EventType::Result]);
        assert!(events[1].error.is_none());
        assert_eq!(tasks.status(&task_id), Some(TaskStatus::Cancelled));
    }

    #[tokio::test]
    async fn test_queue_closed_without_terminal_gets_one() {
        let task_id = TaskId::new();
        let (tx, rx) = mpsc::channel::<ProgressEvent>(1);
        let id = task_id.clone();
        let producer = tokio::spawn(async move {
            drop(tx);
            report(&id, TaskStatus::Completed)
        });
        let events = collect(EventStream::new(task_id, rx, producer, settings())).await;
        let kinds: Vec<EventType> = events.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventType::AnalysisComplete, EventType::Result]);
        assert!(events[1].error.is_none());
    }

    #[tokio::test]
    async fn test_stuck_producer_times_out() {
        let task_id = TaskId::new();
        let (tx, rx) = mpsc::channel(1);
        let id = task_id.clone();
        let producer = tokio::spawn(async move {
            tx.send(ProgressEvent::new(EventType::AnalysisComplete, &id, "c"))
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_secs(60)).await;
            report(&id, TaskStatus::Completed)
        });
        let events = collect(EventStream::new(task_id, rx, producer, settings())).await;
        assert_eq!(events.len(), 2);
        let err = events[1].error.as_ref().unwrap();
        assert!(err.message.contains("timed out"));
    }
}
