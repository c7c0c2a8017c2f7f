//! Progress event emission.
//!
//! A running scan publishes [`ProgressEvent`]s onto a bounded, ordered,
//! single-consumer queue. The consumer is either the SSE response or the
//! CLI's JSONL writer. Per stream the order is:
//!
//! ```text
//! analysis_started → file_verification
//!   → (insight_start → (file_open → insight_progress* → path_result)* → insight_complete)*
//!   → analysis_complete | cancelled | error
//!   → result
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sift_common::{StructuredError, TaskId};
use sift_filter::{ScanObserver, ScanUpdate};
use std::io::Write;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::trace;

/// Default capacity of a task's event queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Event kinds, serialized as the `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    AnalysisStarted,
    FileVerification,
    InsightStart,
    FileOpen,
    InsightProgress,
    PathResult,
    InsightComplete,
    AnalysisComplete,
    Cancelled,
    Error,
    Result,
}

impl EventType {
    /// `analysis_complete`, `cancelled` and `error` end the progress phase.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            EventType::AnalysisComplete | EventType::Cancelled | EventType::Error
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventType::AnalysisStarted => "analysis_started",
            EventType::FileVerification => "file_verification",
            EventType::InsightStart => "insight_start",
            EventType::FileOpen => "file_open",
            EventType::InsightProgress => "insight_progress",
            EventType::PathResult => "path_result",
            EventType::InsightComplete => "insight_complete",
            EventType::AnalysisComplete => "analysis_complete",
            EventType::Cancelled => "cancelled",
            EventType::Error => "error",
            EventType::Result => "result",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One progress event on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    #[serde(rename = "type")]
    pub kind: EventType,
    pub task_id: TaskId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insight_id: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_files: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size_mb: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lines_processed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StructuredError>,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(kind: EventType, task_id: &TaskId, message: impl Into<String>) -> Self {
        Self {
            kind,
            task_id: task_id.clone(),
            insight_id: None,
            message: message.into(),
            file_path: None,
            file_index: None,
            total_files: None,
            file_size_mb: None,
            lines_processed: None,
            data: None,
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_insight(mut self, insight_id: impl Into<String>) -> Self {
        self.insight_id = Some(insight_id.into());
        self
    }

    /// `index` is zero-based here and one-based on the wire.
    pub fn with_file(mut self, path: impl Into<String>, index: usize, total: usize) -> Self {
        self.file_path = Some(path.into());
        self.file_index = Some(index + 1);
        self.total_files = Some(total);
        self
    }

    pub fn with_total_files(mut self, total: usize) -> Self {
        self.total_files = Some(total);
        self
    }

    pub fn with_size_bytes(mut self, bytes: u64) -> Self {
        let mb = bytes as f64 / (1024.0 * 1024.0);
        self.file_size_mb = Some((mb * 100.0).round() / 100.0);
        self
    }

    pub fn with_lines_processed(mut self, lines: u64) -> Self {
        self.lines_processed = Some(lines);
        self
    }

    pub fn with_data(mut self, data: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(data) {
            self.data = Some(v);
        }
        self
    }

    pub fn with_error(mut self, error: StructuredError) -> Self {
        self.error = Some(error);
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                r#"{{"type":"error","task_id":"{}","message":"serialization_failed"}}"#,
                self.task_id
            )
        })
    }

    /// One server-sent-events frame: `data: <json>\n\n`.
    pub fn to_sse_frame(&self) -> String {
        format!("data: {}\n\n", self.to_json())
    }
}

/// Sink for progress events. Awaiting lets a bounded queue push back on
/// the scan.
#[async_trait]
pub trait ProgressEmitter: Send + Sync {
    async fn emit(&self, event: ProgressEvent);
}

/// Producer half of a task's event queue.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<ProgressEvent>,
}

impl EventSender {
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[async_trait]
impl ProgressEmitter for EventSender {
    async fn emit(&self, event: ProgressEvent) {
        let kind = event.kind;
        if self.tx.send(event).await.is_err() {
            // Consumer went away; delivery is best-effort.
            trace!(event = %kind, "event dropped, consumer gone");
        }
    }
}

/// Single-producer, single-consumer bounded event queue.
pub struct EventBus;

impl EventBus {
    pub fn bounded(capacity: usize) -> (EventSender, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (EventSender { tx }, rx)
    }
}

/// JSONL writer for progress events (CLI-friendly).
pub struct JsonlWriter<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonlWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn write_event(&self, event: &ProgressEvent) {
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(writer, "{}", event.to_json());
            let _ = writer.flush();
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl<W: Write + Send> ProgressEmitter for JsonlWriter<W> {
    async fn emit(&self, event: ProgressEvent) {
        self.write_event(&event);
    }
}

/// Turns one insight's [`ScanUpdate`]s into progress events.
pub struct InsightEmitter<'a> {
    task_id: TaskId,
    insight_id: String,
    inner: &'a dyn ProgressEmitter,
}

impl<'a> InsightEmitter<'a> {
    pub fn new(task_id: &TaskId, insight_id: impl Into<String>, inner: &'a dyn ProgressEmitter) -> Self {
        Self {
            task_id: task_id.clone(),
            insight_id: insight_id.into(),
            inner,
        }
    }

    fn event(&self, kind: EventType, message: String) -> ProgressEvent {
        ProgressEvent::new(kind, &self.task_id, message).with_insight(self.insight_id.clone())
    }
}

#[async_trait]
impl ScanObserver for InsightEmitter<'_> {
    async fn on_update(&self, update: ScanUpdate) {
        let event = match update {
            ScanUpdate::FileOpen {
                index,
                total,
                path,
                size_bytes,
            } => self
                .event(EventType::FileOpen, format!("Opening {}", display_name(&path)))
                .with_file(path.to_string(), index, total)
                .with_size_bytes(size_bytes),
            ScanUpdate::Progress {
                path,
                lines_processed,
            } => self
                .event(
                    EventType::InsightProgress,
                    format!("{lines_processed} lines processed"),
                )
                .with_lines_processed(lines_processed)
                .with_data(serde_json::json!({ "file_path": path.to_string() })),
            ScanUpdate::PathResult {
                index,
                total,
                path,
                matches,
                method,
                preview,
            } => self
                .event(
                    EventType::PathResult,
                    format!("{matches} matches in {}", display_name(&path)),
                )
                .with_file(path.to_string(), index, total)
                .with_data(serde_json::json!({
                    "match_count": matches,
                    "execution_method": method,
                    "preview": preview,
                })),
        };
        self.inner.emit(event).await;
    }
}

fn display_name(path: &sift_vfs::VirtualPath) -> String {
    path.file_name()
        .map(str::to_string)
        .unwrap_or_else(|| path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sift_filter::ExecutionMethod;
    use sift_vfs::VirtualPath;

    #[derive(Default)]
    struct Capture {
        events: Mutex<Vec<ProgressEvent>>,
    }

    #[async_trait]
    impl ProgressEmitter for Capture {
        async fn emit(&self, event: ProgressEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[test]
    fn test_event_json_shape() {
        let task = TaskId("sift-20260115-143022-a7xqk2mz".into());
        let event = ProgressEvent::new(EventType::FileOpen, &task, "Opening a.log")
            .with_insight("fatal")
            .with_file("/logs/a.log", 0, 3)
            .with_size_bytes(3 * 1024 * 1024 / 2);
        let json: Value = serde_json::from_str(&event.to_json()).unwrap();

        assert_eq!(json["type"], "file_open");
        assert_eq!(json["task_id"], "sift-20260115-143022-a7xqk2mz");
        assert_eq!(json["insight_id"], "fatal");
        assert_eq!(json["file_index"], 1);
        assert_eq!(json["total_files"], 3);
        assert_eq!(json["file_size_mb"], 1.5);
        assert!(json.get("data").is_none());
        assert!(json["timestamp"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_sse_frame_format() {
        let event = ProgressEvent::new(EventType::AnalysisStarted, &TaskId::new(), "go");
        let frame = event.to_sse_frame();
        assert!(frame.starts_with("data: {"));
        assert!(frame.ends_with("}\n\n"));
        assert_eq!(frame.matches('\n').count(), 2);
    }

    #[test]
    fn test_terminal_kinds() {
        let terminal: Vec<EventType> = [
            EventType::AnalysisStarted,
            EventType::PathResult,
            EventType::AnalysisComplete,
            EventType::Cancelled,
            EventType::Error,
            EventType::Result,
        ]
        .into_iter()
        .filter(|k| k.is_terminal())
        .collect();
        assert_eq!(
            terminal,
            vec![EventType::AnalysisComplete, EventType::Cancelled, EventType::Error]
        );
    }

    #[tokio::test]
    async fn test_bus_preserves_order() {
        let (tx, mut rx) = EventBus::bounded(2);
        let task = TaskId::new();
        let producer = tokio::spawn(async move {
            for i in 0..10 {
                tx.emit(ProgressEvent::new(EventType::InsightProgress, &task, i.to_string()))
                    .await;
            }
        });
        let mut seen = Vec::new();
        while let Some(event) = rx.recv().await {
            seen.push(event.message);
        }
        producer.await.unwrap();
        let expected: Vec<String> = (0..10).map(|i| i.to_string()).collect();
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn test_send_after_consumer_dropped_is_silent() {
        let (tx, rx) = EventBus::bounded(1);
        drop(rx);
        assert!(tx.is_closed());
        tx.emit(ProgressEvent::new(EventType::Error, &TaskId::new(), "x"))
            .await;
    }

    #[tokio::test]
    async fn test_insight_emitter_maps_updates() {
        let capture = Capture::default();
        let task = TaskId::new();
        let emitter = InsightEmitter::new(&task, "anr", &capture);
        let path = VirtualPath::parse("/logs/bugreport.zip::FS/data/anr/traces.txt");

        emitter
            .on_update(ScanUpdate::FileOpen {
                index: 1,
                total: 2,
                path: path.clone(),
                size_bytes: 0,
            })
            .await;
        emitter
            .on_update(ScanUpdate::PathResult {
                index: 1,
                total: 2,
                path: path.clone(),
                matches: 12,
                method: ExecutionMethod::Chunk,
                preview: vec!["ANR in com.example".into()],
            })
            .await;

        let events = capture.events.lock().unwrap().clone();
        assert_eq!(events[0].kind, EventType::FileOpen);
        assert_eq!(events[0].file_index, Some(2));
        assert_eq!(events[0].message, "Opening traces.txt");
        assert_eq!(
            events[0].file_path.as_deref(),
            Some("/logs/bugreport.zip::FS/data/anr/traces.txt")
        );
        let data = events[1].data.as_ref().unwrap();
        assert_eq!(data["match_count"], 12);
        assert_eq!(data["execution_method"], "chunk");
        assert_eq!(data["preview"][0], "ANR in com.example");
        assert!(events.iter().all(|e| e.insight_id.as_deref() == Some("anr")));
    }

    #[tokio::test]
    async fn test_jsonl_writer_one_line_per_event() {
        let writer = JsonlWriter::new(Vec::new());
        let task = TaskId::new();
        writer
            .emit(ProgressEvent::new(EventType::AnalysisStarted, &task, "a"))
            .await;
        writer
            .emit(ProgressEvent::new(EventType::AnalysisComplete, &task, "b"))
            .await;
        let out = String::from_utf8(writer.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains(r#""type":"analysis_complete""#));
    }
}
