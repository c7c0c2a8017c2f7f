//! Task lifecycle: ids, cancellation, status, temp dirs and eviction.
//!
//! - **Create** a task with caller parameters; status starts `running`.
//! - **Cancel** triggers the task's token and marks it `cancelled`.
//! - **Update** moves a running task to a terminal status exactly once.
//! - **Temp dir** is created lazily per task and removed on cleanup.
//! - **Sweep** evicts tasks that have been terminal past the retention window.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sift_common::{TaskContext, TaskId};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::TaskSettings;

/// Temp root used when none is configured: `<system temp>/logsift`.
const DEFAULT_TEMP_DIR_NAME: &str = "logsift";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("task not found: {task_id}")]
    TaskNotFound { task_id: TaskId },

    #[error("failed to create temp dir {}: {source}", path.display())]
    TempDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<RegistryError> for sift_common::Error {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::TaskNotFound { task_id } => sift_common::Error::TaskNotFound {
                task_id: task_id.to_string(),
            },
            RegistryError::TempDir { source, .. } => sift_common::Error::Io(source),
        }
    }
}

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Completed,
    Cancelled,
    Error,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskStatus::Running)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Cancelled => write!(f, "cancelled"),
            TaskStatus::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug)]
struct AnalysisTask {
    context: TaskContext,
    cancel: CancellationToken,
    status: TaskStatus,
    finished_at: Option<DateTime<Utc>>,
    temp_dir: Option<PathBuf>,
}

/// Point-in-time view of a task, as returned over HTTP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub task_id: TaskId,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analyzer_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub has_temp_dir: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, Value>,
}

impl From<&AnalysisTask> for TaskSnapshot {
    fn from(task: &AnalysisTask) -> Self {
        Self {
            task_id: task.context.task_id.clone(),
            status: task.status,
            analyzer_id: task.context.analyzer_id.clone(),
            created_at: task.context.created_at,
            finished_at: task.finished_at,
            has_temp_dir: task.temp_dir.is_some(),
            params: task.context.params().clone(),
        }
    }
}

/// Result of an eviction sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepResult {
    pub evicted: Vec<TaskId>,
    pub remaining: usize,
}

/// Owns every live task. Cheap to share behind an `Arc`.
#[derive(Debug)]
pub struct TaskRegistry {
    tasks: Mutex<HashMap<TaskId, AnalysisTask>>,
    temp_root: PathBuf,
    retention: Duration,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new(&TaskSettings::default())
    }
}

impl TaskRegistry {
    pub fn new(settings: &TaskSettings) -> Self {
        let temp_root = settings
            .temp_root
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_TEMP_DIR_NAME));
        Self {
            tasks: Mutex::new(HashMap::new()),
            temp_root,
            retention: settings.retention(),
        }
    }

    pub fn with_temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.temp_root = root.into();
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn temp_root(&self) -> &Path {
        &self.temp_root
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TaskId, AnalysisTask>> {
        // A panic while holding the lock leaves the map itself consistent.
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a new running task. Reserved keys in `params` are dropped.
    pub fn create_task<I, K>(&self, analyzer_id: Option<&str>, params: I) -> TaskId
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let task_id = TaskId::new();
        let mut context = TaskContext::new(task_id.clone()).with_params(params);
        if let Some(id) = analyzer_id {
            context = context.with_analyzer(id);
        }
        if !context.rejected_keys().is_empty() {
            warn!(
                task_id = %task_id,
                keys = ?context.rejected_keys(),
                "ignoring caller params that shadow reserved keys"
            );
        }

        let task = AnalysisTask {
            context,
            cancel: CancellationToken::new(),
            status: TaskStatus::Running,
            finished_at: None,
            temp_dir: None,
        };
        self.lock().insert(task_id.clone(), task);
        info!(task_id = %task_id, analyzer = analyzer_id.unwrap_or("-"), "task created");
        task_id
    }

    pub fn context(&self, task_id: &TaskId) -> Option<TaskContext> {
        self.lock().get(task_id).map(|t| t.context.clone())
    }

    pub fn token(&self, task_id: &TaskId) -> Option<CancellationToken> {
        self.lock().get(task_id).map(|t| t.cancel.clone())
    }

    pub fn status(&self, task_id: &TaskId) -> Option<TaskStatus> {
        self.lock().get(task_id).map(|t| t.status)
    }

    pub fn get(&self, task_id: &TaskId) -> Option<TaskSnapshot> {
        self.lock().get(task_id).map(TaskSnapshot::from)
    }

    /// Snapshots of every known task, oldest first.
    pub fn list(&self) -> Vec<TaskSnapshot> {
        let mut all: Vec<TaskSnapshot> = self.lock().values().map(TaskSnapshot::from).collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        all
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Trigger the task's token and mark a running task cancelled. A task
    /// already in a terminal status keeps it. Returns whether the task exists.
    pub fn cancel(&self, task_id: &TaskId) -> bool {
        let mut tasks = self.lock();
        let Some(task) = tasks.get_mut(task_id) else {
            debug!(task_id = %task_id, "cancel for unknown task");
            return false;
        };
        task.cancel.cancel();
        if task.status.is_terminal() {
            debug!(task_id = %task_id, status = %task.status, "cancel after terminal status");
            return true;
        }
        task.status = TaskStatus::Cancelled;
        task.finished_at = Some(Utc::now());
        info!(task_id = %task_id, "task cancelled");
        true
    }

    /// Move a running task to `status`. Transitions out of a terminal
    /// status, or back to running, are ignored. Returns whether the status
    /// changed.
    pub fn update_status(&self, task_id: &TaskId, status: TaskStatus) -> bool {
        let mut tasks = self.lock();
        let Some(task) = tasks.get_mut(task_id) else {
            return false;
        };
        if task.status.is_terminal() || !status.is_terminal() {
            debug!(
                task_id = %task_id,
                from = %task.status,
                to = %status,
                "ignoring status transition"
            );
            return false;
        }
        task.status = status;
        task.finished_at = Some(Utc::now());
        debug!(task_id = %task_id, status = %status, "task status updated");
        true
    }

    /// The task's scratch directory, created on first use.
    pub fn get_or_create_temp_dir(&self, task_id: &TaskId) -> Result<PathBuf, RegistryError> {
        let mut tasks = self.lock();
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| RegistryError::TaskNotFound {
                task_id: task_id.clone(),
            })?;
        if let Some(dir) = &task.temp_dir {
            return Ok(dir.clone());
        }

        let dir = self.temp_root.join(task_id.as_str());
        std::fs::create_dir_all(&dir).map_err(|e| RegistryError::TempDir {
            path: dir.clone(),
            source: e,
        })?;
        debug!(task_id = %task_id, dir = %dir.display(), "created task temp dir");
        task.temp_dir = Some(dir.clone());
        Ok(dir)
    }

    pub fn temp_dir(&self, task_id: &TaskId) -> Option<PathBuf> {
        self.lock().get(task_id).and_then(|t| t.temp_dir.clone())
    }

    /// Remove the task's temp dir if it has one. Never fails.
    pub fn cleanup_temp_dir(&self, task_id: &TaskId) {
        let dir = self
            .lock()
            .get_mut(task_id)
            .and_then(|t| t.temp_dir.take());
        if let Some(dir) = dir {
            remove_dir_logged(task_id, &dir);
        }
    }

    /// Remove the temp dir and forget the task.
    pub fn cleanup_task(&self, task_id: &TaskId) {
        let removed = self.lock().remove(task_id);
        if let Some(dir) = removed.and_then(|t| t.temp_dir) {
            remove_dir_logged(task_id, &dir);
        }
        debug!(task_id = %task_id, "task evicted");
    }

    /// Evict tasks terminal for longer than the retention window.
    pub fn sweep(&self, now: DateTime<Utc>) -> SweepResult {
        let retention = chrono::Duration::from_std(self.retention)
            .unwrap_or_else(|_| chrono::Duration::weeks(52 * 100));
        let mut expired = Vec::new();
        let remaining = {
            let mut tasks = self.lock();
            tasks.retain(|id, task| {
                let stale = task
                    .finished_at
                    .is_some_and(|at| now.signed_duration_since(at) > retention);
                if stale {
                    expired.push((id.clone(), task.temp_dir.take()));
                }
                !stale
            });
            tasks.len()
        };

        let mut evicted = Vec::with_capacity(expired.len());
        for (task_id, dir) in expired {
            if let Some(dir) = dir {
                remove_dir_logged(&task_id, &dir);
            }
            evicted.push(task_id);
        }
        if !evicted.is_empty() {
            info!(evicted = evicted.len(), remaining, "swept finished tasks");
        }
        SweepResult { evicted, remaining }
    }

    /// Run [`sweep`](Self::sweep) every `interval` until `shutdown` fires.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        registry.sweep(Utc::now());
                    }
                }
            }
            debug!("task sweeper stopped");
        })
    }
}

fn remove_dir_logged(task_id: &TaskId, dir: &Path) {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => debug!(task_id = %task_id, dir = %dir.display(), "removed task temp dir"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(
            task_id = %task_id,
            dir = %dir.display(),
            error = %e,
            "failed to remove task temp dir"
        ),
    }
}
