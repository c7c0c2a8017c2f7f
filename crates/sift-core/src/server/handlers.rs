//! HTTP request handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sift_common::{Error, ErrorCategory, StructuredError, TaskId};
use sift_vfs::VirtualPath;
use tracing::{info, warn};

use super::AppState;
use crate::analyzer::AnalyzerInfo;
use crate::logging::truncate_for_log;
use crate::sse::sse_response;
use crate::task::{TaskSnapshot, TaskStatus};

/// Body of `POST /api/analyze`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub analyzer_id: String,
    pub paths: Vec<VirtualPath>,
    #[serde(default)]
    pub params: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub ripgrep: bool,
    pub analyzers: usize,
    pub tasks: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelResponse {
    pub task_id: TaskId,
    /// False when the task had already finished.
    pub cancelled: bool,
    pub status: TaskStatus,
}

/// Error response: status code plus a [`StructuredError`] body.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: StructuredError,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::from(Error::Config(message.into()))
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::AnalyzerNotFound { .. } | Error::TaskNotFound { .. } | Error::NotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            Error::Cancelled { .. } => StatusCode::CONFLICT,
            Error::PermissionDenied { .. } => StatusCode::FORBIDDEN,
            e if e.category() == ErrorCategory::Config => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            body: StructuredError::from(&err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn parse_task_id(raw: &str) -> Result<TaskId, ApiError> {
    TaskId::parse(raw).ok_or_else(|| {
        ApiError::from(Error::TaskNotFound {
            task_id: raw.to_string(),
        })
    })
}

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        ripgrep: state.service.engine().ripgrep().is_available(),
        analyzers: state.service.analyzers().len(),
        tasks: state.service.tasks().len(),
    })
}

pub async fn list_analyzers(State(state): State<AppState>) -> Json<Vec<AnalyzerInfo>> {
    Json(state.service.analyzers().list())
}

/// Start a scan and stream its events. Unknown analyzers and empty input
/// lists are refused before any task is created.
pub async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.paths.is_empty() {
        return Err(ApiError::bad_request("no paths to analyze"));
    }
    let inputs = request
        .paths
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    let handle = state
        .service
        .start(&request.analyzer_id, request.paths, request.params)
        .map_err(|e| {
            warn!(analyzer = %request.analyzer_id, error = %e, "analysis request refused");
            ApiError::from(e)
        })?;
    info!(
        task_id = %handle.task_id,
        analyzer = %request.analyzer_id,
        inputs = %truncate_for_log(&inputs, 200),
        "analysis started"
    );
    Ok(sse_response(handle.into_stream(state.stream)))
}

pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskSnapshot>, ApiError> {
    let id = parse_task_id(&task_id)?;
    state
        .service
        .tasks()
        .get(&id)
        .map(Json)
        .ok_or_else(|| ApiError::from(Error::TaskNotFound { task_id }))
}

pub async fn cancel_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<CancelResponse>, ApiError> {
    let id = parse_task_id(&task_id)?;
    let tasks = state.service.tasks();
    let before = tasks.status(&id);
    if !tasks.cancel(&id) {
        return Err(ApiError::from(Error::TaskNotFound { task_id }));
    }
    let cancelled = before == Some(TaskStatus::Running);
    let status = tasks.status(&id).unwrap_or(TaskStatus::Cancelled);
    if cancelled {
        info!(task_id = %id, "cancellation requested over HTTP");
    }
    Ok(Json(CancelResponse {
        task_id: id,
        cancelled,
        status,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_error_status_mapping() {
        let cases = vec![
            (
                Error::AnalyzerNotFound { id: "x".into() },
                StatusCode::NOT_FOUND,
            ),
            (
                Error::TaskNotFound {
                    task_id: "t".into(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                Error::InvalidPattern("(".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                Error::Cancelled {
                    task_id: "t".into(),
                },
                StatusCode::CONFLICT,
            ),
            (
                Error::PermissionDenied {
                    path: PathBuf::from("/root"),
                },
                StatusCode::FORBIDDEN,
            ),
            (Error::Scan("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            let code = err.code();
            let api = ApiError::from(err);
            assert_eq!(api.status, expected);
            assert_eq!(api.body.code, code);
        }
    }

    #[test]
    fn test_analyze_request_defaults_params() {
        let request: AnalyzeRequest = serde_json::from_str(
            r#"{"analyzer_id":"builtin.crash_detector","paths":["a.zip::b/c.txt"]}"#,
        )
        .unwrap();
        assert!(request.params.is_empty());
        assert_eq!(request.paths[0], VirtualPath::parse("a.zip::b/c.txt"));
    }

    #[test]
    fn test_unparseable_task_id_is_not_found() {
        let err = parse_task_id("../../etc").unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }
}
