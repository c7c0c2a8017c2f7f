//! Error types for logsift.
//!
//! This module provides structured error handling with:
//! - Stable error codes for machine parsing
//! - Category classification matching the scan failure taxonomy
//! - Recoverability hints (whether a scan can keep going)
//!
//! Errors serialize to structured JSON for the SSE `error`/`result` payloads:
//! ```json
//! {
//!   "code": 40,
//!   "category": "cancellation",
//!   "message": "task sift-20260115-143022-a7xqk2mz was cancelled",
//!   "recoverable": false,
//!   "context": { "task_id": "sift-20260115-143022-a7xqk2mz" }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for logsift operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories, one per failure class a scan distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Configuration and analyzer definition errors.
    Config,
    /// Archive member rejected by a security limit.
    Security,
    /// Unreadable, missing or corrupt file or archive member.
    Io,
    /// Cooperative cancellation observed.
    Cancellation,
    /// External search tool failure.
    Subprocess,
    /// Unexpected failure of a whole scan.
    Scan,
    /// Task registry errors.
    Task,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Security => write!(f, "security"),
            ErrorCategory::Io => write!(f, "io"),
            ErrorCategory::Cancellation => write!(f, "cancellation"),
            ErrorCategory::Subprocess => write!(f, "subprocess"),
            ErrorCategory::Scan => write!(f, "scan"),
            ErrorCategory::Task => write!(f, "task"),
        }
    }
}

/// Unified error type for logsift.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid analyzer definition: {0}")]
    InvalidDefinition(String),

    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    // Security errors (20-29)
    #[error("archive member {member} rejected: {reason}")]
    ArchiveRejected { member: String, reason: String },

    #[error("malformed archive: {0}")]
    MalformedArchive(String),

    // I/O errors (30-39)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("permission denied: {}", path.display())]
    PermissionDenied { path: PathBuf },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Cancellation (40-49)
    #[error("task {task_id} was cancelled")]
    Cancelled { task_id: String },

    // Subprocess errors (50-59)
    #[error("search subprocess failed: {0}")]
    Subprocess(String),

    // Scan errors (60-69)
    #[error("scan failed: {0}")]
    Scan(String),

    #[error("analyzer not found: {id}")]
    AnalyzerNotFound { id: String },

    // Task errors (70-79)
    #[error("task not found: {task_id}")]
    TaskNotFound { task_id: String },
}

impl Error {
    /// Returns the error code for this error type.
    ///
    /// Error codes are stable and grouped by category:
    /// - 10-19: Configuration errors
    /// - 20-29: Security rejections
    /// - 30-39: I/O errors
    /// - 40-49: Cancellation
    /// - 50-59: Subprocess errors
    /// - 60-69: Scan errors
    /// - 70-79: Task errors
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::InvalidDefinition(_) => 11,
            Error::InvalidPattern(_) => 12,
            Error::ArchiveRejected { .. } => 20,
            Error::MalformedArchive(_) => 21,
            Error::Io(_) => 30,
            Error::NotFound { .. } => 31,
            Error::PermissionDenied { .. } => 32,
            Error::Json(_) => 33,
            Error::Cancelled { .. } => 40,
            Error::Subprocess(_) => 50,
            Error::Scan(_) => 60,
            Error::AnalyzerNotFound { .. } => 61,
            Error::TaskNotFound { .. } => 70,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) | Error::InvalidDefinition(_) | Error::InvalidPattern(_) => {
                ErrorCategory::Config
            }
            Error::ArchiveRejected { .. } | Error::MalformedArchive(_) => ErrorCategory::Security,
            Error::Io(_)
            | Error::NotFound { .. }
            | Error::PermissionDenied { .. }
            | Error::Json(_) => ErrorCategory::Io,
            Error::Cancelled { .. } => ErrorCategory::Cancellation,
            Error::Subprocess(_) => ErrorCategory::Subprocess,
            Error::Scan(_) | Error::AnalyzerNotFound { .. } => ErrorCategory::Scan,
            Error::TaskNotFound { .. } => ErrorCategory::Task,
        }
    }

    /// Returns whether a multi-file scan can continue past this error.
    ///
    /// Failures scoped to a single file or archive member are recoverable;
    /// cancellation, invalid configuration and fatal scan errors are not.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Config(_) => false,
            Error::InvalidDefinition(_) => false,
            Error::InvalidPattern(_) => false,

            Error::ArchiveRejected { .. } => true,
            Error::MalformedArchive(_) => true,

            Error::Io(_) => true,
            Error::NotFound { .. } => true,
            Error::PermissionDenied { .. } => true,
            Error::Json(_) => true,

            Error::Cancelled { .. } => false,

            // Subprocess failures fall back to line scanning
            Error::Subprocess(_) => true,

            Error::Scan(_) => false,
            Error::AnalyzerNotFound { .. } => false,
            Error::TaskNotFound { .. } => false,
        }
    }

    /// Whether this error represents cooperative cancellation.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled { .. })
    }

    /// Returns a short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self {
            Error::Config(_) => "Configuration Error",
            Error::InvalidDefinition(_) => "Invalid Analyzer Definition",
            Error::InvalidPattern(_) => "Invalid Pattern",
            Error::ArchiveRejected { .. } => "Archive Member Rejected",
            Error::MalformedArchive(_) => "Malformed Archive",
            Error::Io(_) => "I/O Error",
            Error::NotFound { .. } => "Not Found",
            Error::PermissionDenied { .. } => "Permission Denied",
            Error::Json(_) => "JSON Error",
            Error::Cancelled { .. } => "Cancelled",
            Error::Subprocess(_) => "Search Tool Failure",
            Error::Scan(_) => "Scan Failed",
            Error::AnalyzerNotFound { .. } => "Analyzer Not Found",
            Error::TaskNotFound { .. } => "Task Not Found",
        }
    }
}

/// Structured error payload for JSON output.
///
/// Carried in the SSE `error` event and the final `result` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredError {
    /// Stable error code.
    pub code: u32,

    /// Error category for grouping.
    pub category: ErrorCategory,

    /// Human-readable error message.
    pub message: String,

    /// Whether the error is potentially recoverable.
    pub recoverable: bool,

    /// Additional structured context (e.g., task id, file path).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        let mut context = HashMap::new();

        match err {
            Error::ArchiveRejected { member, reason } => {
                context.insert("member".to_string(), serde_json::json!(member));
                context.insert("reason".to_string(), serde_json::json!(reason));
            }
            Error::NotFound { path } | Error::PermissionDenied { path } => {
                context.insert(
                    "path".to_string(),
                    serde_json::json!(path.display().to_string()),
                );
            }
            Error::Cancelled { task_id } | Error::TaskNotFound { task_id } => {
                context.insert("task_id".to_string(), serde_json::json!(task_id));
            }
            Error::AnalyzerNotFound { id } => {
                context.insert("analyzer_id".to_string(), serde_json::json!(id));
            }
            _ => {}
        }

        StructuredError {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
            context,
        }
    }
}

impl StructuredError {
    /// Build a scan-category error from a bare message.
    pub fn scan(message: impl Into<String>) -> Self {
        StructuredError::from(&Error::Scan(message.into()))
    }

    /// Add additional context to the error.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":{},"error":"serialization_failed"}}"#, self.code)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_follow_category_ranges() {
        let cases: Vec<(Error, ErrorCategory, std::ops::Range<u32>)> = vec![
            (Error::Config("x".into()), ErrorCategory::Config, 10..20),
            (
                Error::ArchiveRejected {
                    member: "a".into(),
                    reason: "ratio".into(),
                },
                ErrorCategory::Security,
                20..30,
            ),
            (
                Error::NotFound {
                    path: PathBuf::from("/nope"),
                },
                ErrorCategory::Io,
                30..40,
            ),
            (
                Error::Cancelled {
                    task_id: "t".into(),
                },
                ErrorCategory::Cancellation,
                40..50,
            ),
            (Error::Subprocess("rg".into()), ErrorCategory::Subprocess, 50..60),
            (Error::Scan("boom".into()), ErrorCategory::Scan, 60..70),
            (
                Error::TaskNotFound {
                    task_id: "t".into(),
                },
                ErrorCategory::Task,
                70..80,
            ),
        ];
        for (err, category, range) in cases {
            assert_eq!(err.category(), category, "{err}");
            assert!(range.contains(&err.code()), "{err} -> {}", err.code());
        }
    }

    #[test]
    fn test_per_file_errors_are_recoverable() {
        assert!(Error::NotFound {
            path: PathBuf::from("x")
        }
        .is_recoverable());
        assert!(Error::Subprocess("exit 2".into()).is_recoverable());
        assert!(!Error::Cancelled {
            task_id: "t".into()
        }
        .is_recoverable());
        assert!(!Error::Scan("fatal".into()).is_recoverable());
    }

    #[test]
    fn test_structured_error_carries_context() {
        let err = Error::Cancelled {
            task_id: "sift-20260115-143022-a7xqk2mz".into(),
        };
        let structured = StructuredError::from(&err);
        assert_eq!(structured.code, 40);
        assert_eq!(structured.category, ErrorCategory::Cancellation);
        assert_eq!(
            structured.context.get("task_id"),
            Some(&serde_json::json!("sift-20260115-143022-a7xqk2mz"))
        );
        let json = structured.to_json();
        assert!(json.contains(r#""category":"cancellation""#));
    }

    #[test]
    fn test_structured_error_with_context() {
        let structured = StructuredError::scan("boom").with_context("file", "a.log");
        assert_eq!(structured.category, ErrorCategory::Scan);
        assert_eq!(structured.context["file"], serde_json::json!("a.log"));
    }
}
