//! Exit codes for the `sift` CLI.
//!
//! Exit codes communicate the outcome of a scan without requiring output
//! parsing:
//! - 0-1: operational outcomes (matches found or not)
//! - 2-3: errors (usage/configuration, scan failure)
//! - 130: interrupted (Ctrl-C or cancellation), following the shell convention

use sift_common::{Error, ErrorCategory};

/// Exit codes for `sift` operations.
///
/// These codes are a stable contract for automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success: scan completed (matches found, for `grep`)
    Clean = 0,

    /// `grep` completed without a single match
    NoMatches = 1,

    /// Invalid arguments, configuration or analyzer definition
    UsageError = 2,

    /// The scan itself failed
    ScanError = 3,

    /// Scan cancelled before completion
    Cancelled = 130,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Check if this exit code indicates an operational outcome rather than
    /// a failure.
    pub fn is_success(self) -> bool {
        matches!(self, ExitCode::Clean | ExitCode::NoMatches)
    }

    /// Get the code name as a string constant (for JSON output).
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK",
            ExitCode::NoMatches => "OK_NO_MATCHES",
            ExitCode::UsageError => "ERR_USAGE",
            ExitCode::ScanError => "ERR_SCAN",
            ExitCode::Cancelled => "ERR_CANCELLED",
        }
    }

    /// Map an error to the exit code the CLI reports for it.
    pub fn for_error(err: &Error) -> Self {
        match err.category() {
            ErrorCategory::Cancellation => ExitCode::Cancelled,
            ErrorCategory::Config => ExitCode::UsageError,
            _ if matches!(err, Error::AnalyzerNotFound { .. }) => ExitCode::UsageError,
            _ => ExitCode::ScanError,
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        // Every variant fits in a u8.
        std::process::ExitCode::from(code.as_i32() as u8)
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Clean.as_i32(), 0);
        assert_eq!(ExitCode::NoMatches.as_i32(), 1);
        assert_eq!(ExitCode::UsageError.as_i32(), 2);
        assert_eq!(ExitCode::ScanError.as_i32(), 3);
        assert_eq!(ExitCode::Cancelled.as_i32(), 130);
    }

    #[test]
    fn test_success_codes() {
        assert!(ExitCode::Clean.is_success());
        assert!(ExitCode::NoMatches.is_success());
        assert!(!ExitCode::ScanError.is_success());
        assert!(!ExitCode::Cancelled.is_success());
    }

    #[test]
    fn test_for_error() {
        assert_eq!(
            ExitCode::for_error(&Error::Cancelled {
                task_id: "t".into()
            }),
            ExitCode::Cancelled
        );
        assert_eq!(
            ExitCode::for_error(&Error::InvalidPattern("(".into())),
            ExitCode::UsageError
        );
        assert_eq!(
            ExitCode::for_error(&Error::AnalyzerNotFound { id: "x".into() }),
            ExitCode::UsageError
        );
        assert_eq!(
            ExitCode::for_error(&Error::Scan("boom".into())),
            ExitCode::ScanError
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(ExitCode::Cancelled.to_string(), "ERR_CANCELLED (130)");
    }
}
