//! logsift common types, IDs, and errors.
//!
//! This crate provides foundational types shared across the logsift crates:
//! - Task identity types
//! - The unified error taxonomy with stable codes
//! - Explicit per-task context threaded through a scan
//! - Output formats

pub mod context;
pub mod error;
pub mod id;
pub mod output;

pub use context::{TaskContext, RESERVED_CONTEXT_KEYS};
pub use error::{Error, ErrorCategory, Result, StructuredError};
pub use id::TaskId;
pub use output::OutputFormat;
