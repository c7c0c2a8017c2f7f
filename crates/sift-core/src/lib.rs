//! logsift Core Library
//!
//! This library provides the execution side of logsift:
//! - Analyzer definitions, the built-in crash detector and the registry
//! - Task lifecycle with cooperative cancellation and temp dir cleanup
//! - Progress events, the bounded event queue and the SSE consumer
//! - Scan orchestration tying analyzers, tasks and the filter engine together
//! - Configuration, logging, exit codes and the HTTP surface
//!
//! The binary entry point is in `main.rs`.

pub mod analyzer;
pub mod config;
pub mod events;
pub mod exit_codes;
pub mod logging;
pub mod server;
pub mod service;
pub mod sse;
pub mod task;

pub use service::{AnalysisHandle, AnalysisReport, AnalysisService};
