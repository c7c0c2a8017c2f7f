//! Structured logging for logsift.
//!
//! Two output modes:
//! - Human-readable console output for interactive use
//! - JSON lines for servers and pipelines
//!
//! stdout is reserved for command payloads (events, reports); every log line
//! goes to stderr.

pub mod config;

pub use config::{LogConfig, LogFormat, LogLevel};

use std::io::IsTerminal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global subscriber. Safe to call more than once; later
/// calls are ignored.
pub fn init_logging(config: &LogConfig) {
    // SIFT_LOG already folded into `config.level`; RUST_LOG directives are
    // honoured verbatim only when SIFT_LOG is unset.
    let filter = if config.level == LogLevel::Off {
        EnvFilter::new("off")
    } else if std::env::var_os("SIFT_LOG").is_some() {
        EnvFilter::new(config.default_directive())
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.default_directive()))
    };

    let result = match config.format {
        LogFormat::Human => {
            let use_ansi = std::io::stderr().is_terminal();
            let layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_ansi(use_ansi)
                .with_file(config.source_location)
                .with_line_number(config.source_location);

            if config.timestamps {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(layer)
                    .try_init()
            } else {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(layer.without_time())
                    .try_init()
            }
        }
        LogFormat::Jsonl => {
            let layer = fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(true)
                .with_span_list(false)
                .with_file(config.source_location)
                .with_line_number(config.source_location);
            tracing_subscriber::registry()
                .with(filter)
                .with(layer)
                .try_init()
        }
    };

    if result.is_err() {
        tracing::debug!("global subscriber already installed");
    }
}

/// Shorten a string for log fields.
pub fn truncate_for_log(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let head: String = s.chars().take(max_chars).collect();
    format!("{head}...(truncated)")
}
