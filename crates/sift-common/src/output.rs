//! Output formats.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Supported output formats for CLI commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Streaming JSON Lines: every progress event, then the final result
    #[default]
    Jsonl,

    /// Final report only, as one JSON document
    Json,

    /// Matched lines prefixed by their source path, grep style
    Lines,

    /// One-line summary for quick status checks
    Summary,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Jsonl => write!(f, "jsonl"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Lines => write!(f, "lines"),
            OutputFormat::Summary => write!(f, "summary"),
        }
    }
}
