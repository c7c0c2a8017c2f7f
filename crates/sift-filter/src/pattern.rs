//! Line filter configuration.

use crate::error::{FilterError, Result};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default chunk size for chunked reads (1 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// How a file is read while matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingMode {
    #[default]
    Line,
    Chunk,
    Ripgrep,
}

impl fmt::Display for ReadingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadingMode::Line => write!(f, "line"),
            ReadingMode::Chunk => write!(f, "chunk"),
            ReadingMode::Ripgrep => write!(f, "ripgrep"),
        }
    }
}

impl std::str::FromStr for ReadingMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "line" => Ok(ReadingMode::Line),
            "chunk" => Ok(ReadingMode::Chunk),
            "ripgrep" | "rg" => Ok(ReadingMode::Ripgrep),
            other => Err(format!("unknown reading mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternFlags {
    pub ignore_case: bool,
    pub multi_line: bool,
    pub dot_matches_new_line: bool,
}

/// One matching stage: a regex applied to every line of every file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineFilterConfig {
    pub pattern: String,
    #[serde(default)]
    pub mode: ReadingMode,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(flatten)]
    pub flags: PatternFlags,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl LineFilterConfig {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            mode: ReadingMode::Line,
            chunk_size: DEFAULT_CHUNK_SIZE,
            flags: PatternFlags::default(),
        }
    }

    pub fn with_mode(mut self, mode: ReadingMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_flags(mut self, flags: PatternFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn ignore_case(mut self, yes: bool) -> Self {
        self.flags.ignore_case = yes;
        self
    }

    /// Compile the pattern with the configured flags.
    pub fn compile(&self) -> Result<Regex> {
        RegexBuilder::new(&self.pattern)
            .case_insensitive(self.flags.ignore_case)
            .multi_line(self.flags.multi_line)
            .dot_matches_new_line(self.flags.dot_matches_new_line)
            .build()
            .map_err(|source| FilterError::InvalidPattern {
                pattern: self.pattern.clone(),
                source,
            })
    }

    /// Semantic checks beyond regex syntax.
    pub fn validate(&self) -> Result<()> {
        self.compile()?;
        if self.mode == ReadingMode::Chunk && self.chunk_size == 0 {
            return Err(FilterError::InvalidConfig(
                "chunk_size must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
