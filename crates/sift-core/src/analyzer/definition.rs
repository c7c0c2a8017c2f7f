//! Declarative analyzer definitions (TOML-based).
//!
//! # Example definition
//!
//! ```toml
//! [analyzer]
//! name = "Crash detector"
//! description = "Fatal exceptions and ANRs"
//! file_patterns = ["^logcat", "^bugreport-"]
//!
//! [[insights]]
//! id = "fatal_exception"
//! name = "Fatal exceptions"
//! pattern = "FATAL EXCEPTION"
//! mode = "chunk"
//! chunk_size = 65536
//! ignore_case = true
//! ```

use serde::{Deserialize, Serialize};
use sift_filter::{FileFilterConfig, FilterError, LineFilterConfig};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors when loading or registering an analyzer.
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("I/O error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid definition: {0}")]
    Invalid(String),

    #[error("insight {insight}: {source}")]
    Pattern {
        insight: String,
        #[source]
        source: FilterError,
    },

    #[error("duplicate analyzer id: {id}")]
    DuplicateId { id: String },
}

impl From<DefinitionError> for sift_common::Error {
    fn from(err: DefinitionError) -> Self {
        sift_common::Error::InvalidDefinition(err.to_string())
    }
}

/// `[analyzer]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerMeta {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// File-name include patterns applied to expanded directories.
    #[serde(default)]
    pub file_patterns: Vec<String>,
}

/// One `[[insights]]` entry: an id plus a line filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsightDefinition {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub filter: LineFilterConfig,
}

impl InsightDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>, filter: LineFilterConfig) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            filter,
        }
    }

    /// Display name, falling back to the id.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// A complete definition file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerDefinition {
    pub analyzer: AnalyzerMeta,
    #[serde(default)]
    pub insights: Vec<InsightDefinition>,
}

impl AnalyzerDefinition {
    /// Parse and validate definition text. `origin` is only used in errors.
    pub fn parse(content: &str, origin: &Path) -> Result<Self, DefinitionError> {
        let definition: AnalyzerDefinition =
            toml::from_str(content).map_err(|e| DefinitionError::Parse {
                path: origin.to_path_buf(),
                source: e,
            })?;
        definition.validate()?;
        Ok(definition)
    }

    pub fn load(path: &Path) -> Result<Self, DefinitionError> {
        let content = std::fs::read_to_string(path).map_err(|e| DefinitionError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&content, path)
    }

    pub fn file_filter(&self) -> FileFilterConfig {
        FileFilterConfig::new(self.analyzer.file_patterns.iter().cloned())
    }

    pub fn validate(&self) -> Result<(), DefinitionError> {
        if self.analyzer.name.trim().is_empty() {
            return Err(DefinitionError::Invalid("analyzer.name is empty".into()));
        }
        if self.insights.is_empty() {
            return Err(DefinitionError::Invalid("at least one insight is required".into()));
        }
        self.file_filter()
            .compile()
            .map_err(|source| DefinitionError::Pattern {
                insight: "file_patterns".into(),
                source,
            })?;

        let mut seen = HashSet::new();
        for insight in &self.insights {
            if insight.id.trim().is_empty() {
                return Err(DefinitionError::Invalid("insight with empty id".into()));
            }
            if !seen.insert(insight.id.as_str()) {
                return Err(DefinitionError::Invalid(format!(
                    "duplicate insight id: {}",
                    insight.id
                )));
            }
            insight
                .filter
                .validate()
                .and_then(|()| insight.filter.compile().map(drop))
                .map_err(|source| DefinitionError::Pattern {
                    insight: insight.id.clone(),
                    source,
                })?;
        }
        Ok(())
    }
}
