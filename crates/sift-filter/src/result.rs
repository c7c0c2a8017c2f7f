//! Filter results grouped by source path.

use serde::{Deserialize, Serialize};
use sift_vfs::VirtualPath;
use std::collections::HashMap;
use std::fmt;

/// How a file was actually scanned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMethod {
    Line,
    Chunk,
    Ripgrep,
    /// Ripgrep was requested but the file was scanned in line mode.
    RipgrepFallback,
}

impl fmt::Display for ExecutionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMethod::Line => write!(f, "line"),
            ExecutionMethod::Chunk => write!(f, "chunk"),
            ExecutionMethod::Ripgrep => write!(f, "ripgrep"),
            ExecutionMethod::RipgrepFallback => write!(f, "ripgrep_fallback"),
        }
    }
}

/// Matching lines from one source path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathMatches {
    pub path: VirtualPath,
    pub lines: Vec<String>,
    /// Command line or strategy description used for this path.
    pub command: String,
    pub method: ExecutionMethod,
}

/// Matches for every scanned path, in scan order.
///
/// Entries are only ever added or extended, so a result handed out after a
/// cancelled scan still holds everything finished before the cancel.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FilterResult {
    /// Method of the first file recorded.
    pub execution_method: Option<ExecutionMethod>,
    results: Vec<PathMatches>,
    #[serde(skip)]
    index: HashMap<VirtualPath, usize>,
}

impl FilterResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome for one path. A repeated path extends its lines.
    pub fn record(
        &mut self,
        path: VirtualPath,
        lines: Vec<String>,
        command: impl Into<String>,
        method: ExecutionMethod,
    ) {
        self.execution_method.get_or_insert(method);
        match self.index.get(&path) {
            Some(&i) => self.results[i].lines.extend(lines),
            None => {
                self.index.insert(path.clone(), self.results.len());
                self.results.push(PathMatches {
                    path,
                    lines,
                    command: command.into(),
                    method,
                });
            }
        }
    }

    pub fn get(&self, path: &VirtualPath) -> Option<&PathMatches> {
        self.index.get(path).map(|&i| &self.results[i])
    }

    pub fn lines(&self, path: &VirtualPath) -> &[String] {
        self.get(path).map(|m| m.lines.as_slice()).unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathMatches> {
        self.results.iter()
    }

    pub fn paths(&self) -> impl Iterator<Item = &VirtualPath> {
        self.results.iter().map(|m| &m.path)
    }

    /// Number of paths recorded, including paths with no matches.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn total_matches(&self) -> usize {
        self.results.iter().map(|m| m.lines.len()).sum()
    }

    /// Paths with at least one match.
    pub fn matched_paths(&self) -> usize {
        self.results.iter().filter(|m| !m.lines.is_empty()).count()
    }
}
