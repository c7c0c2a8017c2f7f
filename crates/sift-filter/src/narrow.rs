//! File narrowing: turns raw inputs into the list of files worth scanning.

use crate::error::{FilterError, Result};
use regex::RegexSet;
use serde::{Deserialize, Serialize};
use sift_vfs::{is_archive_name, Vfs, VirtualPath};
use std::sync::OnceLock;
use tracing::{debug, warn};

/// File-name include patterns, OR-combined. Empty keeps everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFilterConfig {
    #[serde(default)]
    pub name_patterns: Vec<String>,
}

impl FileFilterConfig {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name_patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn compile(&self) -> Result<Option<RegexSet>> {
        if self.name_patterns.is_empty() {
            return Ok(None);
        }
        RegexSet::new(&self.name_patterns)
            .map(Some)
            .map_err(|source| FilterError::InvalidPattern {
                pattern: self.name_patterns.join(" | "),
                source,
            })
    }
}

/// Outcome of narrowing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Narrowed {
    pub files: Vec<VirtualPath>,
    /// Inputs that failed validation and were dropped.
    pub missing: Vec<VirtualPath>,
}

/// Narrows inputs once and caches the answer.
pub struct FileNarrower {
    vfs: Vfs,
    inputs: Vec<VirtualPath>,
    names: Option<RegexSet>,
    cache: OnceLock<Narrowed>,
}

impl FileNarrower {
    pub fn new(vfs: Vfs, inputs: Vec<VirtualPath>, filter: &FileFilterConfig) -> Result<Self> {
        Ok(Self {
            vfs,
            inputs,
            names: filter.compile()?,
            cache: OnceLock::new(),
        })
    }

    /// Explicit files always pass. Directories and archive files are expanded
    /// and their contents kept only when the base name matches a pattern.
    pub fn narrow(&self) -> &Narrowed {
        self.cache.get_or_init(|| self.compute())
    }

    pub fn files(&self) -> &[VirtualPath] {
        &self.narrow().files
    }

    fn compute(&self) -> Narrowed {
        let mut out = Narrowed::default();
        let mut seen = std::collections::HashSet::new();

        for input in &self.inputs {
            if !self.vfs.validate(input) {
                warn!(path = %input, "input not readable, skipping");
                out.missing.push(input.clone());
                continue;
            }

            let expand = match input {
                VirtualPath::Plain(p) => {
                    p.is_dir() || p.file_name().and_then(|n| n.to_str()).is_some_and(is_archive_name)
                }
                VirtualPath::Archived { .. } => false,
            };

            if !expand {
                if seen.insert(input.clone()) {
                    out.files.push(input.clone());
                }
                continue;
            }

            match self.vfs.list_directory(input.root(), true) {
                Ok(listed) => {
                    for path in listed {
                        if self.keeps(&path) && seen.insert(path.clone()) {
                            out.files.push(path);
                        }
                    }
                }
                Err(e) => {
                    warn!(path = %input, error = %e, "failed to expand input");
                    out.missing.push(input.clone());
                }
            }
        }

        debug!(
            inputs = self.inputs.len(),
            files = out.files.len(),
            missing = out.missing.len(),
            "inputs narrowed"
        );
        out
    }

    fn keeps(&self, path: &VirtualPath) -> bool {
        match &self.names {
            None => true,
            Some(set) => path.file_name().is_some_and(|name| set.is_match(name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_empty_patterns_keep_everything() {
        assert!(FileFilterConfig::default().compile().unwrap().is_none());
    }

    #[test]
    fn test_bad_name_pattern() {
        assert!(FileFilterConfig::new(["[oops"]).compile().is_err());
    }

    #[test]
    fn test_explicit_files_bypass_patterns() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("random.txt");
        fs::write(&file, "x").unwrap();

        let narrower = FileNarrower::new(
            Vfs::default(),
            vec![VirtualPath::plain(&file)],
            &FileFilterConfig::new(["^dumpstate-"]),
        )
        .unwrap();
        assert_eq!(narrower.files(), &[VirtualPath::plain(&file)]);
    }

    #[test]
    fn test_narrowing_is_idempotent() {
        let dir = tempdir().unwrap();
        for name in ["dumpstate-1.txt", "other.txt", "bugreport-2.txt"] {
            fs::write(dir.path().join(name), "x").unwrap();
        }
        let narrower = FileNarrower::new(
            Vfs::default(),
            vec![VirtualPath::plain(dir.path()), VirtualPath::plain(dir.path())],
            &FileFilterConfig::new(["^dumpstate-", "^bugreport-"]),
        )
        .unwrap();
        let first = narrower.narrow().clone();
        let second = narrower.narrow().clone();
        assert_eq!(first, second);
        assert_eq!(first.files.len(), 2);
    }

    #[test]
    fn test_missing_inputs_reported() {
        let dir = tempdir().unwrap();
        let missing = VirtualPath::plain(dir.path().join("gone.log"));
        let narrower =
            FileNarrower::new(Vfs::default(), vec![missing.clone()], &FileFilterConfig::default())
                .unwrap();
        assert!(narrower.files().is_empty());
        assert_eq!(narrower.narrow().missing, vec![missing]);
    }
}
