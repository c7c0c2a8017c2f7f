//! Analyzer registry: discovery, id assignment and lookup.
//!
//! Definitions are `*.toml` files anywhere under the analyzer directory.
//! An analyzer's id is its path relative to that directory, extension
//! dropped, components joined with `.`: `android/crash.toml` becomes
//! `android.crash`. One bad file never stops discovery; failures are
//! collected in the [`RegistryReport`].

use super::{
    Analyzer, AnalyzerDefinition, AnalyzerInfo, AnalyzerSource, CrashDetector,
    DeclarativeAnalyzer, DefinitionError,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const DEFINITION_EXTENSION: &str = "toml";

/// A definition file that failed to load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadError {
    pub path: PathBuf,
    pub message: String,
}

/// Outcome of a discovery pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryReport {
    pub loaded: Vec<String>,
    pub errors: Vec<LoadError>,
}

/// Analyzers keyed by id.
#[derive(Default)]
pub struct AnalyzerRegistry {
    analyzers: BTreeMap<String, Arc<dyn Analyzer>>,
}

impl std::fmt::Debug for AnalyzerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyzerRegistry")
            .field("analyzers", &self.ids())
            .finish()
    }
}

impl AnalyzerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding only the built-in analyzers.
    pub fn with_builtins() -> Result<Self, DefinitionError> {
        let mut registry = Self::new();
        let crash = CrashDetector::new()
            .map_err(|e| DefinitionError::Invalid(format!("builtin crash detector: {e}")))?;
        registry.register(Arc::new(crash))?;
        Ok(registry)
    }

    /// Built-ins plus everything discovered under `dir`.
    pub fn load(dir: Option<&Path>) -> Result<(Self, RegistryReport), DefinitionError> {
        let mut registry = Self::with_builtins()?;
        let report = match dir {
            Some(dir) => registry.discover(dir),
            None => RegistryReport::default(),
        };
        Ok((registry, report))
    }

    /// Register a code-based analyzer. Ids must be unique.
    pub fn register(&mut self, analyzer: Arc<dyn Analyzer>) -> Result<(), DefinitionError> {
        let id = analyzer.id().to_string();
        if self.analyzers.contains_key(&id) {
            return Err(DefinitionError::DuplicateId { id });
        }
        debug!(analyzer = %id, "registered analyzer");
        self.analyzers.insert(id, analyzer);
        Ok(())
    }

    /// Load every definition under `dir`. Missing directories load nothing.
    pub fn discover(&mut self, dir: &Path) -> RegistryReport {
        let mut report = RegistryReport::default();
        if !dir.is_dir() {
            debug!(path = %dir.display(), "analyzer directory does not exist, nothing loaded");
            return report;
        }

        let mut files = Vec::new();
        collect_definitions(dir, &mut files, &mut report);
        files.sort();

        for path in files {
            let Some(id) = analyzer_id(dir, &path) else {
                report.errors.push(LoadError {
                    path: path.clone(),
                    message: "cannot derive analyzer id from path".into(),
                });
                continue;
            };
            let loaded = AnalyzerDefinition::load(&path).and_then(|definition| {
                let analyzer = DeclarativeAnalyzer::new(
                    id.clone(),
                    AnalyzerSource::File { path: path.clone() },
                    definition,
                );
                self.register(Arc::new(analyzer))
            });
            match loaded {
                Ok(()) => {
                    info!(analyzer = %id, path = %path.display(), "loaded analyzer");
                    report.loaded.push(id);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping analyzer definition");
                    report.errors.push(LoadError {
                        path,
                        message: e.to_string(),
                    });
                }
            }
        }

        debug!(
            loaded = report.loaded.len(),
            errors = report.errors.len(),
            "analyzer discovery complete"
        );
        report
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Analyzer>> {
        self.analyzers.get(id).cloned()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.analyzers.keys().map(String::as_str).collect()
    }

    /// Metadata for every analyzer, sorted by id.
    pub fn list(&self) -> Vec<AnalyzerInfo> {
        self.analyzers.values().map(|a| a.info()).collect()
    }

    pub fn len(&self) -> usize {
        self.analyzers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.analyzers.is_empty()
    }
}

fn collect_definitions(dir: &Path, out: &mut Vec<PathBuf>, report: &mut RegistryReport) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            report.errors.push(LoadError {
                path: dir.to_path_buf(),
                message: e.to_string(),
            });
            return;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        match entry.file_type() {
            Ok(ft) if ft.is_dir() => collect_definitions(&path, out, report),
            Ok(ft) if ft.is_file() => {
                if path.extension().and_then(|e| e.to_str()) == Some(DEFINITION_EXTENSION) {
                    out.push(path);
                }
            }
            _ => {}
        }
    }
}

/// `root/android/crash.toml` → `android.crash`.
pub fn analyzer_id(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?.with_extension("");
    let parts: Vec<&str> = relative
        .components()
        .map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect::<Option<_>>()?;
    if parts.is_empty() || parts.iter().any(|p| p.is_empty()) {
        return None;
    }
    Some(parts.join("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::builtin::CRASH_DETECTOR_ID;
    use crate::analyzer::{AnalyzerOutput, AnalyzerScope};
    use async_trait::async_trait;
    use tempfile::tempdir;

    const VALID: &str = "[analyzer]\nname = \"ok\"\n[[insights]]\nid = \"a\"\npattern = \"x\"\n";

    struct Custom;

    #[async_trait]
    impl Analyzer for Custom {
        fn id(&self) -> &str {
            "custom.code"
        }

        fn info(&self) -> AnalyzerInfo {
            AnalyzerInfo {
                id: self.id().into(),
                name: "Custom".into(),
                description: String::new(),
                source: AnalyzerSource::Builtin,
                file_patterns: vec![],
                insights: vec![],
            }
        }

        async fn run(
            &self,
            _scope: &AnalyzerScope<'_>,
            _output: &mut AnalyzerOutput,
        ) -> Result<(), sift_common::Error> {
            Ok(())
        }
    }

    #[test]
    fn test_analyzer_id_from_path() {
        let root = Path::new("/defs");
        assert_eq!(
            analyzer_id(root, Path::new("/defs/android/crash.toml")).as_deref(),
            Some("android.crash")
        );
        assert_eq!(
            analyzer_id(root, Path::new("/defs/net.toml")).as_deref(),
            Some("net")
        );
        assert_eq!(analyzer_id(root, Path::new("/elsewhere/x.toml")), None);
    }

    #[test]
    fn test_builtins_present() {
        let registry = AnalyzerRegistry::with_builtins().unwrap();
        assert!(registry.get(CRASH_DETECTOR_ID).is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_discover_collects_errors_as_data() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("android")).unwrap();
        std::fs::write(dir.path().join("android/crash.toml"), VALID).unwrap();
        std::fs::write(dir.path().join("broken.toml"), "[analyzer\n").unwrap();
        std::fs::write(dir.path().join("notes.md"), "ignored").unwrap();

        let (registry, report) = AnalyzerRegistry::load(Some(dir.path())).unwrap();
        assert_eq!(report.loaded, vec!["android.crash"]);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].path.ends_with("broken.toml"));
        assert!(registry.get("android.crash").is_some());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_duplicate_id_is_reported() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("builtin")).unwrap();
        std::fs::write(dir.path().join("builtin/crash_detector.toml"), VALID).unwrap();

        let (registry, report) = AnalyzerRegistry::load(Some(dir.path())).unwrap();
        assert!(report.loaded.is_empty());
        assert!(report.errors[0].message.contains("duplicate analyzer id"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_missing_dir_loads_nothing() {
        let dir = tempdir().unwrap();
        let (_registry, report) = AnalyzerRegistry::load(Some(&dir.path().join("none"))).unwrap();
        assert_eq!(report, RegistryReport::default());
    }

    #[test]
    fn test_register_code_analyzer() {
        let mut registry = AnalyzerRegistry::new();
        registry.register(Arc::new(Custom)).unwrap();
        let err = registry.register(Arc::new(Custom)).unwrap_err();
        assert!(matches!(err, DefinitionError::DuplicateId { .. }));
        assert_eq!(registry.ids(), vec!["custom.code"]);
        assert_eq!(registry.list()[0].name, "Custom");
    }
}
