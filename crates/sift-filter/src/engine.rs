//! The per-file scan loop.
//!
//! Files are scanned one at a time, in input order. Each file runs on tokio's
//! blocking pool; progress ticks travel back over a channel and are forwarded
//! to the [`ScanObserver`] while the worker is still running. Cancellation is
//! checked before every file and every `check_interval` lines inside it.

use crate::error::{FilterError, Result};
use crate::pattern::{LineFilterConfig, ReadingMode};
use crate::result::{ExecutionMethod, FilterResult};
use crate::ripgrep::{RipgrepError, RipgrepRunner};
use crate::strategy::{scan_chunks, scan_lines, FileScan};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sift_vfs::{Vfs, VirtualPath};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Default number of lines between cancellation checks and progress ticks.
pub const DEFAULT_CHECK_INTERVAL: u64 = 10_000;

/// Default number of matching lines previewed per file in progress updates.
pub const DEFAULT_PREVIEW_LINES: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub check_interval: u64,
    pub preview_lines: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            check_interval: DEFAULT_CHECK_INTERVAL,
            preview_lines: DEFAULT_PREVIEW_LINES,
        }
    }
}

/// Scan state changes reported while a filter runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanUpdate {
    FileOpen {
        index: usize,
        total: usize,
        path: VirtualPath,
        size_bytes: u64,
    },
    /// Lines read so far in the current file. For ripgrep, matches so far.
    Progress {
        path: VirtualPath,
        lines_processed: u64,
    },
    PathResult {
        index: usize,
        total: usize,
        path: VirtualPath,
        matches: usize,
        method: ExecutionMethod,
        preview: Vec<String>,
    },
}

/// Receives [`ScanUpdate`]s in order. Awaiting lets a bounded sink apply
/// backpressure to the scan.
#[async_trait]
pub trait ScanObserver: Send + Sync {
    async fn on_update(&self, update: ScanUpdate);
}

/// Observer that drops every update.
pub struct NoopObserver;

#[async_trait]
impl ScanObserver for NoopObserver {
    async fn on_update(&self, _update: ScanUpdate) {}
}

/// Per-scan collaborators: the cancellation token, the task's scratch
/// directory and the progress observer.
pub struct ScanScope<'a> {
    pub cancel: CancellationToken,
    /// Where archive members are extracted for ripgrep.
    pub temp_dir: Option<PathBuf>,
    pub observer: &'a dyn ScanObserver,
}

impl<'a> ScanScope<'a> {
    pub fn new(cancel: CancellationToken, observer: &'a dyn ScanObserver) -> Self {
        Self {
            cancel,
            temp_dir: None,
            observer,
        }
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct FilterEngine {
    vfs: Vfs,
    ripgrep: Arc<RipgrepRunner>,
    config: EngineConfig,
}

impl FilterEngine {
    pub fn new(vfs: Vfs, ripgrep: RipgrepRunner, config: EngineConfig) -> Self {
        Self {
            vfs,
            ripgrep: Arc::new(ripgrep),
            config,
        }
    }

    pub fn vfs(&self) -> &Vfs {
        &self.vfs
    }

    pub fn ripgrep(&self) -> &RipgrepRunner {
        &self.ripgrep
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run `filter` over `paths` into a fresh result.
    pub async fn filter(
        &self,
        filter: &LineFilterConfig,
        paths: &[VirtualPath],
        scope: &ScanScope<'_>,
    ) -> Result<FilterResult> {
        let mut result = FilterResult::new();
        self.filter_into(filter, paths, &mut result, scope).await?;
        Ok(result)
    }

    /// Run `filter` over `paths`, recording into `result` as each file
    /// finishes. On cancellation `result` keeps every completed file and
    /// nothing from the interrupted one.
    #[instrument(skip_all, fields(pattern = %filter.pattern, mode = %filter.mode, files = paths.len()))]
    pub async fn filter_into(
        &self,
        filter: &LineFilterConfig,
        paths: &[VirtualPath],
        result: &mut FilterResult,
        scope: &ScanScope<'_>,
    ) -> Result<()> {
        filter.validate()?;
        let regex = filter.compile()?;
        let total = paths.len();

        for (index, path) in paths.iter().enumerate() {
            if scope.cancel.is_cancelled() {
                debug!(processed = index, total, "scan cancelled");
                return Err(FilterError::Cancelled);
            }

            let size_bytes = match self.file_size(path).await {
                Ok(size) => size,
                Err(e) => {
                    warn!(path = %path, error = %e, "skipping unreadable file");
                    continue;
                }
            };
            scope
                .observer
                .on_update(ScanUpdate::FileOpen {
                    index,
                    total,
                    path: path.clone(),
                    size_bytes,
                })
                .await;

            match self.scan_file(filter, &regex, path, scope).await {
                Ok(FileOutcome::Done {
                    matches,
                    command,
                    method,
                }) => {
                    let preview = matches
                        .iter()
                        .take(self.config.preview_lines)
                        .cloned()
                        .collect();
                    let count = matches.len();
                    result.record(path.clone(), matches, command, method);
                    scope
                        .observer
                        .on_update(ScanUpdate::PathResult {
                            index,
                            total,
                            path: path.clone(),
                            matches: count,
                            method,
                            preview,
                        })
                        .await;
                }
                Ok(FileOutcome::Cancelled) | Err(FilterError::Cancelled) => {
                    debug!(path = %path, processed = index, total, "scan cancelled mid-file");
                    return Err(FilterError::Cancelled);
                }
                Err(e) => {
                    warn!(path = %path, error = %e, "skipping file after scan error");
                }
            }
        }
        Ok(())
    }

    async fn file_size(&self, path: &VirtualPath) -> Result<u64> {
        let vfs = self.vfs.clone();
        let path = path.clone();
        tokio::task::spawn_blocking(move || vfs.file_size(&path))
            .await
            .map_err(|e| FilterError::Worker(e.to_string()))?
            .map_err(FilterError::from)
    }

    async fn scan_file(
        &self,
        filter: &LineFilterConfig,
        regex: &Regex,
        path: &VirtualPath,
        scope: &ScanScope<'_>,
    ) -> Result<FileOutcome> {
        let job = FileJob {
            vfs: self.vfs.clone(),
            ripgrep: Arc::clone(&self.ripgrep),
            filter: filter.clone(),
            regex: regex.clone(),
            path: path.clone(),
            cancel: scope.cancel.clone(),
            temp_dir: scope.temp_dir.clone(),
            check_interval: self.config.check_interval,
        };

        let (tx, mut rx) = mpsc::unbounded_channel::<u64>();
        let mut handle = tokio::task::spawn_blocking(move || {
            job.run(&mut |lines| {
                let _ = tx.send(lines);
            })
        });

        loop {
            tokio::select! {
                biased;
                joined = &mut handle => {
                    while let Ok(lines) = rx.try_recv() {
                        self.forward_progress(path, lines, scope).await;
                    }
                    return joined.map_err(|e| FilterError::Worker(e.to_string()))?;
                }
                Some(lines) = rx.recv() => {
                    self.forward_progress(path, lines, scope).await;
                }
            }
        }
    }

    async fn forward_progress(&self, path: &VirtualPath, lines: u64, scope: &ScanScope<'_>) {
        scope
            .observer
            .on_update(ScanUpdate::Progress {
                path: path.clone(),
                lines_processed: lines,
            })
            .await;
    }
}

enum FileOutcome {
    Done {
        matches: Vec<String>,
        command: String,
        method: ExecutionMethod,
    },
    Cancelled,
}

impl From<(FileScan, String, ExecutionMethod)> for FileOutcome {
    fn from((scan, command, method): (FileScan, String, ExecutionMethod)) -> Self {
        match scan {
            FileScan::Completed(out) => FileOutcome::Done {
                matches: out.matches,
                command,
                method,
            },
            FileScan::Cancelled => FileOutcome::Cancelled,
        }
    }
}

/// Everything one blocking worker needs, owned.
struct FileJob {
    vfs: Vfs,
    ripgrep: Arc<RipgrepRunner>,
    filter: LineFilterConfig,
    regex: Regex,
    path: VirtualPath,
    cancel: CancellationToken,
    temp_dir: Option<PathBuf>,
    check_interval: u64,
}

impl FileJob {
    fn run(self, on_tick: &mut dyn FnMut(u64)) -> Result<FileOutcome> {
        match self.filter.mode {
            ReadingMode::Line => {
                let scan = scan_lines(
                    &self.vfs,
                    &self.path,
                    &self.regex,
                    &self.cancel,
                    self.check_interval,
                    on_tick,
                )?;
                Ok((scan, "line".to_string(), ExecutionMethod::Line).into())
            }
            ReadingMode::Chunk => {
                let scan = scan_chunks(
                    &self.vfs,
                    &self.path,
                    &self.regex,
                    self.filter.chunk_size,
                    &self.cancel,
                    self.check_interval,
                    on_tick,
                )?;
                let command = format!("chunk(size={})", self.filter.chunk_size);
                Ok((scan, command, ExecutionMethod::Chunk).into())
            }
            ReadingMode::Ripgrep => self.run_ripgrep(on_tick),
        }
    }

    fn run_ripgrep(&self, on_tick: &mut dyn FnMut(u64)) -> Result<FileOutcome> {
        if !self.ripgrep.is_available() {
            return self.fallback(on_tick);
        }

        let (target, extracted) = match &self.path {
            VirtualPath::Plain(p) => (p.clone(), false),
            VirtualPath::Archived { container, member } => {
                let Some(dir) = &self.temp_dir else {
                    debug!(path = %self.path, "no task temp dir for extraction");
                    return self.fallback(on_tick);
                };
                match self.vfs.extract_member(container, member, dir) {
                    Ok(p) => (p, true),
                    Err(e) => {
                        warn!(path = %self.path, error = %e, "extraction for ripgrep failed");
                        return self.fallback(on_tick);
                    }
                }
            }
        };

        let command = self
            .ripgrep
            .command_line(&self.filter.pattern, &self.filter.flags, &target);
        let interval = self.check_interval.max(1);
        let mut matches = Vec::new();
        let outcome = self.ripgrep.search(
            &self.filter.pattern,
            &self.filter.flags,
            &target,
            &self.cancel,
            &mut |line| {
                matches.push(line);
                if matches.len() as u64 % interval == 0 {
                    on_tick(matches.len() as u64);
                }
            },
        );

        if extracted {
            if let Err(e) = std::fs::remove_file(&target) {
                debug!(file = %target.display(), error = %e, "failed to remove extracted member");
            }
        }

        match outcome {
            Ok(()) => Ok(FileOutcome::Done {
                matches,
                command,
                method: ExecutionMethod::Ripgrep,
            }),
            Err(RipgrepError::Cancelled) => Ok(FileOutcome::Cancelled),
            Err(e) => {
                warn!(path = %self.path, error = %e, "ripgrep failed, falling back to line mode");
                self.fallback(on_tick)
            }
        }
    }

    fn fallback(&self, on_tick: &mut dyn FnMut(u64)) -> Result<FileOutcome> {
        let scan = scan_lines(
            &self.vfs,
            &self.path,
            &self.regex,
            &self.cancel,
            self.check_interval,
            on_tick,
        )?;
        Ok((
            scan,
            "line (ripgrep fallback)".to_string(),
            ExecutionMethod::RipgrepFallback,
        )
            .into())
    }
}
