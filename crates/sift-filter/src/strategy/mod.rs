//! Synchronous reading strategies.
//!
//! Each strategy runs on a blocking worker thread, feeds decoded lines into a
//! [`LineScanner`] and reports progress through a tick callback. The scanner
//! polls the cancellation token every `check_interval` lines.

pub mod chunk;
pub mod line;

use regex::Regex;
use std::ops::ControlFlow;
use tokio_util::sync::CancellationToken;

pub use chunk::scan_chunks;
pub use line::scan_lines;

/// Result of scanning one file to the end.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOutput {
    pub matches: Vec<String>,
    pub lines_processed: u64,
}

/// How a single-file scan ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileScan {
    Completed(ScanOutput),
    Cancelled,
}

/// Shared per-line loop used by every strategy.
pub struct LineScanner<'a> {
    regex: &'a Regex,
    cancel: &'a CancellationToken,
    check_interval: u64,
    on_tick: &'a mut dyn FnMut(u64),
    output: ScanOutput,
}

impl<'a> LineScanner<'a> {
    pub fn new(
        regex: &'a Regex,
        cancel: &'a CancellationToken,
        check_interval: u64,
        on_tick: &'a mut dyn FnMut(u64),
    ) -> Self {
        Self {
            regex,
            cancel,
            check_interval: check_interval.max(1),
            on_tick,
            output: ScanOutput::default(),
        }
    }

    /// Match one line. Breaks once cancellation is observed.
    pub fn feed(&mut self, line: String) -> ControlFlow<()> {
        if self.regex.is_match(&line) {
            self.output.matches.push(line);
        }
        self.output.lines_processed += 1;

        if self.output.lines_processed % self.check_interval == 0 {
            if self.cancel.is_cancelled() {
                return ControlFlow::Break(());
            }
            (self.on_tick)(self.output.lines_processed);
        }
        ControlFlow::Continue(())
    }

    pub fn finish(self) -> FileScan {
        if self.cancel.is_cancelled() {
            return FileScan::Cancelled;
        }
        FileScan::Completed(self.output)
    }
}
