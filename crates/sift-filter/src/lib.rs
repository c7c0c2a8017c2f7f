//! Pattern filter engine for logsift.
//!
//! Given a set of input paths and a [`LineFilterConfig`], the engine narrows
//! the inputs to the files worth scanning, then streams every file through
//! one of three reading strategies:
//!
//! - **line**: buffered line reads, regex per line
//! - **chunk**: fixed-size byte chunks reassembled into lines
//! - **ripgrep**: an external `rg` subprocess, falling back to line mode
//!
//! All three produce the same matches for the same input. Results are
//! grouped by source path in a [`FilterResult`].

pub mod engine;
pub mod error;
pub mod narrow;
pub mod pattern;
pub mod result;
pub mod ripgrep;
pub mod strategy;

pub use engine::{EngineConfig, FilterEngine, NoopObserver, ScanObserver, ScanScope, ScanUpdate};
pub use error::{FilterError, Result};
pub use narrow::{FileFilterConfig, FileNarrower, Narrowed};
pub use pattern::{LineFilterConfig, PatternFlags, ReadingMode, DEFAULT_CHUNK_SIZE};
pub use result::{ExecutionMethod, FilterResult, PathMatches};
pub use ripgrep::{RipgrepConfig, RipgrepError, RipgrepRunner};
