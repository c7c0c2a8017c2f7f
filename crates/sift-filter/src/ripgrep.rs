//! External `rg` runner.
//!
//! Runs ripgrep against a single file with an argument vector (never a
//! shell), a cleared environment and a timeout. Stdout is consumed line by
//! line on a reader thread so cancellation and the deadline are observed
//! while the tool is still producing output.

use crate::pattern::PatternFlags;
use serde::{Deserialize, Serialize};
use sift_vfs::decode_line;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default timeout per file in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Cap on captured stderr.
const MAX_STDERR_BYTES: u64 = 64 * 1024;

/// How often the runner wakes to check cancellation and the deadline.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum RipgrepError {
    #[error("ripgrep binary not found")]
    NotFound,

    #[error("failed to spawn ripgrep: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("ripgrep exited with status {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },

    #[error("ripgrep timed out after {0:?}")]
    Timeout(Duration),

    #[error("ripgrep cancelled")]
    Cancelled,

    #[error("invalid ripgrep argument: {0}")]
    InvalidArgument(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RipgrepConfig {
    /// Explicit binary. `None` searches `PATH` for `rg`.
    pub binary: Option<PathBuf>,
    pub timeout_secs: u64,
}

impl Default for RipgrepConfig {
    fn default() -> Self {
        Self {
            binary: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Resolved ripgrep runner. Construct once and share.
#[derive(Debug, Clone)]
pub struct RipgrepRunner {
    binary: Option<PathBuf>,
    timeout: Duration,
}

impl RipgrepRunner {
    pub fn new(config: &RipgrepConfig) -> Self {
        let binary = match &config.binary {
            Some(path) if path.is_file() => Some(path.clone()),
            Some(path) => {
                warn!(binary = %path.display(), "configured ripgrep binary missing");
                None
            }
            None => which::which("rg").ok(),
        };
        match &binary {
            Some(path) => debug!(binary = %path.display(), "ripgrep available"),
            None => info!("ripgrep not found, ripgrep mode will fall back to line reads"),
        }
        Self {
            binary,
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
        }
    }

    /// A runner that never finds the tool.
    pub fn unavailable() -> Self {
        Self {
            binary: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn is_available(&self) -> bool {
        self.binary.is_some()
    }

    pub fn binary(&self) -> Option<&Path> {
        self.binary.as_deref()
    }

    /// Argument vector for one search.
    pub fn args(pattern: &str, flags: &PatternFlags, file: &Path) -> Vec<String> {
        let mut args = vec![
            "--no-config".to_string(),
            "--no-heading".to_string(),
            "--no-filename".to_string(),
            "--no-line-number".to_string(),
            "--color".to_string(),
            "never".to_string(),
            "--text".to_string(),
        ];
        if flags.ignore_case {
            args.push("--ignore-case".to_string());
        }
        // `--multiline` would let matches span lines; inline flags keep
        // rg on the same per-line semantics as the compiled regex.
        let mut inline = String::new();
        if flags.multi_line {
            inline.push('m');
        }
        if flags.dot_matches_new_line {
            inline.push('s');
        }
        args.push("--regexp".to_string());
        if inline.is_empty() {
            args.push(pattern.to_string());
        } else {
            args.push(format!("(?{inline}){pattern}"));
        }
        args.push("--".to_string());
        args.push(file.display().to_string());
        args
    }

    /// Human-readable command line, recorded alongside results.
    pub fn command_line(&self, pattern: &str, flags: &PatternFlags, file: &Path) -> String {
        let binary = self
            .binary
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "rg".to_string());
        let args: Vec<String> = Self::args(pattern, flags, file)
            .into_iter()
            .map(|a| {
                if a.contains(char::is_whitespace) || a.is_empty() {
                    format!("{a:?}")
                } else {
                    a
                }
            })
            .collect();
        format!("{binary} {}", args.join(" "))
    }

    /// Search `file`, handing each matching line to `on_line`.
    ///
    /// Exit status 0 means matches, 1 means none; anything else is a failure.
    #[instrument(skip(self, flags, cancel, on_line), fields(file = %file.display()))]
    pub fn search(
        &self,
        pattern: &str,
        flags: &PatternFlags,
        file: &Path,
        cancel: &CancellationToken,
        on_line: &mut dyn FnMut(String),
    ) -> Result<(), RipgrepError> {
        let binary = self.binary.as_deref().ok_or(RipgrepError::NotFound)?;
        if pattern.contains('\0') {
            return Err(RipgrepError::InvalidArgument("pattern contains NUL".into()));
        }

        let mut command = Command::new(binary);
        command.args(Self::args(pattern, flags, file));
        command.env_clear();
        if let Ok(path) = std::env::var("PATH") {
            command.env("PATH", path);
        }

        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(RipgrepError::Spawn)?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (tx, rx) = mpsc::channel::<String>();
        let reader = thread::spawn(move || {
            let Some(stdout) = stdout else { return };
            let mut reader = BufReader::new(stdout);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        if tx.send(decode_line(&buf)).is_err() {
                            break;
                        }
                    }
                }
            }
        });
        let stderr_reader = thread::spawn(move || {
            let mut captured = Vec::new();
            if let Some(stderr) = stderr {
                let _ = stderr.take(MAX_STDERR_BYTES).read_to_end(&mut captured);
            }
            String::from_utf8_lossy(&captured).trim().to_string()
        });

        let deadline = Instant::now() + self.timeout;
        let mut matched = 0usize;
        loop {
            if cancel.is_cancelled() {
                terminate(&mut child);
                let _ = reader.join();
                debug!(matched, "ripgrep cancelled");
                return Err(RipgrepError::Cancelled);
            }
            if Instant::now() >= deadline {
                terminate(&mut child);
                let _ = reader.join();
                warn!(timeout = ?self.timeout, "ripgrep timed out");
                return Err(RipgrepError::Timeout(self.timeout));
            }
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(line) => {
                    matched += 1;
                    on_line(line);
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }

        let _ = reader.join();
        let status = child.wait().map_err(RipgrepError::Spawn)?;
        let stderr = stderr_reader.join().unwrap_or_default();

        match status.code() {
            Some(0) | Some(1) => {
                debug!(matched, code = ?status.code(), "ripgrep finished");
                Ok(())
            }
            code => Err(RipgrepError::Failed { code, stderr }),
        }
    }
}

fn terminate(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}
