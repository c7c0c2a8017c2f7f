//! Analysis task identity.
//!
//! Task ids are opaque to consumers but carry a creation timestamp to make
//! logs and temp directories easy to correlate by eye.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix shared by every generated task id.
const TASK_ID_PREFIX: &str = "sift";

/// Length of the random base32 suffix.
const SUFFIX_LEN: usize = 8;

/// Identifier of one analysis task.
///
/// Format: `sift-YYYYMMDD-HHMMSS-XXXXXXXX`
/// Example: `sift-20260115-143022-a7xqk2mz`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Generate a new task id.
    pub fn new() -> Self {
        let now = chrono::Utc::now();
        TaskId(format!(
            "{}-{}-{}-{}",
            TASK_ID_PREFIX,
            now.format("%Y%m%d"),
            now.format("%H%M%S"),
            generate_base32_suffix()
        ))
    }

    /// Parse an existing task id string.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.split('-');
        let prefix = parts.next()?;
        let date = parts.next()?;
        let time = parts.next()?;
        let suffix = parts.next()?;
        if parts.next().is_some() || prefix != TASK_ID_PREFIX {
            return None;
        }
        if date.len() != 8 || !date.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        if time.len() != 6 || !time.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        if suffix.len() != SUFFIX_LEN || !suffix.chars().all(|c| matches!(c, 'a'..='z' | '2'..='7')) {
            return None;
        }
        Some(TaskId(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for TaskId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn generate_base32_suffix() -> String {
    let uuid = uuid::Uuid::new_v4();
    let bytes = uuid.as_bytes();
    let mut value: u64 = 0;
    for b in &bytes[..5] {
        value = (value << 8) | u64::from(*b);
    }
    let alphabet = b"abcdefghijklmnopqrstuvwxyz234567";
    let mut out = String::with_capacity(SUFFIX_LEN);
    for i in (0..SUFFIX_LEN).rev() {
        let idx = ((value >> (i * 5)) & 0x1F) as usize;
        out.push(alphabet[idx] as char);
    }
    out
}
