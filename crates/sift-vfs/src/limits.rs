//! Archive expansion limits and the per-traversal budget that enforces them.

use crate::archive::MemberInfo;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default maximum uncompressed size of a single member (512 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 512 * 1024 * 1024;

/// Default maximum cumulative uncompressed size per traversal (2 GiB).
pub const DEFAULT_MAX_TOTAL_SIZE: u64 = 2 * 1024 * 1024 * 1024;

/// Default maximum uncompressed/compressed ratio. Plain text logs sit well
/// below this; zip bombs sit far above it.
pub const DEFAULT_MAX_COMPRESSION_RATIO: u64 = 100;

/// Default maximum archive nesting depth.
pub const DEFAULT_MAX_DEPTH: usize = 3;

/// Default maximum number of members admitted per traversal.
pub const DEFAULT_MAX_FILES: usize = 10_000;

/// Limits applied to every archive member before any of its bytes are read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveSecurityLimits {
    pub max_file_size: u64,
    pub max_total_size: u64,
    pub max_compression_ratio: u64,
    pub max_depth: usize,
    pub max_files: usize,
}

impl Default for ArchiveSecurityLimits {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_total_size: DEFAULT_MAX_TOTAL_SIZE,
            max_compression_ratio: DEFAULT_MAX_COMPRESSION_RATIO,
            max_depth: DEFAULT_MAX_DEPTH,
            max_files: DEFAULT_MAX_FILES,
        }
    }
}

impl ArchiveSecurityLimits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    pub fn with_max_total_size(mut self, bytes: u64) -> Self {
        self.max_total_size = bytes;
        self
    }

    pub fn with_max_compression_ratio(mut self, ratio: u64) -> Self {
        self.max_compression_ratio = ratio;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_max_files(mut self, files: usize) -> Self {
        self.max_files = files;
        self
    }

    /// Start a fresh budget for one traversal or one read.
    pub fn budget(&self) -> TraversalBudget {
        TraversalBudget::new(self.clone())
    }

    /// Semantic checks for configuration loading.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_file_size == 0 {
            return Err("archive.max_file_size must be greater than zero".into());
        }
        if self.max_total_size < self.max_file_size {
            return Err("archive.max_total_size must be >= archive.max_file_size".into());
        }
        if self.max_compression_ratio == 0 {
            return Err("archive.max_compression_ratio must be at least 1".into());
        }
        if self.max_depth == 0 {
            return Err("archive.max_depth must be at least 1".into());
        }
        if self.max_files == 0 {
            return Err("archive.max_files must be greater than zero".into());
        }
        Ok(())
    }
}

/// Why a member was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SecurityRejection {
    DepthExceeded { depth: usize, max: usize },
    TooManyFiles { max: usize },
    FileTooLarge { size: u64, max: u64 },
    TotalSizeExceeded { total: u64, max: u64 },
    CompressionRatio { ratio: u64, max: u64 },
    /// The member streamed more bytes than its header declared.
    SizeMismatch { declared: u64 },
}

impl fmt::Display for SecurityRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecurityRejection::DepthExceeded { depth, max } => {
                write!(f, "nesting depth {depth} exceeds limit {max}")
            }
            SecurityRejection::TooManyFiles { max } => {
                write!(f, "member count limit {max} reached")
            }
            SecurityRejection::FileTooLarge { size, max } => {
                write!(f, "member size {size} bytes exceeds limit {max}")
            }
            SecurityRejection::TotalSizeExceeded { total, max } => {
                write!(f, "cumulative size {total} bytes exceeds limit {max}")
            }
            SecurityRejection::CompressionRatio { ratio, max } => {
                write!(f, "compression ratio {ratio}:1 exceeds limit {max}:1")
            }
            SecurityRejection::SizeMismatch { declared } => {
                write!(f, "member data runs past its declared size of {declared} bytes")
            }
        }
    }
}

impl std::error::Error for SecurityRejection {}

/// Running totals for one traversal. Admitted members count against the
/// budget; rejected ones do not.
#[derive(Debug, Clone)]
pub struct TraversalBudget {
    limits: ArchiveSecurityLimits,
    files: usize,
    total_size: u64,
}

impl TraversalBudget {
    pub fn new(limits: ArchiveSecurityLimits) -> Self {
        Self {
            limits,
            files: 0,
            total_size: 0,
        }
    }

    pub fn limits(&self) -> &ArchiveSecurityLimits {
        &self.limits
    }

    pub fn files(&self) -> usize {
        self.files
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Check a member whose containing archive sits at nesting `depth` (0 for
    /// an archive on disk). Checks run in a fixed order and the first failure
    /// wins.
    pub fn admit(&mut self, member: &MemberInfo, depth: usize) -> Result<(), SecurityRejection> {
        let limits = &self.limits;

        if depth >= limits.max_depth {
            return Err(SecurityRejection::DepthExceeded {
                depth,
                max: limits.max_depth,
            });
        }
        if self.files >= limits.max_files {
            return Err(SecurityRejection::TooManyFiles {
                max: limits.max_files,
            });
        }
        if member.size > limits.max_file_size {
            return Err(SecurityRejection::FileTooLarge {
                size: member.size,
                max: limits.max_file_size,
            });
        }
        let total = self.total_size.saturating_add(member.size);
        if total > limits.max_total_size {
            return Err(SecurityRejection::TotalSizeExceeded {
                total,
                max: limits.max_total_size,
            });
        }
        if let Some(ratio) = compression_ratio(member) {
            if ratio > limits.max_compression_ratio {
                return Err(SecurityRejection::CompressionRatio {
                    ratio,
                    max: limits.max_compression_ratio,
                });
            }
        }

        self.files += 1;
        self.total_size = total;
        Ok(())
    }
}

/// Integer ratio rounded up. Empty members have no ratio; a non-empty member
/// claiming zero compressed bytes is treated as unbounded.
fn compression_ratio(member: &MemberInfo) -> Option<u64> {
    if member.size == 0 {
        return None;
    }
    if member.compressed_size == 0 {
        return Some(u64::MAX);
    }
    Some(member.size.div_ceil(member.compressed_size))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(size: u64, compressed_size: u64) -> MemberInfo {
        MemberInfo {
            name: "m.txt".into(),
            sanitized: "m.txt".into(),
            size,
            compressed_size,
            index: 0,
            is_dir: false,
        }
    }

    #[test]
    fn test_default_limits_validate() {
        assert!(ArchiveSecurityLimits::default().validate().is_ok());
        assert!(ArchiveSecurityLimits::default()
            .with_max_compression_ratio(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_depth_checked_first() {
        let mut budget = ArchiveSecurityLimits::new().with_max_depth(2).budget();
        let err = budget.admit(&member(u64::MAX, 1), 2).unwrap_err();
        assert_eq!(err, SecurityRejection::DepthExceeded { depth: 2, max: 2 });
        assert!(budget.admit(&member(10, 10), 0).is_ok());
    }

    #[test]
    fn test_file_count_limit() {
        let mut budget = ArchiveSecurityLimits::new().with_max_files(2).budget();
        assert!(budget.admit(&member(1, 1), 0).is_ok());
        assert!(budget.admit(&member(1, 1), 0).is_ok());
        assert_eq!(
            budget.admit(&member(1, 1), 0),
            Err(SecurityRejection::TooManyFiles { max: 2 })
        );
    }

    #[test]
    fn test_size_limits() {
        let mut budget = ArchiveSecurityLimits::new()
            .with_max_file_size(100)
            .with_max_total_size(150)
            .budget();
        assert!(matches!(
            budget.admit(&member(101, 101), 0),
            Err(SecurityRejection::FileTooLarge { .. })
        ));
        assert!(budget.admit(&member(100, 100), 0).is_ok());
        assert!(matches!(
            budget.admit(&member(60, 60), 0),
            Err(SecurityRejection::TotalSizeExceeded { total: 160, max: 150 })
        ));
        // rejected members do not consume budget
        assert_eq!(budget.total_size(), 100);
        assert_eq!(budget.files(), 0);
    }

    #[test]
    fn test_compression_ratio() {
        let mut budget = ArchiveSecurityLimits::new()
            .with_max_compression_ratio(10)
            .budget();
        assert!(budget.admit(&member(100, 10), 0).is_ok());
        assert!(matches!(
            budget.admit(&member(1_000_000, 1_000), 0),
            Err(SecurityRejection::CompressionRatio { ratio: 1000, max: 10 })
        ));
        assert!(matches!(
            budget.admit(&member(5, 0), 0),
            Err(SecurityRejection::CompressionRatio { .. })
        ));
        assert!(budget.admit(&member(0, 0), 0).is_ok());
    }

    #[test]
    fn test_rejection_display() {
        let msg = SecurityRejection::CompressionRatio { ratio: 500, max: 100 }.to_string();
        assert!(msg.contains("500:1"));
    }
}
