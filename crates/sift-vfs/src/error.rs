//! VFS error types.

use crate::limits::SecurityRejection;
use crate::read::size_rejection;
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use zip::result::ZipError;

/// Result type for VFS operations.
pub type Result<T> = std::result::Result<T, VfsError>;

/// Errors surfaced by the virtual file system. Paths are rendered in the
/// virtual wire format so archive members stay identifiable in logs.
#[derive(Error, Debug)]
pub enum VfsError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("path not found: {path}")]
    NotFound { path: String },

    #[error("member {member} not found in {container}")]
    MemberNotFound { container: String, member: String },

    #[error("malformed archive {path}: {source}")]
    MalformedArchive {
        path: String,
        #[source]
        source: ZipError,
    },

    #[error("member {path} rejected: {reason}")]
    Rejected {
        path: String,
        reason: SecurityRejection,
    },
}

impl VfsError {
    pub(crate) fn io(path: impl ToString, source: io::Error) -> Self {
        if let Some(reason) = size_rejection(&source) {
            return VfsError::Rejected {
                path: path.to_string(),
                reason: reason.clone(),
            };
        }
        if source.kind() == io::ErrorKind::NotFound {
            VfsError::NotFound {
                path: path.to_string(),
            }
        } else {
            VfsError::Io {
                path: path.to_string(),
                source,
            }
        }
    }

    pub(crate) fn zip(path: impl ToString, source: ZipError) -> Self {
        match source {
            ZipError::Io(err) => VfsError::io(path, err),
            other => VfsError::MalformedArchive {
                path: path.to_string(),
                source: other,
            },
        }
    }

    /// True for missing plain files and missing archive members.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            VfsError::NotFound { .. } | VfsError::MemberNotFound { .. }
        )
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, VfsError::Rejected { .. })
    }
}

impl From<VfsError> for sift_common::Error {
    fn from(err: VfsError) -> Self {
        match err {
            VfsError::Io { path, source } if source.kind() == io::ErrorKind::PermissionDenied => {
                sift_common::Error::PermissionDenied {
                    path: PathBuf::from(path),
                }
            }
            VfsError::Io { source, .. } => sift_common::Error::Io(source),
            VfsError::NotFound { path } => sift_common::Error::NotFound {
                path: PathBuf::from(path),
            },
            VfsError::MemberNotFound { container, member } => sift_common::Error::NotFound {
                path: PathBuf::from(format!("{container}{}{member}", crate::SEPARATOR)),
            },
            VfsError::MalformedArchive { path, source } => {
                sift_common::Error::MalformedArchive(format!("{path}: {source}"))
            }
            VfsError::Rejected { path, reason } => sift_common::Error::ArchiveRejected {
                member: path,
                reason: reason.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_not_found_maps_to_not_found() {
        let err = VfsError::io("/missing.log", io::Error::from(io::ErrorKind::NotFound));
        assert!(err.is_not_found());
        let common: sift_common::Error = err.into();
        assert_eq!(common.code(), 31);
    }

    #[test]
    fn test_rejection_maps_to_security_category() {
        let err = VfsError::Rejected {
            path: "bomb.zip::zeros.bin".into(),
            reason: SecurityRejection::CompressionRatio { ratio: 900, max: 100 },
        };
        assert!(err.is_rejected());
        let common: sift_common::Error = err.into();
        assert_eq!(common.category(), sift_common::ErrorCategory::Security);
    }

    #[test]
    fn test_member_not_found_keeps_virtual_path() {
        let err = VfsError::MemberNotFound {
            container: "logs.zip".into(),
            member: "gone.txt".into(),
        };
        let common: sift_common::Error = err.into();
        assert!(common.to_string().contains("logs.zip::gone.txt"));
    }

    #[test]
    fn test_size_overrun_io_error_becomes_rejection() {
        let source = io::Error::new(
            io::ErrorKind::InvalidData,
            SecurityRejection::SizeMismatch { declared: 10 },
        );
        let err = VfsError::io("logs.zip::big.txt", source);
        assert!(err.is_rejected());
        assert!(err.to_string().contains("declared size of 10 bytes"));
    }
}
