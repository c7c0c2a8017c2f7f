//! Filter engine errors.

use crate::ripgrep::RipgrepError;
use sift_vfs::VfsError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FilterError>;

#[derive(Error, Debug)]
pub enum FilterError {
    #[error("invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid filter: {0}")]
    InvalidConfig(String),

    #[error("scan cancelled")]
    Cancelled,

    #[error(transparent)]
    Vfs(#[from] VfsError),

    #[error(transparent)]
    Ripgrep(#[from] RipgrepError),

    #[error("scan worker failed: {0}")]
    Worker(String),
}

impl FilterError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FilterError::Cancelled)
    }
}

impl From<FilterError> for sift_common::Error {
    fn from(err: FilterError) -> Self {
        match err {
            FilterError::InvalidPattern { pattern, source } => {
                sift_common::Error::InvalidPattern(format!("{pattern:?}: {source}"))
            }
            FilterError::InvalidConfig(msg) => sift_common::Error::InvalidDefinition(msg),
            FilterError::Cancelled => sift_common::Error::Cancelled {
                task_id: String::new(),
            },
            FilterError::Vfs(e) => e.into(),
            FilterError::Ripgrep(e) => sift_common::Error::Subprocess(e.to_string()),
            FilterError::Worker(msg) => sift_common::Error::Scan(msg),
        }
    }
}
