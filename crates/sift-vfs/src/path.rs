//! Virtual path type.
//!
//! The `::` string form is the external wire format. Internally a virtual
//! path is parsed once into a tagged value so nested archives are never
//! re-split or re-escaped.

use crate::sanitize::sanitize_member_name;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Reserved token joining an archive container and a member path.
pub const SEPARATOR: &str = "::";

/// A file addressed directly on disk or as a member inside a (possibly
/// nested) archive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VirtualPath {
    /// Regular filesystem path.
    Plain(PathBuf),
    /// Member inside the archive addressed by `container`.
    Archived {
        container: Box<VirtualPath>,
        member: String,
    },
}

impl VirtualPath {
    /// Parse the wire format. Member segments are sanitized on the way in.
    pub fn parse(s: &str) -> Self {
        let mut segments = s.split(SEPARATOR);
        // split always yields at least one segment
        let mut path = VirtualPath::Plain(PathBuf::from(segments.next().unwrap_or_default()));
        for member in segments {
            path = path.join(member);
        }
        path
    }

    pub fn plain(path: impl Into<PathBuf>) -> Self {
        VirtualPath::Plain(path.into())
    }

    /// Address `member` inside the archive at `self`.
    pub fn join(&self, member: &str) -> Self {
        VirtualPath::Archived {
            container: Box::new(self.clone()),
            member: sanitize_member_name(member),
        }
    }

    pub fn is_archived(&self) -> bool {
        matches!(self, VirtualPath::Archived { .. })
    }

    /// Number of archive levels above this path (0 for a plain file).
    pub fn depth(&self) -> usize {
        match self {
            VirtualPath::Plain(_) => 0,
            VirtualPath::Archived { container, .. } => 1 + container.depth(),
        }
    }

    /// The on-disk file at the bottom of the nesting chain.
    pub fn root(&self) -> &Path {
        match self {
            VirtualPath::Plain(path) => path,
            VirtualPath::Archived { container, .. } => container.root(),
        }
    }

    pub fn container(&self) -> Option<&VirtualPath> {
        match self {
            VirtualPath::Plain(_) => None,
            VirtualPath::Archived { container, .. } => Some(container),
        }
    }

    pub fn member(&self) -> Option<&str> {
        match self {
            VirtualPath::Plain(_) => None,
            VirtualPath::Archived { member, .. } => Some(member),
        }
    }

    /// Base name of the file this path points at.
    pub fn file_name(&self) -> Option<&str> {
        match self {
            VirtualPath::Plain(path) => path.file_name().and_then(|n| n.to_str()),
            VirtualPath::Archived { member, .. } => {
                member.rsplit('/').next().filter(|n| !n.is_empty())
            }
        }
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VirtualPath::Plain(path) => write!(f, "{}", path.display()),
            VirtualPath::Archived { container, member } => {
                write!(f, "{}{}{}", container, SEPARATOR, member)
            }
        }
    }
}

impl FromStr for VirtualPath {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(VirtualPath::parse(s))
    }
}

impl From<PathBuf> for VirtualPath {
    fn from(path: PathBuf) -> Self {
        VirtualPath::parse(&path.to_string_lossy())
    }
}

impl From<&Path> for VirtualPath {
    fn from(path: &Path) -> Self {
        VirtualPath::parse(&path.to_string_lossy())
    }
}

impl Serialize for VirtualPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VirtualPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(VirtualPath::parse(&s))
    }
}
