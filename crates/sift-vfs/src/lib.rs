//! Virtual file access for logsift.
//!
//! This crate lets the scan engine treat plain files and zip archive members
//! the same way. A member is addressed by a virtual path:
//!
//! ```text
//! logs/bugreport.zip::FS/data/anr/anr_2026-01-15.txt
//! outer.zip::nested.zip::file.txt
//! ```
//!
//! Every archive member touched, whether while listing or while reading,
//! passes the checks in [`ArchiveSecurityLimits`] first. A rejected member is
//! skipped and the surrounding traversal continues.
//!
//! # Example
//!
//! ```no_run
//! use sift_vfs::{Vfs, VirtualPath};
//! use std::path::Path;
//!
//! let vfs = Vfs::default();
//! for path in vfs.list_directory(Path::new("/var/log/device"), true).unwrap() {
//!     let lines = vfs.read_lines(&path, |lines| Ok(lines.count())).unwrap();
//!     println!("{path}: {lines} lines");
//! }
//! let member = VirtualPath::parse("bugreport.zip::dumpstate.txt");
//! assert!(member.is_archived());
//! ```

pub mod archive;
pub mod error;
pub mod fs;
pub mod limits;
pub mod path;
pub mod read;
pub mod sanitize;

pub use archive::{is_archive_name, is_system_entry, MemberInfo};
pub use error::{Result, VfsError};
pub use fs::Vfs;
pub use limits::{ArchiveSecurityLimits, SecurityRejection, TraversalBudget};
pub use path::{VirtualPath, SEPARATOR};
pub use read::{decode_line, size_rejection, ByteChunks, DeclaredSize, LossyLines};
pub use sanitize::sanitize_member_name;
