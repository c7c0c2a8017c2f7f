//! The virtual file system.
//!
//! Resolves plain paths, directories and `container::member` paths to byte
//! streams. Archives are opened read-only for the duration of one call and
//! dropped before it returns.

use crate::archive::{is_archive_name, ArchiveReader, ArchiveSource, MemberInfo};
use crate::error::{Result, VfsError};
use crate::limits::{ArchiveSecurityLimits, TraversalBudget};
use crate::path::{VirtualPath, SEPARATOR};
use crate::read::{ByteChunks, LossyLines};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Virtual file system bound to one set of archive limits.
#[derive(Debug, Clone, Default)]
pub struct Vfs {
    limits: ArchiveSecurityLimits,
}

impl Vfs {
    pub fn new(limits: ArchiveSecurityLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &ArchiveSecurityLimits {
        &self.limits
    }

    /// Plain paths must exist and be readable. Virtual paths need a
    /// well-formed container chain; the member itself is checked at read time.
    pub fn validate(&self, path: &VirtualPath) -> bool {
        match path {
            VirtualPath::Plain(p) => {
                if p.is_dir() {
                    fs::read_dir(p).is_ok()
                } else {
                    File::open(p).is_ok()
                }
            }
            VirtualPath::Archived { container, .. } => match self.open_archive(container) {
                Ok(_) => true,
                Err(e) => {
                    debug!(path = %path, error = %e, "virtual path failed validation");
                    false
                }
            },
        }
    }

    /// List files under `root`, expanding every archive (on disk or nested)
    /// into its members. Results are de-duplicated in walk order.
    pub fn list_directory(&self, root: &Path, recursive: bool) -> Result<Vec<VirtualPath>> {
        let mut listing = Listing::default();
        let mut budget = self.limits.budget();

        if root.is_file() {
            self.list_file(root, &mut budget, &mut listing);
            return Ok(listing.paths);
        }
        if !root.is_dir() {
            return Err(VfsError::NotFound {
                path: root.display().to_string(),
            });
        }

        let mut walker = WalkDir::new(root).sort_by_file_name();
        if !recursive {
            walker = walker.max_depth(1);
        }
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(root = %root.display(), error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if entry.file_type().is_file() {
                self.list_file(entry.path(), &mut budget, &mut listing);
            }
        }

        debug!(
            root = %root.display(),
            files = listing.paths.len(),
            archive_members = budget.files(),
            "directory listed"
        );
        Ok(listing.paths)
    }

    fn list_file(&self, path: &Path, budget: &mut TraversalBudget, listing: &mut Listing) {
        let is_archive = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(is_archive_name);
        if !is_archive {
            listing.push(VirtualPath::plain(path));
            return;
        }
        match ArchiveReader::open(path) {
            Ok(mut reader) => self.expand(&mut reader, 0, budget, listing),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable archive"),
        }
    }

    fn expand(
        &self,
        reader: &mut ArchiveReader<ArchiveSource>,
        depth: usize,
        budget: &mut TraversalBudget,
        listing: &mut Listing,
    ) {
        let members: Vec<MemberInfo> = reader
            .members()
            .iter()
            .filter(|m| m.is_listable())
            .cloned()
            .collect();

        for member in members {
            let path = reader.label().join(&member.sanitized);
            if let Err(reason) = budget.admit(&member, depth) {
                warn!(member = %path, %reason, "archive member rejected");
                continue;
            }
            if !is_archive_name(&member.sanitized) {
                listing.push(path);
                continue;
            }
            if depth + 1 >= self.limits.max_depth {
                warn!(member = %path, max_depth = self.limits.max_depth, "nested archive too deep, skipping");
                continue;
            }
            let nested = reader
                .read_member(member.index, self.limits.max_file_size)
                .and_then(|bytes| ArchiveReader::from_bytes(path.clone(), bytes));
            match nested {
                Ok(mut nested) => self.expand(&mut nested, depth + 1, budget, listing),
                Err(e) => warn!(member = %path, error = %e, "skipping unreadable nested archive"),
            }
        }
    }

    /// Open the archive addressed by `container`, descending through any
    /// nesting.
    pub fn open_archive(&self, container: &VirtualPath) -> Result<ArchiveReader<ArchiveSource>> {
        self.open_archive_with(container, &mut self.limits.budget())
    }

    fn open_archive_with(
        &self,
        container: &VirtualPath,
        budget: &mut TraversalBudget,
    ) -> Result<ArchiveReader<ArchiveSource>> {
        match container {
            VirtualPath::Plain(path) => ArchiveReader::open(path),
            VirtualPath::Archived {
                container: parent,
                member,
            } => {
                let mut reader = self.open_archive_with(parent, budget)?;
                let info = admit_member(&reader, parent, member, budget)?;
                let bytes = reader.read_member(info.index, self.limits.max_file_size)?;
                ArchiveReader::from_bytes(container.clone(), bytes)
            }
        }
    }

    /// Run `f` over the raw byte stream behind `path`.
    pub fn with_reader<T, F>(&self, path: &VirtualPath, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn Read) -> io::Result<T>,
    {
        match path {
            VirtualPath::Plain(p) => {
                let mut file = File::open(p).map_err(|e| VfsError::io(path, e))?;
                f(&mut file).map_err(|e| VfsError::io(path, e))
            }
            VirtualPath::Archived { container, member } => {
                let mut budget = self.limits.budget();
                let mut archive = self.open_archive_with(container, &mut budget)?;
                let info = admit_member(&archive, container, member, &mut budget)?;
                // Capped at the declared size the budget admitted.
                let mut reader = archive.open_member(info.index)?;
                f(&mut reader).map_err(|e| VfsError::io(path, e))
            }
        }
    }

    /// Stream decoded lines. Invalid UTF-8 is replaced, never fatal.
    pub fn read_lines<T, F>(&self, path: &VirtualPath, f: F) -> Result<T>
    where
        F: FnOnce(LossyLines<BufReader<&mut dyn Read>>) -> io::Result<T>,
    {
        self.with_reader(path, |reader| f(LossyLines::new(BufReader::new(reader))))
    }

    /// Stream fixed-size byte chunks. Chunks are raw bytes so a multi-byte
    /// character split across a boundary is reassembled by the consumer.
    pub fn read_chunks<T, F>(&self, path: &VirtualPath, size: usize, f: F) -> Result<T>
    where
        F: FnOnce(ByteChunks<&mut dyn Read>) -> io::Result<T>,
    {
        self.with_reader(path, |reader| f(ByteChunks::new(reader, size)))
    }

    /// Uncompressed size in bytes.
    pub fn file_size(&self, path: &VirtualPath) -> Result<u64> {
        match path {
            VirtualPath::Plain(p) => fs::metadata(p)
                .map(|m| m.len())
                .map_err(|e| VfsError::io(path, e)),
            VirtualPath::Archived { container, member } => {
                let archive = self.open_archive(container)?;
                archive
                    .locate(member)
                    .map(|info| info.size)
                    .ok_or_else(|| VfsError::MemberNotFound {
                        container: container.to_string(),
                        member: member.clone(),
                    })
            }
        }
    }

    /// Copy one member to `dest_dir` under a name derived from a SHA-256 of
    /// the full virtual path, so members with equal base names never collide.
    pub fn extract_member(
        &self,
        container: &VirtualPath,
        member: &str,
        dest_dir: &Path,
    ) -> Result<PathBuf> {
        let mut budget = self.limits.budget();
        let mut archive = self.open_archive_with(container, &mut budget)?;
        let info = admit_member(&archive, container, member, &mut budget)?;

        let digest = Sha256::digest(format!("{container}{SEPARATOR}{member}").as_bytes());
        let digest = hex::encode(digest);
        let prefix = &digest[..16];
        let virtual_path = container.join(&info.sanitized);
        let base = virtual_path.file_name().unwrap_or("member");
        let dest = dest_dir.join(format!("{prefix}_{base}"));

        fs::create_dir_all(dest_dir).map_err(|e| VfsError::io(dest_dir.display(), e))?;
        let mut out = File::create(&dest).map_err(|e| VfsError::io(dest.display(), e))?;
        let mut reader = archive.open_member(info.index)?;
        let copied = match io::copy(&mut reader, &mut out) {
            Ok(copied) => copied,
            Err(e) => {
                drop(out);
                if let Err(remove) = fs::remove_file(&dest) {
                    debug!(dest = %dest.display(), error = %remove, "partial extraction not removed");
                }
                return Err(VfsError::io(&virtual_path, e));
            }
        };

        debug!(member = %virtual_path, dest = %dest.display(), bytes = copied, "member extracted");
        Ok(dest)
    }
}

/// Locate `member` and run it through the security checks.
fn admit_member(
    archive: &ArchiveReader<ArchiveSource>,
    container: &VirtualPath,
    member: &str,
    budget: &mut TraversalBudget,
) -> Result<MemberInfo> {
    let info = archive
        .locate(member)
        .cloned()
        .ok_or_else(|| VfsError::MemberNotFound {
            container: container.to_string(),
            member: member.to_string(),
        })?;
    budget
        .admit(&info, container.depth())
        .map_err(|reason| VfsError::Rejected {
            path: container.join(&info.sanitized).to_string(),
            reason,
        })?;
    Ok(info)
}

#[derive(Default)]
struct Listing {
    paths: Vec<VirtualPath>,
    seen: HashSet<VirtualPath>,
}

impl Listing {
    fn push(&mut self, path: VirtualPath) {
        if self.seen.insert(path.clone()) {
            self.paths.push(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use tempfile::tempdir;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (name, data) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_validate_plain_and_virtual() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.log");
        fs::write(&file, "x\n").unwrap();
        let archive = dir.path().join("b.zip");
        fs::write(&archive, zip_bytes(&[("inner.txt", b"y\n")])).unwrap();

        let vfs = Vfs::default();
        assert!(vfs.validate(&VirtualPath::plain(&file)));
        assert!(!vfs.validate(&VirtualPath::plain(dir.path().join("missing.log"))));
        // member existence is deferred to read time
        assert!(vfs.validate(&VirtualPath::plain(&archive).join("not-there.txt")));
        assert!(!vfs.validate(&VirtualPath::plain(&file).join("inner.txt")));
    }

    #[test]
    fn test_read_lines_plain_and_member() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("logs.zip");
        fs::write(&archive, zip_bytes(&[("dir/app.log", b"one\ntwo\n")])).unwrap();

        let vfs = Vfs::default();
        let path = VirtualPath::plain(&archive).join("dir/app.log");
        let lines: Vec<String> = vfs
            .read_lines(&path, |lines| lines.collect::<io::Result<_>>())
            .unwrap();
        assert_eq!(lines, vec!["one", "two"]);
        assert_eq!(vfs.file_size(&path).unwrap(), 8);
    }

    #[test]
    fn test_missing_member_is_not_found() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("logs.zip");
        fs::write(&archive, zip_bytes(&[("a.txt", b"a")])).unwrap();

        let vfs = Vfs::default();
        let err = vfs
            .read_lines(&VirtualPath::plain(&archive).join("b.txt"), |l| Ok(l.count()))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_list_single_file_root() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("only.txt");
        fs::write(&file, "x").unwrap();
        let listed = Vfs::default().list_directory(&file, true).unwrap();
        assert_eq!(listed, vec![VirtualPath::plain(&file)]);
    }

    #[test]
    fn test_list_missing_root() {
        let dir = tempdir().unwrap();
        let err = Vfs::default()
            .list_directory(&dir.path().join("nope"), true)
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
