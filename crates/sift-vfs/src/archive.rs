//! Zip archive access.
//!
//! Opens archives read-only from disk or from memory (for nested archives),
//! indexes member metadata without decompressing anything and resolves
//! member names the way virtual paths spell them.

use crate::error::{Result, VfsError};
use crate::path::VirtualPath;
use crate::read::DeclaredSize;
use crate::sanitize::sanitize_member_name;
use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::debug;
use zip::ZipArchive;

/// Metadata for one archive entry, read from the central directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    /// Name as stored in the archive.
    pub name: String,
    /// Name after [`sanitize_member_name`].
    pub sanitized: String,
    /// Uncompressed size claimed by the archive.
    pub size: u64,
    pub compressed_size: u64,
    pub index: usize,
    pub is_dir: bool,
}

impl MemberInfo {
    /// Members worth exposing through listings.
    pub fn is_listable(&self) -> bool {
        !self.is_dir && !self.sanitized.is_empty() && !is_system_entry(&self.sanitized)
    }
}

/// True when `name` looks like a zip archive.
pub fn is_archive_name(name: &str) -> bool {
    name.len() > 4 && name.to_ascii_lowercase().ends_with(".zip")
}

/// Archive cruft left behind by desktop operating systems.
pub fn is_system_entry(name: &str) -> bool {
    let mut components = name.split('/');
    if components.clone().any(|c| c == "__MACOSX") {
        return true;
    }
    let base = components.next_back().unwrap_or_default();
    base == ".DS_Store" || base.starts_with("._") || base == "Thumbs.db" || base == "desktop.ini"
}

/// Backing bytes of an opened archive.
#[derive(Debug)]
pub enum ArchiveSource {
    File(File),
    Memory(Cursor<Vec<u8>>),
}

impl Read for ArchiveSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            ArchiveSource::File(file) => file.read(buf),
            ArchiveSource::Memory(cursor) => cursor.read(buf),
        }
    }
}

impl Seek for ArchiveSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            ArchiveSource::File(file) => file.seek(pos),
            ArchiveSource::Memory(cursor) => cursor.seek(pos),
        }
    }
}

/// An opened archive plus its member index.
pub struct ArchiveReader<R: Read + Seek> {
    label: VirtualPath,
    archive: ZipArchive<R>,
    members: Vec<MemberInfo>,
}

impl ArchiveReader<ArchiveSource> {
    /// Open an archive stored on disk.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| VfsError::io(path.display(), e))?;
        Self::from_reader(VirtualPath::plain(path), ArchiveSource::File(file))
    }

    /// Open an archive held in memory, typically a nested member.
    pub fn from_bytes(label: VirtualPath, bytes: Vec<u8>) -> Result<Self> {
        Self::from_reader(label, ArchiveSource::Memory(Cursor::new(bytes)))
    }
}

impl<R: Read + Seek> ArchiveReader<R> {
    /// Create a reader from any Read + Seek source.
    pub fn from_reader(label: VirtualPath, reader: R) -> Result<Self> {
        let mut archive = ZipArchive::new(reader).map_err(|e| VfsError::zip(&label, e))?;

        let mut members = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let entry = archive
                .by_index_raw(index)
                .map_err(|e| VfsError::zip(&label, e))?;
            let name = entry.name().to_string();
            members.push(MemberInfo {
                sanitized: sanitize_member_name(&name),
                name,
                size: entry.size(),
                compressed_size: entry.compressed_size(),
                index,
                is_dir: entry.is_dir(),
            });
        }

        debug!(archive = %label, members = members.len(), "archive opened");
        Ok(Self {
            label,
            archive,
            members,
        })
    }

    pub fn label(&self) -> &VirtualPath {
        &self.label
    }

    pub fn members(&self) -> &[MemberInfo] {
        &self.members
    }

    /// Resolve a member name: exact match on the stored or sanitized name
    /// first, then a case-insensitive match on the sanitized name.
    pub fn locate(&self, name: &str) -> Option<&MemberInfo> {
        let wanted = sanitize_member_name(name);
        let files = || self.members.iter().filter(|m| !m.is_dir);

        files()
            .find(|m| m.name == name || m.sanitized == wanted)
            .or_else(|| {
                let lowered = wanted.to_lowercase();
                files().find(|m| m.sanitized.to_lowercase() == lowered)
            })
    }

    /// Decompressing reader over one member, capped at its declared size.
    pub fn open_member(&mut self, index: usize) -> Result<Box<dyn Read + '_>> {
        let label = &self.label;
        let entry = self
            .archive
            .by_index(index)
            .map_err(|e| VfsError::zip(label, e))?;
        let declared = self
            .members
            .get(index)
            .map_or_else(|| entry.size(), |member| member.size);
        Ok(Box::new(DeclaredSize::new(entry, declared)))
    }

    /// Read a whole member into memory, never more than `limit` bytes.
    pub fn read_member(&mut self, index: usize, limit: u64) -> Result<Vec<u8>> {
        let label = self.label.clone();
        let member_path = match self.members.get(index) {
            Some(member) => label.join(&member.sanitized),
            None => label.clone(),
        };
        let mut reader = self.open_member(index)?.take(limit);
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(|e| VfsError::io(&member_path, e))?;
        Ok(bytes)
    }
}
