//! No-mock VFS integration tests.
//!
//! Exercises real directories and real zip archives on disk:
//! - Recursive listing with nested archive expansion
//! - Archive cruft and directory entries skipped
//! - Zip-bomb rejection by compression ratio
//! - Nesting depth limit
//! - Case-insensitive member lookup and traversal-safe names
//! - Collision-free member extraction

use sift_vfs::{ArchiveSecurityLimits, Vfs, VfsError, VirtualPath};
use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

// ============================================================================
// Helpers
// ============================================================================

fn zip_with(entries: &[(&str, &[u8])], method: CompressionMethod) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(method);
    for (name, data) in entries {
        if name.ends_with('/') {
            writer.add_directory(*name, options).expect("add dir");
        } else {
            writer.start_file(*name, options).expect("start file");
            writer.write_all(data).expect("write member");
        }
    }
    writer.finish().expect("finish zip").into_inner()
}

fn stored(entries: &[(&str, &[u8])]) -> Vec<u8> {
    zip_with(entries, CompressionMethod::Stored)
}

fn write(dir: &Path, name: &str, bytes: &[u8]) -> std::path::PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent");
    }
    fs::write(&path, bytes).expect("write file");
    path
}

/// Rewrite the first member's declared sizes, in both the local header and
/// the central directory, leaving its data untouched.
fn forge_declared_size(mut zip: Vec<u8>, size: u32) -> Vec<u8> {
    let le = size.to_le_bytes();
    assert_eq!(&zip[..4], b"PK\x03\x04", "archive must start with a local header");
    zip[18..22].copy_from_slice(&le);
    zip[22..26].copy_from_slice(&le);
    let central = zip
        .windows(4)
        .position(|w| w == b"PK\x01\x02")
        .expect("central directory entry");
    zip[central + 20..central + 24].copy_from_slice(&le);
    zip[central + 24..central + 28].copy_from_slice(&le);
    zip
}

fn wire(paths: &[VirtualPath], root: &Path) -> Vec<String> {
    let prefix = format!("{}/", root.display());
    paths
        .iter()
        .map(|p| p.to_string().trim_start_matches(&prefix).to_string())
        .collect()
}

// ============================================================================
// Listing
// ============================================================================

#[test]
fn test_lists_plain_files_and_archive_members_in_walk_order() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.log", b"plain\n");
    write(
        dir.path(),
        "b/bugreport.zip",
        &stored(&[
            ("dumpstate.txt", b"x\n"),
            ("FS/", b""),
            ("FS/data/anr/trace.txt", b"y\n"),
            ("__MACOSX/._dumpstate.txt", b"junk"),
            (".DS_Store", b"junk"),
            ("FS/Thumbs.db", b"junk"),
        ]),
    );
    write(dir.path(), "c.txt", b"plain\n");

    let listed = Vfs::default().list_directory(dir.path(), true).unwrap();
    assert_eq!(
        wire(&listed, dir.path()),
        vec![
            "a.log",
            "b/bugreport.zip::dumpstate.txt",
            "b/bugreport.zip::FS/data/anr/trace.txt",
            "c.txt",
        ]
    );
}

#[test]
fn test_non_recursive_listing_stays_at_top_level() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "top.log", b"x\n");
    write(dir.path(), "sub/deep.log", b"y\n");

    let listed = Vfs::default().list_directory(dir.path(), false).unwrap();
    assert_eq!(wire(&listed, dir.path()), vec!["top.log"]);
}

#[test]
fn test_nested_archives_expand_and_never_list_the_archive_itself() {
    let dir = TempDir::new().unwrap();
    let inner = stored(&[("inner.txt", b"nested line\n")]);
    let outer = stored(&[("nested.zip", &inner), ("top.txt", b"top\n")]);
    let archive = write(dir.path(), "outer.zip", &outer);

    let vfs = Vfs::default();
    let listed = vfs.list_directory(&archive, true).unwrap();
    let names: Vec<String> = listed.iter().map(|p| p.to_string()).collect();
    let root = archive.display().to_string();
    assert_eq!(
        names,
        vec![
            format!("{root}::nested.zip::inner.txt"),
            format!("{root}::top.txt"),
        ]
    );

    let lines = vfs
        .read_lines(&listed[0], |lines| lines.collect::<std::io::Result<Vec<_>>>())
        .unwrap();
    assert_eq!(lines, vec!["nested line"]);
}

#[test]
fn test_depth_limit_stops_expansion() {
    let dir = TempDir::new().unwrap();
    let level2 = stored(&[("deep.txt", b"deep\n")]);
    let level1 = stored(&[("level2.zip", &level2), ("mid.txt", b"mid\n")]);
    let archive = write(dir.path(), "level0.zip", &stored(&[("level1.zip", &level1)]));

    let vfs = Vfs::new(ArchiveSecurityLimits::default().with_max_depth(2));
    let listed = vfs.list_directory(&archive, true).unwrap();
    let names: Vec<String> = listed.iter().map(|p| p.to_string()).collect();
    assert_eq!(names.len(), 1);
    assert!(names[0].ends_with("level0.zip::level1.zip::mid.txt"));

    // reading past the limit is refused as well
    let too_deep = VirtualPath::plain(&archive)
        .join("level1.zip")
        .join("level2.zip")
        .join("deep.txt");
    let err = vfs.read_lines(&too_deep, |l| Ok(l.count())).unwrap_err();
    assert!(err.is_rejected(), "unexpected error: {err}");
}

#[test]
fn test_duplicate_member_names_are_listed_once() {
    let dir = TempDir::new().unwrap();
    let archive = write(
        dir.path(),
        "dups.zip",
        &stored(&[("./a/log.txt", b"1\n"), ("a/log.txt", b"2\n")]),
    );
    let listed = Vfs::default().list_directory(&archive, true).unwrap();
    assert_eq!(listed.len(), 1);
}

// ============================================================================
// Security
// ============================================================================

#[test]
fn test_zip_bomb_member_is_skipped_and_unreadable() {
    let dir = TempDir::new().unwrap();
    let zeros = vec![0u8; 4 * 1024 * 1024];
    let bomb = zip_with(
        &[("zeros.bin", &zeros), ("ok.txt", b"fine\n")],
        CompressionMethod::Deflated,
    );
    let archive = write(dir.path(), "bomb.zip", &bomb);

    let vfs = Vfs::new(ArchiveSecurityLimits::default().with_max_compression_ratio(50));
    let listed = vfs.list_directory(&archive, true).unwrap();
    let names: Vec<String> = listed.iter().map(|p| p.to_string()).collect();
    assert_eq!(names.len(), 1);
    assert!(names[0].ends_with("bomb.zip::ok.txt"));

    let err = vfs
        .read_lines(&VirtualPath::plain(&archive).join("zeros.bin"), |l| Ok(l.count()))
        .unwrap_err();
    assert!(matches!(err, VfsError::Rejected { .. }));
}

#[test]
fn test_oversized_member_is_rejected() {
    let dir = TempDir::new().unwrap();
    let archive = write(
        dir.path(),
        "big.zip",
        &stored(&[("big.log", &[b'a'; 2048]), ("small.log", b"ok\n")]),
    );
    let vfs = Vfs::new(ArchiveSecurityLimits::default().with_max_file_size(1024));
    let listed = vfs.list_directory(&archive, true).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].member(), Some("small.log"));
}

#[test]
fn test_traversal_names_are_sanitized_in_listing() {
    let dir = TempDir::new().unwrap();
    let archive = write(dir.path(), "evil.zip", &stored(&[("../../etc/passwd", b"root\n")]));

    let vfs = Vfs::default();
    let listed = vfs.list_directory(&archive, true).unwrap();
    assert_eq!(listed[0].member(), Some("etc/passwd"));
    let count = vfs.read_lines(&listed[0], |l| Ok(l.count())).unwrap();
    assert_eq!(count, 1);
}

// ============================================================================
// Reading and extraction
// ============================================================================

#[test]
fn test_member_lookup_is_case_insensitive() {
    let dir = TempDir::new().unwrap();
    let archive = write(dir.path(), "logs.zip", &stored(&[("Logs/Main.LOG", b"hello\n")]));
    let path = VirtualPath::parse(&format!("{}::logs/main.log", archive.display()));

    let first = Vfs::default()
        .read_lines(&path, |mut lines| lines.next().transpose())
        .unwrap();
    assert_eq!(first.as_deref(), Some("hello"));
}

#[test]
fn test_read_chunks_yields_raw_bytes() {
    let dir = TempDir::new().unwrap();
    let file = write(dir.path(), "utf8.log", "héllo\n".as_bytes());

    let chunks = Vfs::default()
        .read_chunks(&VirtualPath::plain(&file), 2, |chunks| {
            chunks.collect::<std::io::Result<Vec<Vec<u8>>>>()
        })
        .unwrap();
    assert_eq!(chunks.concat(), "héllo\n".as_bytes());
    assert_eq!(chunks[0], b"h\xc3");
}

#[test]
fn test_extract_member_uses_digest_prefixed_names() {
    let dir = TempDir::new().unwrap();
    let archive = write(
        dir.path(),
        "two.zip",
        &stored(&[("a/app.log", b"from a\n"), ("b/app.log", b"from b\n")]),
    );
    let dest = dir.path().join("extract");
    let container = VirtualPath::plain(&archive);

    let vfs = Vfs::default();
    let first = vfs.extract_member(&container, "a/app.log", &dest).unwrap();
    let second = vfs.extract_member(&container, "b/app.log", &dest).unwrap();

    assert_ne!(first, second);
    assert!(first.file_name().unwrap().to_str().unwrap().ends_with("_app.log"));
    let mut contents = String::new();
    fs::File::open(&second)
        .unwrap()
        .read_to_string(&mut contents)
        .unwrap();
    assert_eq!(contents, "from b\n");
}

#[test]
fn test_member_streaming_past_declared_size_is_refused() {
    let dir = TempDir::new().unwrap();
    let body = b"xx\n".repeat(2000);
    let archive = write(
        dir.path(),
        "forged.zip",
        &forge_declared_size(stored(&[("big.txt", &body)]), 10),
    );
    let path = VirtualPath::parse(&format!("{}::big.txt", archive.display()));
    let vfs = Vfs::new(
        ArchiveSecurityLimits::default()
            .with_max_file_size(100)
            .with_max_total_size(100),
    );

    assert_eq!(vfs.file_size(&path).unwrap(), 10);

    let mut delivered = 0usize;
    let result = vfs.read_chunks(&path, 4, |chunks| {
        for chunk in chunks {
            delivered += chunk?.len();
        }
        Ok(())
    });
    assert!(result.is_err(), "oversized stream must not read cleanly");
    assert!(delivered <= 10, "delivered {delivered} bytes past the declared size");

    let lines = vfs.read_lines(&path, |lines| lines.collect::<std::io::Result<Vec<_>>>());
    assert!(lines.is_err());
}

#[test]
fn test_extraction_of_forged_member_fails_and_leaves_nothing() {
    let dir = TempDir::new().unwrap();
    let body = vec![b'z'; 5000];
    let archive = write(
        dir.path(),
        "forged.zip",
        &forge_declared_size(stored(&[("big.bin", &body)]), 10),
    );
    let dest = dir.path().join("extract");
    let vfs = Vfs::new(
        ArchiveSecurityLimits::default()
            .with_max_file_size(100)
            .with_max_total_size(100),
    );

    let result = vfs.extract_member(&VirtualPath::plain(&archive), "big.bin", &dest);
    assert!(result.is_err());
    let leftovers = fs::read_dir(&dest).map(|d| d.count()).unwrap_or(0);
    assert_eq!(leftovers, 0);
}

#[test]
fn test_malformed_archive_is_skipped_in_listing() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "broken.zip", b"PK\x03\x04 definitely not a zip");
    write(dir.path(), "good.log", b"x\n");

    let vfs = Vfs::default();
    let listed = vfs.list_directory(dir.path(), true).unwrap();
    assert_eq!(wire(&listed, dir.path()), vec!["good.log"]);
    assert!(!vfs.validate(&VirtualPath::plain(dir.path().join("broken.zip")).join("x")));
}
