//! Fixed-size chunk strategy with boundary-safe line reassembly.

use super::{FileScan, LineScanner};
use regex::Regex;
use sift_vfs::{decode_line, Result, Vfs, VirtualPath};
use tokio_util::sync::CancellationToken;

/// Read `chunk_size` bytes at a time. Bytes after the last newline of a chunk
/// carry over into the next one; a non-empty remainder at EOF is the final
/// line. Produces exactly the lines line mode produces.
pub fn scan_chunks(
    vfs: &Vfs,
    path: &VirtualPath,
    regex: &Regex,
    chunk_size: usize,
    cancel: &CancellationToken,
    check_interval: u64,
    on_tick: &mut dyn FnMut(u64),
) -> Result<FileScan> {
    vfs.read_chunks(path, chunk_size, |chunks| {
        let mut scanner = LineScanner::new(regex, cancel, check_interval, on_tick);
        let mut carry: Vec<u8> = Vec::new();

        for chunk in chunks {
            let appended_at = carry.len();
            carry.extend_from_slice(&chunk?);
            let Some(last_newline) = last_newline_since(&carry, appended_at) else {
                continue;
            };
            let rest = carry.split_off(last_newline + 1);
            for raw in carry.split_inclusive(|&b| b == b'\n') {
                if scanner.feed(decode_line(raw)).is_break() {
                    return Ok(FileScan::Cancelled);
                }
            }
            carry = rest;
        }

        if !carry.is_empty() && scanner.feed(decode_line(&carry)).is_break() {
            return Ok(FileScan::Cancelled);
        }
        Ok(scanner.finish())
    })
}

/// Position of the last `\n` at or after `from`. Carried bytes never hold a
/// newline, so only the freshly appended tail is searched.
fn last_newline_since(buf: &[u8], from: usize) -> Option<usize> {
    buf.get(from..)?
        .iter()
        .rposition(|&b| b == b'\n')
        .map(|i| from + i)
}
