//! Line-at-a-time strategy.

use super::{FileScan, LineScanner};
use regex::Regex;
use sift_vfs::{Result, Vfs, VirtualPath};
use tokio_util::sync::CancellationToken;

pub fn scan_lines(
    vfs: &Vfs,
    path: &VirtualPath,
    regex: &Regex,
    cancel: &CancellationToken,
    check_interval: u64,
    on_tick: &mut dyn FnMut(u64),
) -> Result<FileScan> {
    vfs.read_lines(path, |lines| {
        let mut scanner = LineScanner::new(regex, cancel, check_interval, on_tick);
        for line in lines {
            if scanner.feed(line?).is_break() {
                return Ok(FileScan::Cancelled);
            }
        }
        Ok(scanner.finish())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::ScanOutput;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_matches_in_order() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.log");
        fs::write(&file, "match here\nnothing\nanother match\n").unwrap();

        let regex = Regex::new("match").unwrap();
        let scan = scan_lines(
            &Vfs::default(),
            &VirtualPath::plain(&file),
            &regex,
            &CancellationToken::new(),
            1000,
            &mut |_| {},
        )
        .unwrap();
        assert_eq!(
            scan,
            FileScan::Completed(ScanOutput {
                matches: vec!["match here".into(), "another match".into()],
                lines_processed: 3,
            })
        );
    }

    #[test]
    fn test_cancel_observed_at_check_interval() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("big.log");
        fs::write(&file, "line\n".repeat(100)).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let scan = scan_lines(
            &Vfs::default(),
            &VirtualPath::plain(&file),
            &Regex::new("line").unwrap(),
            &cancel,
            10,
            &mut |_| {},
        )
        .unwrap();
        assert_eq!(scan, FileScan::Cancelled);
    }

    #[test]
    fn test_ticks_every_interval() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("ticks.log");
        fs::write(&file, "x\n".repeat(25)).unwrap();

        let mut ticks = Vec::new();
        scan_lines(
            &Vfs::default(),
            &VirtualPath::plain(&file),
            &Regex::new("y").unwrap(),
            &CancellationToken::new(),
            10,
            &mut |n| ticks.push(n),
        )
        .unwrap();
        assert_eq!(ticks, vec![10, 20]);
    }
}
