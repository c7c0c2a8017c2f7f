//! Streaming readers that tolerate invalid UTF-8, plus the size guard for
//! archive members.

use crate::limits::SecurityRejection;
use std::io::{self, BufRead, Read};

/// Decode one raw line, dropping the trailing `\n` / `\r\n`. Invalid UTF-8
/// sequences become U+FFFD.
pub fn decode_line(bytes: &[u8]) -> String {
    let mut end = bytes.len();
    if end > 0 && bytes[end - 1] == b'\n' {
        end -= 1;
        if end > 0 && bytes[end - 1] == b'\r' {
            end -= 1;
        }
    }
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Line iterator over a buffered reader with lossy decoding.
pub struct LossyLines<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: BufRead> LossyLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(256),
        }
    }
}

impl<R: BufRead> Iterator for LossyLines<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => None,
            Ok(_) => Some(Ok(decode_line(&self.buf))),
            Err(e) => Some(Err(e)),
        }
    }
}

/// Fixed-size byte chunks. Every chunk except the last is exactly `size`
/// bytes; chunk boundaries ignore line and character boundaries.
pub struct ByteChunks<R> {
    reader: R,
    size: usize,
    done: bool,
}

impl<R: Read> ByteChunks<R> {
    pub fn new(reader: R, size: usize) -> Self {
        Self {
            reader,
            size: size.max(1),
            done: false,
        }
    }
}

impl<R: Read> Iterator for ByteChunks<R> {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut chunk = vec![0u8; self.size];
        let mut filled = 0;
        while filled < self.size {
            match self.reader.read(&mut chunk[filled..]) {
                Ok(0) => {
                    self.done = true;
                    break;
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        if filled == 0 {
            return None;
        }
        chunk.truncate(filled);
        Some(Ok(chunk))
    }
}

/// Caps a member stream at the uncompressed size its archive declared.
///
/// The security checks run against the declared size, so a stream that
/// carries more bytes fails with [`SecurityRejection::SizeMismatch`] as the
/// `io::Error` payload instead of being silently cut short.
pub struct DeclaredSize<R> {
    inner: R,
    declared: u64,
    remaining: u64,
}

impl<R: Read> DeclaredSize<R> {
    pub fn new(inner: R, declared: u64) -> Self {
        Self {
            inner,
            declared,
            remaining: declared,
        }
    }

    fn overrun(&self) -> io::Error {
        io::Error::new(
            io::ErrorKind::InvalidData,
            SecurityRejection::SizeMismatch {
                declared: self.declared,
            },
        )
    }
}

impl<R: Read> Read for DeclaredSize<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.remaining == 0 {
            let mut extra = [0u8; 1];
            return match self.inner.read(&mut extra)? {
                0 => Ok(0),
                _ => Err(self.overrun()),
            };
        }
        let want = usize::try_from(self.remaining).map_or(buf.len(), |r| r.min(buf.len()));
        let n = self.inner.read(&mut buf[..want])?;
        self.remaining -= n as u64;
        Ok(n)
    }
}

/// The size rejection carried by an error from [`DeclaredSize`], if any.
pub fn size_rejection(err: &io::Error) -> Option<&SecurityRejection> {
    err.get_ref()
        .and_then(|inner| inner.downcast_ref::<SecurityRejection>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_decode_line_strips_terminators() {
        assert_eq!(decode_line(b"abc\n"), "abc");
        assert_eq!(decode_line(b"abc\r\n"), "abc");
        assert_eq!(decode_line(b"abc"), "abc");
        assert_eq!(decode_line(b"\n"), "");
    }

    #[test]
    fn test_invalid_utf8_replaced() {
        let line = decode_line(b"bad \xff\xfe byte\n");
        assert_eq!(line, "bad \u{fffd}\u{fffd} byte");
    }

    #[test]
    fn test_lossy_lines_keeps_final_unterminated_line() {
        let lines: Vec<String> = LossyLines::new(Cursor::new(b"one\ntwo\r\nthree".to_vec()))
            .collect::<io::Result<_>>()
            .unwrap();
        assert_eq!(lines, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_lossy_lines_empty_input() {
        assert_eq!(LossyLines::new(Cursor::new(Vec::new())).count(), 0);
    }

    #[test]
    fn test_byte_chunks_sizes() {
        let chunks: Vec<Vec<u8>> = ByteChunks::new(Cursor::new(b"abcdefg".to_vec()), 3)
            .collect::<io::Result<_>>()
            .unwrap();
        assert_eq!(chunks, vec![b"abc".to_vec(), b"def".to_vec(), b"g".to_vec()]);
    }

    #[test]
    fn test_byte_chunks_zero_size_clamped() {
        let chunks = ByteChunks::new(Cursor::new(b"ab".to_vec()), 0).count();
        assert_eq!(chunks, 2);
    }

    #[test]
    fn test_declared_size_exact_stream_passes() {
        let mut out = Vec::new();
        DeclaredSize::new(Cursor::new(b"0123456789".to_vec()), 10)
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, b"0123456789");
    }

    #[test]
    fn test_declared_size_short_stream_passes() {
        let mut out = Vec::new();
        DeclaredSize::new(Cursor::new(b"0123".to_vec()), 10)
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, b"0123");
    }

    #[test]
    fn test_declared_size_overrun_fails() {
        let mut out = Vec::new();
        let err = DeclaredSize::new(Cursor::new(vec![b'x'; 5000]), 10)
            .read_to_end(&mut out)
            .unwrap_err();
        assert_eq!(out.len(), 10);
        assert_eq!(
            size_rejection(&err),
            Some(&SecurityRejection::SizeMismatch { declared: 10 })
        );
    }

    #[test]
    fn test_plain_io_error_has_no_rejection() {
        let err = io::Error::from(io::ErrorKind::UnexpectedEof);
        assert!(size_rejection(&err).is_none());
    }
}
