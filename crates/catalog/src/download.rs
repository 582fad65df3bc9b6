//! Streaming downloads with optional progress reporting.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::io::{ErrorKind as IoErrorKind, Read, Write};

const CHUNK_SIZE: usize = 8 * 1024;

/// An observer called as a transfer advances. Purely informational.
pub type Progress<'a> = &'a (dyn Fn() + Sync);

/// An open byte stream for one remote file.
pub struct Download {
    /// Announced size in bytes; `0` when the server did not send one.
    pub size: u64,
    reader: Box<dyn Read + Send>,
}

impl Download {
    pub fn new(size: u64, reader: impl Read + Send + 'static) -> Self {
        Self { size, reader: Box::new(reader) }
    }

    /// Stream the whole body into `writer`, returning the bytes copied.
    ///
    /// The stream is read to its end regardless of the announced size. When a
    /// `progress` observer is supplied it is called once per additional whole
    /// percent of [`size`](Self::size) transferred, and once more at the end.
    /// Read failures are [`Network`](ErrorKind::Network) errors, write
    /// failures are [`Io`](ErrorKind::Io) errors.
    pub fn write_to<W: Write>(self, writer: &mut W, progress: Option<Progress<'_>>) -> Result<u64> {
        let mut reader = ProgressReader::new(self.reader, self.size, progress);
        let mut buffer = [0u8; CHUNK_SIZE];
        loop {
            let read = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == IoErrorKind::Interrupted => continue,
                Err(e) => return Err(e).or_raise(|| ErrorKind::Network),
            };
            writer.write_all(&buffer[..read]).or_raise(|| ErrorKind::Io)?;
        }
        writer.flush().or_raise(|| ErrorKind::Io)?;
        if let Some(progress) = progress {
            progress();
        }
        Ok(reader.transferred)
    }
}

impl Debug for Download {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Download").field("size", &self.size).finish_non_exhaustive()
    }
}

/// Counts bytes flowing through a reader and reports whole-percent steps.
struct ProgressReader<'p, R> {
    inner: R,
    total: u64,
    transferred: u64,
    reported: u64,
    progress: Option<Progress<'p>>,
}

impl<'p, R: Read> ProgressReader<'p, R> {
    fn new(inner: R, total: u64, progress: Option<Progress<'p>>) -> Self {
        Self { inner, total, transferred: 0, reported: 0, progress }
    }
}

impl<R: Read> Read for ProgressReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let read = self.inner.read(buf)?;
        self.transferred += read as u64;
        if let Some(progress) = self.progress
            && self.total > 0
        {
            let percent = (self.transferred.saturating_mul(100) / self.total).min(100);
            while self.reported < percent {
                self.reported += 1;
                progress();
            }
        }
        Ok(read)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn count_calls(size: u64, data: Vec<u8>) -> (usize, Vec<u8>) {
        let calls = AtomicUsize::new(0);
        let observer = || {
            calls.fetch_add(1, Ordering::SeqCst);
        };
        let mut output = Vec::new();
        Download::new(size, Cursor::new(data)).write_to(&mut output, Some(&observer)).unwrap();
        (calls.load(Ordering::SeqCst), output)
    }

    #[rstest]
    // Every percent, plus the completion call.
    #[case(100_000, 101)]
    #[case(100, 101)]
    // Fewer bytes than percent steps: a single read crosses several
    // percents, each still reported.
    #[case(10, 101)]
    #[case(1, 101)]
    fn test_progress_calls(#[case] size: usize, #[case] expected: usize) {
        let (calls, output) = count_calls(size as u64, vec![7u8; size]);
        assert_eq!(calls, expected);
        assert_eq!(output.len(), size);
    }

    #[test]
    fn test_unknown_size_still_copies() {
        let (calls, output) = count_calls(0, b"no content-length".to_vec());
        assert_eq!(output, b"no content-length");
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_overlong_body_caps_progress() {
        // The server under-reported the size; progress never exceeds 100 steps.
        let (calls, output) = count_calls(50, vec![0u8; 500]);
        assert_eq!(calls, 101);
        assert_eq!(output.len(), 500);
    }

    #[test]
    fn test_without_observer() {
        let mut output = Vec::new();
        let copied = Download::new(3, Cursor::new(b"abc".to_vec())).write_to(&mut output, None).unwrap();
        assert_eq!(copied, 3);
        assert_eq!(output, b"abc");
    }

    struct FailingReader;
    impl Read for FailingReader {
        fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(IoErrorKind::ConnectionReset, "reset"))
        }
    }

    #[test]
    fn test_read_failure_is_network_error() {
        let mut output = Vec::new();
        let err = Download::new(10, FailingReader).write_to(&mut output, None).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Network));
    }
}
