//! The outer byte-stream codec.
//!
//! Tarballs are handled by their [`stream_codec`](Compression::stream_codec)
//! here; the tar container itself is [`materialize`](Compression::materialize)'s
//! business.

use crate::Compression;
use crate::error::{ErrorKind, Result};
use bzip2::{Compression as BzLevel, read::BzDecoder, write::BzEncoder};
use exn::ResultExt;
use flate2::{Compression as GzLevel, read::GzDecoder, write::GzEncoder};
use std::io::{ErrorKind as IoErrorKind, Read, Write};

const CHUNK_SIZE: usize = 64 * 1024;

impl Compression {
    /// A reader yielding the decoded bytes of `reader`.
    pub fn wrap_reader<'a, R: Read + 'a>(&self, reader: R) -> Box<dyn Read + 'a> {
        match self.stream_codec() {
            Compression::Gzip => Box::new(GzDecoder::new(reader)),
            Compression::Bzip2 => Box::new(BzDecoder::new(reader)),
            _ => Box::new(reader),
        }
    }

    /// A writer encoding into `writer`. The stream trailer is written when
    /// the returned writer is dropped.
    pub fn wrap_writer<'a, W: Write + 'a>(&self, writer: W) -> Box<dyn Write + 'a> {
        match self.stream_codec() {
            Compression::Gzip => Box::new(GzEncoder::new(writer, GzLevel::default())),
            Compression::Bzip2 => Box::new(BzEncoder::new(writer, BzLevel::default())),
            _ => Box::new(writer),
        }
    }

    /// Encode `input` in memory.
    ///
    /// ```
    /// use serverfiles_compress::Compression;
    ///
    /// let packed = Compression::Gzip.compress(b"taxonomy").unwrap();
    /// assert_eq!(Compression::Gzip.decompress(&packed).unwrap(), b"taxonomy");
    /// ```
    pub fn compress(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        match self.stream_codec() {
            Compression::Gzip => {
                let mut encoder = GzEncoder::new(&mut output, GzLevel::default());
                encoder.write_all(input).or_raise(|| ErrorKind::Io)?;
                encoder.finish().or_raise(|| ErrorKind::Io)?;
            },
            Compression::Bzip2 => {
                let mut encoder = BzEncoder::new(&mut output, BzLevel::default());
                encoder.write_all(input).or_raise(|| ErrorKind::Io)?;
                encoder.finish().or_raise(|| ErrorKind::Io)?;
            },
            _ => output.extend_from_slice(input),
        }
        Ok(output)
    }

    /// Decode `input` in memory.
    pub fn decompress(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        self.decompress_stream(input, &mut output)?;
        Ok(output)
    }

    /// Decode everything `reader` yields into `writer`, returning the number
    /// of decoded bytes.
    ///
    /// Anything that goes wrong while reading is
    /// [`InvalidData`](ErrorKind::InvalidData), as the decoder sits on that
    /// side; write failures are [`Io`](ErrorKind::Io).
    pub fn decompress_stream<'a, R: Read + 'a, W: Write>(&self, reader: R, mut writer: W) -> Result<u64> {
        let mut reader = self.wrap_reader(reader);
        let mut chunk = vec![0u8; CHUNK_SIZE];
        let mut written = 0u64;
        loop {
            let read = match reader.read(&mut chunk) {
                Ok(0) => break,
                Ok(read) => read,
                Err(e) if e.kind() == IoErrorKind::Interrupted => continue,
                Err(e) => return Err(e).or_raise(|| ErrorKind::InvalidData),
            };
            writer.write_all(&chunk[..read]).or_raise(|| ErrorKind::Io)?;
            written += read as u64;
        }
        writer.flush().or_raise(|| ErrorKind::Io)?;
        Ok(written)
    }
}
