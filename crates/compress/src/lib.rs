//! Decompression and archive materialization.
//!
//! A repository file's metadata may carry a `compression` tag (`none`, `gz`,
//! `bz2`, `tar.gz`, `tar.bz2`). [`Compression`] parses those tags and
//! [`Compression::materialize`] turns a downloaded blob into what the tag
//! promises: one decompressed file, or a directory unpacked from a tarball.

mod codec;
pub mod error;
mod materialize;
mod tag;

/// A compression format a repository file can be published with.
///
/// Defaults to [`None`](Self::None) (uncompressed).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Compression {
    /// Uncompressed
    #[default]
    None,
    /// Bzip2 compression (.bz2)
    Bzip2,
    /// Gzip compression (.gz)
    Gzip,
    /// Bzip2-compressed tarball (.tar.bz2)
    TarBzip2,
    /// Gzip-compressed tarball (.tar.gz)
    TarGzip,
}

impl Compression {
    /// Whether materializing this format produces a directory tree instead of
    /// a single file.
    #[inline]
    #[must_use]
    pub fn is_archive(&self) -> bool {
        matches!(self, Compression::TarBzip2 | Compression::TarGzip)
    }

    /// The codec applied to the byte stream, ignoring any tar container.
    #[inline]
    #[must_use]
    pub fn stream_codec(&self) -> Compression {
        match self {
            Compression::TarBzip2 => Compression::Bzip2,
            Compression::TarGzip => Compression::Gzip,
            other => *other,
        }
    }
}
