//! Cache errors.
//!
//! Failures from the catalog and from materialization keep their original
//! `Exn` frame as a child, so the full tree is available to whoever reports
//! the error while [`ErrorKind`] stays matchable at the top.

use derive_more::{Display, Error};
use serverfiles_catalog::error::{Error as CatalogError, ErrorKind as CatalogErrorKind};
use serverfiles_compress::error::{Error as CompressionError, ErrorKind as CompressionErrorKind};
use std::io::Error as IoError;
use std::path::PathBuf;

pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// No cache entry (artifact plus sidecar) exists at this local path.
    #[display("not in local cache: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// A sidecar exists but is not valid metadata JSON. Treated as missing by
    /// staleness checks and enumeration.
    #[display("corrupt metadata sidecar: {}", _0.display())]
    MetadataCorrupt(#[error(not(source))] PathBuf),
    /// Remote metadata names a compression the cache can't materialize.
    #[display("unsupported compression: {_0}")]
    UnsupportedCompression(#[error(not(source))] String),
    /// The cache root is relative, or exists and isn't a directory.
    #[display("invalid cache root: {}", _0.display())]
    InvalidPath(#[error(not(source))] PathBuf),
    /// The remote catalog failed; the inner kind says whether to retry.
    #[display("catalog error: {_0}")]
    Catalog(CatalogErrorKind),
    /// A downloaded blob could not be turned into its final form.
    #[display("materialization error: {_0}")]
    Materialize(CompressionErrorKind),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
}

impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Convert a catalog error into a cache error, keeping the catalog's
    /// `Exn` frame as a child in the error tree.
    #[track_caller]
    pub fn catalog(err: CatalogError) -> Error {
        let inner = (*err).clone();
        err.raise(ErrorKind::Catalog(inner))
    }

    /// Convert a compression error into a cache error, keeping the compress
    /// crate's `Exn` frame as a child in the error tree.
    #[track_caller]
    pub fn materialize(err: CompressionError) -> Error {
        let inner = (*err).clone();
        err.raise(ErrorKind::Materialize(inner))
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Io(_) => true,
            Self::Catalog(kind) => kind.is_retryable(),
            Self::Materialize(kind) => kind.is_retryable(),
            _ => false,
        }
    }
}
