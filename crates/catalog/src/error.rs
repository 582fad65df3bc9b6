//! Catalog Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A catalog error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The remote answered 404 for the requested path.
    #[display("not found on server: {_0}")]
    NotFound(#[error(not(source))] String),
    /// The remote answered with a status other than 200 or 404.
    #[display("transfer failed with HTTP status {_0}")]
    TransferFailed(#[error(not(source))] u16),
    /// Connection, timeout or body read failure.
    #[display("network error")]
    Network,
    /// A repository path segment is empty, relative, or contains separators.
    #[display("invalid repository path: {_0}")]
    InvalidPath(#[error(not(source))] String),
    /// The configured server address can't be used as a base URL.
    #[display("invalid server URL: {_0}")]
    InvalidUrl(#[error(not(source))] String),
    /// A remote `.info` document is not valid metadata JSON.
    #[display("invalid file metadata")]
    InvalidMetadata,
    /// Writing downloaded bytes to their destination failed.
    #[display("I/O error")]
    Io,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransferFailed(_) | Self::Network | Self::Io)
    }
}
