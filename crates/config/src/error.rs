//! Configuration errors. None of them go away on retry.

use derive_more::{Display, Error};
use std::path::PathBuf;

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A source could not be read or holds values of the wrong type.
    #[display("failed to load configuration")]
    Load,
    /// An explicitly requested configuration file doesn't exist.
    #[display("configuration file not found: {}", _0.display())]
    FileNotFound(#[error(not(source))] PathBuf),
    /// The cache root must be an absolute path.
    #[display("cache root must be an absolute path: {}", _0.display())]
    InvalidRoot(#[error(not(source))] PathBuf),
    /// No root was configured and the platform has no data directory to
    /// default to.
    #[display("no data directory available; set `root` explicitly")]
    NoDataDir,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        false
    }
}
