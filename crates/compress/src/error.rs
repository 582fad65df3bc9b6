//! Errors raised while decoding or materializing downloads.

use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The bytes don't decode (or unpack) as the declared format. The same
    /// blob will fail the same way.
    #[display("corrupt or truncated data")]
    InvalidData,
    /// A `compression` tag outside the published set.
    #[display("unsupported compression: {_0}")]
    UnsupportedFormat(#[error(not(source))] String),
    /// Reading the blob or writing the result failed.
    #[display("I/O error")]
    Io,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ErrorKind::InvalidData, "corrupt or truncated data", false)]
    #[case(ErrorKind::UnsupportedFormat("zip".into()), "unsupported compression: zip", false)]
    #[case(ErrorKind::Io, "I/O error", true)]
    fn test_kinds(#[case] kind: ErrorKind, #[case] message: &str, #[case] retryable: bool) {
        assert_eq!(kind.to_string(), message);
        assert_eq!(kind.is_retryable(), retryable);
    }
}
