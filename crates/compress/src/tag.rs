//! Metadata `compression` tags.

use crate::Compression;
use crate::error::{Error, ErrorKind};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

impl Compression {
    /// The tag repositories publish for this format.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Gzip => "gz",
            Compression::Bzip2 => "bz2",
            Compression::TarGzip => "tar.gz",
            Compression::TarBzip2 => "tar.bz2",
        }
    }
}

impl Display for Compression {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.tag())
    }
}

/// Tags compare case-insensitively and ignore surrounding whitespace. Anything
/// outside the published set is [`UnsupportedFormat`](ErrorKind::UnsupportedFormat).
impl FromStr for Compression {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_ascii_lowercase();
        [Compression::None, Compression::Gzip, Compression::Bzip2, Compression::TarGzip, Compression::TarBzip2]
            .into_iter()
            .find(|format| format.tag() == tag)
            .ok_or_else(|| ErrorKind::UnsupportedFormat(s.to_string()).into())
    }
}

#[cfg(test)]
mod tests {
    use crate::Compression;
    use crate::error::ErrorKind;
    use rstest::rstest;

    #[rstest]
    #[case("none", Compression::None)]
    #[case("gz", Compression::Gzip)]
    #[case("GZ", Compression::Gzip)]
    #[case("bz2", Compression::Bzip2)]
    #[case(" tar.gz ", Compression::TarGzip)]
    #[case("Tar.Bz2", Compression::TarBzip2)]
    fn test_parse(#[case] tag: &str, #[case] expected: Compression) {
        assert_eq!(tag.parse::<Compression>().unwrap(), expected);
    }

    #[rstest]
    #[case("zip")]
    #[case("gzip")]
    #[case("tar.xz")]
    #[case("")]
    fn test_parse_unsupported(#[case] tag: &str) {
        let err = tag.parse::<Compression>().unwrap_err();
        assert_eq!(*err, ErrorKind::UnsupportedFormat(tag.to_string()));
    }

    #[test]
    fn test_display_is_the_tag() {
        for format in [Compression::None, Compression::Gzip, Compression::Bzip2, Compression::TarGzip, Compression::TarBzip2]
        {
            assert_eq!(format.to_string(), format.tag());
            assert_eq!(format.tag().parse::<Compression>().unwrap(), format);
        }
    }
}
