//! Repository paths.
//!
//! A [`RepositoryPath`] names one remote file and, at the same time, its
//! location inside a local mirror. Segments are validated once on
//! construction so that neither use can escape its root.

use crate::error::{ErrorKind, Result};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

/// An ordered, non-empty sequence of path segments (domain, then name).
///
/// Two paths are equal iff their segments are equal. Ordering is
/// lexicographic by segment, so paths can key a [`BTreeMap`](std::collections::BTreeMap).
///
/// # Examples
///
/// ```
/// use serverfiles_catalog::RepositoryPath;
///
/// let path = RepositoryPath::new(["GO", "taxonomy.pickle"]).unwrap();
/// assert_eq!(path.to_string(), "GO/taxonomy.pickle");
/// assert_eq!(path, "GO/taxonomy.pickle".parse().unwrap());
/// // Segments that could escape the mirror root are rejected.
/// assert!(RepositoryPath::new(["..", "passwd"]).is_err());
/// assert!(RepositoryPath::new(Vec::<String>::new()).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepositoryPath(Vec<String>);

impl RepositoryPath {
    pub fn new<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            exn::bail!(ErrorKind::InvalidPath(String::new()));
        }
        if let Some(bad) = segments.iter().find(|s| !is_valid_segment(s)) {
            exn::bail!(ErrorKind::InvalidPath(bad.clone()));
        }
        Ok(Self(segments))
    }

    /// Rebuild a repository path from a path relative to a mirror root.
    pub fn from_relative_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut segments = Vec::new();
        for component in path.components() {
            match component {
                Component::Normal(s) => match s.to_str() {
                    Some(s) => segments.push(s.to_string()),
                    None => exn::bail!(ErrorKind::InvalidPath(path.to_string_lossy().into_owned())),
                },
                Component::CurDir => {},
                _ => exn::bail!(ErrorKind::InvalidPath(path.to_string_lossy().into_owned())),
            }
        }
        Self::new(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// The final segment (the file name).
    pub fn name(&self) -> &str {
        // Never empty, enforced by the constructor.
        self.0.last().map(String::as_str).unwrap_or_default()
    }

    /// Append one segment.
    pub fn join(&self, segment: impl Into<String>) -> Result<Self> {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self::new(segments)
    }

    /// Component-wise prefix test (`a/b` is a prefix of `a/b/c`, not of `a/bc`).
    pub fn starts_with(&self, prefix: &RepositoryPath) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// The same path as a relative filesystem path.
    pub fn to_relative_path(&self) -> PathBuf {
        self.0.iter().collect()
    }
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty() && segment != "." && segment != ".." && !segment.contains(['/', '\\', '\0'])
}

impl Display for RepositoryPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.0.join("/"))
    }
}

impl FromStr for RepositoryPath {
    type Err = crate::error::Error;
    /// Parse `domain/name`; leading, trailing and doubled slashes are ignored.
    fn from_str(s: &str) -> Result<Self> {
        Self::new(s.split('/').filter(|segment| !segment.is_empty()))
    }
}
