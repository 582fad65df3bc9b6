//! In-memory catalog for testing.

use crate::download::Download;
use crate::error::{ErrorKind, Result};
use crate::{Catalog, FileMetadata, RepositoryPath};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Read};
use std::thread;
use std::time::Duration;

/// How a [`MockCatalog`] fetch should misbehave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// Answer with this HTTP status (`404` maps to `NotFound`).
    Status(u16),
    /// Deliver half of the bytes, then fail the read.
    BrokenStream,
}

#[derive(Debug, Clone)]
struct MockFile {
    data: Vec<u8>,
    metadata: FileMetadata,
}

/// In-memory catalog for testing.
///
/// Files and their metadata live behind locks, so a test can publish a newer
/// version while a cache holds the catalog. Every successful or failed fetch
/// is counted per path.
///
/// # Examples
///
/// ```
/// use serverfiles_catalog::{Catalog, FileMetadata, MockCatalog};
///
/// let catalog = MockCatalog::default().with_file("demo/a.txt", "alpha", FileMetadata::default());
/// let path = "demo/a.txt".parse().unwrap();
/// let mut body = Vec::new();
/// catalog.fetch(&path).unwrap().write_to(&mut body, None).unwrap();
/// assert_eq!(body, b"alpha");
/// assert_eq!(catalog.fetch_count(&path), 1);
/// ```
#[derive(Debug, Default)]
pub struct MockCatalog {
    files: RwLock<BTreeMap<RepositoryPath, MockFile>>,
    failures: RwLock<HashMap<RepositoryPath, MockFailure>>,
    fetches: Mutex<HashMap<RepositoryPath, usize>>,
    delay: Option<Duration>,
}

fn parse(path: &str) -> RepositoryPath {
    match path.parse() {
        Ok(path) => path,
        // Deliberate: a broken test fixture should fail loudly.
        Err(e) => panic!("MockCatalog: invalid path {path}: {e:?}"),
    }
}

impl MockCatalog {
    /// Add (or replace) a file. Panics if `path` is not a valid repository path.
    pub fn with_file(self, path: &str, data: impl Into<Vec<u8>>, metadata: FileMetadata) -> Self {
        self.publish(path, data, metadata);
        self
    }

    /// Sleep this long before every fetch returns, widening race windows.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Add or replace a file on a shared catalog.
    pub fn publish(&self, path: &str, data: impl Into<Vec<u8>>, metadata: FileMetadata) {
        let file = MockFile { data: data.into(), metadata };
        self.files.write().insert(parse(path), file);
    }

    pub fn unpublish(&self, path: &str) {
        self.files.write().remove(&parse(path));
    }

    /// Make fetches of `path` fail (or succeed again, with `None`).
    pub fn set_failure(&self, path: &str, failure: Option<MockFailure>) {
        let path = parse(path);
        let mut failures = self.failures.write();
        match failure {
            Some(failure) => failures.insert(path, failure),
            None => failures.remove(&path),
        };
    }

    /// Number of times `path` was fetched.
    pub fn fetch_count(&self, path: &RepositoryPath) -> usize {
        self.fetches.lock().get(path).copied().unwrap_or_default()
    }

    pub fn total_fetches(&self) -> usize {
        self.fetches.lock().values().sum()
    }
}

impl Catalog for MockCatalog {
    fn name(&self) -> &str {
        "mock"
    }

    fn list(&self, prefix: Option<&RepositoryPath>, recursive: bool) -> Result<Vec<RepositoryPath>> {
        let depth = prefix.map_or(0, |p| p.segments().len());
        let files = self.files.read();
        let found: Vec<RepositoryPath> = files
            .keys()
            .filter(|path| prefix.is_none_or(|prefix| path.starts_with(prefix) && *path != prefix))
            .filter(|path| recursive || path.segments().len() == depth + 1)
            .cloned()
            .collect();
        if let Some(prefix) = prefix
            && !files.keys().any(|path| path.starts_with(prefix) && path != prefix)
        {
            exn::bail!(ErrorKind::NotFound(prefix.to_string()));
        }
        Ok(found)
    }

    fn metadata(&self, path: &RepositoryPath) -> Result<FileMetadata> {
        Ok(self.files.read().get(path).map(|file| file.metadata.clone()).unwrap_or_default())
    }

    fn fetch(&self, path: &RepositoryPath) -> Result<Download> {
        *self.fetches.lock().entry(path.clone()).or_default() += 1;
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        let failure = self.failures.read().get(path).copied();
        let file = self.files.read().get(path).cloned();
        match (failure, file) {
            (Some(MockFailure::Status(404)), _) | (None, None) => {
                exn::bail!(ErrorKind::NotFound(path.to_string()))
            },
            (Some(MockFailure::Status(status)), _) => exn::bail!(ErrorKind::TransferFailed(status)),
            (Some(MockFailure::BrokenStream), file) => {
                let data = file.map(|file| file.data).unwrap_or_default();
                let size = data.len() as u64;
                let half = data[..data.len() / 2].to_vec();
                Ok(Download::new(size, Cursor::new(half).chain(BrokenReader)))
            },
            (None, Some(file)) => Ok(Download::new(file.data.len() as u64, Cursor::new(file.data))),
        }
    }
}

struct BrokenReader;

impl Read for BrokenReader {
    fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
        Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "connection reset by mock"))
    }
}
