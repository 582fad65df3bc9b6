//! Remote repository catalog.
//!
//! A repository is a tree of files served as plain HTTP directory indexes.
//! Every published file `domain/name` sits next to a JSON document
//! `domain/name.info` describing it (see [`FileMetadata`]). The [`Catalog`]
//! trait is the boundary the local cache talks to; [`HttpCatalog`] is the
//! production transport.

mod download;
pub mod error;
mod http;
mod links;
mod metadata;
#[cfg(feature = "mock")]
mod mock;
mod path;
mod search;

pub use crate::download::{Download, Progress};
pub use crate::http::{DEFAULT_SERVER, DEFAULT_TIMEOUT, HttpCatalog, HttpCatalogBuilder};
pub use crate::links::extract_links;
pub use crate::metadata::FileMetadata;
#[cfg(feature = "mock")]
pub use crate::mock::{MockCatalog, MockFailure};
pub use crate::path::RepositoryPath;
pub use crate::search::{SearchOptions, SearchSession, search};

use crate::error::Result;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Metadata for every file under a prefix, keyed (and ordered) by path.
pub type Snapshot = BTreeMap<RepositoryPath, FileMetadata>;

pub type CatalogHandle = Arc<dyn Catalog + Send + Sync>;

/// Read-only access to a remote repository.
///
/// # Examples
///
/// ```no_run
/// use serverfiles_catalog::{Catalog, HttpCatalog, RepositoryPath};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let catalog = HttpCatalog::builder().build()?;
/// let path: RepositoryPath = "GO/taxonomy.pickle".parse()?;
/// let metadata = catalog.metadata(&path)?;
/// println!("{path} was published {:?}", metadata.datetime);
/// let mut file = std::fs::File::create("taxonomy.pickle")?;
/// catalog.fetch(&path)?.write_to(&mut file, None)?;
/// # Ok(())
/// # }
/// ```
pub trait Catalog {
    /// Human-readable name of the catalog, for logs.
    fn name(&self) -> &str;

    /// Files directly under `prefix` (the repository root when `None`), or
    /// every file beneath it when `recursive`. Order is unspecified.
    fn list(&self, prefix: Option<&RepositoryPath>, recursive: bool) -> Result<Vec<RepositoryPath>>;

    /// Published metadata for one file; an empty record when none exists.
    fn metadata(&self, path: &RepositoryPath) -> Result<FileMetadata>;

    /// Open a byte stream for one file.
    fn fetch(&self, path: &RepositoryPath) -> Result<Download>;

    /// Every file beneath `prefix` with its metadata.
    fn all_metadata(&self, prefix: Option<&RepositoryPath>) -> Result<Snapshot> {
        self.list(prefix, true)?
            .into_iter()
            .map(|path| {
                let metadata = self.metadata(&path)?;
                Ok((path, metadata))
            })
            .collect()
    }
}
