//! Substring search over repository metadata.

use crate::error::Result;
use crate::{Catalog, RepositoryPath, Snapshot};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// Which fields a search looks at, and how it compares them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    pub case_sensitive: bool,
    pub in_tags: bool,
    pub in_title: bool,
    pub in_name: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            in_tags: true,
            in_title: true,
            in_name: true,
        }
    }
}

/// Paths whose selected fields contain every one of `queries`.
///
/// Tags, title and path segments are concatenated into one haystack (tags and
/// segments space-separated), so a query may span the boundary between
/// fields. An empty query list matches everything. Results follow the
/// snapshot's path order.
///
/// ```
/// use serverfiles_catalog::{FileMetadata, RepositoryPath, SearchOptions, Snapshot, search};
///
/// let mut snapshot = Snapshot::new();
/// snapshot.insert("GO/taxonomy.pickle".parse().unwrap(), FileMetadata {
///     tags: Some(vec!["gene ontology".into()]),
///     ..Default::default()
/// });
/// snapshot.insert("Affy/chip.tab".parse().unwrap(), FileMetadata::default());
///
/// let found = search(&snapshot, &["ONTOLOGY", "pickle"], &SearchOptions::default());
/// assert_eq!(found, ["GO/taxonomy.pickle".parse::<RepositoryPath>().unwrap()]);
/// ```
pub fn search<S: AsRef<str>>(snapshot: &Snapshot, queries: &[S], options: &SearchOptions) -> Vec<RepositoryPath> {
    let queries: Vec<String> = queries.iter().map(|query| normalize(query.as_ref(), options)).collect();
    snapshot
        .iter()
        .filter(|(path, metadata)| {
            let mut haystack = String::new();
            if options.in_tags {
                haystack.push_str(&metadata.tags().join(" "));
            }
            if options.in_title {
                haystack.push_str(metadata.title());
            }
            if options.in_name {
                haystack.push_str(&path.segments().join(" "));
            }
            let haystack = normalize(&haystack, options);
            queries.iter().all(|query| haystack.contains(query.as_str()))
        })
        .map(|(path, _)| path.clone())
        .collect()
}

fn normalize(value: &str, options: &SearchOptions) -> String {
    if options.case_sensitive { value.to_string() } else { value.to_lowercase() }
}

/// Searches a catalog, downloading its metadata at most once.
///
/// The first [`search`](Self::search) fetches metadata for every remote file;
/// later searches reuse that snapshot for the lifetime of the session.
pub struct SearchSession<C: ?Sized> {
    catalog: Arc<C>,
    snapshot: Mutex<Option<Arc<Snapshot>>>,
}

impl<C: Catalog + ?Sized> SearchSession<C> {
    pub fn new(catalog: Arc<C>) -> Self {
        Self { catalog, snapshot: Mutex::new(None) }
    }

    /// The cached snapshot, loading it on first use.
    pub fn snapshot(&self) -> Result<Arc<Snapshot>> {
        let mut guard = self.snapshot.lock();
        if let Some(snapshot) = guard.as_ref() {
            return Ok(Arc::clone(snapshot));
        }
        debug!(catalog = self.catalog.name(), "loading metadata snapshot");
        let snapshot = Arc::new(self.catalog.all_metadata(None)?);
        *guard = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    pub fn search<S: AsRef<str>>(&self, queries: &[S], options: &SearchOptions) -> Result<Vec<RepositoryPath>> {
        Ok(search(&*self.snapshot()?, queries, options))
    }
}
