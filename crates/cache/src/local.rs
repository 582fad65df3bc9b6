//! The local mirror.

use crate::error::{ErrorKind, Result};
use crate::lock::LockTable;
use crate::sidecar::{self, BLOB_SUFFIX, SIDECAR_SUFFIX, with_suffix};
use serverfiles_catalog::{CatalogHandle, FileMetadata, Progress, RepositoryPath, SearchOptions, Snapshot, search};
use serverfiles_compress::Compression;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::fs::{self, DirEntry};
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, warn};

enum WalkEntry {
    Entry(RepositoryPath),
    Descend(PathBuf),
    Skip,
}

/// How [`LocalCache::fetch`] and friends treat a download.
#[derive(Clone, Copy)]
pub struct FetchOptions<'a> {
    /// Materialize compressed files (decompress, or unpack tarballs).
    /// When `false` the raw bytes are stored as published.
    pub extract: bool,
    /// Let [`LocalCache::resolve`] download files that aren't cached yet.
    pub fetch_if_missing: bool,
    /// Observer for download progress.
    pub progress: Option<Progress<'a>>,
}

impl Default for FetchOptions<'_> {
    fn default() -> Self {
        Self { extract: true, fetch_if_missing: true, progress: None }
    }
}

impl Debug for FetchOptions<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("FetchOptions")
            .field("extract", &self.extract)
            .field("fetch_if_missing", &self.fetch_if_missing)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// A local mirror of a remote [`Catalog`](serverfiles_catalog::Catalog).
///
/// File `domain/name` is stored at `<root>/domain/name` (a file, or a
/// directory for unpacked tarballs) with its metadata in
/// `<root>/domain/name.info`. An entry exists only when both are present.
///
/// Mutating operations on one path hold that path's lock from the
/// [`LockTable`] the cache was built with. Downloads are staged in temporary
/// files and renamed into place, and the sidecar is written last, so a
/// reader never sees a partial file at a final path and an interrupted
/// update leaves an entry that reports itself stale.
///
/// # Examples
///
/// ```no_run
/// use serverfiles_cache::{FetchOptions, LocalCache, LockTable};
/// use serverfiles_catalog::HttpCatalog;
/// use std::sync::Arc;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let catalog = Arc::new(HttpCatalog::builder().build()?);
/// let cache = LocalCache::new("/var/cache/serverfiles", catalog, LockTable::new())?;
/// let path = "GO/taxonomy.pickle".parse()?;
/// let local = cache.resolve(&path, &FetchOptions::default())?;
/// println!("{}", local.display());
/// # Ok(())
/// # }
/// ```
pub struct LocalCache {
    root: PathBuf,
    catalog: CatalogHandle,
    locks: LockTable,
}

impl Debug for LocalCache {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("LocalCache")
            .field("root", &self.root)
            .field("catalog", &self.catalog.name())
            .finish_non_exhaustive()
    }
}

impl LocalCache {
    /// Open (creating if needed) a cache rooted at the absolute path `root`.
    pub fn new(root: impl AsRef<Path>, catalog: CatalogHandle, locks: LockTable) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::InvalidPath(root));
            }
        } else {
            fs::create_dir_all(&root).map_err(ErrorKind::from)?;
        }
        Ok(Self { root, catalog, locks })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn catalog(&self) -> &CatalogHandle {
        &self.catalog
    }

    /// Where `path` lives (or would live) on disk. Nothing is checked.
    pub fn local_path(&self, path: &RepositoryPath) -> PathBuf {
        self.root.join(path.to_relative_path())
    }

    /// Whether the remote has a newer version than the local copy.
    ///
    /// Anything that prevents a comparison counts as stale: no local entry,
    /// a corrupt sidecar, a missing or malformed timestamp on either side,
    /// or a remote that can't be asked.
    #[instrument(skip(self, path), fields(path = %path))]
    pub fn is_stale(&self, path: &RepositoryPath) -> bool {
        let local = match sidecar::read(&self.local_path(path)) {
            Ok(local) => local,
            Err(e) => {
                debug!(error = ?e, "no usable local metadata");
                return true;
            },
        };
        let Some(local_time) = local.modified() else {
            debug!("local timestamp missing or malformed");
            return true;
        };
        let remote = match self.catalog.metadata(path) {
            Ok(remote) => remote,
            Err(e) => {
                warn!(error = ?e, "remote metadata unavailable, assuming stale");
                return true;
            },
        };
        let Some(remote_time) = remote.modified() else {
            debug!("remote timestamp missing or malformed");
            return true;
        };
        remote_time > local_time
    }

    /// Download `path` and make it available locally, replacing any cached
    /// version. Returns the local path.
    #[instrument(skip(self, path, options), fields(path = %path, extract = options.extract))]
    pub fn fetch(&self, path: &RepositoryPath, options: &FetchOptions<'_>) -> Result<PathBuf> {
        let target = self.local_path(path);
        let lock = self.locks.lock_for(&target);
        let _guard = lock.lock();
        self.fetch_locked(path, &target, options)?;
        Ok(target)
    }

    fn fetch_locked(&self, path: &RepositoryPath, target: &Path, options: &FetchOptions<'_>) -> Result<()> {
        let metadata = self.catalog.metadata(path).map_err(ErrorKind::catalog)?;
        let compression = match metadata.compression.as_deref() {
            Some(tag) if options.extract => tag
                .parse::<Compression>()
                .map_err(|e| e.raise(ErrorKind::UnsupportedCompression(tag.to_string())))?,
            _ => Compression::None,
        };

        let parent = target.parent().ok_or_else(|| ErrorKind::InvalidPath(target.to_path_buf()))?;
        fs::create_dir_all(parent).map_err(ErrorKind::from)?;

        let download = self.catalog.fetch(path).map_err(ErrorKind::catalog)?;
        info!(size = download.size, %compression, "downloading");
        let mut staged = NamedTempFile::new_in(parent).map_err(ErrorKind::from)?;
        let written = download.write_to(staged.as_file_mut(), options.progress).map_err(ErrorKind::catalog)?;

        if compression == Compression::None {
            clear_conflicting(target, false)?;
            staged.persist(target).map_err(|e| ErrorKind::Io(e.error))?;
        } else {
            let blob = with_suffix(target, BLOB_SUFFIX);
            staged.persist(&blob).map_err(|e| ErrorKind::Io(e.error))?;
            let materialized = clear_conflicting(target, compression.is_archive())
                .and_then(|()| compression.materialize(&blob, target).map_err(ErrorKind::materialize));
            if let Err(e) = fs::remove_file(&blob) {
                warn!(blob = %blob.display(), error = %e, "failed to delete downloaded blob");
            }
            materialized?;
        }

        sidecar::write(target, &metadata)?;
        info!(written, "fetched");
        Ok(())
    }

    /// The local path of `path`, downloading it first when it isn't cached
    /// and `options.fetch_if_missing` is set.
    ///
    /// Concurrent callers for the same path download it once.
    #[instrument(skip(self, path, options), fields(path = %path))]
    pub fn resolve(&self, path: &RepositoryPath, options: &FetchOptions<'_>) -> Result<PathBuf> {
        let target = self.local_path(path);
        let lock = self.locks.lock_for(&target);
        let _guard = lock.lock();
        if options.fetch_if_missing && !target.exists() {
            return self.fetch(path, options);
        }
        Ok(target)
    }

    /// Every cached entry beneath `prefix` (the whole cache when `None`),
    /// sorted by path.
    ///
    /// Only complete entries are listed: the artifact and a parseable
    /// sidecar must both exist. The contents of unpacked tarballs are not
    /// searched for entries.
    pub fn enumerate(&self, prefix: Option<&RepositoryPath>) -> Result<Vec<RepositoryPath>> {
        let start = match prefix {
            Some(prefix) => self.local_path(prefix),
            None => self.root.clone(),
        };
        let mut stack = vec![start];
        let mut found = Vec::new();
        while let Some(current) = stack.pop() {
            let entries = match fs::read_dir(&current) {
                Ok(entries) => entries,
                // Nothing cached under this prefix, or the prefix is a file.
                Err(e) if matches!(e.kind(), IoErrorKind::NotFound | IoErrorKind::NotADirectory) => continue,
                Err(e) => return Err(ErrorKind::Io(e).into()),
            };
            for entry in entries {
                match self.walk_entry(&entry.map_err(ErrorKind::from)?) {
                    WalkEntry::Entry(path) => found.push(path),
                    WalkEntry::Descend(directory) => stack.push(directory),
                    WalkEntry::Skip => {},
                }
            }
        }
        found.sort();
        Ok(found)
    }

    fn walk_entry(&self, entry: &DirEntry) -> WalkEntry {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            return WalkEntry::Skip;
        };
        if file_type.is_dir() {
            // An unpacked tarball is an artifact, not part of the tree.
            if sidecar::sidecar_path(&path).is_file() {
                return WalkEntry::Skip;
            }
            return WalkEntry::Descend(path);
        }
        let Some(artifact) = path.to_str().and_then(|p| p.strip_suffix(SIDECAR_SUFFIX)).map(PathBuf::from) else {
            return WalkEntry::Skip;
        };
        if !file_type.is_file() || !artifact.exists() {
            return WalkEntry::Skip;
        }
        if let Err(e) = sidecar::read(&artifact) {
            debug!(sidecar = %path.display(), error = ?e, "skipping unreadable entry");
            return WalkEntry::Skip;
        }
        let relative = match artifact.strip_prefix(&self.root) {
            Ok(relative) => relative,
            Err(_) => return WalkEntry::Skip,
        };
        match RepositoryPath::from_relative_path(relative) {
            Ok(path) => WalkEntry::Entry(path),
            Err(_) => WalkEntry::Skip,
        }
    }

    /// The cached metadata of `path`.
    ///
    /// A corrupt sidecar is reported as [`NotFound`](ErrorKind::NotFound),
    /// with the [`MetadataCorrupt`](ErrorKind::MetadataCorrupt) cause kept in
    /// the error tree.
    pub fn metadata(&self, path: &RepositoryPath) -> Result<FileMetadata> {
        let target = self.local_path(path);
        sidecar::read(&target).map_err(|e| {
            if matches!(&*e, ErrorKind::MetadataCorrupt(_)) { e.raise(ErrorKind::NotFound(target.clone())) } else { e }
        })
    }

    /// Cached metadata for every entry beneath `prefix`.
    pub fn all_metadata(&self, prefix: Option<&RepositoryPath>) -> Result<Snapshot> {
        self.enumerate(prefix)?
            .into_iter()
            .map(|path| {
                let metadata = self.metadata(&path)?;
                Ok((path, metadata))
            })
            .collect()
    }

    /// Fetch `path` if it is stale. Returns whether a fetch happened.
    #[instrument(skip(self, path, options), fields(path = %path))]
    pub fn update(&self, path: &RepositoryPath, options: &FetchOptions<'_>) -> Result<bool> {
        if !self.is_stale(path) {
            debug!("up to date");
            return Ok(false);
        }
        self.fetch(path, options)?;
        Ok(true)
    }

    /// Update every cached entry beneath `prefix`. Returns how many were
    /// fetched. The first failed fetch aborts the run.
    pub fn update_all(&self, prefix: Option<&RepositoryPath>, options: &FetchOptions<'_>) -> Result<usize> {
        let mut updated = 0;
        for path in self.enumerate(prefix)? {
            if self.update(&path, options)? {
                updated += 1;
            }
        }
        info!(updated, "update complete");
        Ok(updated)
    }

    /// Search cached metadata; see [`search`](serverfiles_catalog::search).
    pub fn search<S: AsRef<str>>(&self, queries: &[S], options: &SearchOptions) -> Result<Vec<RepositoryPath>> {
        Ok(search(&self.all_metadata(None)?, queries, options))
    }

    /// Delete a cached entry.
    ///
    /// Fails with [`NotFound`](ErrorKind::NotFound), touching nothing, when
    /// there is no sidecar. Otherwise the artifact (a whole directory for
    /// unpacked tarballs) and then the sidecar are deleted; a failure to
    /// delete either is logged and doesn't stop the other.
    #[instrument(skip(self, path), fields(path = %path))]
    pub fn remove(&self, path: &RepositoryPath) -> Result<()> {
        let target = self.local_path(path);
        let lock = self.locks.lock_for(&target);
        let _guard = lock.lock();
        let sidecar = sidecar::sidecar_path(&target);
        if !sidecar.is_file() {
            exn::bail!(ErrorKind::NotFound(target));
        }
        if let Err(e) = remove_artifact(&target) {
            warn!(artifact = %target.display(), error = %e, "failed to delete cached file");
        }
        if let Err(e) = fs::remove_file(&sidecar) {
            warn!(sidecar = %sidecar.display(), error = %e, "failed to delete metadata");
        }
        info!("removed");
        Ok(())
    }
}

fn remove_artifact(target: &Path) -> std::io::Result<()> {
    match fs::symlink_metadata(target) {
        Ok(metadata) if metadata.is_dir() => fs::remove_dir_all(target),
        Ok(_) => fs::remove_file(target),
        Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Make room at `target` when a new version changes its kind (file versus
/// unpacked directory).
fn clear_conflicting(target: &Path, expect_directory: bool) -> Result<()> {
    let Ok(metadata) = fs::symlink_metadata(target) else {
        return Ok(());
    };
    if metadata.is_dir() != expect_directory {
        debug!(target = %target.display(), "replacing artifact of a different kind");
        remove_artifact(target).map_err(ErrorKind::from)?;
    }
    Ok(())
}
