//! Per-path mutual exclusion.
//!
//! Every mutating cache operation holds the lock of the local path it
//! touches. Locks are keyed by canonical path, so two spellings of the same
//! location (a symlinked root, say) share one lock, and they are reentrant,
//! so an operation may call another that takes the same lock.

use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};
use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

type LockMap = HashMap<PathBuf, Arc<ReentrantMutex<()>>>;

/// Registry of per-path locks.
///
/// Cloning is cheap and yields a handle to the same registry; caches that
/// must exclude each other have to be built with clones of one table.
/// Entries are created on first use and never removed.
///
/// # Examples
///
/// ```
/// use serverfiles_cache::LockTable;
/// use std::path::Path;
///
/// let locks = LockTable::new();
/// let lock = locks.lock_for(Path::new("/srv/mirror/GO/taxonomy.pickle"));
/// let _held = lock.lock();
/// // Same thread, same path: reentrant.
/// let _again = lock.lock();
/// ```
#[derive(Debug, Clone, Default)]
pub struct LockTable {
    locks: Arc<Mutex<LockMap>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock guarding `path`, creating it if needed.
    ///
    /// Only the lookup happens under the registry mutex; acquiring the
    /// returned lock is a separate step, so waiting on one path never
    /// blocks lookups for another.
    pub fn lock_for(&self, path: &Path) -> PathLock {
        let key = canonical_key(path);
        let mutex = Arc::clone(self.locks.lock().entry(key.clone()).or_default());
        PathLock { path: key, mutex }
    }

    /// Number of distinct paths that have been locked so far.
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle to the lock of one canonical path.
#[derive(Debug, Clone)]
pub struct PathLock {
    path: PathBuf,
    mutex: Arc<ReentrantMutex<()>>,
}

impl PathLock {
    /// The canonical path this lock is keyed by.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Block until the lock is held. Released when the guard drops.
    pub fn lock(&self) -> ReentrantMutexGuard<'_, ()> {
        self.mutex.lock()
    }

    pub fn try_lock(&self) -> Option<ReentrantMutexGuard<'_, ()>> {
        self.mutex.try_lock()
    }
}

/// Canonicalize the deepest existing ancestor of `path` and re-attach the
/// components below it, so paths that don't exist yet still get a stable key.
fn canonical_key(path: &Path) -> PathBuf {
    let mut existing = path;
    let mut missing: Vec<OsString> = Vec::new();
    loop {
        if let Ok(canonical) = fs::canonicalize(existing) {
            return missing.iter().rev().fold(canonical, |key, name| key.join(name));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            },
            _ => return path.to_path_buf(),
        }
    }
}
