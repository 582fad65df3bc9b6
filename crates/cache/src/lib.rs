//! Local mirror of a serverfiles repository.
//!
//! [`LocalCache`] keeps copies of remote files under a root directory, each
//! next to a JSON sidecar holding the metadata it was fetched with. It
//! answers one question: is the local copy of a file current, and if not,
//! fetch and prepare it (decompressing or unpacking as the metadata asks).
//!
//! # Consistency
//! - Files are downloaded to temporary files in the destination directory
//!   and renamed into place; a failed download leaves nothing at the final
//!   path and keeps any previous version.
//! - The sidecar is written after the artifact is in place, so an entry
//!   whose update was interrupted compares as stale.
//! - Mutations of one path are serialized through a [`LockTable`]; separate
//!   paths never contend.
//!
//! The filesystem is the only source of truth: nothing about the cache is
//! held in memory besides the locks.

pub mod error;
mod local;
mod lock;
mod sidecar;

pub use crate::local::{FetchOptions, LocalCache};
pub use crate::lock::{LockTable, PathLock};
