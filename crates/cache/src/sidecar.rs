//! Sidecar metadata files (`<artifact>.info`).

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serverfiles_catalog::FileMetadata;
use std::ffi::OsString;
use std::fs;
use std::io::{BufWriter, ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub(crate) const SIDECAR_SUFFIX: &str = ".info";
pub(crate) const BLOB_SUFFIX: &str = ".tmp";

/// `path` with `suffix` appended to its final component.
pub(crate) fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

pub(crate) fn sidecar_path(artifact: &Path) -> PathBuf {
    with_suffix(artifact, SIDECAR_SUFFIX)
}

/// Read the sidecar of `artifact`.
///
/// A missing sidecar is [`NotFound`](ErrorKind::NotFound) (naming the
/// artifact); one that doesn't parse is
/// [`MetadataCorrupt`](ErrorKind::MetadataCorrupt) (naming the sidecar).
pub(crate) fn read(artifact: &Path) -> Result<FileMetadata> {
    let sidecar = sidecar_path(artifact);
    let contents = match fs::read(&sidecar) {
        Ok(contents) => contents,
        Err(e) if e.kind() == IoErrorKind::NotFound => exn::bail!(ErrorKind::NotFound(artifact.to_path_buf())),
        Err(e) => return Err(ErrorKind::Io(e).into()),
    };
    serde_json::from_slice(&contents).or_raise(|| ErrorKind::MetadataCorrupt(sidecar))
}

/// Atomically replace the sidecar of `artifact` with `metadata`.
pub(crate) fn write(artifact: &Path, metadata: &FileMetadata) -> Result<()> {
    let sidecar = sidecar_path(artifact);
    let parent = sidecar.parent().ok_or_else(|| ErrorKind::InvalidPath(sidecar.clone()))?;
    let mut staged = NamedTempFile::new_in(parent).map_err(ErrorKind::from)?;
    {
        let mut writer = BufWriter::new(staged.as_file_mut());
        serde_json::to_writer(&mut writer, metadata).map_err(|e| ErrorKind::Io(e.into()))?;
        writer.flush().map_err(ErrorKind::from)?;
    }
    staged.persist(&sidecar).map_err(|e| ErrorKind::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let artifact = Path::new("/cache/demo/a.tar.gz");
        assert_eq!(sidecar_path(artifact), Path::new("/cache/demo/a.tar.gz.info"));
        assert_eq!(with_suffix(artifact, BLOB_SUFFIX), Path::new("/cache/demo/a.tar.gz.tmp"));
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("a.txt");
        let metadata: FileMetadata =
            serde_json::from_str(r#"{"datetime": "2020-01-01 00:00:00", "tags": ["t"], "custom": {"k": [1, 2]}}"#)
                .unwrap();
        write(&artifact, &metadata).unwrap();
        assert_eq!(read(&artifact).unwrap(), metadata);
        // Only the sidecar is left behind; the staging file was renamed.
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_missing_and_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("a.txt");
        let err = read(&artifact).unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(p) if p == &artifact));

        fs::write(sidecar_path(&artifact), "{not json").unwrap();
        let err = read(&artifact).unwrap_err();
        assert!(matches!(&*err, ErrorKind::MetadataCorrupt(p) if p == &sidecar_path(&artifact)));
    }
}
