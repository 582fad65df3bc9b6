//! Turning a downloaded blob into its final, usable form.

use crate::Compression;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::instrument;

const READ_BUFFER_SIZE: usize = 1024 * 1024;

impl Compression {
    /// Materialize the blob at `blob` into `target`.
    ///
    /// - Tarballs: `target` is created as a directory (it may already exist)
    ///   and the whole archive is unpacked into it. A failure part-way through
    ///   leaves whatever was unpacked so far; there is no rollback.
    /// - Single-file formats: the decompressed stream is staged in a
    ///   temporary file next to `target` and renamed over it, so `target` is
    ///   never observed half-written.
    ///
    /// The blob is only read. Its handle is closed before returning, leaving
    /// the caller free to delete it.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use serverfiles_compress::Compression;
    /// use std::path::Path;
    ///
    /// let format: Compression = "gz".parse().unwrap();
    /// format.materialize(Path::new("genome.txt.tmp"), Path::new("genome.txt")).unwrap();
    /// std::fs::remove_file("genome.txt.tmp").unwrap();
    /// ```
    #[instrument(skip_all, fields(format = %self, blob = %blob.display(), target = %target.display()))]
    pub fn materialize(&self, blob: &Path, target: &Path) -> Result<()> {
        let reader = BufReader::with_capacity(READ_BUFFER_SIZE, File::open(blob).or_raise(|| ErrorKind::Io)?);

        if self.is_archive() {
            fs::create_dir_all(target).or_raise(|| ErrorKind::Io)?;
            let mut archive = tar::Archive::new(self.wrap_reader(reader));
            archive.unpack(target).or_raise(|| ErrorKind::InvalidData)?;
            tracing::debug!("expanded archive");
            return Ok(());
        }

        let parent = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut staged = NamedTempFile::new_in(parent).or_raise(|| ErrorKind::Io)?;
        let written = self.decompress_stream(reader, staged.as_file_mut())?;
        staged.persist(target).or_raise(|| ErrorKind::Io)?;
        tracing::debug!(written, "decompressed file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::Compression;
    use crate::error::ErrorKind;
    use rstest::rstest;
    use std::fs;
    use std::path::Path;

    fn tarball(format: Compression, files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut output = Vec::new();
        {
            let mut builder = tar::Builder::new(format.wrap_writer(&mut output));
            for (name, data) in files {
                let mut header = tar::Header::new_gnu();
                header.set_size(data.len() as u64);
                header.set_mode(0o644);
                header.set_cksum();
                builder.append_data(&mut header, name, *data).unwrap();
            }
            builder.into_inner().unwrap();
        }
        output
    }

    #[rstest]
    #[case(Compression::Gzip)]
    #[case(Compression::Bzip2)]
    #[case(Compression::None)]
    fn test_single_file(#[case] format: Compression) {
        let dir = tempfile::tempdir().unwrap();
        let blob = dir.path().join("data.txt.tmp");
        let target = dir.path().join("data.txt");
        fs::write(&blob, format.compress(b"decompressed bytes").unwrap()).unwrap();

        format.materialize(&blob, &target).unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"decompressed bytes");
        // The blob is left for the caller to remove.
        assert!(blob.exists());
    }

    #[rstest]
    #[case(Compression::TarGzip)]
    #[case(Compression::TarBzip2)]
    fn test_archive_expands_into_directory(#[case] format: Compression) {
        let dir = tempfile::tempdir().unwrap();
        let blob = dir.path().join("bundle.tmp");
        let target = dir.path().join("bundle");
        fs::write(&blob, tarball(format, &[("a.txt", &b"alpha"[..]), ("nested/b.txt", &b"beta"[..])])).unwrap();

        format.materialize(&blob, &target).unwrap();

        assert!(target.is_dir());
        assert_eq!(fs::read(target.join("a.txt")).unwrap(), b"alpha");
        assert_eq!(fs::read(target.join("nested/b.txt")).unwrap(), b"beta");
    }

    #[test]
    fn test_archive_into_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let blob = dir.path().join("bundle.tmp");
        let target = dir.path().join("bundle");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("old.txt"), b"left alone").unwrap();
        fs::write(&blob, tarball(Compression::TarGzip, &[("new.txt", &b"fresh"[..])])).unwrap();

        Compression::TarGzip.materialize(&blob, &target).unwrap();

        assert_eq!(fs::read(target.join("new.txt")).unwrap(), b"fresh");
        assert_eq!(fs::read(target.join("old.txt")).unwrap(), b"left alone");
    }

    #[test]
    fn test_corrupt_blob_leaves_no_target() {
        let dir = tempfile::tempdir().unwrap();
        let blob = dir.path().join("data.tmp");
        let target = dir.path().join("data");
        fs::write(&blob, b"definitely not gzip").unwrap();

        let err = Compression::Gzip.materialize(&blob, &target).unwrap_err();
        assert_eq!(*err, ErrorKind::InvalidData);
        assert!(!target.exists());
        // Only the blob remains; the staging file was cleaned up.
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_missing_blob() {
        let dir = tempfile::tempdir().unwrap();
        let err = Compression::Gzip.materialize(&dir.path().join("missing"), Path::new("unused")).unwrap_err();
        assert_eq!(*err, ErrorKind::Io);
    }
}
