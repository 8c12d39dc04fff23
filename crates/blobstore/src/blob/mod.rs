//! Local blobs: compressed, checksummed artifacts spooled to a temporary file.
//!
//! A [`LocalBlob`] is the write side. Bytes written to it are counted, hashed
//! and compressed into a private spool file in one pass. [`LocalBlob::close`]
//! seals it into a [`SealedBlob`] whose digest and sizes are final and which
//! can be read back for uploading.
//!
//! The spool file belongs to the blob from the moment it is created. Dropping
//! either type removes it; [`SealedBlob::remove`] does the same but reports
//! failures to the caller.

mod pipeline;

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use blobstore_digest::Sha256Hash;
use tempfile::TempPath;

use crate::key::{ObjectKey, UploadMetadata};
use pipeline::Pipeline;
pub use pipeline::CompressionLevel;

/// Errors that can occur while creating, filling or sealing a blob.
#[derive(thiserror::Error, Debug)]
#[allow(missing_docs)]
pub enum BlobError {
    #[error("could not create temporary spool file")]
    TempStorageUnavailable(#[source] std::io::Error),

    #[error("invalid compression level")]
    InvalidCompressionLevel(#[source] std::io::Error),

    #[error("failed to write to the blob")]
    Write(#[source] std::io::Error),

    #[error("failed to flush the blob")]
    Flush(#[source] std::io::Error),
}

/// Configures and creates [`LocalBlob`]s.
#[derive(Debug, Clone, Default)]
pub struct BlobBuilder {
    is_directory: bool,
    reference_name: String,
    compression_level: CompressionLevel,
    tempdir: Option<PathBuf>,
}

impl BlobBuilder {
    /// Creates a builder for a single-file blob with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the payload as a tar stream of a directory.
    pub fn directory(mut self, is_directory: bool) -> Self {
        self.is_directory = is_directory;
        self
    }

    /// Sets the human readable reference carried as metadata.
    pub fn reference(mut self, reference_name: impl Into<String>) -> Self {
        self.reference_name = reference_name.into();
        self
    }

    /// Sets the gzip level used for the spool file.
    pub fn compression_level(mut self, compression_level: CompressionLevel) -> Self {
        self.compression_level = compression_level;
        self
    }

    /// Places the spool file in `tempdir` instead of the system temp directory.
    pub fn tempdir(mut self, tempdir: impl Into<PathBuf>) -> Self {
        self.tempdir = Some(tempdir.into());
        self
    }

    /// The directory spool files are created in, if not the system default.
    pub fn temp_dir(&self) -> Option<&Path> {
        self.tempdir.as_deref()
    }

    /// Allocates the spool file and wires up the encode pipeline.
    pub fn create(&self) -> Result<LocalBlob, BlobError> {
        let level = self
            .compression_level
            .to_gzip_level()
            .map_err(BlobError::InvalidCompressionLevel)?;

        let mut builder = tempfile::Builder::new();
        builder.prefix("blob");
        let temp_file = match &self.tempdir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(BlobError::TempStorageUnavailable)?;
        let (file, spool) = temp_file.into_parts();

        tracing::debug!("created spool file {}", spool.display());

        Ok(LocalBlob {
            is_directory: self.is_directory,
            reference_name: self.reference_name.clone(),
            spool,
            pipeline: Pipeline::new(file, level),
        })
    }
}

/// A blob that is still being written.
///
/// Writes go through [`std::io::Write`]. Call [`LocalBlob::close`] to flush
/// the compressor and obtain the final digest and sizes.
pub struct LocalBlob {
    is_directory: bool,
    reference_name: String,
    spool: TempPath,
    pipeline: Pipeline<File>,
}

impl LocalBlob {
    /// Creates a single-file blob in the system temp directory.
    pub fn create() -> Result<Self, BlobError> {
        BlobBuilder::new().create()
    }

    /// Returns a builder to configure a new blob.
    pub fn builder() -> BlobBuilder {
        BlobBuilder::new()
    }

    /// True if the payload is a tar stream of a directory.
    pub fn is_directory(&self) -> bool {
        self.is_directory
    }

    /// The human readable reference of this blob.
    pub fn reference_name(&self) -> &str {
        &self.reference_name
    }

    /// The location of the spool file.
    pub fn path(&self) -> &Path {
        &self.spool
    }

    /// Compressed bytes written to the spool file so far. Only reflects data
    /// the compressor has emitted, see [`Write::flush`].
    pub fn size(&self) -> u64 {
        self.pipeline.compressed_size()
    }

    /// Bytes written into the blob so far.
    pub fn uncompressed_size(&self) -> u64 {
        self.pipeline.uncompressed_size()
    }

    /// Flushes the compressor and the spool file and seals the blob.
    ///
    /// If sealing fails the spool file is removed before the error is
    /// returned.
    pub fn close(self) -> Result<SealedBlob, BlobError> {
        let LocalBlob {
            is_directory,
            reference_name,
            spool,
            pipeline,
        } = self;

        let output = match pipeline.finish() {
            Ok(output) => output,
            Err(err) => {
                remove_spool(spool);
                return Err(BlobError::Flush(err));
            }
        };
        drop(output.sink);

        tracing::debug!(
            "sealed blob {:x} ({} bytes, {} uncompressed)",
            output.digest,
            output.compressed_size,
            output.uncompressed_size
        );

        Ok(SealedBlob {
            is_directory,
            reference_name,
            spool,
            size: output.compressed_size,
            uncompressed_size: output.uncompressed_size,
            digest: output.digest,
        })
    }

    /// Abandons the blob and removes its spool file, logging failures.
    pub fn discard(self) {
        let LocalBlob {
            spool, pipeline, ..
        } = self;
        drop(pipeline);
        remove_spool(spool);
    }
}

impl Write for LocalBlob {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.pipeline.write(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.pipeline.flush()
    }
}

/// A finished blob: the compressed payload on disk plus its digest and sizes.
#[derive(Debug)]
pub struct SealedBlob {
    is_directory: bool,
    reference_name: String,
    spool: TempPath,
    size: u64,
    uncompressed_size: u64,
    digest: Sha256Hash,
}

impl SealedBlob {
    /// The compressed size, i.e. the size of the spool file.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// The number of bytes written into the blob. For directory blobs this is
    /// the size of the tar stream.
    pub fn uncompressed_size(&self) -> u64 {
        self.uncompressed_size
    }

    /// The SHA-256 of the uncompressed content.
    pub fn hash(&self) -> &Sha256Hash {
        &self.digest
    }

    /// The remote key this blob is stored under.
    pub fn key(&self) -> ObjectKey {
        ObjectKey::for_digest(&self.digest)
    }

    /// The metadata attached to the remote object.
    pub fn metadata(&self) -> UploadMetadata {
        UploadMetadata {
            uncompressed_size: self.uncompressed_size,
            reference_name: self.reference_name.clone(),
            is_directory: self.is_directory,
        }
    }

    /// True if the payload is a tar stream of a directory.
    pub fn is_directory(&self) -> bool {
        self.is_directory
    }

    /// The human readable reference of this blob.
    pub fn reference_name(&self) -> &str {
        &self.reference_name
    }

    /// The location of the spool file.
    pub fn path(&self) -> &Path {
        &self.spool
    }

    /// Opens the compressed payload for reading.
    pub fn open(&self) -> std::io::Result<fs_err::File> {
        fs_err::File::open(self.path())
    }

    /// Deletes the spool file.
    pub fn remove(self) -> std::io::Result<()> {
        self.spool.close()
    }
}

/// Copies everything from `reader` into a new blob and seals it.
pub fn blob_from_reader(
    builder: &BlobBuilder,
    reader: &mut impl Read,
) -> Result<SealedBlob, BlobError> {
    let mut blob = builder.create()?;
    if let Err(err) = std::io::copy(reader, &mut blob) {
        blob.discard();
        return Err(BlobError::Write(err));
    }
    blob.close()
}

fn remove_spool(spool: TempPath) {
    let path = spool.to_path_buf();
    if let Err(err) = spool.close() {
        tracing::warn!("failed to remove spool file {}: {}", path.display(), err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_level_creates_no_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result = LocalBlob::builder()
            .tempdir(temp_dir.path())
            .compression_level(CompressionLevel::Numeric(42))
            .create();

        assert!(matches!(result, Err(BlobError::InvalidCompressionLevel(_))));
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_missing_tempdir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result = LocalBlob::builder()
            .tempdir(temp_dir.path().join("missing"))
            .create();
        assert!(matches!(result, Err(BlobError::TempStorageUnavailable(_))));
    }

    #[test]
    fn test_blob_from_reader() {
        let sealed = blob_from_reader(
            &BlobBuilder::new().reference("greeting.txt"),
            &mut &b"helloworld"[..],
        )
        .unwrap();

        assert_eq!(sealed.uncompressed_size(), 10);
        assert_eq!(sealed.reference_name(), "greeting.txt");
        assert!(!sealed.is_directory());
        assert_eq!(
            sealed.size(),
            std::fs::metadata(sealed.path()).unwrap().len()
        );
    }
}
