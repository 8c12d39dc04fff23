//! Deduplicating uploads of files, directories and streams.

use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use blobstore_digest::Sha256Hash;
use blobstore_tar::PackError;

use crate::blob::{blob_from_reader, BlobBuilder, BlobError, CompressionLevel, LocalBlob, SealedBlob};
use crate::config::BlobStoreConfig;
use crate::key::ObjectKey;
use crate::remote::{RemoteError, RemoteStore};
use crate::reporter::UploadReporter;

/// Errors returned by the upload operations of [`BlobClient`]. Each variant
/// names the stage that failed.
#[derive(thiserror::Error, Debug)]
#[allow(missing_docs)]
pub enum UploadError {
    #[error("failed to prepare a local blob")]
    Prepare(#[source] BlobError),

    #[error("failed to archive {}", path.display())]
    Tar {
        path: PathBuf,
        #[source]
        source: PackError,
    },

    #[error("failed to write to the local blob")]
    Write(#[source] BlobError),

    #[error("failed to flush the local blob")]
    Flush(#[source] BlobError),

    #[error("failed to read {}", path.display())]
    ReadSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to upload {key}")]
    Upload {
        digest: Sha256Hash,
        key: ObjectKey,
        #[source]
        source: RemoteError,
    },
}

impl UploadError {
    /// The digest of the content, if it was computed before the failure.
    pub fn digest(&self) -> Option<&Sha256Hash> {
        match self {
            UploadError::Upload { digest, .. } => Some(digest),
            _ => None,
        }
    }
}

impl From<BlobError> for UploadError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::Write(_) => UploadError::Write(err),
            BlobError::Flush(_) => UploadError::Flush(err),
            BlobError::TempStorageUnavailable(_) | BlobError::InvalidCompressionLevel(_) => {
                UploadError::Prepare(err)
            }
        }
    }
}

/// Uploads content-addressed blobs to a [`RemoteStore`].
///
/// Every upload compresses the content into a local spool file while hashing
/// it, asks the store whether an object of the same key and size already
/// exists, and only sends the blob if it does not. The spool file is removed
/// on every path.
pub struct BlobClient<S> {
    store: S,
    blob_builder: BlobBuilder,
    reporter: Option<Arc<dyn UploadReporter>>,
}

impl<S: RemoteStore> BlobClient<S> {
    /// Creates a client with default blob settings.
    pub fn new(store: S) -> Self {
        Self {
            store,
            blob_builder: BlobBuilder::new(),
            reporter: None,
        }
    }

    /// Creates a client using the blob settings of `config`. The remote part
    /// of the configuration is not used; `store` is taken as is.
    pub fn with_config(store: S, config: &BlobStoreConfig) -> Self {
        let mut client = Self::new(store).with_compression_level(config.compression_level());
        if let Some(temp_dir) = &config.temp_dir {
            client = client.with_tempdir(temp_dir);
        }
        client
    }

    /// Sets the gzip level of new blobs.
    #[must_use]
    pub fn with_compression_level(mut self, level: CompressionLevel) -> Self {
        self.blob_builder = self.blob_builder.compression_level(level);
        self
    }

    /// Places spool files in `tempdir`.
    #[must_use]
    pub fn with_tempdir(mut self, tempdir: impl Into<PathBuf>) -> Self {
        self.blob_builder = self.blob_builder.tempdir(tempdir);
        self
    }

    /// Reports upload progress to `reporter`.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn UploadReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Where temporary files of this client go, `None` for the system
    /// default.
    pub fn temp_dir(&self) -> Option<&Path> {
        self.blob_builder.temp_dir()
    }

    /// Returns true only if the store holds an object under the blob's key
    /// whose size equals the blob's compressed size.
    ///
    /// Any failure to determine this counts as "not a duplicate" and is only
    /// logged, so a flaky store results in a redundant upload rather than a
    /// missing object.
    pub fn check_duplicate(&self, blob: &SealedBlob) -> bool {
        let key = blob.key();
        match self.store.stat(&key) {
            Ok(Some(stat)) if stat.size == blob.size() => true,
            Ok(Some(stat)) => {
                tracing::debug!(
                    "{key} exists with size {} but the local blob has {} bytes",
                    stat.size,
                    blob.size()
                );
                false
            }
            Ok(None) => false,
            Err(err) => {
                tracing::warn!("failed to stat {key}, assuming it is missing: {err}");
                false
            }
        }
    }

    /// Sends the blob to the store under its key.
    ///
    /// If sending fails the object is deleted, best effort, so a partial
    /// upload cannot be mistaken for a duplicate later. The returned error is
    /// always the upload error. The spool file is left alone.
    pub fn upload_blob(&self, blob: &SealedBlob) -> Result<(), UploadError> {
        let key = blob.key();
        let upload_error = |source: RemoteError| UploadError::Upload {
            digest: *blob.hash(),
            key: key.clone(),
            source,
        };

        let mut file = blob
            .open()
            .map_err(|err| upload_error(RemoteError::Io(err)))?;

        let total = blob.size();
        let index = self
            .reporter
            .as_deref()
            .map(|reporter| reporter.on_upload_start(&key, total));
        let mut on_progress = |sent: u64| {
            if let (Some(reporter), Some(index)) = (self.reporter.as_deref(), index) {
                reporter.on_upload_progress(index, sent, total);
            }
        };

        let result = self
            .store
            .put(&key, &mut file, total, &blob.metadata(), &mut on_progress);

        if let (Some(reporter), Some(index)) = (self.reporter.as_deref(), index) {
            reporter.on_upload_complete(index);
        }

        match result {
            Ok(_) => {
                tracing::info!("uploaded {key} ({total} bytes)");
                Ok(())
            }
            Err(err) => {
                if let Err(delete_err) = self.store.delete(&key) {
                    tracing::warn!("failed to delete {key} after a failed upload: {delete_err}");
                }
                Err(upload_error(err))
            }
        }
    }

    /// Packs the directory at `path` into a blob and uploads it unless the
    /// store already has it. Returns the digest of the tar stream.
    pub fn upload_directory(&self, path: &Path) -> Result<Sha256Hash, UploadError> {
        let reference = reference_name(path);
        self.upload_packed(path, &reference, |blob| {
            blobstore_tar::pack_directory(path, blob).map(|_| ())
        })
    }

    /// Converts the zip archive at `path` into a directory blob and uploads
    /// it unless the store already has it.
    pub fn upload_zip(&self, path: &Path) -> Result<Sha256Hash, UploadError> {
        let reference = reference_name(path);
        self.upload_packed(path, &reference, |blob| {
            let file = fs_err::File::open(path)?;
            blobstore_tar::convert_zip_to_tar(BufReader::new(file), blob).map(|_| ())
        })
    }

    /// Uploads the file at `path` as a single-file blob. The file name is
    /// used as the reference.
    pub fn upload_file(&self, path: &Path) -> Result<Sha256Hash, UploadError> {
        let mut file = fs_err::File::open(path).map_err(|source| UploadError::ReadSource {
            path: path.to_path_buf(),
            source,
        })?;
        self.upload_reader(&mut file, &reference_name(path))
    }

    /// Uploads everything read from `reader` as a single-file blob.
    pub fn upload_reader(
        &self,
        reader: &mut impl Read,
        reference: &str,
    ) -> Result<Sha256Hash, UploadError> {
        let builder = self.blob_builder.clone().reference(reference);
        let blob = blob_from_reader(&builder, reader)?;
        self.finish_upload(blob)
    }

    fn upload_packed(
        &self,
        path: &Path,
        reference: &str,
        pack: impl FnOnce(&mut LocalBlob) -> Result<(), PackError>,
    ) -> Result<Sha256Hash, UploadError> {
        let mut blob = self
            .blob_builder
            .clone()
            .directory(true)
            .reference(reference)
            .create()
            .map_err(UploadError::Prepare)?;

        if let Err(source) = pack(&mut blob) {
            blob.discard();
            return Err(UploadError::Tar {
                path: path.to_path_buf(),
                source,
            });
        }

        // `close` finishes the encoder, a flush here would emit an extra
        // sync block into the gzip stream.
        let blob = blob.close().map_err(UploadError::Flush)?;
        self.finish_upload(blob)
    }

    /// Deduplicates and uploads a sealed blob, then removes its spool file.
    fn finish_upload(&self, blob: SealedBlob) -> Result<Sha256Hash, UploadError> {
        let digest = *blob.hash();
        let key = blob.key();

        let result = if self.check_duplicate(&blob) {
            tracing::info!("{key} already exists, skipping upload");
            if let Some(reporter) = self.reporter.as_deref() {
                reporter.on_duplicate(&key);
            }
            Ok(())
        } else {
            self.upload_blob(&blob)
        };

        let spool = blob.path().to_path_buf();
        if let Err(err) = blob.remove() {
            tracing::warn!("failed to remove spool file {}: {err}", spool.display());
        }

        result.map(|()| digest)
    }
}

/// The reference recorded for `path`: its final component, or the path
/// itself if it has none.
fn reference_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.to_string_lossy(), |name| name.to_string_lossy())
        .into_owned()
}
