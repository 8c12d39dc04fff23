//! Fetching blobs back out of the store.
//!
//! Downloaded objects are decompressed and their SHA-256 is checked against
//! the requested digest before anything is written to the destination.

use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use blobstore_digest::{HashingReader, Sha256, Sha256Hash};
use blobstore_tar::UnpackError;
use flate2::read::GzDecoder;

use crate::client::BlobClient;
use crate::key::ObjectKey;
use crate::remote::{RemoteError, RemoteStore};

/// Errors returned by the download operations of [`BlobClient`].
#[derive(thiserror::Error, Debug)]
#[allow(missing_docs)]
pub enum DownloadError {
    #[error("failed to fetch {key}")]
    Remote {
        key: ObjectKey,
        #[source]
        source: RemoteError,
    },

    #[error("could not create a temporary file")]
    TempStorageUnavailable(#[source] std::io::Error),

    #[error("failed to decompress {0}")]
    Decompress(ObjectKey, #[source] std::io::Error),

    #[error("{key} has digest {actual:x} instead of {expected:x}")]
    DigestMismatch {
        key: ObjectKey,
        expected: Sha256Hash,
        actual: Sha256Hash,
    },

    #[error(transparent)]
    Unpack(#[from] UnpackError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl<S: RemoteStore> BlobClient<S> {
    /// Downloads the directory blob with the given digest and unpacks it into
    /// `destination`, which is created if needed.
    pub fn download_directory(
        &self,
        digest: &Sha256Hash,
        destination: &Path,
    ) -> Result<(), DownloadError> {
        let key = ObjectKey::for_digest(digest);
        let mut compressed = self.fetch(&key, self.temp_dir())?;

        let (_, actual) = decompress_verified(&key, &mut compressed, digest, std::io::sink())?;
        tracing::debug!("verified {key} ({actual:x})");

        compressed.seek(SeekFrom::Start(0))?;
        blobstore_tar::unpack(GzDecoder::new(compressed), destination)?;
        tracing::info!("unpacked {key} into {}", destination.display());
        Ok(())
    }

    /// Downloads the single-file blob with the given digest to `destination`.
    ///
    /// The file is written next to `destination` and only moved into place
    /// once its digest was verified.
    pub fn download_file(&self, digest: &Sha256Hash, destination: &Path) -> Result<(), DownloadError> {
        let key = ObjectKey::for_digest(digest);
        let parent = destination
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

        let mut compressed = self.fetch(&key, Some(&parent))?;
        let target = tempfile::NamedTempFile::new_in(&parent)
            .map_err(DownloadError::TempStorageUnavailable)?;

        let (target, _) = decompress_verified(&key, &mut compressed, digest, target)?;
        target
            .persist(destination)
            .map_err(|err| DownloadError::Io(err.error))?;
        tracing::info!("downloaded {key} to {}", destination.display());
        Ok(())
    }

    /// Copies the object into an anonymous temporary file and rewinds it.
    fn fetch(&self, key: &ObjectKey, dir: Option<&Path>) -> Result<std::fs::File, DownloadError> {
        let mut file = match dir {
            Some(dir) => tempfile::tempfile_in(dir),
            None => tempfile::tempfile(),
        }
        .map_err(DownloadError::TempStorageUnavailable)?;

        self.store()
            .get(key, &mut file)
            .map_err(|source| DownloadError::Remote {
                key: key.clone(),
                source,
            })?;
        file.seek(SeekFrom::Start(0))?;
        Ok(file)
    }
}

/// Decompresses `compressed` into `sink` while hashing the output, and fails
/// if the result does not match `expected`.
fn decompress_verified<W: Write>(
    key: &ObjectKey,
    compressed: &mut impl Read,
    expected: &Sha256Hash,
    mut sink: W,
) -> Result<(W, Sha256Hash), DownloadError> {
    let mut reader = HashingReader::<_, Sha256>::new(GzDecoder::new(compressed));
    std::io::copy(&mut reader, &mut sink)
        .map_err(|err| DownloadError::Decompress(key.clone(), err))?;

    let (_, actual) = reader.finalize();
    if &actual != expected {
        return Err(DownloadError::DigestMismatch {
            key: key.clone(),
            expected: *expected,
            actual,
        });
    }
    Ok((sink, actual))
}
