//! Addressing and metadata of remote objects.

use std::fmt::{Display, Formatter};

use blobstore_digest::Sha256Hash;

/// The content type attached to every uploaded blob.
pub const CONTENT_TYPE: &str = "application/gzip";

/// The key of a blob in the remote store, derived from its digest only.
///
/// The layout `blob/<lowercase hex digest>.gz` is shared with existing stores
/// and must not change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Returns the key for content with the given digest.
    pub fn for_digest(digest: &Sha256Hash) -> Self {
        Self(format!("blob/{digest:x}.gz"))
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ObjectKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ObjectKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Side-channel information stored next to a remote object. Readers may use
/// it, the upload protocol never does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadMetadata {
    /// Size of the uncompressed payload (the tar stream for directories).
    pub uncompressed_size: u64,

    /// Human readable, non-unique reference supplied by the user.
    pub reference_name: String,

    /// True if the payload is a tar stream of a directory.
    pub is_directory: bool,
}

impl UploadMetadata {
    /// Metadata field holding [`UploadMetadata::uncompressed_size`].
    pub const UNCOMPRESSED_SIZE: &'static str = "Uncompressed-Size";

    /// Metadata field holding [`UploadMetadata::reference_name`].
    pub const REFERENCE_NAME: &'static str = "Reference-Name";

    /// Metadata field holding [`UploadMetadata::is_directory`].
    pub const IS_DIR: &'static str = "Is-Dir";

    /// The string-valued fields as sent to the store.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        vec![
            (
                Self::UNCOMPRESSED_SIZE.to_string(),
                self.uncompressed_size.to_string(),
            ),
            (
                Self::REFERENCE_NAME.to_string(),
                self.reference_name.clone(),
            ),
            (Self::IS_DIR.to_string(), self.is_directory.to_string()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blobstore_digest::{compute_bytes_digest, Sha256};

    #[test]
    fn test_key_for_digest() {
        // SHA-256 of empty content
        let digest = compute_bytes_digest::<Sha256>(b"");
        assert_eq!(
            ObjectKey::for_digest(&digest).as_str(),
            "blob/e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855.gz"
        );
    }

    #[test]
    fn test_metadata_pairs() {
        let metadata = UploadMetadata {
            uncompressed_size: 10240,
            reference_name: "Human Music.mp3".to_string(),
            is_directory: false,
        };
        assert_eq!(
            metadata.to_pairs(),
            vec![
                ("Uncompressed-Size".to_string(), "10240".to_string()),
                ("Reference-Name".to_string(), "Human Music.mp3".to_string()),
                ("Is-Dir".to_string(), "false".to_string()),
            ]
        );
    }
}
