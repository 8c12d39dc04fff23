#![deny(missing_docs)]

//! Content-addressed blob uploads.
//!
//! Files, directories and zip archives are turned into gzip compressed blobs
//! whose key is the SHA-256 of their uncompressed content:
//!
//! ```text
//! blob/<lowercase hex sha256>.gz
//! ```
//!
//! Directories are first packed into a deterministic tar stream so the same
//! tree always produces the same key. Before uploading, the [`BlobClient`]
//! asks the [`RemoteStore`] whether an object of the same key and size
//! already exists and skips the upload if it does.
//!
//! ```no_run
//! use blobstore::{BlobClient, MemoryStore};
//!
//! let client = BlobClient::new(MemoryStore::new());
//! let digest = client.upload_directory("./assets".as_ref()).unwrap();
//! println!("uploaded blob/{digest:x}.gz");
//! ```

pub mod blob;
mod client;
pub mod config;
mod download;
mod key;
pub mod remote;
mod reporter;

pub use blob::{blob_from_reader, BlobBuilder, BlobError, CompressionLevel, LocalBlob, SealedBlob};
pub use blobstore_digest::{Sha256, Sha256Hash};
pub use client::{BlobClient, UploadError};
pub use config::BlobStoreConfig;
pub use download::DownloadError;
pub use key::{ObjectKey, UploadMetadata, CONTENT_TYPE};
#[cfg(feature = "opendal")]
pub use remote::OpendalStore;
pub use remote::{MemoryStore, ObjectStat, RemoteError, RemoteStore};
pub use reporter::UploadReporter;
