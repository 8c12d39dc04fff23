//! The object store capability the client talks to.
//!
//! [`RemoteStore`] is a small blocking interface: stat, put, get and delete
//! by [`ObjectKey`]. [`MemoryStore`] keeps objects in memory and is meant for
//! tests. [`OpendalStore`] talks to S3 or a local directory through
//! `opendal`.

mod memory;
#[cfg(feature = "opendal")]
mod operator;

use std::io::{Read, Write};
use std::sync::Arc;

use crate::key::{ObjectKey, UploadMetadata};

pub use memory::{MemoryStore, StoredObject};
#[cfg(feature = "opendal")]
pub use operator::OpendalStore;

/// What the store reports about an existing object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectStat {
    /// Size of the stored (compressed) object in bytes.
    pub size: u64,
}

/// Errors returned by a [`RemoteStore`].
#[derive(thiserror::Error, Debug)]
#[allow(missing_docs)]
pub enum RemoteError {
    #[error("object {0} does not exist")]
    NotFound(ObjectKey),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("the storage backend reported an error")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl RemoteError {
    /// Wraps a backend specific error.
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        RemoteError::Backend(Box::new(err))
    }
}

/// A remote object store addressed by [`ObjectKey`].
pub trait RemoteStore {
    /// Returns the size of the object or `None` if it does not exist.
    fn stat(&self, key: &ObjectKey) -> Result<Option<ObjectStat>, RemoteError>;

    /// Stores `size` bytes read from `source` under `key` with the given
    /// metadata. `progress` is called with the number of bytes sent so far.
    /// Returns the number of bytes stored.
    fn put(
        &self,
        key: &ObjectKey,
        source: &mut dyn Read,
        size: u64,
        metadata: &UploadMetadata,
        progress: &mut dyn FnMut(u64),
    ) -> Result<u64, RemoteError>;

    /// Writes the object into `sink` and returns the number of bytes written.
    fn get(&self, key: &ObjectKey, sink: &mut dyn Write) -> Result<u64, RemoteError>;

    /// Deletes the object. Deleting a missing object is not an error.
    fn delete(&self, key: &ObjectKey) -> Result<(), RemoteError>;
}

macro_rules! forward_remote_store {
    ($($ty:ty),*) => {
        $(
            impl<T: RemoteStore + ?Sized> RemoteStore for $ty {
                fn stat(&self, key: &ObjectKey) -> Result<Option<ObjectStat>, RemoteError> {
                    (**self).stat(key)
                }

                fn put(
                    &self,
                    key: &ObjectKey,
                    source: &mut dyn Read,
                    size: u64,
                    metadata: &UploadMetadata,
                    progress: &mut dyn FnMut(u64),
                ) -> Result<u64, RemoteError> {
                    (**self).put(key, source, size, metadata, progress)
                }

                fn get(&self, key: &ObjectKey, sink: &mut dyn Write) -> Result<u64, RemoteError> {
                    (**self).get(key, sink)
                }

                fn delete(&self, key: &ObjectKey) -> Result<(), RemoteError> {
                    (**self).delete(key)
                }
            }
        )*
    };
}

forward_remote_store!(&T, Box<T>, Arc<T>);
