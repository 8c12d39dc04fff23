use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::{ObjectStat, RemoteError, RemoteStore};
use crate::key::{ObjectKey, UploadMetadata};

const CHUNK_SIZE: usize = 64 * 1024;

/// An object held by a [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// The object bytes.
    pub data: Vec<u8>,

    /// The metadata the object was stored with.
    pub metadata: Option<UploadMetadata>,
}

/// A [`RemoteStore`] that keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<ObjectKey, StoredObject>>,
    put_count: AtomicUsize,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times [`RemoteStore::put`] was called, including failures.
    pub fn put_count(&self) -> usize {
        self.put_count.load(Ordering::SeqCst)
    }

    /// Returns a copy of the object stored under `key`.
    pub fn object(&self, key: &ObjectKey) -> Option<StoredObject> {
        self.objects.lock().get(key).cloned()
    }

    /// The keys of all stored objects, sorted.
    pub fn keys(&self) -> Vec<ObjectKey> {
        let mut keys: Vec<_> = self.objects.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Stores raw bytes without metadata, bypassing the upload path.
    pub fn insert(&self, key: ObjectKey, data: Vec<u8>) {
        self.objects.lock().insert(
            key,
            StoredObject {
                data,
                metadata: None,
            },
        );
    }
}

impl RemoteStore for MemoryStore {
    fn stat(&self, key: &ObjectKey) -> Result<Option<ObjectStat>, RemoteError> {
        Ok(self.objects.lock().get(key).map(|object| ObjectStat {
            size: object.data.len() as u64,
        }))
    }

    fn put(
        &self,
        key: &ObjectKey,
        source: &mut dyn Read,
        size: u64,
        metadata: &UploadMetadata,
        progress: &mut dyn FnMut(u64),
    ) -> Result<u64, RemoteError> {
        self.put_count.fetch_add(1, Ordering::SeqCst);

        let mut data = Vec::with_capacity(usize::try_from(size).unwrap_or_default());
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let read = source.read(&mut buf)?;
            if read == 0 {
                break;
            }
            data.extend_from_slice(&buf[..read]);
            progress(data.len() as u64);
        }

        let written = data.len() as u64;
        self.objects.lock().insert(
            key.clone(),
            StoredObject {
                data,
                metadata: Some(metadata.clone()),
            },
        );
        Ok(written)
    }

    fn get(&self, key: &ObjectKey, sink: &mut dyn Write) -> Result<u64, RemoteError> {
        let data = self
            .objects
            .lock()
            .get(key)
            .map(|object| object.data.clone())
            .ok_or_else(|| RemoteError::NotFound(key.clone()))?;
        sink.write_all(&data)?;
        Ok(data.len() as u64)
    }

    fn delete(&self, key: &ObjectKey) -> Result<(), RemoteError> {
        self.objects.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blobstore_digest::{compute_bytes_digest, Sha256};

    fn key() -> ObjectKey {
        ObjectKey::for_digest(&compute_bytes_digest::<Sha256>(b"helloworld"))
    }

    #[test]
    fn test_put_stat_get_delete() {
        let store = MemoryStore::new();
        let key = key();
        assert_eq!(store.stat(&key).unwrap(), None);

        let metadata = UploadMetadata {
            uncompressed_size: 10,
            reference_name: "a.txt".to_string(),
            is_directory: false,
        };
        let mut reported = Vec::new();
        let written = store
            .put(&key, &mut &b"payload"[..], 7, &metadata, &mut |n| {
                reported.push(n)
            })
            .unwrap();
        assert_eq!(written, 7);
        assert_eq!(reported, vec![7]);
        assert_eq!(store.stat(&key).unwrap(), Some(ObjectStat { size: 7 }));
        assert_eq!(store.object(&key).unwrap().metadata, Some(metadata));

        let mut sink = Vec::new();
        assert_eq!(store.get(&key, &mut sink).unwrap(), 7);
        assert_eq!(sink, b"payload");

        store.delete(&key).unwrap();
        store.delete(&key).unwrap();
        assert_eq!(store.stat(&key).unwrap(), None);
        assert!(matches!(
            store.get(&key, &mut Vec::new()),
            Err(RemoteError::NotFound(_))
        ));
        assert_eq!(store.put_count(), 1);
    }
}
