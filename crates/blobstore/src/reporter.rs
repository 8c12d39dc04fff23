use crate::key::ObjectKey;

/// A trait that enables being notified of upload progress.
///
/// All methods have empty default implementations so implementors only need
/// to override what they display.
pub trait UploadReporter: Send + Sync {
    /// Called when the upload of a blob starts.
    ///
    /// Returns an index that identifies the upload in subsequent calls.
    fn on_upload_start(&self, _key: &ObjectKey, _total_bytes: u64) -> usize {
        0
    }

    /// Called whenever more bytes of the blob were sent.
    fn on_upload_progress(&self, _index: usize, _bytes_uploaded: u64, _total_bytes: u64) {}

    /// Called when the upload finished, successfully or not.
    fn on_upload_complete(&self, _index: usize) {}

    /// Called when the store already holds the blob and the upload is skipped.
    fn on_duplicate(&self, _key: &ObjectKey) {}
}
