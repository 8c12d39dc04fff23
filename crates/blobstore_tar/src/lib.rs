//! Packing and unpacking of directory blobs.
//!
//! A directory is stored as a single tar stream. For two identical trees to
//! end up at the same content address the stream has to be byte-for-byte
//! reproducible, so [`pack_directory`] walks the tree in a stable order and
//! erases everything from the headers that depends on the machine or the
//! moment of packing (timestamps, owners, umask).
//!
//! [`unpack`] is the inverse operation. It consumes an *uncompressed* tar
//! stream and recreates the tree, refusing entries that would escape the
//! destination.

#![deny(missing_docs)]

mod pack;
mod unpack;

use std::path::PathBuf;

pub use pack::{convert_zip_to_tar, pack_directory};
pub use unpack::unpack;

/// Errors that can occur while packing a directory or zip archive into a tar
/// stream.
#[derive(thiserror::Error, Debug)]
pub enum PackError {
    /// The source path could not be read.
    #[error("unable to tar files, {path} could not be read")]
    SourceNotFound {
        /// The source that was requested.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The source path exists but is not a directory.
    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),

    /// The tree contains something other than a file, directory or symlink.
    #[error("{0}: unsupported file type")]
    UnsupportedFileType(PathBuf),

    /// Walking the source tree failed.
    #[error("failed to walk the source directory")]
    Walk(#[from] walkdir::Error),

    /// The zip archive could not be read.
    #[error("invalid zip archive")]
    Zip(#[from] zip::result::ZipError),

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while unpacking a tar stream.
#[derive(thiserror::Error, Debug)]
pub enum UnpackError {
    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A path traversal attempt was detected in the archive.
    #[error("path traversal attempt in archive: {0}")]
    PathTraversal(PathBuf),

    /// A symlink entry without a target.
    #[error("symlink {0} has no target")]
    MissingLinkTarget(PathBuf),
}
