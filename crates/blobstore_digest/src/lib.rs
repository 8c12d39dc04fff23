#![deny(missing_docs)]

//! Content addresses for blobs.
//!
//! A blob is addressed by the SHA-256 of its *uncompressed* bytes. This crate
//! provides the digest type, hex parsing for user supplied addresses, and the
//! I/O adapters that let the digest and the number of bytes reaching a sink be
//! computed while data streams through a pipeline exactly once.
//!
//! ```
//! use blobstore_digest::{compute_bytes_digest, parse_digest_from_hex, Sha256};
//!
//! let digest = compute_bytes_digest::<Sha256>("helloworld");
//! let hex = format!("{digest:x}");
//! assert_eq!(parse_digest_from_hex::<Sha256>(&hex), Some(digest));
//! ```

mod counting;

pub use digest;

use std::io::Read;

use digest::{Digest, Output};

pub use counting::CountingWriter;
pub use sha2::Sha256;

/// The 32 byte output of [`Sha256`].
pub type Sha256Hash = sha2::digest::Output<Sha256>;

/// Hashes `bytes` in one go.
pub fn compute_bytes_digest<D: Digest>(bytes: impl AsRef<[u8]>) -> Output<D> {
    D::digest(bytes)
}

/// Turns the lowercase or uppercase hex form of a digest back into bytes.
///
/// Returns `None` unless `hex` decodes to exactly the output size of `D`.
pub fn parse_digest_from_hex<D: Digest>(hex: &str) -> Option<Output<D>> {
    let mut digest = Output::<D>::default();
    hex::decode_to_slice(hex, &mut digest).ok()?;
    Some(digest)
}

/// A [`Read`] adapter that hashes every byte handed out by the inner reader.
///
/// Used to verify downloaded content while it is being decompressed.
pub struct HashingReader<R, D: Digest> {
    reader: R,
    hasher: D,
}

impl<R, D: Digest> HashingReader<R, D> {
    /// Wraps `reader` with an empty hasher.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            hasher: D::new(),
        }
    }

    /// Returns the inner reader and the digest of everything read so far.
    pub fn finalize(self) -> (R, Output<D>) {
        (self.reader, self.hasher.finalize())
    }
}

impl<R: Read, D: Digest> Read for HashingReader<R, D> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let read = self.reader.read(buf)?;
        self.hasher.update(&buf[..read]);
        Ok(read)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const HELLOWORLD_SHA256: &str =
        "936a185caaa266bb9cbe981e9e05cb78cd732b0b3280eb944412bb6f8f8f07af";

    #[test]
    fn test_helloworld_digest() {
        let digest = compute_bytes_digest::<Sha256>("helloworld");
        assert_eq!(format!("{digest:x}"), HELLOWORLD_SHA256);
    }

    #[rstest]
    #[case::lowercase(HELLOWORLD_SHA256.to_string())]
    #[case::uppercase(HELLOWORLD_SHA256.to_uppercase())]
    fn test_parse_digest_from_hex(#[case] hex: String) {
        assert_eq!(
            parse_digest_from_hex::<Sha256>(&hex),
            Some(compute_bytes_digest::<Sha256>("helloworld"))
        );
    }

    #[rstest]
    #[case::truncated(&HELLOWORLD_SHA256[..62])]
    #[case::too_long("936a185caaa266bb9cbe981e9e05cb78cd732b0b3280eb944412bb6f8f8f07af00")]
    #[case::not_hex("blob/936a185c")]
    #[case::empty("")]
    fn test_reject_malformed_hex(#[case] hex: &str) {
        assert_eq!(parse_digest_from_hex::<Sha256>(hex), None);
    }

    #[test]
    fn test_hashing_reader_in_small_reads() {
        let mut reader = HashingReader::<_, Sha256>::new(&b"helloworld"[..]);
        let mut buf = [0u8; 3];
        let mut seen = Vec::new();
        loop {
            let n = reader.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            seen.extend_from_slice(&buf[..n]);
        }

        let (rest, digest) = reader.finalize();
        assert!(rest.is_empty());
        assert_eq!(seen, b"helloworld");
        assert_eq!(format!("{digest:x}"), HELLOWORLD_SHA256);
    }
}
