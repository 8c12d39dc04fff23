use blobstore::{Sha256, Sha256Hash};

pub mod download;
pub mod stat;
pub mod upload;

/// Parses a hex encoded SHA-256 given on the command line.
fn parse_digest(input: &str) -> miette::Result<Sha256Hash> {
    blobstore_digest::parse_digest_from_hex::<Sha256>(input)
        .ok_or_else(|| miette::miette!("'{input}' is not a valid SHA-256 digest"))
}
