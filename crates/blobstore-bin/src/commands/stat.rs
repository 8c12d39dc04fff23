use blobstore::{BlobClient, ObjectKey, OpendalStore, RemoteStore};
use miette::IntoDiagnostic;

/// Show whether a blob is stored and its compressed size
#[derive(Debug, clap::Parser)]
pub struct Opt {
    /// The hex encoded SHA-256 of the blob
    digest: String,
}

pub fn stat(client: &BlobClient<OpendalStore>, opt: Opt) -> miette::Result<()> {
    let digest = super::parse_digest(&opt.digest)?;
    let key = ObjectKey::for_digest(&digest);
    match client.store().stat(&key).into_diagnostic()? {
        Some(stat) => println!("{key}\t{}", stat.size),
        None => miette::bail!("{key} is not stored"),
    }
    Ok(())
}
