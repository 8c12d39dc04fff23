use std::path::PathBuf;

use blobstore::{BlobClient, OpendalStore};
use miette::{Context, IntoDiagnostic};

/// Download a blob by its digest
#[derive(Debug, clap::Parser)]
pub struct Opt {
    /// The hex encoded SHA-256 of the blob
    digest: String,

    /// Where to place the content
    destination: PathBuf,

    /// The blob is a single file, write it to the destination instead of
    /// unpacking it as a directory
    #[clap(long)]
    file: bool,
}

pub fn download(client: &BlobClient<OpendalStore>, opt: Opt) -> miette::Result<()> {
    let digest = super::parse_digest(&opt.digest)?;
    let result = if opt.file {
        client.download_file(&digest, &opt.destination)
    } else {
        client.download_directory(&digest, &opt.destination)
    };
    result
        .into_diagnostic()
        .with_context(|| format!("failed to download {}", opt.digest))?;

    tracing::info!("wrote {}", opt.destination.display());
    Ok(())
}
