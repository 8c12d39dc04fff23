use std::path::PathBuf;

use blobstore::{BlobClient, ObjectKey, OpendalStore};
use miette::{Context, IntoDiagnostic};

/// Upload a file or directory unless the store already has it
#[derive(Debug, clap::Parser)]
pub struct Opt {
    /// The file or directory to upload, `-` reads from stdin
    path: PathBuf,

    /// Treat the file as a zip archive and upload its contents as a directory
    #[clap(long)]
    zip: bool,

    /// The reference name recorded for files and stdin, defaults to the file
    /// name
    #[clap(long)]
    reference: Option<String>,
}

pub fn upload(client: &BlobClient<OpendalStore>, opt: Opt) -> miette::Result<()> {
    let path = opt.path;
    let digest = if path.as_os_str() == "-" {
        let reference = opt.reference.as_deref().unwrap_or("stdin");
        client.upload_reader(&mut std::io::stdin().lock(), reference)
    } else if opt.zip {
        client.upload_zip(&path)
    } else if path.is_dir() {
        if opt.reference.is_some() {
            miette::bail!("--reference cannot be used when uploading a directory");
        }
        client.upload_directory(&path)
    } else if let Some(reference) = &opt.reference {
        let mut file = fs_err::File::open(&path).into_diagnostic()?;
        client.upload_reader(&mut file, reference)
    } else {
        client.upload_file(&path)
    }
    .into_diagnostic()
    .with_context(|| format!("failed to upload {}", path.display()))?;

    println!("{}", ObjectKey::for_digest(&digest));
    Ok(())
}
