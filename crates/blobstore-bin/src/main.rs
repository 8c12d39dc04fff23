use std::path::PathBuf;
use std::sync::Arc;

use blobstore::config::{RemoteConfig, S3Options};
use blobstore::{BlobClient, BlobStoreConfig, OpendalStore};
use clap::Parser;
use indicatif::{MultiProgress, ProgressDrawTarget};
use miette::{Context, IntoDiagnostic};
use once_cell::sync::Lazy;
use tracing_subscriber::{filter::LevelFilter, util::SubscriberInitExt, EnvFilter};
use url::Url;

mod commands;
mod reporter;
mod writer;

/// Returns a global instance of [`indicatif::MultiProgress`].
///
/// Logging is routed through this instance so log lines do not tear pending
/// progress bars.
pub fn global_multi_progress() -> MultiProgress {
    static GLOBAL_MP: Lazy<MultiProgress> = Lazy::new(|| {
        let mp = MultiProgress::new();
        mp.set_draw_target(ProgressDrawTarget::stderr_with_hz(20));
        mp
    });
    GLOBAL_MP.clone()
}

/// Upload and download content-addressed blobs
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    remote: RemoteArgs,

    /// Increase the verbosity of the output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(clap::Subcommand)]
enum Commands {
    Upload(commands::upload::Opt),
    Download(commands::download::Opt),
    Stat(commands::stat::Opt),
}

/// Where blobs are stored. Flags take priority over configuration files.
#[derive(Debug, clap::Args)]
struct RemoteArgs {
    /// Configuration files to load, later files take priority
    #[arg(long = "config", global = true)]
    config: Vec<PathBuf>,

    /// Store blobs in a local directory instead of a bucket
    #[arg(long, global = true)]
    filesystem_root: Option<PathBuf>,

    /// Name of the S3 bucket
    #[arg(long, global = true, env = "BLOBSTORE_BUCKET")]
    bucket: Option<String>,

    /// The endpoint URL of the S3 backend
    #[arg(
        long,
        global = true,
        env = "S3_ENDPOINT_URL",
        default_value = "https://s3.amazonaws.com"
    )]
    endpoint_url: Url,

    /// The region of the S3 backend
    #[arg(long, global = true, env = "S3_REGION", default_value = "eu-central-1")]
    region: String,

    /// Whether to use path-style S3 URLs
    #[arg(long, global = true, env = "S3_FORCE_PATH_STYLE")]
    force_path_style: bool,
}

impl RemoteArgs {
    fn load_config(&self) -> miette::Result<BlobStoreConfig> {
        let mut config = BlobStoreConfig::load_from_files(&self.config)
            .into_diagnostic()
            .context("failed to load configuration")?;

        if let Some(root) = &self.filesystem_root {
            config.remote = Some(RemoteConfig::Filesystem { root: root.clone() });
        } else if let Some(bucket) = &self.bucket {
            config.remote = Some(RemoteConfig::S3(S3Options {
                bucket: bucket.clone(),
                endpoint_url: self.endpoint_url.clone(),
                region: self.region.clone(),
                force_path_style: self.force_path_style,
                root: None,
                access_key_id: std::env::var("AWS_ACCESS_KEY_ID").ok(),
                secret_access_key: std::env::var("AWS_SECRET_ACCESS_KEY").ok(),
                session_token: std::env::var("AWS_SESSION_TOKEN").ok(),
            }));
        }

        config.validate().into_diagnostic()?;
        Ok(config)
    }

    fn client(&self) -> miette::Result<BlobClient<OpendalStore>> {
        let config = self.load_config()?;
        let remote = config
            .remote
            .as_ref()
            .ok_or(blobstore::config::ConfigError::MissingRemote)
            .into_diagnostic()
            .context("pass --bucket, --filesystem-root or a configuration file")?;
        let store = OpendalStore::from_config(remote).into_diagnostic()?;
        Ok(BlobClient::with_config(store, &config)
            .with_reporter(Arc::new(reporter::IndicatifReporter::default())))
    }
}

/// Entry point of the `blobstore` cli.
fn main() -> miette::Result<()> {
    // Parse the command line arguments
    let cli = Cli::parse();

    // Setup default logging level
    let default_filter = match cli.verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    let env_filter = EnvFilter::builder()
        .with_default_directive(default_filter.into())
        .from_env()
        .into_diagnostic()?;

    // Setup the tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(writer::IndicatifWriter::new(global_multi_progress()))
        .without_time()
        .finish()
        .try_init()
        .into_diagnostic()?;

    let client = cli.remote.client()?;

    // Dispatch the selected command
    match cli.command {
        Commands::Upload(opt) => commands::upload::upload(&client, opt),
        Commands::Download(opt) => commands::download::download(&client, opt),
        Commands::Stat(opt) => commands::stat::stat(&client, opt),
    }
}
