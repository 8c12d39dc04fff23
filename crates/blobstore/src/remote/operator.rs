use std::io::{Read, Write};

use opendal::{
    services::{Fs, S3Config},
    Configurator, ErrorKind, Operator,
};
use tokio::runtime::Runtime;

use super::{ObjectStat, RemoteError, RemoteStore};
use crate::config::{ConfigError, RemoteConfig, S3Options};
use crate::key::{ObjectKey, UploadMetadata, CONTENT_TYPE};

/// Size of the chunks streamed to and from the backend.
const CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// A [`RemoteStore`] backed by an `opendal` [`Operator`].
///
/// The operator is async. Every call is driven to completion on a private
/// current-thread runtime, so methods must not be called from within another
/// tokio runtime.
pub struct OpendalStore {
    operator: Operator,
    runtime: Runtime,
}

impl OpendalStore {
    /// Wraps an existing operator.
    pub fn new(operator: Operator) -> Result<Self, ConfigError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(ConfigError::Runtime)?;
        Ok(Self { operator, runtime })
    }

    /// Builds the operator described by `config`.
    pub fn from_config(config: &RemoteConfig) -> Result<Self, ConfigError> {
        let operator = match config {
            RemoteConfig::S3(options) => s3_operator(options)?,
            RemoteConfig::Filesystem { root } => {
                let builder = Fs::default().root(&root.to_string_lossy());
                Operator::new(builder)?.finish()
            }
        };
        Self::new(operator)
    }

    /// The wrapped operator.
    pub fn operator(&self) -> &Operator {
        &self.operator
    }
}

fn s3_operator(options: &S3Options) -> Result<Operator, ConfigError> {
    let mut s3_config = S3Config::default();
    s3_config.bucket = options.bucket.clone();
    s3_config.root = options.root.clone();
    s3_config.region = Some(options.region.clone());
    s3_config.endpoint = Some(options.endpoint_url.to_string());

    // How to access the S3 bucket.
    s3_config.enable_virtual_host_style = !options.force_path_style;

    if let (Some(access_key_id), Some(secret_access_key)) =
        (&options.access_key_id, &options.secret_access_key)
    {
        s3_config.access_key_id = Some(access_key_id.clone());
        s3_config.secret_access_key = Some(secret_access_key.clone());
        s3_config.session_token = options.session_token.clone();
    }

    let builder = s3_config.into_builder();
    Ok(Operator::new(builder)?.finish())
}

fn map_error(key: &ObjectKey, err: opendal::Error) -> RemoteError {
    if err.kind() == ErrorKind::NotFound {
        RemoteError::NotFound(key.clone())
    } else {
        RemoteError::backend(err)
    }
}

impl RemoteStore for OpendalStore {
    fn stat(&self, key: &ObjectKey) -> Result<Option<ObjectStat>, RemoteError> {
        match self.runtime.block_on(self.operator.stat(key.as_str())) {
            Ok(metadata) => Ok(Some(ObjectStat {
                size: metadata.content_length(),
            })),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(RemoteError::backend(err)),
        }
    }

    fn put(
        &self,
        key: &ObjectKey,
        source: &mut dyn Read,
        size: u64,
        metadata: &UploadMetadata,
        progress: &mut dyn FnMut(u64),
    ) -> Result<u64, RemoteError> {
        tracing::debug!("uploading {key} ({size} bytes)");
        self.runtime.block_on(async {
            let capability = self.operator.info().full_capability();
            let mut writer = self.operator.writer_with(key.as_str());
            if capability.write_with_content_type {
                writer = writer.content_type(CONTENT_TYPE);
            }
            if capability.write_with_user_metadata {
                writer = writer.user_metadata(metadata.to_pairs());
            }
            let mut writer = writer.await.map_err(RemoteError::backend)?;

            let mut written = 0u64;
            let mut buf = vec![0u8; CHUNK_SIZE];
            let result = async {
                loop {
                    let read = source.read(&mut buf)?;
                    if read == 0 {
                        break;
                    }
                    writer
                        .write(buf[..read].to_vec())
                        .await
                        .map_err(RemoteError::backend)?;
                    written += read as u64;
                    progress(written);
                }
                writer.close().await.map_err(RemoteError::backend)?;
                Ok::<_, RemoteError>(())
            }
            .await;

            if let Err(err) = result {
                if let Err(abort_err) = writer.abort().await {
                    tracing::debug!("failed to abort write of {key}: {abort_err}");
                }
                return Err(err);
            }

            Ok(written)
        })
    }

    fn get(&self, key: &ObjectKey, sink: &mut dyn Write) -> Result<u64, RemoteError> {
        self.runtime.block_on(async {
            let size = self
                .operator
                .stat(key.as_str())
                .await
                .map_err(|err| map_error(key, err))?
                .content_length();

            let mut offset = 0u64;
            while offset < size {
                let end = (offset + CHUNK_SIZE as u64).min(size);
                let buffer = self
                    .operator
                    .read_with(key.as_str())
                    .range(offset..end)
                    .await
                    .map_err(|err| map_error(key, err))?;
                sink.write_all(&buffer.to_vec())?;
                offset = end;
            }

            Ok(offset)
        })
    }

    fn delete(&self, key: &ObjectKey) -> Result<(), RemoteError> {
        self.runtime
            .block_on(self.operator.delete(key.as_str()))
            .map_err(RemoteError::backend)
    }
}
