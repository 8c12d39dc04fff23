//! TOML configuration for the blob client and its remote store.
//!
//! ```toml
//! temp-dir = "/var/tmp/blobstore"
//! compression-level = 6
//!
//! [remote]
//! type = "s3"
//! bucket = "artifacts"
//! endpoint-url = "https://s3.eu-central-1.amazonaws.com"
//! region = "eu-central-1"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::blob::CompressionLevel;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingRequiredField(String),

    #[error("Invalid value for field {0}: {1}")]
    InvalidValue(String, String),
}

#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum LoadError {
    #[error("IO error while reading configuration file {1}")]
    IoError(#[source] std::io::Error, PathBuf),

    #[error("Error parsing configuration file {1}")]
    ParseError(#[source] toml::de::Error, PathBuf),

    #[error("Error validating configuration: {0}")]
    ValidationError(#[from] ValidationError),
}

/// Errors raised while turning a configuration into a working store.
#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum ConfigError {
    #[error("no remote store is configured")]
    MissingRemote,

    #[error("failed to start the I/O runtime")]
    Runtime(#[source] std::io::Error),

    #[cfg(feature = "opendal")]
    #[error("failed to configure the storage backend")]
    Backend(#[from] opendal::Error),
}

/// The top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BlobStoreConfig {
    /// Directory for spool files. Uses the system temp directory when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<PathBuf>,

    /// Gzip level between 1 and 9.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression_level: Option<u32>,

    /// The store blobs are uploaded to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteConfig>,

    /// Files this configuration was read from, in load order.
    #[serde(skip)]
    pub loaded_from: Vec<PathBuf>,
}

/// Where blobs are stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RemoteConfig {
    /// An S3 compatible bucket.
    S3(S3Options),

    /// A local directory, mostly useful for testing and air-gapped setups.
    Filesystem {
        /// The directory objects are stored below.
        root: PathBuf,
    },
}

/// Connection settings of an S3 bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct S3Options {
    /// Name of the bucket
    pub bucket: String,

    /// S3 endpoint URL
    pub endpoint_url: Url,

    /// The name of the S3 region
    pub region: String,

    /// Force path style URLs instead of subdomain style
    #[serde(default)]
    pub force_path_style: bool,

    /// Prefix inside the bucket
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[allow(missing_docs)]
    pub access_key_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[allow(missing_docs)]
    pub secret_access_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[allow(missing_docs)]
    pub session_token: Option<String>,
}

impl BlobStoreConfig {
    /// Reads and merges the given files in order, later files taking
    /// priority, and validates the result.
    pub fn load_from_files<I, P>(paths: I) -> Result<Self, LoadError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut config = BlobStoreConfig::default();

        for path in paths {
            let path = path.as_ref();
            let content = fs_err::read_to_string(path)
                .map_err(|e| LoadError::IoError(e, path.to_path_buf()))?;
            let mut other: BlobStoreConfig = toml::from_str(&content)
                .map_err(|e| LoadError::ParseError(e, path.to_path_buf()))?;
            other.loaded_from.push(path.to_path_buf());
            config = config.merge_config(other);
        }

        config.validate()?;
        Ok(config)
    }

    /// Merges `other` into this configuration. Values set in `other` win.
    pub fn merge_config(self, other: Self) -> Self {
        let mut loaded_from = self.loaded_from;
        loaded_from.extend(other.loaded_from);
        Self {
            temp_dir: other.temp_dir.or(self.temp_dir),
            compression_level: other.compression_level.or(self.compression_level),
            remote: other.remote.or(self.remote),
            loaded_from,
        }
    }

    /// Checks values that cannot be expressed in the types.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(level) = self.compression_level {
            if !(1..=9).contains(&level) {
                return Err(ValidationError::InvalidValue(
                    "compression-level".to_string(),
                    format!("{level} is not between 1 and 9"),
                ));
            }
        }

        if let Some(RemoteConfig::S3(s3)) = &self.remote {
            if s3.bucket.is_empty() {
                return Err(ValidationError::MissingRequiredField(
                    "remote.bucket".to_string(),
                ));
            }
            if s3.region.is_empty() {
                return Err(ValidationError::MissingRequiredField(
                    "remote.region".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// The configured compression level, or the default.
    pub fn compression_level(&self) -> CompressionLevel {
        self.compression_level
            .map_or(CompressionLevel::Default, CompressionLevel::Numeric)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_parse_s3_config() {
        let config: BlobStoreConfig = toml::from_str(
            r#"
            temp-dir = "/var/tmp/blobs"
            compression-level = 6

            [remote]
            type = "s3"
            bucket = "artifacts"
            endpoint-url = "http://localhost:9000"
            region = "us-east-1"
            force-path-style = true
            "#,
        )
        .unwrap();

        assert_eq!(config.temp_dir, Some(PathBuf::from("/var/tmp/blobs")));
        assert_eq!(config.compression_level(), CompressionLevel::Numeric(6));
        let Some(RemoteConfig::S3(s3)) = &config.remote else {
            panic!("expected an s3 remote, got {:?}", config.remote);
        };
        assert_eq!(s3.bucket, "artifacts");
        assert!(s3.force_path_style);
        assert_eq!(s3.root, None);
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_filesystem_config() {
        let config: BlobStoreConfig = toml::from_str(
            r#"
            [remote]
            type = "filesystem"
            root = "/srv/blobs"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.remote,
            Some(RemoteConfig::Filesystem {
                root: PathBuf::from("/srv/blobs")
            })
        );
        assert_eq!(config.compression_level(), CompressionLevel::Default);
    }

    #[test]
    fn test_invalid_compression_level() {
        let config = BlobStoreConfig {
            compression_level: Some(11),
            ..Default::default()
        };
        assert_matches!(config.validate(), Err(ValidationError::InvalidValue(field, _)) if field == "compression-level");
    }

    #[test]
    fn test_load_and_merge_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        let base = temp_dir.path().join("base.toml");
        let local = temp_dir.path().join("local.toml");
        fs_err::write(
            &base,
            "compression-level = 3\n[remote]\ntype = \"filesystem\"\nroot = \"/a\"\n",
        )
        .unwrap();
        fs_err::write(&local, "[remote]\ntype = \"filesystem\"\nroot = \"/b\"\n").unwrap();

        let config = BlobStoreConfig::load_from_files([&base, &local]).unwrap();
        assert_eq!(config.compression_level, Some(3));
        assert_eq!(
            config.remote,
            Some(RemoteConfig::Filesystem {
                root: PathBuf::from("/b")
            })
        );
        assert_eq!(config.loaded_from, vec![base, local]);
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result = BlobStoreConfig::load_from_files([temp_dir.path().join("nope.toml")]);
        assert_matches!(result, Err(LoadError::IoError(..)));
    }
}
