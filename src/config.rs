// src/config.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Per-backend configuration loaded once from the JSON file handed to the CLI.
//!
//! The file schema depends on the storage type chosen with `-s`; the loaded
//! [`StorageConfig`] is immutable and moved into the adapter it configures.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::PathBuf;

use crate::constants::DEFAULT_FILE_PAGE_SIZE;
use crate::error::{Result, StorageError};

/// Backends selectable on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StorageType {
    S3,
    Alioss,
    Azurebs,
    Gcs,
    File,
    Dav,
}

impl StorageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageType::S3 => "s3",
            StorageType::Alioss => "alioss",
            StorageType::Azurebs => "azurebs",
            StorageType::Gcs => "gcs",
            StorageType::File => "file",
            StorageType::Dav => "dav",
        }
    }
}

fn default_true() -> bool {
    true
}

/// AWS S3 and S3-compatible services (MinIO, Ceph RGW, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    pub bucket_name: String,
    /// Falls back to the default credential chain when absent
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    #[serde(default)]
    pub session_token: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    /// Custom host for S3-compatible services, with or without scheme
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default = "default_true")]
    pub use_ssl: bool,
    /// Defaults to true whenever `host` is set
    #[serde(default)]
    pub force_path_style: Option<bool>,
    /// PEM bundle that replaces the default trust roots
    #[serde(default)]
    pub ca_cert: Option<PathBuf>,
    #[serde(default)]
    pub retry_attempts: Option<u32>,
}

impl S3Config {
    /// Endpoint URL for custom hosts, `None` for AWS proper.
    pub fn endpoint_url(&self) -> Option<String> {
        let host = self.host.as_deref().filter(|h| !h.is_empty())?;
        let mut url = if host.starts_with("http://") || host.starts_with("https://") {
            host.trim_end_matches('/').to_string()
        } else {
            let scheme = if self.use_ssl { "https" } else { "http" };
            format!("{}://{}", scheme, host.trim_end_matches('/'))
        };
        if let Some(port) = self.port {
            url = format!("{}:{}", url, port);
        }
        Some(url)
    }

    pub fn path_style(&self) -> bool {
        self.force_path_style.unwrap_or(self.host.is_some())
    }
}

/// Alibaba Cloud OSS, reached through its S3-compatible API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AliOssConfig {
    pub endpoint: String,
    pub access_key_id: String,
    pub access_key_secret: String,
    pub bucket_name: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub retry_attempts: Option<u32>,
}

impl AliOssConfig {
    pub fn endpoint_url(&self) -> String {
        if self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://") {
            self.endpoint.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", self.endpoint.trim_end_matches('/'))
        }
    }

    /// Region is the first label of the endpoint host (`oss-cn-hangzhou.aliyuncs.com`).
    pub fn region_name(&self) -> String {
        if let Some(r) = self.region.as_deref().filter(|r| !r.is_empty()) {
            return r.to_string();
        }
        let host = self
            .endpoint
            .trim_start_matches("https://")
            .trim_start_matches("http://");
        match host.split('.').next() {
            Some(label) if label.starts_with("oss-") => label.to_string(),
            _ => crate::constants::DEFAULT_OSS_REGION.to_string(),
        }
    }
}

/// Azure Blob Storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AzureConfig {
    pub account_name: String,
    pub container_name: String,
    /// Shared key, required only for SAS signing
    #[serde(default)]
    pub account_key: Option<String>,
    /// Full account URL (Azurite, sovereign clouds)
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl AzureConfig {
    pub fn account_url(&self) -> String {
        match self.endpoint.as_deref().filter(|e| !e.is_empty()) {
            Some(e) => e.trim_end_matches('/').to_string(),
            None => format!("https://{}.blob.core.windows.net", self.account_name),
        }
    }
}

/// Google Cloud Storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcsConfig {
    pub bucket_name: String,
    /// Emulator endpoint; anonymous auth is used when set
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Needed only to create the bucket
    #[serde(default)]
    pub project_id: Option<String>,
}

/// Local filesystem, one directory per container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    pub root_dir: PathBuf,
    pub container_name: String,
    #[serde(default)]
    pub page_size: Option<usize>,
    #[serde(default)]
    pub signing_secret: Option<String>,
}

impl FileConfig {
    pub fn page_size(&self) -> usize {
        self.page_size.unwrap_or(DEFAULT_FILE_PAGE_SIZE)
    }

    pub fn container_path(&self) -> PathBuf {
        self.root_dir.join(&self.container_name)
    }
}

/// Backend-specific configuration for exactly one container.
#[derive(Debug, Clone)]
pub enum StorageConfig {
    S3(S3Config),
    AliOss(AliOssConfig),
    Azure(AzureConfig),
    Gcs(GcsConfig),
    File(FileConfig),
}

impl StorageConfig {
    /// Read and validate the config for `storage_type`.
    pub fn from_reader<R: Read>(storage_type: StorageType, mut reader: R) -> Result<Self> {
        let mut buf = Vec::new();
        reader
            .read_to_end(&mut buf)
            .map_err(|e| StorageError::Config(format!("failed to read config: {}", e)))?;
        Self::from_slice(storage_type, &buf)
    }

    pub fn from_slice(storage_type: StorageType, bytes: &[u8]) -> Result<Self> {
        let config = match storage_type {
            StorageType::S3 => StorageConfig::S3(serde_json::from_slice(bytes)?),
            StorageType::Alioss => StorageConfig::AliOss(serde_json::from_slice(bytes)?),
            StorageType::Azurebs => StorageConfig::Azure(serde_json::from_slice(bytes)?),
            StorageType::Gcs => StorageConfig::Gcs(serde_json::from_slice(bytes)?),
            StorageType::File => StorageConfig::File(serde_json::from_slice(bytes)?),
            StorageType::Dav => {
                return Err(StorageError::Config(format!(
                    "storage {} not implemented",
                    storage_type.as_str()
                )));
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Bucket or container every operation is scoped to.
    pub fn container_name(&self) -> &str {
        match self {
            StorageConfig::S3(c) => &c.bucket_name,
            StorageConfig::AliOss(c) => &c.bucket_name,
            StorageConfig::Azure(c) => &c.container_name,
            StorageConfig::Gcs(c) => &c.bucket_name,
            StorageConfig::File(c) => &c.container_name,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.container_name().trim().is_empty() {
            return Err(StorageError::Config("bucket/container name must not be empty".into()));
        }
        match self {
            StorageConfig::S3(c) => {
                if c.access_key_id.is_some() != c.secret_access_key.is_some() {
                    return Err(StorageError::Config(
                        "access_key_id and secret_access_key must be set together".into(),
                    ));
                }
                check_retry_attempts(c.retry_attempts)
            }
            StorageConfig::AliOss(c) => {
                if c.endpoint.trim().is_empty() {
                    return Err(StorageError::Config("endpoint must not be empty".into()));
                }
                check_retry_attempts(c.retry_attempts)
            }
            StorageConfig::Azure(c) => {
                if c.account_name.trim().is_empty() {
                    return Err(StorageError::Config("account_name must not be empty".into()));
                }
                Ok(())
            }
            StorageConfig::Gcs(_) => Ok(()),
            StorageConfig::File(c) => {
                if c.page_size == Some(0) {
                    return Err(StorageError::Config("page_size must be at least 1".into()));
                }
                if c.container_name.contains('/') || c.container_name == ".." {
                    return Err(StorageError::Config(format!(
                        "invalid container name '{}'",
                        c.container_name
                    )));
                }
                Ok(())
            }
        }
    }
}

fn check_retry_attempts(attempts: Option<u32>) -> Result<()> {
    match attempts {
        Some(0) => Err(StorageError::Config("retry_attempts must be at least 1".into())),
        _ => Ok(()),
    }
}
