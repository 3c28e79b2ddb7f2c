// src/object_store.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// Pluggable object-store abstraction with one adapter per vendor.
// Supported backends: s3, alioss, azurebs, gcs, file

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::checksum::ContentMd5;
use crate::config::StorageConfig;
use crate::error::{Result, StorageError};
use crate::pagination::{PageSource, list_all};
use crate::properties::BlobProperties;
use crate::signing::SignedUrlRequest;

/// ObjectStore trait for pluggable storage backends.
///
/// Every adapter is bound to exactly one container for its whole lifetime and
/// implements the single-page listing of [`PageSource`]; full listings,
/// recursive deletes and container convergence are built on top of that.
#[async_trait]
pub trait ObjectStore: PageSource {
    /// Short backend label used in log lines.
    fn backend_name(&self) -> &'static str;

    /// Bucket or container this adapter is bound to.
    fn container(&self) -> &str;

    /// Upload the local file at `src` to `key`. A supplied checksum is sent
    /// for server-side verification; a mismatch is an integrity error.
    async fn upload(&self, src: &Path, checksum: Option<&ContentMd5>, key: &str) -> Result<()>;

    /// Download `key` into `dest`. The destination only appears once the
    /// transfer has completed.
    async fn download(&self, key: &str, dest: &Path) -> Result<()>;

    /// Copy `src_key` to `dst_key` inside the container.
    async fn copy(&self, src_key: &str, dst_key: &str) -> Result<()>;

    /// Delete `key`. Deleting an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check if an object exists. Absence is `Ok(false)`, never an error.
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.properties(key).await?.is_some())
    }

    /// Metadata for `key`, `None` when it is absent.
    async fn properties(&self, key: &str) -> Result<Option<BlobProperties>>;

    /// Produce a time-bounded URL for one method, from credentials alone.
    async fn signed_url(&self, req: &SignedUrlRequest) -> Result<String>;

    /// Every key under `prefix`, de-paginated, in vendor order.
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        list_all(self, prefix).await
    }

    /// Best-effort delete of every key under `prefix`.
    async fn delete_recursive(&self, prefix: &str) -> Result<()> {
        crate::recursive_delete::delete_recursive(self, prefix).await
    }

    /// Does the bucket/container itself exist.
    async fn container_exists(&self) -> Result<bool>;

    /// Create the bucket/container. A concurrent creator winning the race is
    /// reported as `StorageError::AlreadyExists`.
    async fn create_container(&self) -> Result<()>;

    /// Idempotent create-if-absent.
    async fn ensure_container_exists(&self) -> Result<()> {
        crate::container::ensure_container_exists(self).await
    }
}

/// Build the adapter for a loaded config. Called once per process; the
/// returned store (and its SDK client) is reused for the whole invocation.
pub async fn store_for_config(config: StorageConfig) -> Result<Box<dyn ObjectStore>> {
    match config {
        StorageConfig::S3(c) => Ok(Box::new(crate::s3_store::S3ObjectStore::from_s3_config(c).await?)),
        StorageConfig::AliOss(c) => Ok(Box::new(crate::s3_store::S3ObjectStore::from_alioss_config(c).await?)),
        StorageConfig::Azure(c) => Ok(Box::new(crate::azure_client::AzureBlobStore::new(c)?)),
        StorageConfig::Gcs(c) => Ok(Box::new(crate::gcs_client::GcsObjectStore::new(c).await?)),
        StorageConfig::File(c) => Ok(Box::new(crate::file_store::FileSystemObjectStore::new(c))),
    }
}

/// Temp file in `dir` carrying the mode a plain create would get (0666 less
/// the umask) instead of tempfile's owner-only default, so a persisted file
/// is as readable as any other the process writes.
pub(crate) fn staging_file(dir: &Path) -> std::io::Result<NamedTempFile> {
    #[cfg_attr(not(unix), allow(unused_mut))]
    let mut builder = tempfile::Builder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(std::fs::Permissions::from_mode(0o666));
    }
    builder.tempfile_in(dir)
}

/// Download staging: bytes land in a temp file next to the destination and
/// are renamed into place only by [`StagedDownload::commit`]. Dropping an
/// uncommitted stage removes the temp file, so an interrupted transfer never
/// leaves a file that looks complete.
pub(crate) struct StagedDownload {
    dest: PathBuf,
    temp: NamedTempFile,
    file: tokio::fs::File,
    bytes: u64,
}

impl StagedDownload {
    pub(crate) fn new(dest: &Path) -> Result<Self> {
        let dir = match dest.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let temp = staging_file(dir).map_err(|e| {
            StorageError::Transfer(format!("failed to stage download in {}: {}", dir.display(), e))
        })?;
        let file = tokio::fs::File::from_std(temp.reopen()?);
        Ok(Self { dest: dest.to_path_buf(), temp, file, bytes: 0 })
    }

    pub(crate) async fn write(&mut self, chunk: &[u8]) -> Result<()> {
        self.file
            .write_all(chunk)
            .await
            .map_err(|e| StorageError::Transfer(format!("failed to write {}: {}", self.dest.display(), e)))?;
        self.bytes += chunk.len() as u64;
        Ok(())
    }

    /// Flush and atomically move the staged file onto the destination.
    pub(crate) async fn commit(mut self) -> Result<u64> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        drop(self.file);
        self.temp.persist(&self.dest).map_err(|e| {
            StorageError::Transfer(format!("failed to finalize {}: {}", self.dest.display(), e.error))
        })?;
        debug!("download committed: {} ({} bytes)", self.dest.display(), self.bytes);
        Ok(self.bytes)
    }
}
