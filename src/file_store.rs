// src/file_store.rs
//
// FileSystemObjectStore: the ObjectStore contract over a local directory.
// The container is `root_dir/container_name`; keys map onto relative paths
// beneath it, `/` separating path components.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, trace};

use crate::checksum::ContentMd5;
use crate::config::FileConfig;
use crate::error::{Result, StorageError};
use crate::object_store::{ObjectStore, StagedDownload, staging_file};
use crate::pagination::{ListingPage, PageSource};
use crate::properties::BlobProperties;
use crate::signing::{SignedUrlRequest, hmac_sha256};

const KEY_PATH: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const COPY_CHUNK: usize = 1024 * 1024;

/// Local filesystem adapter.
///
/// Uploads and copies are staged in `root_dir` (outside the container, so
/// listings never see them) and renamed into place once complete.
#[derive(Debug, Clone)]
pub struct FileSystemObjectStore {
    root: PathBuf,
    container_name: String,
    container: PathBuf,
    page_size: usize,
    signing_secret: Option<String>,
}

impl FileSystemObjectStore {
    pub fn new(config: FileConfig) -> Self {
        Self {
            container: config.container_path(),
            page_size: config.page_size(),
            root: config.root_dir,
            container_name: config.container_name,
            signing_secret: config.signing_secret,
        }
    }

    /// Resolve a key to its path, refusing anything that would escape the container.
    fn key_path(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key.split('/').all(|seg| !seg.is_empty() && seg != "." && seg != "..")
            && Path::new(key).components().all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(StorageError::Config(format!("invalid object key '{}'", key)));
        }
        Ok(self.container.join(key))
    }

    async fn require_container(&self) -> Result<()> {
        if fs::metadata(&self.container).await.map(|m| m.is_dir()).unwrap_or(false) {
            Ok(())
        } else {
            Err(StorageError::NotFound(format!("container '{}' does not exist", self.container_name)))
        }
    }

    /// Stream `src` into a staged file, verify it, then rename it onto `key`.
    async fn commit_from(&self, src: &Path, expected: Option<&ContentMd5>, key: &str) -> Result<ContentMd5> {
        let dest = self.key_path(key)?;
        let staged = staging_file(&self.root).map_err(|e| {
            StorageError::Transfer(format!("failed to stage upload in {}: {}", self.root.display(), e))
        })?;

        let mut input = fs::File::open(src).await?;
        let mut output = fs::File::from_std(staged.reopen()?);
        let mut ctx = md5::Context::new();
        let mut buf = vec![0u8; COPY_CHUNK];
        loop {
            let n = input.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            ctx.consume(&buf[..n]);
            output.write_all(&buf[..n]).await?;
        }
        output.flush().await?;
        output.sync_all().await?;
        drop(output);

        let actual = ContentMd5::from_digest(ctx.compute().0);
        if let Some(expected) = expected {
            if *expected != actual {
                return Err(StorageError::Integrity(format!(
                    "content MD5 mismatch for '{}': expected {}, computed {}",
                    key,
                    expected.to_base64(),
                    actual.to_base64()
                )));
            }
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        staged
            .persist(&dest)
            .map_err(|e| StorageError::Transfer(format!("failed to finalize '{}': {}", key, e.error)))?;
        trace!("committed {} -> {}", src.display(), dest.display());
        Ok(actual)
    }

    /// Every key in the container, sorted.
    async fn all_keys(&self) -> Result<Vec<String>> {
        self.require_container().await?;
        let mut keys = Vec::new();
        let mut pending = vec![self.container.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                let path = entry.path();
                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file() {
                    if let Some(key) = self.key_for(&path) {
                        keys.push(key);
                    }
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.container).ok()?;
        let parts: Option<Vec<&str>> = rel.components().map(|c| c.as_os_str().to_str()).collect();
        Some(parts?.join("/"))
    }

    /// Remove directories left empty by a delete, stopping at the container.
    async fn prune_empty_parents(&self, path: &Path) {
        let mut dir = path.parent();
        while let Some(d) = dir {
            if d == self.container.as_path() || !d.starts_with(&self.container) {
                break;
            }
            if fs::remove_dir(d).await.is_err() {
                break;
            }
            dir = d.parent();
        }
    }

    /// String covered by a file URL signature.
    fn string_to_sign(&self, method: &str, expires: i64, key: &str) -> String {
        format!("{}\n{}\n/{}/{}", method, expires, self.container_name, key)
    }
}

/// One page of `keys` (sorted) after `cursor`, `page_size` long.
fn page_after(keys: &[String], cursor: Option<&str>, page_size: usize) -> ListingPage {
    let start = match cursor {
        Some(c) => keys.partition_point(|k| k.as_str() <= c),
        None => 0,
    };
    let end = (start + page_size).min(keys.len());
    let page: Vec<String> = keys[start..end].to_vec();
    if end < keys.len() {
        match page.last().cloned() {
            Some(last) => ListingPage::truncated(page, last),
            None => ListingPage::last(page),
        }
    } else {
        ListingPage::last(page)
    }
}

#[async_trait]
impl PageSource for FileSystemObjectStore {
    async fn fetch_page(&self, prefix: &str, cursor: Option<&str>) -> Result<ListingPage> {
        let keys: Vec<String> = self.all_keys().await?.into_iter().filter(|k| k.starts_with(prefix)).collect();
        let page = page_after(&keys, cursor, self.page_size);
        debug!("file list page: prefix='{}', cursor={:?}, keys={}", prefix, cursor, page.keys.len());
        Ok(page)
    }
}

#[async_trait]
impl ObjectStore for FileSystemObjectStore {
    fn backend_name(&self) -> &'static str {
        "file"
    }

    fn container(&self) -> &str {
        &self.container_name
    }

    async fn upload(&self, src: &Path, checksum: Option<&ContentMd5>, key: &str) -> Result<()> {
        info!("Uploading {}/{}", self.container_name, key);
        self.require_container().await?;
        self.commit_from(src, checksum, key).await.map_err(StorageError::into_transfer)?;
        Ok(())
    }

    async fn download(&self, key: &str, dest: &Path) -> Result<()> {
        info!("Downloading {}/{}", self.container_name, key);
        let path = self.key_path(key)?;
        // A key naming a directory (only `key/child` exists) is absent, as for `exists`.
        if !fs::metadata(&path).await.map(|m| m.is_file()).unwrap_or(false) {
            return Err(StorageError::NotFound(format!("object '{}' not found", key)));
        }
        let mut input = fs::File::open(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound(format!("object '{}' not found", key)),
            _ => StorageError::Transfer(format!("failed to open '{}': {}", key, e)),
        })?;

        let mut stage = StagedDownload::new(dest)?;
        let mut buf = vec![0u8; COPY_CHUNK];
        loop {
            let n = input.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            stage.write(&buf[..n]).await?;
        }
        stage.commit().await?;
        Ok(())
    }

    async fn copy(&self, src_key: &str, dst_key: &str) -> Result<()> {
        info!("Copying {}/{} to {}", self.container_name, src_key, dst_key);
        let src = self.key_path(src_key)?;
        if !fs::metadata(&src).await.map(|m| m.is_file()).unwrap_or(false) {
            return Err(StorageError::NotFound(format!("object '{}' not found", src_key)));
        }
        self.commit_from(&src, None, dst_key).await.map_err(StorageError::into_transfer)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        info!("Deleting {}/{}", self.container_name, key);
        let path = self.key_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                self.prune_empty_parents(&path).await;
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn properties(&self, key: &str) -> Result<Option<BlobProperties>> {
        let path = self.key_path(key)?;
        let meta = match fs::metadata(&path).await {
            Ok(m) if m.is_file() => m,
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let etag = ContentMd5::of_file(&path).await.ok().map(|d| d.to_hex());
        let last_modified = meta.modified().ok().map(DateTime::<Utc>::from);
        let content_length = i64::try_from(meta.len()).ok();
        Ok(Some(BlobProperties { etag, last_modified, content_length }))
    }

    async fn signed_url(&self, req: &SignedUrlRequest) -> Result<String> {
        let secret = self.signing_secret.as_deref().ok_or_else(|| {
            StorageError::Config("signing_secret is required to sign file URLs".into())
        })?;
        self.key_path(&req.key)?;

        let expires = req.deadline().timestamp();
        let method = req.method.as_http();
        let mac = hmac_sha256(secret.as_bytes(), self.string_to_sign(method, expires, &req.key).as_bytes())?;
        let signature: String = mac.iter().map(|b| format!("{:02x}", b)).collect();

        let base = std::path::absolute(&self.container).unwrap_or_else(|_| self.container.clone());
        Ok(format!(
            "file://{}/{}?method={}&expires={}&signature={}",
            utf8_percent_encode(&base.to_string_lossy(), KEY_PATH),
            utf8_percent_encode(&req.key, KEY_PATH),
            method,
            expires,
            signature
        ))
    }

    async fn container_exists(&self) -> Result<bool> {
        match fs::metadata(&self.container).await {
            Ok(m) => Ok(m.is_dir()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_container(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await?;
        match fs::create_dir(&self.container).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(StorageError::AlreadyExists(format!(
                "container '{}' already exists",
                self.container_name
            ))),
            Err(e) => Err(e.into()),
        }
    }
}
