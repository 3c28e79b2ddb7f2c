// tests/common/mod.rs
//
// Shared helpers: a throwaway filesystem-backed store per test.

#![allow(dead_code)]

use anyhow::Result;
use blobctl::config::FileConfig;
use blobctl::file_store::FileSystemObjectStore;
use blobctl::{ContentMd5, ObjectStore};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const CONTAINER: &str = "test-bucket";
pub const SIGNING_SECRET: &str = "test-signing-secret";

pub fn file_config(root: &Path, page_size: Option<usize>) -> FileConfig {
    FileConfig {
        root_dir: root.to_path_buf(),
        container_name: CONTAINER.to_string(),
        page_size,
        signing_secret: Some(SIGNING_SECRET.to_string()),
    }
}

/// Store over a fresh temp root whose container already exists.
pub async fn new_store(page_size: Option<usize>) -> Result<(TempDir, FileSystemObjectStore)> {
    let root = TempDir::new()?;
    let store = FileSystemObjectStore::new(file_config(root.path(), page_size));
    store.ensure_container_exists().await?;
    Ok((root, store))
}

/// Write `data` to a local scratch file and return its path.
pub fn write_local(dir: &Path, name: &str, data: &[u8]) -> Result<PathBuf> {
    let path = dir.join(name);
    std::fs::write(&path, data)?;
    Ok(path)
}

/// Upload `data` to `key` through a scratch file, with its Content-MD5.
pub async fn put_bytes(store: &dyn ObjectStore, key: &str, data: &[u8]) -> Result<()> {
    let scratch = TempDir::new()?;
    let src = write_local(scratch.path(), "upload.bin", data)?;
    let md5 = ContentMd5::of_bytes(data);
    store.upload(&src, Some(&md5), key).await?;
    Ok(())
}
