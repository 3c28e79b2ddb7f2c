// tests/test_recursive_delete.rs
//
// Best-effort recursive delete: one stuck object must not stop the rest.

mod common;

use anyhow::Result;
use async_trait::async_trait;
use blobctl::file_store::FileSystemObjectStore;
use blobctl::recursive_delete::delete_recursive_with_summary;
use blobctl::{BlobProperties, ContentMd5, ListingPage, ObjectStore, PageSource, SignedUrlRequest, StorageError};
use common::{new_store, put_bytes};
use std::path::Path;
use std::sync::Mutex;

/// Delegates to a filesystem store, but refuses to delete one key and
/// records the order deletes were attempted in.
struct StuckKeyStore {
    inner: FileSystemObjectStore,
    stuck: String,
    attempts: Mutex<Vec<String>>,
}

#[async_trait]
impl PageSource for StuckKeyStore {
    async fn fetch_page(&self, prefix: &str, cursor: Option<&str>) -> blobctl::Result<ListingPage> {
        self.inner.fetch_page(prefix, cursor).await
    }
}

#[async_trait]
impl ObjectStore for StuckKeyStore {
    fn backend_name(&self) -> &'static str {
        "stuck"
    }

    fn container(&self) -> &str {
        self.inner.container()
    }

    async fn upload(&self, src: &Path, checksum: Option<&ContentMd5>, key: &str) -> blobctl::Result<()> {
        self.inner.upload(src, checksum, key).await
    }

    async fn download(&self, key: &str, dest: &Path) -> blobctl::Result<()> {
        self.inner.download(key, dest).await
    }

    async fn copy(&self, src_key: &str, dst_key: &str) -> blobctl::Result<()> {
        self.inner.copy(src_key, dst_key).await
    }

    async fn delete(&self, key: &str) -> blobctl::Result<()> {
        self.attempts.lock().unwrap().push(key.to_string());
        if key == self.stuck {
            return Err(StorageError::Auth(format!("delete of '{}' denied", key)));
        }
        self.inner.delete(key).await
    }

    async fn properties(&self, key: &str) -> blobctl::Result<Option<BlobProperties>> {
        self.inner.properties(key).await
    }

    async fn signed_url(&self, req: &SignedUrlRequest) -> blobctl::Result<String> {
        self.inner.signed_url(req).await
    }

    async fn container_exists(&self) -> blobctl::Result<bool> {
        self.inner.container_exists().await
    }

    async fn create_container(&self) -> blobctl::Result<()> {
        self.inner.create_container().await
    }
}

#[tokio::test]
async fn test_failed_delete_does_not_stop_the_rest() -> Result<()> {
    let (_root, inner) = new_store(Some(2)).await?;
    for key in ["logs/1", "logs/2", "logs/3", "logs/4", "keep"] {
        put_bytes(&inner, key, key.as_bytes()).await?;
    }
    let store = StuckKeyStore { inner, stuck: "logs/2".into(), attempts: Mutex::new(Vec::new()) };

    // Per-object failures are logged, not returned.
    store.delete_recursive("logs/").await?;

    assert!(!store.exists("logs/1").await?);
    assert!(store.exists("logs/2").await?, "the stuck key survives");
    assert!(!store.exists("logs/3").await?);
    assert!(!store.exists("logs/4").await?);
    assert!(store.exists("keep").await?);

    // Deletes follow listing order.
    assert_eq!(*store.attempts.lock().unwrap(), vec!["logs/1", "logs/2", "logs/3", "logs/4"]);
    Ok(())
}

#[tokio::test]
async fn test_summary_counts() -> Result<()> {
    let (_root, inner) = new_store(None).await?;
    for key in ["a/1", "a/2", "a/3"] {
        put_bytes(&inner, key, b"x").await?;
    }
    let store = StuckKeyStore { inner, stuck: "a/3".into(), attempts: Mutex::new(Vec::new()) };

    let summary = delete_recursive_with_summary(&store, "a/").await?;
    assert_eq!((summary.listed, summary.deleted, summary.failed), (3, 2, 1));
    Ok(())
}

#[tokio::test]
async fn test_empty_prefix_clears_the_container() -> Result<()> {
    let (_root, store) = new_store(None).await?;
    for key in ["x", "y/z", "deep/er/key"] {
        put_bytes(&store, key, b"x").await?;
    }
    store.delete_recursive("").await?;
    assert!(store.list("").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_listing_failure_is_returned() -> Result<()> {
    let root = tempfile::TempDir::new()?;
    // Container never created: the listing itself fails.
    let store = FileSystemObjectStore::new(common::file_config(root.path(), None));
    let err = store.delete_recursive("any").await.unwrap_err();
    assert!(err.is_not_found(), "got {err:?}");
    Ok(())
}
