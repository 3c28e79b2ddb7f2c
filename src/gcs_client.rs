// src/gcs_client.rs
//
// Google Cloud Storage adapter using the gcloud-storage crate.
// Authenticates with Application Default Credentials (ADC), or anonymously
// against an emulator endpoint.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gcloud_storage::client::{Client, ClientConfig};
use gcloud_storage::http::Error as GcsHttpError;
use gcloud_storage::http::buckets::get::GetBucketRequest;
use gcloud_storage::http::buckets::insert::{InsertBucketParam, InsertBucketRequest};
use gcloud_storage::http::objects::Object;
use gcloud_storage::http::objects::copy::CopyObjectRequest;
use gcloud_storage::http::objects::delete::DeleteObjectRequest;
use gcloud_storage::http::objects::download::Range;
use gcloud_storage::http::objects::get::GetObjectRequest;
use gcloud_storage::http::objects::list::ListObjectsRequest;
use gcloud_storage::http::objects::upload::{UploadObjectRequest, UploadType};
use gcloud_storage::sign::{SignedURLMethod, SignedURLOptions};
use std::path::Path;
use tracing::{debug, info};

use crate::checksum::ContentMd5;
use crate::config::GcsConfig;
use crate::constants::{DEFAULT_LIST_PAGE_SIZE, ENV_STORAGE_EMULATOR_HOST};
use crate::error::{Result, StorageError};
use crate::object_store::{ObjectStore, StagedDownload};
use crate::pagination::{ListingPage, PageSource};
use crate::properties::{BlobProperties, absent_as_none, trim_etag};
use crate::signing::{SignMethod, SignedUrlRequest};

pub struct GcsObjectStore {
    client: Client,
    bucket: String,
    project_id: Option<String>,
}

impl GcsObjectStore {
    /// Build the one client used for the whole invocation.
    ///
    /// Credentials are discovered from:
    /// - GOOGLE_APPLICATION_CREDENTIALS (loaded from `.env` by the CLI)
    /// - the metadata server when running on GCP
    /// - gcloud CLI credentials
    pub async fn new(config: GcsConfig) -> Result<Self> {
        let endpoint = resolve_endpoint(config.endpoint.as_deref());

        let client_config = match &endpoint {
            Some(endpoint) => {
                info!("Using custom GCS endpoint: {}", endpoint);
                ClientConfig { storage_endpoint: endpoint.clone(), ..ClientConfig::default() }.anonymous()
            }
            None => {
                debug!("Initializing GCS client with Application Default Credentials");
                ClientConfig::default()
                    .with_auth()
                    .await
                    .map_err(|e| StorageError::Auth(format!("failed to initialize GCS authentication: {}", e)))?
            }
        };

        let project_id = config.project_id.clone().or_else(|| client_config.project_id.clone());
        Ok(Self { client: Client::new(client_config), bucket: config.bucket_name, project_id })
    }

    fn object_request(&self, key: &str) -> GetObjectRequest {
        GetObjectRequest { bucket: self.bucket.clone(), object: key.to_string(), ..Default::default() }
    }
}

/// Config endpoint first, then the emulator convention (`host:port`).
fn resolve_endpoint(configured: Option<&str>) -> Option<String> {
    configured
        .filter(|e| !e.is_empty())
        .map(str::to_string)
        .or_else(|| std::env::var(ENV_STORAGE_EMULATOR_HOST).ok().filter(|h| !h.is_empty()))
        .map(|host| {
            if host.starts_with("http://") || host.starts_with("https://") {
                host.trim_end_matches('/').to_string()
            } else {
                format!("http://{}", host.trim_end_matches('/'))
            }
        })
}

/// Map a GCS JSON API failure onto the storage taxonomy.
fn classify(err: GcsHttpError, context: String) -> StorageError {
    match err {
        GcsHttpError::Response(resp) => {
            let detail = format!("{}: {} ({})", context, resp.code, resp.message);
            match resp.code {
                404 => StorageError::NotFound(detail),
                401 | 403 => StorageError::Auth(detail),
                409 => StorageError::AlreadyExists(detail),
                400 if resp.message.to_ascii_lowercase().contains("md5") => StorageError::Integrity(detail),
                _ => StorageError::Backend(detail),
            }
        }
        other => StorageError::Backend(format!("{}: {}", context, other)),
    }
}

#[async_trait]
impl PageSource for GcsObjectStore {
    async fn fetch_page(&self, prefix: &str, cursor: Option<&str>) -> Result<ListingPage> {
        let request = ListObjectsRequest {
            bucket: self.bucket.clone(),
            prefix: Some(prefix.to_string()).filter(|p| !p.is_empty()),
            page_token: cursor.map(str::to_string),
            max_results: Some(DEFAULT_LIST_PAGE_SIZE),
            ..Default::default()
        };
        let response = self
            .client
            .list_objects(&request)
            .await
            .map_err(|e| classify(e, format!("list gs://{}/{}", self.bucket, prefix)))?;

        let keys: Vec<String> = response.items.unwrap_or_default().into_iter().map(|obj| obj.name).collect();
        Ok(match response.next_page_token.filter(|t| !t.is_empty()) {
            Some(token) => ListingPage::truncated(keys, token),
            None => ListingPage::last(keys),
        })
    }
}

#[async_trait]
impl ObjectStore for GcsObjectStore {
    fn backend_name(&self) -> &'static str {
        "gcs"
    }

    fn container(&self) -> &str {
        &self.bucket
    }

    async fn upload(&self, src: &Path, checksum: Option<&ContentMd5>, key: &str) -> Result<()> {
        info!("Uploading gs://{}/{}", self.bucket, key);
        let data = tokio::fs::read(src)
            .await
            .map_err(|e| StorageError::Transfer(format!("failed to read {}: {}", src.display(), e)))?;

        // Multipart upload carries the object resource, so GCS verifies md5Hash.
        let metadata = Object {
            name: key.to_string(),
            bucket: self.bucket.clone(),
            md5_hash: checksum.map(ContentMd5::to_base64),
            ..Default::default()
        };
        self.client
            .upload_object(
                &UploadObjectRequest { bucket: self.bucket.clone(), ..Default::default() },
                data,
                &UploadType::Multipart(Box::new(metadata)),
            )
            .await
            .map_err(|e| classify(e, format!("put gs://{}/{}", self.bucket, key)).into_transfer())?;
        Ok(())
    }

    async fn download(&self, key: &str, dest: &Path) -> Result<()> {
        info!("Downloading gs://{}/{}", self.bucket, key);
        let data = self
            .client
            .download_object(&self.object_request(key), &Range::default())
            .await
            .map_err(|e| classify(e, format!("get gs://{}/{}", self.bucket, key)).into_transfer())?;

        let mut stage = StagedDownload::new(dest)?;
        stage.write(&data).await?;
        stage.commit().await?;
        Ok(())
    }

    async fn copy(&self, src_key: &str, dst_key: &str) -> Result<()> {
        info!("Copying gs://{}/{} to {}", self.bucket, src_key, dst_key);
        let request = CopyObjectRequest {
            source_bucket: self.bucket.clone(),
            source_object: src_key.to_string(),
            destination_bucket: self.bucket.clone(),
            destination_object: dst_key.to_string(),
            ..Default::default()
        };
        self.client
            .copy_object(&request)
            .await
            .map_err(|e| classify(e, format!("copy gs://{}/{} to {}", self.bucket, src_key, dst_key)).into_transfer())?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        info!("Deleting gs://{}/{}", self.bucket, key);
        let request = DeleteObjectRequest { bucket: self.bucket.clone(), object: key.to_string(), ..Default::default() };
        match self.client.delete_object(&request).await {
            Ok(()) => Ok(()),
            Err(e) => match classify(e, format!("delete gs://{}/{}", self.bucket, key)) {
                StorageError::NotFound(_) => Ok(()),
                other => Err(other),
            },
        }
    }

    async fn properties(&self, key: &str) -> Result<Option<BlobProperties>> {
        let obj = self
            .client
            .get_object(&self.object_request(key))
            .await
            .map_err(|e| classify(e, format!("stat gs://{}/{}", self.bucket, key)));
        let Some(obj) = absent_as_none(obj)? else {
            return Ok(None);
        };

        Ok(Some(BlobProperties {
            etag: trim_etag(&obj.etag),
            last_modified: obj
                .updated
                .and_then(|dt| DateTime::<Utc>::from_timestamp(dt.unix_timestamp(), dt.nanosecond())),
            content_length: Some(obj.size).filter(|n| *n >= 0),
        }))
    }

    async fn signed_url(&self, req: &SignedUrlRequest) -> Result<String> {
        let method = match req.method {
            SignMethod::Get => SignedURLMethod::GET,
            SignMethod::Put => SignedURLMethod::PUT,
        };
        let opts = SignedURLOptions { method, expires: req.expiry, ..Default::default() };
        self.client
            .signed_url(&self.bucket, &req.key, None, None, opts)
            .await
            .map_err(|e| StorageError::Auth(format!("sign {} gs://{}/{}: {}", req.method, self.bucket, req.key, e)))
    }

    async fn container_exists(&self) -> Result<bool> {
        let request = GetBucketRequest { bucket: self.bucket.clone(), ..Default::default() };
        match self.client.get_bucket(&request).await {
            Ok(_) => Ok(true),
            Err(e) => match classify(e, format!("get bucket {}", self.bucket)) {
                StorageError::NotFound(_) => Ok(false),
                other => Err(other),
            },
        }
    }

    async fn create_container(&self) -> Result<()> {
        let project = self.project_id.clone().ok_or_else(|| {
            StorageError::Config(format!("project_id is required to create bucket {}", self.bucket))
        })?;
        let request = InsertBucketRequest {
            name: self.bucket.clone(),
            param: InsertBucketParam { project, ..Default::default() },
            ..Default::default()
        };
        self.client
            .insert_bucket(&request)
            .await
            .map_err(|e| classify(e, format!("create bucket {}", self.bucket)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use gcloud_storage::http::error::ErrorResponse;

    fn response(code: u16, message: &str) -> GcsHttpError {
        GcsHttpError::Response(ErrorResponse { code, errors: Vec::new(), message: message.to_string() })
    }

    #[test]
    fn service_errors_map_onto_the_taxonomy() {
        let e = classify(response(404, "No such object: b/k"), "get gs://b/k".into());
        assert!(e.is_not_found(), "got {e:?}");
        assert!(e.to_string().contains("get gs://b/k: 404"));

        let e = classify(response(400, "Provided MD5 hash doesn't match calculated MD5 hash."), "put".into());
        assert!(matches!(e, StorageError::Integrity(_)), "got {e:?}");

        let e = classify(response(400, "Invalid argument."), "put".into());
        assert!(matches!(e, StorageError::Backend(_)), "got {e:?}");

        let e = classify(response(409, "You already own this bucket."), "create bucket b".into());
        assert!(matches!(e, StorageError::AlreadyExists(_)), "got {e:?}");

        for code in [401, 403] {
            let e = classify(response(code, "Permission denied"), "get".into());
            assert!(matches!(e, StorageError::Auth(_)), "{code} gave {e:?}");
        }

        let e = classify(response(503, "Backend unavailable"), "get".into());
        assert!(matches!(e, StorageError::Backend(_)), "got {e:?}");
    }

    #[test]
    fn configured_endpoint_gets_a_scheme() {
        assert_eq!(resolve_endpoint(Some("localhost:4443")).as_deref(), Some("http://localhost:4443"));
        assert_eq!(
            resolve_endpoint(Some("https://gcs.example.com/")).as_deref(),
            Some("https://gcs.example.com")
        );
    }
}
