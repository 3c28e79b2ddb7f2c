// src/s3_store.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! ObjectStore adapter for S3 and S3-compatible services.
//!
//! AWS and most S3 clones page with ListObjectsV2 continuation tokens;
//! Alibaba OSS is driven through the v1 ListObjects call, whose cursor is a
//! `marker` key. Everything else is shared.

use async_trait::async_trait;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::path::Path;
use tracing::{debug, info};

use crate::checksum::ContentMd5;
use crate::config::{AliOssConfig, S3Config};
use crate::constants::{DEFAULT_LIST_PAGE_SIZE, DEFAULT_REGION};
use crate::error::{Result, StorageError};
use crate::object_store::{ObjectStore, StagedDownload};
use crate::pagination::{ListingPage, PageSource};
use crate::properties::{BlobProperties, absent_as_none, trim_etag};
use crate::s3_client::{oss_client, s3_client};
use crate::signing::{SignMethod, SignedUrlRequest};

/// Characters escaped in `x-amz-copy-source`; `/` stays literal.
const COPY_SOURCE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Which listing call (and cursor) the service speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListDialect {
    /// ListObjectsV2, opaque continuation token
    ContinuationToken,
    /// ListObjects v1, `marker` / `NextMarker` / `IsTruncated`
    Marker,
}

pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    dialect: ListDialect,
    backend: &'static str,
}

impl S3ObjectStore {
    pub async fn from_s3_config(config: S3Config) -> Result<Self> {
        let client = s3_client(&config).await?;
        Ok(Self::with_client(client, config.bucket_name, ListDialect::ContinuationToken, "s3"))
    }

    pub async fn from_alioss_config(config: AliOssConfig) -> Result<Self> {
        let client = oss_client(&config).await?;
        Ok(Self::with_client(client, config.bucket_name, ListDialect::Marker, "alioss"))
    }

    pub fn with_client(client: Client, bucket: String, dialect: ListDialect, backend: &'static str) -> Self {
        Self { client, bucket, dialect, backend }
    }

    async fn head(&self, key: &str) -> Result<BlobProperties> {
        let out = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify(e, format!("head {}/{}", self.bucket, key)))?;

        Ok(BlobProperties {
            etag: out.e_tag().and_then(trim_etag),
            last_modified: out
                .last_modified()
                .and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos())),
            content_length: out.content_length().filter(|n| *n >= 0),
        })
    }
}

/// Map an SDK failure onto the storage taxonomy from its HTTP status and
/// S3 error code.
fn classify<E>(err: SdkError<E, HttpResponse>, context: String) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let status = err.raw_response().map(|r| r.status().as_u16());
    let code = err.code().map(str::to_string);
    let detail = match (code.as_deref(), err.message()) {
        (Some(c), Some(m)) => format!("{}: {} ({})", context, c, m),
        (Some(c), None) => format!("{}: {}", context, c),
        _ => format!("{}: {}", context, DisplayErrorContext(&err)),
    };

    match (status, code.as_deref()) {
        (_, Some("BadDigest" | "InvalidDigest")) => StorageError::Integrity(detail),
        (_, Some("BucketAlreadyOwnedByYou" | "BucketAlreadyExists")) => StorageError::AlreadyExists(detail),
        (_, Some("NoSuchKey" | "NoSuchBucket" | "NotFound")) | (Some(404), _) => StorageError::NotFound(detail),
        (_, Some("AccessDenied" | "InvalidAccessKeyId" | "SignatureDoesNotMatch" | "ExpiredToken"))
        | (Some(401 | 403), _) => StorageError::Auth(detail),
        _ => StorageError::Backend(detail),
    }
}

/// Page from a v1 ListObjects response. NextMarker is optional without a
/// delimiter; the last key is the marker then.
fn marker_page(keys: Vec<String>, next_marker: Option<&str>, truncated: bool) -> ListingPage {
    if !truncated {
        return ListingPage::last(keys);
    }
    let next = next_marker
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .or_else(|| keys.last().cloned());
    ListingPage { keys, continuation: next, has_more: true }
}

#[async_trait]
impl PageSource for S3ObjectStore {
    async fn fetch_page(&self, prefix: &str, cursor: Option<&str>) -> Result<ListingPage> {
        match self.dialect {
            ListDialect::ContinuationToken => {
                let out = self
                    .client
                    .list_objects_v2()
                    .bucket(&self.bucket)
                    .prefix(prefix)
                    .max_keys(DEFAULT_LIST_PAGE_SIZE)
                    .set_continuation_token(cursor.map(str::to_string))
                    .send()
                    .await
                    .map_err(|e| classify(e, format!("list {}/{}", self.bucket, prefix)))?;

                let keys: Vec<String> = out.contents().iter().filter_map(|o| o.key().map(str::to_string)).collect();
                Ok(ListingPage {
                    keys,
                    continuation: out.next_continuation_token().map(str::to_string),
                    has_more: out.is_truncated().unwrap_or(false),
                })
            }
            ListDialect::Marker => {
                let out = self
                    .client
                    .list_objects()
                    .bucket(&self.bucket)
                    .prefix(prefix)
                    .max_keys(DEFAULT_LIST_PAGE_SIZE)
                    .set_marker(cursor.map(str::to_string))
                    .send()
                    .await
                    .map_err(|e| classify(e, format!("list {}/{}", self.bucket, prefix)))?;

                let keys: Vec<String> = out.contents().iter().filter_map(|o| o.key().map(str::to_string)).collect();
                Ok(marker_page(keys, out.next_marker(), out.is_truncated().unwrap_or(false)))
            }
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn backend_name(&self) -> &'static str {
        self.backend
    }

    fn container(&self) -> &str {
        &self.bucket
    }

    async fn upload(&self, src: &Path, checksum: Option<&ContentMd5>, key: &str) -> Result<()> {
        info!("Uploading {}/{}", self.bucket, key);
        let body = ByteStream::from_path(src)
            .await
            .map_err(|e| StorageError::Transfer(format!("failed to open {}: {}", src.display(), e)))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .set_content_md5(checksum.map(ContentMd5::to_base64))
            .body(body)
            .send()
            .await
            .map_err(|e| classify(e, format!("put {}/{}", self.bucket, key)).into_transfer())?;
        Ok(())
    }

    async fn download(&self, key: &str, dest: &Path) -> Result<()> {
        info!("Downloading {}/{}", self.bucket, key);
        let mut resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify(e, format!("get {}/{}", self.bucket, key)).into_transfer())?;

        let mut stage = StagedDownload::new(dest)?;
        while let Some(chunk) = resp
            .body
            .try_next()
            .await
            .map_err(|e| StorageError::Transfer(format!("get {}/{}: {}", self.bucket, key, e)))?
        {
            stage.write(&chunk).await?;
        }
        stage.commit().await?;
        Ok(())
    }

    async fn copy(&self, src_key: &str, dst_key: &str) -> Result<()> {
        info!("Copying {}/{} to {}", self.bucket, src_key, dst_key);
        let source = format!("{}/{}", self.bucket, utf8_percent_encode(src_key, COPY_SOURCE));
        self.client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(source)
            .key(dst_key)
            .send()
            .await
            .map_err(|e| classify(e, format!("copy {}/{} to {}", self.bucket, src_key, dst_key)).into_transfer())?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        info!("Deleting {}/{}", self.bucket, key);
        match self.client.delete_object().bucket(&self.bucket).key(key).send().await {
            Ok(_) => Ok(()),
            Err(e) => match classify(e, format!("delete {}/{}", self.bucket, key)) {
                StorageError::NotFound(detail) => {
                    debug!("delete of absent object treated as success: {}", detail);
                    Ok(())
                }
                other => Err(other),
            },
        }
    }

    async fn properties(&self, key: &str) -> Result<Option<BlobProperties>> {
        absent_as_none(self.head(key).await)
    }

    async fn signed_url(&self, req: &SignedUrlRequest) -> Result<String> {
        let presign = PresigningConfig::expires_in(req.expiry)
            .map_err(|e| StorageError::Config(format!("invalid signed URL expiry: {}", e)))?;
        let context = || format!("sign {} {}/{}", req.method, self.bucket, req.key);

        let presigned = match req.method {
            SignMethod::Get => self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(&req.key)
                .presigned(presign)
                .await
                .map_err(|e| classify(e, context()))?,
            SignMethod::Put => self
                .client
                .put_object()
                .bucket(&self.bucket)
                .key(&req.key)
                .presigned(presign)
                .await
                .map_err(|e| classify(e, context()))?,
        };
        Ok(presigned.uri().to_string())
    }

    async fn container_exists(&self) -> Result<bool> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(true),
            Err(e) => match classify(e, format!("head bucket {}", self.bucket)) {
                StorageError::NotFound(_) => Ok(false),
                other => Err(other),
            },
        }
    }

    async fn create_container(&self) -> Result<()> {
        let mut req = self.client.create_bucket().bucket(&self.bucket);

        // Outside us-east-1 AWS wants the region repeated as a location constraint.
        if self.dialect == ListDialect::ContinuationToken {
            if let Some(region) = self.client.config().region().map(|r| r.as_ref().to_string()) {
                if region != DEFAULT_REGION {
                    req = req.create_bucket_configuration(
                        CreateBucketConfiguration::builder()
                            .location_constraint(BucketLocationConstraint::from(region.as_str()))
                            .build(),
                    );
                }
            }
        }

        req.send()
            .await
            .map_err(|e| classify(e, format!("create bucket {}", self.bucket)))?;
        Ok(())
    }
}
