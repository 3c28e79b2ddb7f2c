// src/azure_client.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// ObjectStore adapter for Azure Blob Storage, bound to one container.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use futures::StreamExt;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use azure_core::credentials::TokenCredential;
use azure_core::error::{ErrorKind, HttpError};
use azure_core::http::headers::HeaderName;
use azure_core::http::policies::{BearerTokenCredentialPolicy, Policy};
use azure_core::http::{
    Body, ClientOptions, Context, Method, NoFormat, Pipeline, Request, RequestContent, StatusCode, Url,
};
use azure_identity::DefaultAzureCredential;

use azure_storage_blob::clients::{
    BlobClient, BlobClientOptions, BlobContainerClient, BlobContainerClientOptions,
};
use azure_storage_blob::models::{
    BlobClientDownloadOptions, BlobClientGetPropertiesOptions, BlobClientGetPropertiesResultHeaders,
    BlobContainerClientListBlobFlatSegmentOptions, BlockBlobClientUploadOptions, CopyStatus,
    ListBlobsFlatSegmentResponse,
};

use crate::checksum::ContentMd5;
use crate::config::AzureConfig;
use crate::constants::{
    AZURE_COPY_MAX_POLLS, AZURE_COPY_POLL_INTERVAL, AZURE_STORAGE_VERSION, DEFAULT_LIST_PAGE_SIZE,
};
use crate::error::{Result, StorageError};
use crate::object_store::{ObjectStore, StagedDownload};
use crate::pagination::{ListingPage, PageSource};
use crate::properties::{BlobProperties, absent_as_none, trim_etag};
use crate::signing::{SignMethod, SignedUrlRequest, hmac_sha256};

/// Escape set for blob names inside URLs; `/` separates virtual directories.
const BLOB_PATH: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Escape set for query-string values.
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');

const STORAGE_SCOPE: &str = "https://storage.azure.com/.default";
const COPY_STATUS: HeaderName = HeaderName::from_static("x-ms-copy-status");
const COPY_STATUS_DESCRIPTION: HeaderName = HeaderName::from_static("x-ms-copy-status-description");

pub struct AzureBlobStore {
    account_name: String,
    account_url: String, // e.g. https://{account}.blob.core.windows.net
    container: String,
    account_key: Option<String>,
    credential: Arc<dyn TokenCredential>,
    // Bearer-authenticated pipeline for REST calls the blob clients do not expose (Copy Blob).
    pipeline: Pipeline,
}

impl AzureBlobStore {
    /// Build with the Entra ID default chain (env, managed identity, CLI).
    /// The account key, when configured, is only used to sign SAS URLs.
    pub fn new(config: AzureConfig) -> Result<Self> {
        let credential: Arc<dyn TokenCredential> = DefaultAzureCredential::new()
            .map_err(|e| StorageError::Auth(format!("failed to build Azure credential: {}", e)))?;
        let account_url = config.account_url();
        debug!("Azure adapter: account_url={}, container={}", account_url, config.container_name);

        let auth: Arc<dyn Policy> = Arc::new(BearerTokenCredentialPolicy::new(credential.clone(), [STORAGE_SCOPE]));
        let pipeline = Pipeline::new(
            option_env!("CARGO_PKG_NAME"),
            option_env!("CARGO_PKG_VERSION"),
            ClientOptions::default(),
            Vec::new(),
            vec![auth],
        );

        Ok(Self {
            account_name: config.account_name,
            account_url,
            container: config.container_name,
            account_key: config.account_key,
            credential,
            pipeline,
        })
    }

    fn container_client(&self) -> Result<BlobContainerClient> {
        BlobContainerClient::new(
            &self.account_url,
            self.container.clone(),
            self.credential.clone(),
            Some(BlobContainerClientOptions::default()),
        )
        .map_err(|e| StorageError::Config(format!("invalid Azure container client: {}", e)))
    }

    fn blob_client(&self, blob: &str) -> Result<BlobClient> {
        BlobClient::new(
            &self.account_url,
            self.container.clone(),
            blob.to_string(),
            self.credential.clone(),
            Some(BlobClientOptions::default()),
        )
        .map_err(|e| StorageError::Config(format!("invalid Azure blob client: {}", e)))
    }

    async fn get_bytes(&self, key: &str) -> Result<Bytes> {
        let blob = self.blob_client(key)?;
        let resp = blob
            .download(Some(BlobClientDownloadOptions::default()))
            .await
            .map_err(|e| classify(e, format!("get {}/{}", self.container, key)))?;
        resp.into_raw_body()
            .collect()
            .await
            .map_err(|e| StorageError::Transfer(format!("get {}/{}: {}", self.container, key, e)))
    }

    async fn put_bytes(&self, key: &str, body: Bytes, checksum: Option<&ContentMd5>) -> Result<()> {
        let blob = self.blob_client(key)?;
        let content_len = body.len() as u64;
        let data: RequestContent<Bytes, NoFormat> = Body::from(body).into();
        let mut opts = BlockBlobClientUploadOptions::default();
        if let Some(md5) = checksum {
            opts.transactional_content_md5 = Some(md5.as_bytes().to_vec());
        }
        blob.upload(data, true, content_len, Some(opts))
            .await
            .map_err(|e| classify(e, format!("put {}/{}", self.container, key)))?;
        Ok(())
    }

    /// Copy Blob within the container. Same-account sources are authorized by
    /// the destination request's bearer token; the service usually finishes
    /// such a copy before answering, otherwise it is polled to completion.
    async fn copy_blob(&self, src_key: &str, dst_key: &str) -> Result<()> {
        let context = || format!("copy {}/{} to {}", self.container, src_key, dst_key);
        let dest = Url::parse(&blob_url(&self.account_url, &self.container, dst_key))
            .map_err(|e| StorageError::Config(format!("invalid Azure blob URL: {}", e)))?;

        let mut request = Request::new(dest, Method::Put);
        request.insert_header("x-ms-copy-source", blob_url(&self.account_url, &self.container, src_key));
        request.insert_header("x-ms-version", AZURE_STORAGE_VERSION);

        let rsp = self
            .pipeline
            .send(&Context::new(), &mut request)
            .await
            .map_err(|e| classify(e, context()))?;
        if !rsp.status().is_success() {
            let status = rsp.status();
            let http_error = HttpError::new(rsp).await;
            let kind = ErrorKind::http_response(status, http_error.error_code().map(str::to_owned));
            return Err(classify(azure_core::Error::new(kind, http_error), context()));
        }

        match rsp.headers().get_optional_str(&COPY_STATUS) {
            Some("pending") => self.wait_for_copy(dst_key).await,
            Some("success") | None => Ok(()),
            Some(other) => Err(StorageError::Transfer(format!(
                "{}: copy status {} ({})",
                context(),
                other,
                rsp.headers().get_optional_str(&COPY_STATUS_DESCRIPTION).unwrap_or("no description")
            ))),
        }
    }

    async fn wait_for_copy(&self, dst_key: &str) -> Result<()> {
        let blob = self.blob_client(dst_key)?;
        for _ in 0..AZURE_COPY_MAX_POLLS {
            tokio::time::sleep(AZURE_COPY_POLL_INTERVAL).await;
            let resp = blob
                .get_properties(Some(BlobClientGetPropertiesOptions::default()))
                .await
                .map_err(|e| classify(e, format!("head {}/{}", self.container, dst_key)))?;
            match resp.copy_status().ok().flatten() {
                Some(CopyStatus::Pending) => continue,
                Some(CopyStatus::Success) | None => return Ok(()),
                Some(status) => {
                    let detail = resp.copy_status_description().ok().flatten().unwrap_or_default();
                    return Err(StorageError::Transfer(format!(
                        "copy to {}/{} ended as {:?}: {}",
                        self.container, dst_key, status, detail
                    )));
                }
            }
        }
        Err(StorageError::Transfer(format!(
            "copy to {}/{} still pending after {} polls",
            self.container, dst_key, AZURE_COPY_MAX_POLLS
        )))
    }

    /// Service SAS for one blob, signed with the account key.
    fn sas_url(&self, req: &SignedUrlRequest, expiry: DateTime<Utc>) -> Result<String> {
        let key = self.account_key.as_deref().ok_or_else(|| {
            StorageError::Config("account_key is required to sign Azure URLs".into())
        })?;
        let key = STANDARD
            .decode(key)
            .map_err(|e| StorageError::Config(format!("account_key is not valid base64: {}", e)))?;

        let permissions = sas_permissions(req.method);
        let expiry = expiry.to_rfc3339_opts(SecondsFormat::Secs, true);
        let resource = format!("/blob/{}/{}/{}", self.account_name, self.container, req.key);
        let to_sign = sas_string_to_sign(permissions, &expiry, &resource, AZURE_STORAGE_VERSION);
        let sig = STANDARD.encode(hmac_sha256(&key, to_sign.as_bytes())?);

        Ok(format!(
            "{}?sv={}&se={}&sr=b&sp={}&sig={}",
            blob_url(&self.account_url, &self.container, &req.key),
            AZURE_STORAGE_VERSION,
            utf8_percent_encode(&expiry, QUERY_VALUE),
            permissions,
            utf8_percent_encode(&sig, QUERY_VALUE),
        ))
    }
}

/// `{account_url}/{container}/{escaped key}`, `/` kept between virtual directories.
fn blob_url(account_url: &str, container: &str, key: &str) -> String {
    format!("{}/{}/{}", account_url, container, utf8_percent_encode(key, BLOB_PATH))
}

fn sas_permissions(method: SignMethod) -> &'static str {
    match method {
        SignMethod::Get => "r",
        SignMethod::Put => "cw",
    }
}

/// Blob service SAS string-to-sign (versions 2020-12-06 and later).
/// Unused fields stay as empty lines.
fn sas_string_to_sign(permissions: &str, expiry: &str, resource: &str, version: &str) -> String {
    [
        permissions, // sp
        "",          // st
        expiry,      // se
        resource,    // canonicalized resource
        "",          // si
        "",          // sip
        "",          // spr
        version,     // sv
        "b",         // sr
        "",          // snapshot time
        "",          // encryption scope
        "",          // rscc
        "",          // rscd
        "",          // rsce
        "",          // rscl
        "",          // rsct
    ]
    .join("\n")
}

/// Map an Azure SDK failure onto the storage taxonomy.
fn classify(err: azure_core::Error, context: String) -> StorageError {
    let code = match err.kind() {
        ErrorKind::HttpResponse { error_code, .. } => error_code.clone(),
        _ => None,
    };
    let detail = match &code {
        Some(c) => format!("{}: {}", context, c),
        None => format!("{}: {}", context, err),
    };

    match (err.http_status(), code.as_deref()) {
        (_, Some("Md5Mismatch")) => StorageError::Integrity(detail),
        (_, Some("ContainerAlreadyExists")) => StorageError::AlreadyExists(detail),
        (Some(StatusCode::NotFound), _) => StorageError::NotFound(detail),
        (Some(StatusCode::Unauthorized), _) | (Some(StatusCode::Forbidden), _) => StorageError::Auth(detail),
        _ => StorageError::Backend(detail),
    }
}

#[async_trait]
impl PageSource for AzureBlobStore {
    async fn fetch_page(&self, prefix: &str, cursor: Option<&str>) -> Result<ListingPage> {
        let container = self.container_client()?;
        let mut opts = BlobContainerClientListBlobFlatSegmentOptions::default();
        if !prefix.is_empty() {
            opts.prefix = Some(prefix.to_string());
        }
        opts.marker = cursor.map(str::to_string);
        opts.maxresults = Some(DEFAULT_LIST_PAGE_SIZE);

        let context = || format!("list {}/{}", self.container, prefix);
        let mut pager = container.list_blobs(Some(opts)).map_err(|e| classify(e, context()))?;

        // Only the first page of the pager is consumed; the marker drives the rest.
        let resp = match pager.next().await {
            Some(next) => next.map_err(|e| classify(e, context()))?,
            None => return Ok(ListingPage::last(Vec::new())),
        };
        let body: ListBlobsFlatSegmentResponse = resp.into_body().await.map_err(|e| classify(e, context()))?;

        let keys: Vec<String> = body
            .segment
            .blob_items
            .into_iter()
            .filter_map(|it| it.name.and_then(|bn| bn.content))
            .collect();
        Ok(match body.next_marker.filter(|m| !m.is_empty()) {
            Some(marker) => ListingPage::truncated(keys, marker),
            None => ListingPage::last(keys),
        })
    }
}

#[async_trait]
impl ObjectStore for AzureBlobStore {
    fn backend_name(&self) -> &'static str {
        "azurebs"
    }

    fn container(&self) -> &str {
        &self.container
    }

    async fn upload(&self, src: &Path, checksum: Option<&ContentMd5>, key: &str) -> Result<()> {
        info!("Uploading {}/{}", self.container, key);
        let data = tokio::fs::read(src)
            .await
            .map_err(|e| StorageError::Transfer(format!("failed to read {}: {}", src.display(), e)))?;
        self.put_bytes(key, Bytes::from(data), checksum)
            .await
            .map_err(StorageError::into_transfer)
    }

    async fn download(&self, key: &str, dest: &Path) -> Result<()> {
        info!("Downloading {}/{}", self.container, key);
        let data = self.get_bytes(key).await.map_err(StorageError::into_transfer)?;
        let mut stage = StagedDownload::new(dest)?;
        stage.write(&data).await?;
        stage.commit().await?;
        Ok(())
    }

    async fn copy(&self, src_key: &str, dst_key: &str) -> Result<()> {
        info!("Copying {}/{} to {}", self.container, src_key, dst_key);
        self.copy_blob(src_key, dst_key).await.map_err(StorageError::into_transfer)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        info!("Deleting {}/{}", self.container, key);
        let blob = self.blob_client(key)?;
        match blob.delete(None).await {
            Ok(_) => Ok(()),
            Err(e) => match classify(e, format!("delete {}/{}", self.container, key)) {
                StorageError::NotFound(_) => Ok(()),
                other => Err(other),
            },
        }
    }

    async fn properties(&self, key: &str) -> Result<Option<BlobProperties>> {
        let blob = self.blob_client(key)?;
        let resp = blob
            .get_properties(Some(BlobClientGetPropertiesOptions::default()))
            .await
            .map_err(|e| classify(e, format!("head {}/{}", self.container, key)));
        let Some(resp) = absent_as_none(resp)? else {
            return Ok(None);
        };

        // Header parse failures degrade to absent fields.
        let etag = resp.etag().ok().flatten().and_then(|e| trim_etag(&e.to_string()));
        let last_modified = resp
            .last_modified()
            .ok()
            .flatten()
            .and_then(|dt| DateTime::<Utc>::from_timestamp(dt.unix_timestamp(), dt.nanosecond()));
        let content_length = resp
            .content_length()
            .ok()
            .flatten()
            .and_then(|n| i64::try_from(n).ok());
        Ok(Some(BlobProperties { etag, last_modified, content_length }))
    }

    async fn signed_url(&self, req: &SignedUrlRequest) -> Result<String> {
        self.sas_url(req, req.deadline())
    }

    async fn container_exists(&self) -> Result<bool> {
        let container = self.container_client()?;
        match container.get_properties(None).await {
            Ok(_) => Ok(true),
            Err(e) => match classify(e, format!("head container {}", self.container)) {
                StorageError::NotFound(_) => Ok(false),
                other => Err(other),
            },
        }
    }

    async fn create_container(&self) -> Result<()> {
        let container = self.container_client()?;
        container
            .create_container(None)
            .await
            .map_err(|e| classify(e, format!("create container {}", self.container)))?;
        Ok(())
    }
}
