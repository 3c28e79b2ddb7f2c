// src/s3_client.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! AWS SDK client construction for S3 and S3-compatible services, including
//! Alibaba OSS. One client is built per process from the loaded config and
//! owned by the adapter for the rest of the invocation.

use aws_config::meta::region::RegionProviderChain;
use aws_config::retry::RetryConfig;
use aws_sdk_s3::config::{Credentials, Region, RequestChecksumCalculation, ResponseChecksumValidation};
use aws_sdk_s3::Client;
use aws_smithy_http_client::tls;
use aws_smithy_http_client::tls::rustls_provider::CryptoMode;
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::config::{AliOssConfig, S3Config};
use crate::constants::{DEFAULT_REGION, DEFAULT_RETRY_ATTEMPTS};
use crate::error::{Result, StorageError};

const CREDENTIALS_PROVIDER: &str = "blobctl-config";

// -----------------------------------------------------------------------------
// TLS helper, for CA bundle
// -----------------------------------------------------------------------------

/// Create a TLS context trusting exactly the certificates in a PEM bundle
fn tls_context_from_pem(filename: &Path) -> Result<tls::TlsContext> {
    let pem_contents = fs::read(filename).map_err(|e| {
        StorageError::Config(format!("failed to read CA bundle file {}: {}", filename.display(), e))
    })?;

    let trust_store = tls::TrustStore::empty().with_pem_certificate(pem_contents.as_slice());

    tls::TlsContext::builder()
        .with_trust_store(trust_store)
        .build()
        .map_err(|e| {
            StorageError::Config(format!(
                "failed to build TLS context from PEM {}: {}",
                filename.display(),
                e
            ))
        })
}

// -----------------------------------------------------------------------------
// Client factories
// -----------------------------------------------------------------------------

/// Client for AWS S3 or an S3-compatible endpoint (MinIO, Ceph RGW, ...).
///
/// Static keys from the config win; without them the default AWS credential
/// chain applies (environment, `.env`, profile, IMDS).
pub async fn s3_client(config: &S3Config) -> Result<Client> {
    let region = RegionProviderChain::first_try(config.region.clone().map(Region::new))
        .or_default_provider()
        .or_else(Region::new(DEFAULT_REGION));

    let attempts = config.retry_attempts.unwrap_or(DEFAULT_RETRY_ATTEMPTS);
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::v2025_08_07())
        .region(region)
        .retry_config(RetryConfig::standard().with_max_attempts(attempts));

    if let (Some(id), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
        loader = loader.credentials_provider(Credentials::new(
            id.clone(),
            secret.clone(),
            config.session_token.clone(),
            None,
            CREDENTIALS_PROVIDER,
        ));
    }

    let endpoint = config.endpoint_url();
    if let Some(url) = &endpoint {
        loader = loader.endpoint_url(url.clone());
    }

    if let Some(ca) = &config.ca_cert {
        debug!("Loading CA bundle from: {}", ca.display());
        let tls_context = tls_context_from_pem(ca)?;
        loader = loader.http_client(
            aws_smithy_http_client::Builder::new()
                .tls_provider(tls::Provider::Rustls(CryptoMode::AwsLc))
                .tls_context(tls_context)
                .build_https(),
        );
    }

    let cfg = loader.load().await;

    let mut builder = aws_sdk_s3::config::Builder::from(&cfg).force_path_style(config.path_style());
    if endpoint.is_some() {
        // Third-party S3 implementations commonly reject the SDK's default
        // flexible-checksum trailers.
        builder = builder
            .request_checksum_calculation(RequestChecksumCalculation::WhenRequired)
            .response_checksum_validation(ResponseChecksumValidation::WhenRequired);
    }

    debug!(
        "S3 client ready: bucket={}, endpoint={:?}, path_style={}, retry_attempts={}",
        config.bucket_name,
        endpoint,
        config.path_style(),
        attempts
    );
    Ok(Client::from_conf(builder.build()))
}

/// Client for Alibaba OSS through its S3-compatible API. OSS only accepts
/// virtual-hosted addressing.
pub async fn oss_client(config: &AliOssConfig) -> Result<Client> {
    let attempts = config.retry_attempts.unwrap_or(DEFAULT_RETRY_ATTEMPTS);
    let cfg = aws_config::defaults(aws_config::BehaviorVersion::v2025_08_07())
        .region(Region::new(config.region_name()))
        .endpoint_url(config.endpoint_url())
        .retry_config(RetryConfig::standard().with_max_attempts(attempts))
        .credentials_provider(Credentials::new(
            config.access_key_id.clone(),
            config.access_key_secret.clone(),
            None,
            None,
            CREDENTIALS_PROVIDER,
        ))
        .load()
        .await;

    let s3_config = aws_sdk_s3::config::Builder::from(&cfg)
        .force_path_style(false)
        .request_checksum_calculation(RequestChecksumCalculation::WhenRequired)
        .response_checksum_validation(ResponseChecksumValidation::WhenRequired)
        .build();

    debug!(
        "OSS client ready: bucket={}, endpoint={}, region={}",
        config.bucket_name,
        config.endpoint_url(),
        config.region_name()
    );
    Ok(Client::from_conf(s3_config))
}
