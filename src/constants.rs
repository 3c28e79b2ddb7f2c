// src/constants.rs
//
// Centralized constants for blobctl to avoid hardcoded values throughout the codebase

use std::time::Duration;

/// Default region used when an S3 config does not name one
pub const DEFAULT_REGION: &str = "us-east-1";

/// Region name passed to the SDK for Alibaba OSS when the config omits it
pub const DEFAULT_OSS_REGION: &str = "oss-cn-hangzhou";

/// Default page size requested from vendors that accept a page-size hint
pub const DEFAULT_LIST_PAGE_SIZE: i32 = 1000;

/// Default page size for the local filesystem backend
pub const DEFAULT_FILE_PAGE_SIZE: usize = 1000;

/// Default retry attempts handed to the SDK retry layer
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Upper bound on pages a single listing may fetch before it is treated as
/// a runaway continuation (10 billion keys at 1000 per page)
pub const MAX_LIST_PAGES: usize = 10_000_000;

/// Longest expiry a presigned URL may carry (SigV4 limit, 7 days)
pub const MAX_SIGNED_URL_EXPIRY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Polling cadence and bound for an Azure copy the service reports as pending
pub const AZURE_COPY_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const AZURE_COPY_MAX_POLLS: u32 = 1200;

/// Azure storage service version for SAS tokens and hand-built REST calls
pub const AZURE_STORAGE_VERSION: &str = "2022-11-02";

// ============================================================================
// Environment variable names
// ============================================================================

/// Overrides the log filter configured by `-v`
pub const ENV_LOG_FILTER: &str = "RUST_LOG";

/// GCS emulator convention (host:port)
pub const ENV_STORAGE_EMULATOR_HOST: &str = "STORAGE_EMULATOR_HOST";
