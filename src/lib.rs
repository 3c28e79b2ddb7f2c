// src/lib.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// Crate root: one blob-storage contract over S3, Alibaba OSS, Azure Blob,
// Google Cloud Storage and the local filesystem.

// ===== Core contract =====
pub mod error;
pub mod object_store;
pub mod pagination;
pub mod properties;
pub mod signing;
pub mod recursive_delete;
pub mod container;
pub mod checksum;

// ===== Configuration / CLI plumbing =====
pub mod constants;
pub mod config;
pub mod dispatch;

// ===== Backend adapters =====
pub mod s3_client;
pub mod s3_store;
pub mod azure_client;
pub mod gcs_client;
pub mod file_store;

// ===== Re-exports =====
pub use checksum::ContentMd5;
pub use config::{StorageConfig, StorageType};
pub use dispatch::{EXIT_FAILURE, EXIT_NOT_FOUND, EXIT_SUCCESS, Operation, Outcome, dispatch};
pub use error::{Result, StorageError};
pub use object_store::{ObjectStore, store_for_config};
pub use pagination::{ListingPage, PageSource, list_all};
pub use properties::BlobProperties;
pub use signing::{SignMethod, SignedUrlRequest};
