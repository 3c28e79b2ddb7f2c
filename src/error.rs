// src/error.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Error taxonomy shared by every storage backend.
//!
//! Adapters classify vendor failures into one of these variants; the
//! dispatcher decides exit codes from the variant alone and never looks at
//! vendor-specific detail.

use thiserror::Error;

/// Result type alias used throughout the library.
pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Error, Debug)]
pub enum StorageError {
    /// Object or container is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Credentials rejected or permission denied.
    #[error("authorization error: {0}")]
    Auth(String),

    /// I/O failure while moving bytes (put/get/copy).
    #[error("transfer error: {0}")]
    Transfer(String),

    /// Server-side checksum verification failed.
    #[error("integrity error: {0}")]
    Integrity(String),

    /// Listing continuation did not make forward progress.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Container creation lost a race against another creator.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Malformed input or configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Anything else reported by the vendor.
    #[error("backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }

    /// Re-tag a generic failure as a transfer failure, keeping the more
    /// specific classifications intact.
    pub fn into_transfer(self) -> Self {
        match self {
            StorageError::Backend(msg) => StorageError::Transfer(msg),
            other => other,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound(e.to_string()),
            std::io::ErrorKind::PermissionDenied => StorageError::Auth(e.to_string()),
            _ => StorageError::Transfer(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Config(e.to_string())
    }
}
