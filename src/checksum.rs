// src/checksum.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// Content-MD5 of local files, sent with uploads for server-side verification.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use std::path::Path;
use tokio::io::AsyncReadExt;

use crate::error::{Result, StorageError};

const READ_CHUNK: usize = 1024 * 1024;

/// A 128-bit MD5 digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentMd5([u8; 16]);

impl ContentMd5 {
    pub fn from_digest(digest: [u8; 16]) -> Self {
        Self(digest)
    }

    pub fn of_bytes(data: &[u8]) -> Self {
        Self(md5::compute(data).0)
    }

    /// Stream a file through the hasher without loading it whole.
    pub async fn of_file(path: &Path) -> Result<Self> {
        let mut file = tokio::fs::File::open(path).await.map_err(|e| {
            StorageError::Transfer(format!("failed to open {}: {}", path.display(), e))
        })?;
        let mut ctx = md5::Context::new();
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            let n = file.read(&mut buf).await.map_err(|e| {
                StorageError::Transfer(format!("failed to read {}: {}", path.display(), e))
            })?;
            if n == 0 {
                break;
            }
            ctx.consume(&buf[..n]);
        }
        Ok(Self(ctx.compute().0))
    }

    /// Header form (`Content-MD5`).
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn from_base64(raw: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(raw.trim())
            .map_err(|e| StorageError::Config(format!("invalid content MD5 '{}': {}", raw, e)))?;
        let digest: [u8; 16] = bytes
            .try_into()
            .map_err(|_| StorageError::Config(format!("content MD5 '{}' is not 16 bytes", raw)))?;
        Ok(Self(digest))
    }
}
