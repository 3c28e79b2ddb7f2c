// src/properties.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Blob metadata and the not-found normalization shared by `exists` and
//! `properties`.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{Result, StorageError};

/// Metadata surfaced by `properties`. Fields that could not be read or
/// parsed stay `None` and are omitted from the JSON output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BlobProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_length: Option<i64>,
}

impl BlobProperties {
    /// Build from raw header values, degrading unparsable fields to `None`.
    pub fn from_headers(etag: Option<&str>, last_modified: Option<&str>, content_length: Option<&str>) -> Self {
        Self {
            etag: etag.and_then(trim_etag),
            last_modified: last_modified.and_then(parse_http_date),
            content_length: content_length.and_then(parse_content_length),
        }
    }
}

/// Render the `properties` output: indented JSON, `{}` when the blob is absent.
pub fn properties_json(props: Option<&BlobProperties>) -> Result<String> {
    match props {
        Some(p) => serde_json::to_string_pretty(p)
            .map_err(|e| StorageError::Backend(format!("failed to marshal object properties: {}", e))),
        None => Ok("{}".to_string()),
    }
}

/// Vendors quote entity tags; callers want the bare value.
pub fn trim_etag(raw: &str) -> Option<String> {
    let t = raw.trim().trim_matches('"');
    if t.is_empty() { None } else { Some(t.to_string()) }
}

/// `Last-Modified` is RFC 1123; some SDKs hand back RFC 3339 instead.
pub fn parse_http_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

pub fn parse_content_length(raw: &str) -> Option<i64> {
    raw.trim().parse::<i64>().ok().filter(|n| *n >= 0)
}

/// Turn a vendor not-found into `Ok(None)`; every other error propagates.
pub fn absent_as_none<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(StorageError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}
