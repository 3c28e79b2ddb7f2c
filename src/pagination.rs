// src/pagination.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Drives a vendor "list one page" call to completion.
//!
//! Every backend exposes its listing as a [`PageSource`]; the continuation
//! token is opaque here (S3 continuation token, OSS/Azure marker, GCS page
//! token, file backend last-key). [`list_all`] keeps fetching while the vendor
//! reports more pages and refuses to loop on a token it has already seen.

use async_trait::async_trait;
use std::collections::HashSet;
use tracing::debug;

use crate::constants::MAX_LIST_PAGES;
use crate::error::{Result, StorageError};

/// One truncated listing response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPage {
    /// Keys in the order the vendor returned them.
    pub keys: Vec<String>,
    /// Token to pass back for the next page.
    pub continuation: Option<String>,
    /// Vendor says more pages remain.
    pub has_more: bool,
}

impl ListingPage {
    /// A final page.
    pub fn last(keys: Vec<String>) -> Self {
        Self { keys, continuation: None, has_more: false }
    }

    /// A truncated page followed by `token`.
    pub fn truncated(keys: Vec<String>, token: impl Into<String>) -> Self {
        Self { keys, continuation: Some(token.into()), has_more: true }
    }
}

/// A backend's single-page listing call.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch the page scoped to `prefix` that follows `cursor` (`None` = first page).
    async fn fetch_page(&self, prefix: &str, cursor: Option<&str>) -> Result<ListingPage>;
}

/// Collect every key under `prefix`, in vendor order.
///
/// Any page failure aborts the whole listing; keys gathered so far are dropped.
pub async fn list_all<S>(source: &S, prefix: &str) -> Result<Vec<String>>
where
    S: PageSource + ?Sized,
{
    let mut keys = Vec::new();
    let mut cursor: Option<String> = None;
    let mut seen_tokens: HashSet<String> = HashSet::new();
    let mut pages = 0usize;

    loop {
        let page = source.fetch_page(prefix, cursor.as_deref()).await?;
        pages += 1;
        debug!(
            "list page {}: prefix='{}', keys={}, has_more={}",
            pages,
            prefix,
            page.keys.len(),
            page.has_more
        );
        keys.extend(page.keys);

        if !page.has_more {
            break;
        }

        let token = match page.continuation {
            Some(t) if !t.is_empty() => t,
            _ => {
                return Err(StorageError::Protocol(format!(
                    "listing of prefix '{}' reported more pages without a continuation token (page {})",
                    prefix, pages
                )));
            }
        };
        if !seen_tokens.insert(token.clone()) {
            return Err(StorageError::Protocol(format!(
                "listing of prefix '{}' repeated continuation token '{}' (page {})",
                prefix, token, pages
            )));
        }
        if pages >= MAX_LIST_PAGES {
            return Err(StorageError::Protocol(format!(
                "listing of prefix '{}' exceeded {} pages",
                prefix, MAX_LIST_PAGES
            )));
        }
        cursor = Some(token);
    }

    debug!("list complete: prefix='{}', {} keys in {} pages", prefix, keys.len(), pages);
    Ok(keys)
}
