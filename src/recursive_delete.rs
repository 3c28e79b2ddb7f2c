// src/recursive_delete.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Best-effort prefix delete built on the full listing.
//!
//! Keys are deleted one at a time, in the order the vendor listed them. A key
//! that fails to delete is logged and skipped; the call still succeeds once
//! the listing itself succeeded. Only a listing failure is returned.

use tracing::{info, warn};

use crate::error::Result;
use crate::object_store::ObjectStore;

/// Outcome counts of one recursive delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteSummary {
    pub listed: usize,
    pub deleted: usize,
    pub failed: usize,
}

/// Delete every key under `prefix` (empty prefix = whole container).
pub async fn delete_recursive<S>(store: &S, prefix: &str) -> Result<()>
where
    S: ObjectStore + ?Sized,
{
    delete_recursive_with_summary(store, prefix).await.map(|_| ())
}

/// Same as [`delete_recursive`], also reporting how many deletes failed.
pub async fn delete_recursive_with_summary<S>(store: &S, prefix: &str) -> Result<DeleteSummary>
where
    S: ObjectStore + ?Sized,
{
    let keys = store.list(prefix).await?;
    let mut summary = DeleteSummary { listed: keys.len(), ..Default::default() };

    for key in &keys {
        match store.delete(key).await {
            Ok(()) => summary.deleted += 1,
            Err(e) => {
                summary.failed += 1;
                warn!("Failed to delete {}/{}: {}", store.container(), key, e);
            }
        }
    }

    info!(
        "Deleted {} of {} objects under '{}' in {} ({} failed)",
        summary.deleted,
        summary.listed,
        prefix,
        store.container(),
        summary.failed
    );
    Ok(summary)
}
