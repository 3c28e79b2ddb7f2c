// src/container.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// Idempotent create-if-absent for the bucket/container an adapter is bound to.

use tracing::info;

use crate::error::{Result, StorageError};
use crate::object_store::ObjectStore;

/// Converge on "the container exists". Losing a creation race to another
/// process counts as success.
pub async fn ensure_container_exists<S>(store: &S) -> Result<()>
where
    S: ObjectStore + ?Sized,
{
    if store.container_exists().await? {
        info!("{} bucket '{}' already exists", store.backend_name(), store.container());
        return Ok(());
    }

    match store.create_container().await {
        Ok(()) => {
            info!("Created {} bucket '{}'", store.backend_name(), store.container());
            Ok(())
        }
        Err(StorageError::AlreadyExists(detail)) => {
            info!("{} bucket '{}' was created concurrently: {}", store.backend_name(), store.container(), detail);
            Ok(())
        }
        Err(e) => Err(e),
    }
}
