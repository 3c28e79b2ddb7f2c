// src/dispatch.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! One CLI verb to one storage operation, and its outcome to an exit code.
//!
//! Exit codes are decided from the error taxonomy alone:
//! `0` success, `3` absent object on `exists`, `1` anything else.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use crate::checksum::ContentMd5;
use crate::error::{Result, StorageError};
use crate::object_store::ObjectStore;
use crate::properties::properties_json;
use crate::signing::{SignMethod, SignedUrlRequest};

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_NOT_FOUND: i32 = 3;

/// A single storage operation requested on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Put { src: PathBuf, key: String },
    Get { key: String, dest: PathBuf },
    Delete { key: String },
    DeleteRecursive { prefix: String },
    Copy { src_key: String, dst_key: String },
    Exists { key: String },
    Sign { key: String, method: SignMethod, expiry: Duration },
    List { prefix: String },
    Properties { key: String },
    EnsureBucketExists,
}

impl Operation {
    /// Name used in failure diagnostics.
    pub fn label(&self) -> &'static str {
        match self {
            Operation::Put { .. } => "upload",
            Operation::Get { .. } => "download",
            Operation::Delete { .. } => "delete",
            Operation::DeleteRecursive { .. } => "delete-recursive",
            Operation::Copy { .. } => "copy",
            Operation::Exists { .. } => "exists",
            Operation::Sign { .. } => "sign",
            Operation::List { .. } => "list",
            Operation::Properties { .. } => "properties",
            Operation::EnsureBucketExists => "ensure-bucket-exists",
        }
    }

    fn target(&self, container: &str) -> String {
        match self {
            Operation::Put { key, .. }
            | Operation::Get { key, .. }
            | Operation::Delete { key }
            | Operation::Exists { key }
            | Operation::Sign { key, .. }
            | Operation::Properties { key } => format!("'{}'", key),
            Operation::DeleteRecursive { prefix } | Operation::List { prefix } => format!("prefix '{}'", prefix),
            Operation::Copy { src_key, dst_key } => format!("'{}' to '{}'", src_key, dst_key),
            Operation::EnsureBucketExists => format!("bucket '{}'", container),
        }
    }
}

/// What the process reports once the operation has run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub exit_code: i32,
    /// One line for stderr, if any.
    pub diagnostic: Option<String>,
}

impl Outcome {
    fn success(diagnostic: Option<String>) -> Self {
        Self { exit_code: EXIT_SUCCESS, diagnostic }
    }
}

/// Exit code for a failed operation.
pub fn exit_code_for(op: &Operation, err: &StorageError) -> i32 {
    match (op, err) {
        (Operation::Exists { .. }, StorageError::NotFound(_)) => EXIT_NOT_FOUND,
        _ => EXIT_FAILURE,
    }
}

/// Run `op` against `store`, writing machine-readable output to `out`.
pub async fn dispatch<W: Write>(store: &dyn ObjectStore, op: &Operation, out: &mut W) -> Outcome {
    debug!("dispatch {} on {} bucket '{}'", op.label(), store.backend_name(), store.container());
    match run(store, op, out).await {
        Ok(diagnostic) => Outcome::success(diagnostic),
        Err(err) => {
            let exit_code = exit_code_for(op, &err);
            let diagnostic = match (op, &err) {
                (Operation::Exists { key }, StorageError::NotFound(_)) => {
                    format!("File '{}' does not exist in bucket '{}'", key, store.container())
                }
                _ => format!("{} failure for {}: {}", op.label(), op.target(store.container()), err),
            };
            Outcome { exit_code, diagnostic: Some(diagnostic) }
        }
    }
}

async fn run<W: Write>(store: &dyn ObjectStore, op: &Operation, out: &mut W) -> Result<Option<String>> {
    match op {
        Operation::Put { src, key } => {
            let checksum = ContentMd5::of_file(src).await?;
            store.upload(src, Some(&checksum), key).await?;
        }
        Operation::Get { key, dest } => store.download(key, dest).await?,
        Operation::Delete { key } => store.delete(key).await?,
        Operation::DeleteRecursive { prefix } => store.delete_recursive(prefix).await?,
        Operation::Copy { src_key, dst_key } => store.copy(src_key, dst_key).await?,
        Operation::Exists { key } => {
            if !store.exists(key).await? {
                return Err(StorageError::NotFound(key.clone()));
            }
            return Ok(Some(format!("File '{}' exists in bucket '{}'", key, store.container())));
        }
        Operation::Sign { key, method, expiry } => {
            let req = SignedUrlRequest::new(key.clone(), *method, *expiry)?;
            let url = store.signed_url(&req).await?;
            emit(out, &url)?;
        }
        Operation::List { prefix } => {
            for key in store.list(prefix).await? {
                emit(out, &key)?;
            }
        }
        Operation::Properties { key } => {
            let props = store.properties(key).await?;
            emit(out, &properties_json(props.as_ref())?)?;
        }
        Operation::EnsureBucketExists => store.ensure_container_exists().await?,
    }
    out.flush().map_err(output_error)?;
    Ok(None)
}

fn emit<W: Write>(out: &mut W, line: &str) -> Result<()> {
    writeln!(out, "{}", line).map_err(output_error)
}

fn output_error(e: std::io::Error) -> StorageError {
    StorageError::Transfer(format!("failed to write output: {}", e))
}
