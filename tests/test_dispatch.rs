// tests/test_dispatch.rs
//
// Verb dispatch against the filesystem backend: stdout lines, stderr
// diagnostics and exit codes.

mod common;

use anyhow::Result;
use blobctl::file_store::FileSystemObjectStore;
use blobctl::{EXIT_FAILURE, EXIT_NOT_FOUND, EXIT_SUCCESS, ObjectStore, Operation, SignMethod, dispatch};
use common::{CONTAINER, file_config, new_store, put_bytes, write_local};
use std::time::Duration;
use tempfile::TempDir;

async fn run(store: &dyn ObjectStore, op: Operation) -> (blobctl::Outcome, String) {
    let mut out = Vec::new();
    let outcome = dispatch(store, &op, &mut out).await;
    (outcome, String::from_utf8(out).expect("utf-8 output"))
}

#[tokio::test]
async fn test_exists_exit_codes() -> Result<()> {
    let (_root, store) = new_store(None).await?;

    let (outcome, stdout) = run(&store, Operation::Exists { key: "missing".into() }).await;
    assert_eq!(outcome.exit_code, EXIT_NOT_FOUND);
    assert_eq!(
        outcome.diagnostic.as_deref(),
        Some(format!("File 'missing' does not exist in bucket '{}'", CONTAINER).as_str())
    );
    assert!(stdout.is_empty());

    put_bytes(&store, "present", b"x").await?;
    let (outcome, _) = run(&store, Operation::Exists { key: "present".into() }).await;
    assert_eq!(outcome.exit_code, EXIT_SUCCESS);
    assert!(outcome.diagnostic.unwrap_or_default().contains("exists in bucket"));
    Ok(())
}

#[tokio::test]
async fn test_put_then_get() -> Result<()> {
    let (_root, store) = new_store(None).await?;
    let scratch = TempDir::new()?;
    let src = write_local(scratch.path(), "in.txt", b"payload")?;
    let dest = scratch.path().join("out.txt");

    let (outcome, _) = run(&store, Operation::Put { src, key: "dir/obj".into() }).await;
    assert_eq!(outcome.exit_code, EXIT_SUCCESS);
    assert_eq!(outcome.diagnostic, None);

    let (outcome, _) = run(&store, Operation::Get { key: "dir/obj".into(), dest: dest.clone() }).await;
    assert_eq!(outcome.exit_code, EXIT_SUCCESS);
    assert_eq!(std::fs::read(&dest)?, b"payload");
    Ok(())
}

#[tokio::test]
async fn test_put_without_container_reports_upload_failure() -> Result<()> {
    let root = TempDir::new()?;
    let store = FileSystemObjectStore::new(file_config(root.path(), None));
    let scratch = TempDir::new()?;
    let src = write_local(scratch.path(), "in.txt", b"payload")?;

    let (outcome, _) = run(&store, Operation::Put { src, key: "k".into() }).await;
    assert_eq!(outcome.exit_code, EXIT_FAILURE);
    let diag = outcome.diagnostic.unwrap_or_default();
    assert!(diag.starts_with("upload failure for 'k'"), "got {diag}");
    Ok(())
}

#[tokio::test]
async fn test_put_missing_source_file_fails() -> Result<()> {
    let (_root, store) = new_store(None).await?;
    let op = Operation::Put { src: "/definitely/not/here.bin".into(), key: "k".into() };
    let (outcome, _) = run(&store, op).await;
    assert_eq!(outcome.exit_code, EXIT_FAILURE);
    Ok(())
}

#[tokio::test]
async fn test_get_missing_key_exits_one() -> Result<()> {
    let (_root, store) = new_store(None).await?;
    let scratch = TempDir::new()?;
    let dest = scratch.path().join("out");

    let (outcome, _) = run(&store, Operation::Get { key: "nope".into(), dest: dest.clone() }).await;
    assert_eq!(outcome.exit_code, EXIT_FAILURE);
    assert!(outcome.diagnostic.unwrap_or_default().starts_with("download failure for 'nope'"));
    assert!(!dest.exists());
    Ok(())
}

#[tokio::test]
async fn test_delete_of_absent_key_succeeds() -> Result<()> {
    let (_root, store) = new_store(None).await?;
    let (outcome, _) = run(&store, Operation::Delete { key: "never-written".into() }).await;
    assert_eq!(outcome.exit_code, EXIT_SUCCESS);
    Ok(())
}

#[tokio::test]
async fn test_list_prints_one_key_per_line() -> Result<()> {
    let (_root, store) = new_store(Some(1)).await?;
    for key in ["a/1", "a/2", "b/1"] {
        put_bytes(&store, key, b"x").await?;
    }
    let (outcome, stdout) = run(&store, Operation::List { prefix: "a/".into() }).await;
    assert_eq!(outcome.exit_code, EXIT_SUCCESS);
    assert_eq!(stdout, "a/1\na/2\n");

    let (_, stdout) = run(&store, Operation::List { prefix: "zzz".into() }).await;
    assert!(stdout.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_copy_and_delete_recursive() -> Result<()> {
    let (_root, store) = new_store(None).await?;
    put_bytes(&store, "src/a", b"a").await?;

    let (outcome, _) = run(&store, Operation::Copy { src_key: "src/a".into(), dst_key: "dst/a".into() }).await;
    assert_eq!(outcome.exit_code, EXIT_SUCCESS);
    assert!(store.exists("dst/a").await?);

    let (outcome, _) = run(&store, Operation::DeleteRecursive { prefix: "src/".into() }).await;
    assert_eq!(outcome.exit_code, EXIT_SUCCESS);
    assert_eq!(store.list("").await?, vec!["dst/a".to_string()]);

    let (outcome, _) = run(&store, Operation::Copy { src_key: "gone".into(), dst_key: "x".into() }).await;
    assert_eq!(outcome.exit_code, EXIT_FAILURE);
    assert!(outcome.diagnostic.unwrap_or_default().starts_with("copy failure for 'gone' to 'x'"));
    Ok(())
}

#[tokio::test]
async fn test_properties_output() -> Result<()> {
    let (_root, store) = new_store(None).await?;

    let (outcome, stdout) = run(&store, Operation::Properties { key: "absent".into() }).await;
    assert_eq!(outcome.exit_code, EXIT_SUCCESS);
    assert_eq!(stdout.trim(), "{}");

    put_bytes(&store, "present", b"hello").await?;
    let (outcome, stdout) = run(&store, Operation::Properties { key: "present".into() }).await;
    assert_eq!(outcome.exit_code, EXIT_SUCCESS);
    let json: serde_json::Value = serde_json::from_str(&stdout)?;
    assert_eq!(json["etag"], "5d41402abc4b2a76b9719d911017c592");
    assert_eq!(json["content_length"], 5);
    assert!(json["last_modified"].is_string());
    Ok(())
}

#[tokio::test]
async fn test_sign_prints_url() -> Result<()> {
    let (_root, store) = new_store(None).await?;
    let op = Operation::Sign { key: "obj".into(), method: SignMethod::Put, expiry: Duration::from_secs(60) };
    let (outcome, stdout) = run(&store, op).await;
    assert_eq!(outcome.exit_code, EXIT_SUCCESS);
    let url = stdout.trim();
    assert!(url.starts_with("file://"), "got {url}");
    assert!(url.contains("method=PUT"));

    let op = Operation::Sign { key: "obj".into(), method: SignMethod::Get, expiry: Duration::ZERO };
    let (outcome, stdout) = run(&store, op).await;
    assert_eq!(outcome.exit_code, EXIT_FAILURE);
    assert!(stdout.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_ensure_bucket_exists_twice() -> Result<()> {
    let root = TempDir::new()?;
    let store = FileSystemObjectStore::new(file_config(root.path(), None));
    for _ in 0..2 {
        let (outcome, _) = run(&store, Operation::EnsureBucketExists).await;
        assert_eq!(outcome.exit_code, EXIT_SUCCESS);
    }
    assert!(store.container_exists().await?);
    Ok(())
}

/// Accepts writes but fails every flush, like a closed pipe behind a buffer.
struct FlushFails;

impl std::io::Write for FlushFails {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "stdout closed"))
    }
}

#[tokio::test]
async fn test_unflushable_output_fails_the_command() -> Result<()> {
    let (_root, store) = new_store(None).await?;
    put_bytes(&store, "k", b"x").await?;

    let outcome = dispatch(&store, &Operation::List { prefix: String::new() }, &mut FlushFails).await;
    assert_eq!(outcome.exit_code, EXIT_FAILURE);
    let diag = outcome.diagnostic.unwrap_or_default();
    assert!(diag.starts_with("list failure for prefix ''"), "got {diag}");
    assert!(diag.contains("stdout closed"), "got {diag}");
    Ok(())
}
