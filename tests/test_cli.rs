// tests/test_cli.rs
//
// End-to-end runs of the blob-cli binary against the file backend.

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

const BIN: &str = env!("CARGO_BIN_EXE_blob-cli");

struct Fixture {
    root: TempDir,
    config: PathBuf,
}

impl Fixture {
    fn new() -> Result<Self> {
        let root = TempDir::new()?;
        let config = root.path().join("file.json");
        let json = serde_json::json!({
            "root_dir": root.path().join("blobs"),
            "container_name": "bucket",
            "page_size": 2,
            "signing_secret": "s3cret",
        });
        std::fs::write(&config, serde_json::to_vec(&json)?)?;
        Ok(Self { root, config })
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        let output = Command::new(BIN)
            .arg("-s")
            .arg("file")
            .arg("-c")
            .arg(&self.config)
            .args(args)
            .env_remove("RUST_LOG")
            .output()?;
        Ok(output)
    }

    fn local(&self, name: &str) -> PathBuf {
        self.root.path().join(name)
    }
}

fn code(output: &Output) -> i32 {
    output.status.code().unwrap_or(-1)
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn path_arg(p: &Path) -> &str {
    p.to_str().expect("utf-8 temp path")
}

#[test]
fn test_full_lifecycle() -> Result<()> {
    let fx = Fixture::new()?;
    let out = fx.run(&["ensure-bucket-exists"])?;
    assert_eq!(code(&out), 0, "stderr: {}", stderr(&out));

    let src = fx.local("hello.txt");
    std::fs::write(&src, b"hello")?;
    let out = fx.run(&["put", path_arg(&src), "greetings/hello.txt"])?;
    assert_eq!(code(&out), 0, "stderr: {}", stderr(&out));

    let out = fx.run(&["exists", "greetings/hello.txt"])?;
    assert_eq!(code(&out), 0);

    let out = fx.run(&["copy", "greetings/hello.txt", "greetings/copy.txt"])?;
    assert_eq!(code(&out), 0, "stderr: {}", stderr(&out));

    let out = fx.run(&["list", "greetings/"])?;
    assert_eq!(code(&out), 0);
    assert_eq!(stdout(&out), "greetings/copy.txt\ngreetings/hello.txt\n");

    let out = fx.run(&["properties", "greetings/hello.txt"])?;
    assert_eq!(code(&out), 0);
    let props: serde_json::Value = serde_json::from_str(&stdout(&out))?;
    assert_eq!(props["content_length"], 5);

    let dest = fx.local("back.txt");
    let out = fx.run(&["get", "greetings/copy.txt", path_arg(&dest)])?;
    assert_eq!(code(&out), 0, "stderr: {}", stderr(&out));
    assert_eq!(std::fs::read(&dest)?, b"hello");

    let out = fx.run(&["delete-recursive", "greetings/"])?;
    assert_eq!(code(&out), 0);
    let out = fx.run(&["list"])?;
    assert!(stdout(&out).is_empty());
    Ok(())
}

#[test]
fn test_exists_missing_key_exits_three() -> Result<()> {
    let fx = Fixture::new()?;
    fx.run(&["ensure-bucket-exists"])?;
    let out = fx.run(&["exists", "nope"])?;
    assert_eq!(code(&out), 3);
    assert!(stderr(&out).contains("File 'nope' does not exist in bucket 'bucket'"));
    Ok(())
}

#[test]
fn test_properties_of_missing_key_prints_empty_object() -> Result<()> {
    let fx = Fixture::new()?;
    fx.run(&["ensure-bucket-exists"])?;
    let out = fx.run(&["properties", "nope"])?;
    assert_eq!(code(&out), 0);
    assert_eq!(stdout(&out).trim(), "{}");
    Ok(())
}

#[test]
fn test_sign_accepts_any_case_method() -> Result<()> {
    let fx = Fixture::new()?;
    fx.run(&["ensure-bucket-exists"])?;
    let out = fx.run(&["sign", "obj", "GET", "15m"])?;
    assert_eq!(code(&out), 0, "stderr: {}", stderr(&out));
    assert!(stdout(&out).starts_with("file://"));

    let out = fx.run(&["sign", "obj", "delete", "15m"])?;
    assert_eq!(code(&out), 1);
    Ok(())
}

#[test]
fn test_failures_exit_one() -> Result<()> {
    let fx = Fixture::new()?;
    fx.run(&["ensure-bucket-exists"])?;

    let out = fx.run(&["get", "nope", path_arg(&fx.local("x"))])?;
    assert_eq!(code(&out), 1);
    assert!(stderr(&out).contains("download failure for 'nope'"));

    // unknown verb
    let out = fx.run(&["frobnicate"])?;
    assert_eq!(code(&out), 1);

    // missing argument
    let out = fx.run(&["put", "only-one-arg"])?;
    assert_eq!(code(&out), 1);
    Ok(())
}

#[test]
fn test_bad_config_exits_one() -> Result<()> {
    let dir = TempDir::new()?;
    let config = dir.path().join("broken.json");
    std::fs::write(&config, b"{ nope")?;

    let out = Command::new(BIN).args(["-s", "file", "-c"]).arg(&config).args(["list"]).output()?;
    assert_eq!(code(&out), 1);

    let out = Command::new(BIN)
        .args(["-s", "file", "-c"])
        .arg(dir.path().join("missing.json"))
        .args(["list"])
        .output()?;
    assert_eq!(code(&out), 1);
    assert!(String::from_utf8_lossy(&out.stderr).contains("failed to open config file"));

    std::fs::write(&config, b"{}")?;
    let out = Command::new(BIN).args(["-s", "dav", "-c"]).arg(&config).args(["list"]).output()?;
    assert_eq!(code(&out), 1);
    assert!(String::from_utf8_lossy(&out.stderr).contains("not implemented"));
    Ok(())
}
