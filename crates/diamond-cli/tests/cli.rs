//! Integration tests for the `diamond` binary.
//!
//! Nothing here touches the network: failures are provoked through parse
//! errors and offline installs against an empty cache.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::tempdir;

fn cargo_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO"));
    cmd.args(["run", "-p", "diamond-cli", "--bin", "diamond", "--"]);
    cmd
}

/// Run `diamond` in `dir` with an isolated cache.
fn diamond(dir: &Path, args: &[&str]) -> Output {
    cargo_bin()
        .args(args)
        .arg("--cwd")
        .arg(dir)
        .env("DIAMOND_CACHE_DIR", dir.join(".cache"))
        .output()
        .expect("Failed to run diamond")
}

#[test]
fn test_help_lists_commands() {
    let output = cargo_bin().arg("--help").output().expect("Failed to run diamond --help");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("install"));
    assert!(stdout.contains("compile"));
    assert!(stdout.contains("--json"));
}

#[test]
fn test_install_help_lists_flags() {
    let output = cargo_bin()
        .args(["install", "--help"])
        .output()
        .expect("Failed to run diamond install --help");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    for flag in ["--no-save", "--no-cache", "--offline"] {
        assert!(stdout.contains(flag), "missing {flag} in: {stdout}");
    }
}

#[test]
fn test_invalid_specifier_is_fatal() {
    let dir = tempdir().unwrap();
    let output = diamond(dir.path(), &["install", "a/b/c"]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error[PKG_SPEC_INVALID]"), "stderr: {stderr}");
    assert!(stderr.contains("not ok"), "stderr: {stderr}");
}

#[test]
fn test_offline_miss_is_fatal() {
    let dir = tempdir().unwrap();
    let output = diamond(dir.path(), &["i", "--offline", "bourbon"]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error[PKG_OFFLINE_MISS]"), "stderr: {stderr}");
    assert!(!dir.path().join("diamond/packages/bourbon").exists());
}

#[test]
fn test_offline_miss_json() {
    let dir = tempdir().unwrap();
    let output = diamond(dir.path(), &["--json", "install", "--offline", "npm:bootstrap@4.x"]);

    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let json: serde_json::Value = serde_json::from_str(&stdout)
        .unwrap_or_else(|_| panic!("stdout should be valid JSON: {stdout}"));
    assert_eq!(json["ok"], false);
    assert_eq!(json["error"]["code"], "PKG_OFFLINE_MISS");
}

#[test]
fn test_install_with_nothing_to_do() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("package.json"),
        r#"{"name": "site", "version": "1.0.0", "diamond": {"dependencies": {}}}"#,
    )
    .unwrap();

    let output = diamond(dir.path(), &["install"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("no packages to install"), "stdout: {stdout}");
}

#[test]
fn test_install_rejects_invalid_package_json() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("package.json"), "{ not json").unwrap();

    let output = diamond(dir.path(), &["install"]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error[PKG_PACKAGE_JSON_INVALID]"), "stderr: {stderr}");
}

#[test]
fn test_compile_minified() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("site.scss"),
        "$c: red;\n.a {\n  .b { color: $c; }\n}\n",
    )
    .unwrap();

    let output = diamond(dir.path(), &["compile", "site.scss", "-m"]);

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), ".a .b{color:red}");
}

#[test]
fn test_compile_missing_file() {
    let dir = tempdir().unwrap();
    let output = diamond(dir.path(), &["c", "missing.scss"]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error: Stylesheet not found"), "stderr: {stderr}");
}
