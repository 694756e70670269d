//! Post-processor hooks.
//!
//! A post-processor is a JavaScript module exporting `css => css` (sync or
//! returning a promise). Each one runs in a `node` child process with the CSS
//! on stdin.

use crate::pkg::error::PkgError;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

const NODE: &str = "node";

const RUNNER: &str = "const m=require(process.argv[1]);const f=m.default||m;let s='';\
process.stdin.setEncoding('utf8');process.stdin.on('data',d=>{s+=d}).on('end',()=>{\
Promise.resolve().then(()=>f(s)).then(c=>process.stdout.write(String(c)),\
e=>{process.stderr.write(String(e&&e.message||e));process.exit(1)})})";

/// Run `css` through each module in order.
///
/// # Errors
/// Returns `PKG_POST_PROCESS_FAILED` if a module cannot be run or fails.
pub fn apply_post_processors(css: String, modules: &[PathBuf]) -> Result<String, PkgError> {
    modules
        .iter()
        .try_fold(css, |css, module| run_one(&css, module))
}

fn run_one(css: &str, module: &Path) -> Result<String, PkgError> {
    debug!(module = %module.display(), "Running post-processor");
    let mut child = Command::new(NODE)
        .arg("-e")
        .arg(RUNNER)
        .arg(module)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            PkgError::post_process_failed(format!("{}: failed to start {NODE}: {e}", module.display()))
        })?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(css.as_bytes()).map_err(|e| {
            PkgError::post_process_failed(format!("{}: {e}", module.display()))
        })?;
    }

    let output = child
        .wait_with_output()
        .map_err(|e| PkgError::post_process_failed(format!("{}: {e}", module.display())))?;

    if !output.status.success() {
        return Err(PkgError::post_process_failed(format!(
            "{}: {}",
            module.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_modules_is_identity() {
        assert_eq!(apply_post_processors("a{}".into(), &[]).unwrap(), "a{}");
    }

    #[test]
    fn test_missing_module_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = apply_post_processors("a{}".into(), &[dir.path().join("nope.js")]).unwrap_err();
        assert_eq!(err.code(), crate::pkg::error::codes::PKG_POST_PROCESS_FAILED);
        assert!(err.message().contains("nope.js"));
    }
}
