//! Lock store: the persisted list of installed packages.
//!
//! ## File Format
//!
//! `diamond/.internal/packages.lock` is a JSON array of package records:
//!
//! ```json
//! [
//!   {
//!     "name": "sierra",
//!     "version": "2.0.0",
//!     "source": { "type": "diamond", "name": "sierra", "version": "^2.0.0" },
//!     "path": "sierra",
//!     "main": "scss/sierra.scss",
//!     "dependencies": {}
//!   }
//! ]
//! ```
//!
//! A missing or corrupt file reads as an empty list. Mutual exclusion across
//! tasks and processes is an advisory lock on a sidecar file.

use super::error::PkgError;
use super::manifest::Hooks;
use super::spec::Source;
use diamond_util::fs::atomic_write;
use fs4::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Default bound on waiting for another installer to release the lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(60);

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// One installed package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,
    pub source: Source,
    /// Install path relative to `diamond/packages`.
    pub path: String,
    /// Path of the consuming package, for nested dependencies.
    #[serde(default, rename = "for", skip_serializing_if = "Option::is_none")]
    pub for_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main: Option<String>,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_processor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub functions: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importer: Option<String>,
}

impl PackageRecord {
    /// Whether the record is a nested dependency.
    #[must_use]
    pub fn is_nested(&self) -> bool {
        self.for_path.is_some()
    }

    #[must_use]
    pub fn hooks(&self) -> Hooks {
        Hooks {
            post_processor: self.post_processor.clone(),
            functions: self.functions.clone(),
            importer: self.importer.clone(),
        }
    }

    pub fn set_hooks(&mut self, hooks: Hooks) {
        self.post_processor = hooks.post_processor;
        self.functions = hooks.functions;
        self.importer = hooks.importer;
    }

    /// `name@version`, `name#ref`, or `name`.
    #[must_use]
    pub fn label(&self) -> String {
        match (&self.version, &self.git_ref) {
            (Some(v), _) => format!("{}@{v}", self.name),
            (None, Some(r)) => format!("{}#{r}", self.name),
            (None, None) => self.name.clone(),
        }
    }
}

/// Lock-file access for one project.
#[derive(Debug, Clone)]
pub struct LockStore {
    path: PathBuf,
    guard_path: PathBuf,
    timeout: Duration,
}

impl LockStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, guard_path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard_path: guard_path.into(),
            timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record. Missing or corrupt files yield an empty list.
    #[must_use]
    pub fn read(&self) -> Vec<PackageRecord> {
        let Ok(text) = fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        match serde_json::from_str(&text) {
            Ok(records) => records,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring corrupt lock file");
                Vec::new()
            }
        }
    }

    /// Replace the file with `records`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn write(&self, records: &[PackageRecord]) -> Result<(), PkgError> {
        let mut json = serde_json::to_string_pretty(records)?;
        json.push('\n');
        atomic_write(&self.path, json.as_bytes()).map_err(|e| {
            PkgError::lock_failed(format!("Failed to write {}: {e}", self.path.display()))
        })
    }

    /// Run `section` while holding the exclusive lock.
    ///
    /// Blocks (up to the configured timeout) while another holder exists.
    /// The lock is released on every exit path, including errors and panics.
    ///
    /// # Errors
    /// Returns `PKG_LOCK_FAILED` if the lock cannot be acquired, or the
    /// section's own error.
    pub fn with_lock<T>(
        &self,
        section: impl FnOnce() -> Result<T, PkgError>,
    ) -> Result<T, PkgError> {
        let _guard = LockGuard::acquire(&self.guard_path, self.timeout)?;
        section()
    }

    /// Read, mutate and write the records under one lock acquisition.
    ///
    /// The file is only written when `section` succeeds.
    ///
    /// # Errors
    /// Returns the lock error, the section's error, or a write error.
    pub fn update<T>(
        &self,
        section: impl FnOnce(&mut Vec<PackageRecord>) -> Result<T, PkgError>,
    ) -> Result<T, PkgError> {
        self.with_lock(|| {
            let mut records = self.read();
            let out = section(&mut records)?;
            self.write(&records)?;
            Ok(out)
        })
    }
}

/// Held advisory lock. Released on drop.
struct LockGuard {
    file: File,
}

impl LockGuard {
    fn acquire(path: &Path, timeout: Duration) -> Result<Self, PkgError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                PkgError::lock_failed(format!("Failed to create {}: {e}", parent.display()))
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|e| PkgError::lock_failed(format!("Failed to open {}: {e}", path.display())))?;

        let started = Instant::now();
        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => {
                    debug!(path = %path.display(), "Acquired lock");
                    return Ok(Self { file });
                }
                Err(e) if is_contended(&e) => {
                    if started.elapsed() >= timeout {
                        return Err(PkgError::lock_failed(format!(
                            "Timed out after {}s waiting for {}",
                            timeout.as_secs(),
                            path.display()
                        )));
                    }
                    std::thread::sleep(LOCK_POLL_INTERVAL);
                }
                Err(e) => {
                    return Err(PkgError::lock_failed(format!(
                        "Failed to lock {}: {e}",
                        path.display()
                    )))
                }
            }
        }
    }
}

fn is_contended(e: &std::io::Error) -> bool {
    // ERROR_LOCK_VIOLATION
    #[cfg(windows)]
    if e.raw_os_error() == Some(33) {
        return true;
    }
    e.kind() == ErrorKind::WouldBlock
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
