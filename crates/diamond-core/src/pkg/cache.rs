//! First-party content cache.
//!
//! Archives of installed first-party packages, stored flat as
//! `<name>@<version>.tar.gz` or `<name>#<tag>.tar.gz`. Entries are never
//! evicted.

use super::error::PkgError;
use super::spec::Selector;
use super::version::max_satisfying;
use crate::paths::cache_dir;
use diamond_util::fs::atomic_write;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const ARCHIVE_EXT: &str = ".tar.gz";

/// What a cache entry is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKey<'a> {
    Version(&'a str),
    Tag(&'a str),
}

/// A cache entry that satisfied a lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheHit {
    pub path: PathBuf,
    /// Known when the entry is keyed by version.
    pub version: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ContentCache {
    root: PathBuf,
}

impl ContentCache {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Cache at the default location (see [`cache_dir`]).
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(cache_dir())
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn entry_path(&self, name: &str, key: CacheKey<'_>) -> PathBuf {
        let name = encode_name(name);
        let file = match key {
            CacheKey::Version(v) => format!("{name}@{v}{ARCHIVE_EXT}"),
            CacheKey::Tag(t) => format!("{name}#{t}{ARCHIVE_EXT}"),
        };
        self.root.join(file)
    }

    /// Exact lookup.
    #[must_use]
    pub fn get(&self, name: &str, key: CacheKey<'_>) -> Option<PathBuf> {
        let path = self.entry_path(name, key);
        path.is_file().then_some(path)
    }

    /// Best entry for a selector: the highest cached version satisfying a
    /// range, or the entry stored under a tag.
    ///
    /// # Errors
    /// Returns an error if the cache directory exists but cannot be read.
    pub fn find(&self, name: &str, selector: &Selector) -> Result<Option<CacheHit>, PkgError> {
        match selector {
            Selector::Tag(tag) => Ok(self.get(name, CacheKey::Tag(tag)).map(|path| CacheHit {
                path,
                version: None,
            })),
            Selector::Version(range) => {
                let versions = self.cached_versions(name)?;
                let candidates: Vec<&str> = versions.iter().map(String::as_str).collect();
                let Some(version) = max_satisfying(&candidates, range)? else {
                    return Ok(None);
                };
                Ok(Some(CacheHit {
                    path: self.entry_path(name, CacheKey::Version(&version)),
                    version: Some(version),
                }))
            }
        }
    }

    /// Versions cached for `name`, unsorted.
    ///
    /// # Errors
    /// Returns an error if the cache directory exists but cannot be read.
    pub fn cached_versions(&self, name: &str) -> Result<Vec<String>, PkgError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(PkgError::cache_error(format!(
                    "Failed to read cache {}: {e}",
                    self.root.display()
                )))
            }
        };

        let prefix = format!("{}@", encode_name(name));
        Ok(entries
            .flatten()
            .filter_map(|entry| {
                let file = entry.file_name().to_string_lossy().into_owned();
                file.strip_prefix(&prefix)?
                    .strip_suffix(ARCHIVE_EXT)
                    .map(String::from)
            })
            .collect())
    }

    /// Store an archive, replacing any previous entry.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn store(&self, name: &str, key: CacheKey<'_>, bytes: &[u8]) -> Result<PathBuf, PkgError> {
        let path = self.entry_path(name, key);
        atomic_write(&path, bytes).map_err(|e| {
            PkgError::cache_error(format!("Failed to write {}: {e}", path.display()))
        })?;
        debug!(path = %path.display(), "Cached package archive");
        Ok(path)
    }
}

/// Scoped names contain `/`, which cannot appear in a file name.
fn encode_name(name: &str) -> String {
    name.replace('/', "%2F")
}
