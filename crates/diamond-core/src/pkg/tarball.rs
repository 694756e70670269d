//! Archive extraction and packing.
//!
//! Extraction hashes the raw (still gzip-compressed) bytes as they are
//! consumed, so the digest can be compared against the registry's integrity
//! token once the archive has been unpacked.

use super::error::PkgError;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use tar::{Archive, Builder, Header};
use walkdir::WalkDir;

/// Directories never written into cache archives.
const PACK_EXCLUDES: &[&str] = &["node_modules", "diamond-packages"];

/// Digests of the raw archive bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveDigest {
    /// Lowercase hex SHA-1.
    pub sha1: String,
    /// Lowercase hex SHA-256.
    pub sha256: String,
}

/// A reader that hashes everything read through it.
struct HashingReader<R> {
    inner: R,
    sha1: Sha1,
    sha256: Sha256,
}

impl<R: Read> HashingReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            sha1: Sha1::new(),
            sha256: Sha256::new(),
        }
    }

    fn finish(self) -> ArchiveDigest {
        ArchiveDigest {
            sha1: hex::encode(self.sha1.finalize()),
            sha256: hex::encode(self.sha256.finalize()),
        }
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.sha1.update(&buf[..n]);
        self.sha256.update(&buf[..n]);
        Ok(n)
    }
}

/// Extract a gzip-compressed tar stream into `dest`.
///
/// `strip_components` leading path components are removed from every entry;
/// entries left with an empty path are skipped. Only regular files are
/// written. The whole input is consumed before the digest is returned.
///
/// # Errors
/// Returns an error if the archive is malformed or an entry escapes `dest`.
pub fn extract_tgz<R: Read>(
    reader: R,
    dest: &Path,
    strip_components: usize,
) -> Result<ArchiveDigest, PkgError> {
    fs::create_dir_all(dest)?;

    let mut archive = Archive::new(GzDecoder::new(HashingReader::new(reader)));

    for entry in archive
        .entries()
        .map_err(|e| PkgError::extract_failed(format!("Failed to read archive entries: {e}")))?
    {
        let mut entry = entry
            .map_err(|e| PkgError::extract_failed(format!("Failed to read archive entry: {e}")))?;

        let path = entry
            .path()
            .map_err(|e| PkgError::extract_failed(format!("Failed to read entry path: {e}")))?
            .into_owned();

        let Some(relative) = sanitize_entry_path(&path, strip_components)? else {
            continue;
        };

        if !entry.header().entry_type().is_file() {
            // Directories are created on demand; links and specials are skipped.
            continue;
        }

        let dest_path = dest.join(&relative);
        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = File::create(&dest_path)?;
        io::copy(&mut entry, &mut file)?;
        file.flush()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(mode) = entry.header().mode() {
                let _ = fs::set_permissions(&dest_path, fs::Permissions::from_mode(mode | 0o600));
            }
        }
    }

    // Drain the gzip trailer and any padding so the digest covers every byte.
    let mut gz = archive.into_inner();
    io::copy(&mut gz, &mut io::sink())
        .map_err(|e| PkgError::extract_failed(format!("Failed to drain archive: {e}")))?;
    let mut hashing = gz.into_inner();
    io::copy(&mut hashing, &mut io::sink())?;

    Ok(hashing.finish())
}

/// Validate an entry path and strip its leading components.
///
/// `Ok(None)` means the entry has nothing left after stripping.
fn sanitize_entry_path(path: &Path, strip: usize) -> Result<Option<PathBuf>, PkgError> {
    let display = path.display();
    if path.is_absolute() {
        return Err(PkgError::extract_failed(format!(
            "Archive contains absolute path: {display}"
        )));
    }

    let mut out = PathBuf::new();
    for component in path.components().skip(strip) {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(PkgError::extract_failed(format!(
                    "Archive contains path traversal: {display}"
                )));
            }
        }
    }

    Ok((!out.as_os_str().is_empty()).then_some(out))
}

/// Pack a directory into a gzip-compressed tar with no path prefix.
///
/// Entries are sorted and carry fixed metadata, so packing the same tree
/// twice yields identical bytes.
///
/// # Errors
/// Returns an error if the directory cannot be read.
pub fn pack_dir(dir: &Path) -> Result<Vec<u8>, PkgError> {
    let mut builder = Builder::new(GzEncoder::new(Vec::new(), Compression::default()));

    let walker = WalkDir::new(dir)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            !(e.depth() == 1
                && e.file_type().is_dir()
                && PACK_EXCLUDES.contains(&e.file_name().to_string_lossy().as_ref()))
        });

    for entry in walker {
        let entry = entry.map_err(|e| PkgError::cache_error(format!("Failed to walk {}: {e}", dir.display())))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(dir)
            .map_err(|e| PkgError::cache_error(e.to_string()))?;
        let data = fs::read(entry.path())?;

        let mut header = Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        builder
            .append_data(&mut header, relative, data.as_slice())
            .map_err(|e| PkgError::cache_error(format!("Failed to pack {}: {e}", relative.display())))?;
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| PkgError::cache_error(format!("Failed to finish archive: {e}")))?;
    Ok(encoder.finish()?)
}
