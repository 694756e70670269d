//! Source dispatch: turn a specifier into something downloadable.

use super::archive::{resolve_archive, ArchiveHost};
use super::error::PkgError;
use super::manifest::Manifest;
use super::registry::{select_release, RegistryClient};
use super::spec::{is_valid_install_name, Source, SourceKind, DEFAULT_REF};
use super::tarball::ArchiveDigest;
use std::collections::BTreeMap;
use std::path::{Component, Path};

/// Digest declared by a registry for a release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Integrity {
    /// npm `dist.shasum`.
    Sha1(String),
    /// First-party `dist.sha256`.
    Sha256(String),
}

impl Integrity {
    #[must_use]
    pub fn expected(&self) -> &str {
        match self {
            Self::Sha1(hex) | Self::Sha256(hex) => hex,
        }
    }

    /// Digest of the same algorithm taken from `digest`.
    #[must_use]
    pub fn actual<'a>(&self, digest: &'a ArchiveDigest) -> &'a str {
        match self {
            Self::Sha1(_) => &digest.sha1,
            Self::Sha256(_) => &digest.sha256,
        }
    }

    /// # Errors
    /// Returns `PKG_INTEGRITY_MISMATCH` if the digests differ.
    pub fn verify(&self, name: &str, digest: &ArchiveDigest) -> Result<(), PkgError> {
        let actual = self.actual(digest);
        if actual.eq_ignore_ascii_case(self.expected()) {
            Ok(())
        } else {
            Err(PkgError::integrity_mismatch(name, self.expected(), actual))
        }
    }
}

/// A source resolved to concrete metadata and a download location.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub kind: SourceKind,
    pub name: String,
    pub version: Option<String>,
    /// Git ref, for archive sources requested at a non-default ref.
    pub git_ref: Option<String>,
    /// `None` when an archive source has no `package.json`.
    pub manifest: Option<Manifest>,
    pub tarball_url: String,
    pub integrity: Option<Integrity>,
}

impl Resolved {
    /// Leading path components to strip when extracting.
    #[must_use]
    pub fn strip_components(&self) -> usize {
        usize::from(self.kind != SourceKind::Diamond)
    }

    #[must_use]
    pub fn entry_point(&self) -> Option<String> {
        self.manifest.as_ref()?.entry_point(self.kind)
    }

    /// Reject remote metadata that would escape the package directory.
    ///
    /// The name becomes the install path; the entry point and hook modules
    /// are joined onto it.
    ///
    /// # Errors
    /// Returns `PKG_SPEC_INVALID` naming the offending field.
    pub fn validate(&self) -> Result<(), PkgError> {
        if !is_valid_install_name(&self.name) {
            return Err(PkgError::spec_invalid(format!(
                "invalid package name '{}'",
                self.name
            )));
        }

        let Some(manifest) = &self.manifest else {
            return Ok(());
        };
        let hooks = manifest.hooks();
        let paths = self
            .entry_point()
            .into_iter()
            .chain(hooks.post_processor)
            .chain(hooks.importer)
            .chain(hooks.functions.into_iter().flat_map(BTreeMap::into_values));
        for path in paths {
            if !is_contained(&path) {
                return Err(PkgError::spec_invalid(format!(
                    "{}: path '{path}' leaves the package directory",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

/// A relative path with no `..`, root or prefix components.
fn is_contained(path: &str) -> bool {
    Path::new(path)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Resolve `source` over the network.
///
/// Never touches the lock store.
///
/// # Errors
/// Returns an error if metadata cannot be fetched or no release matches.
pub async fn resolve(client: &RegistryClient, source: &Source) -> Result<Resolved, PkgError> {
    let kind = source.kind();
    match source {
        Source::Npm(reg) | Source::Diamond(reg) => {
            let base = if kind == SourceKind::Npm {
                &client.endpoints().npm
            } else {
                &client.endpoints().diamond
            };
            let packument = client.fetch_packument(base, &reg.name).await?;
            let release = select_release(&packument, reg, kind)?;
            let integrity = release.digest.map(|hex| {
                if kind == SourceKind::Npm {
                    Integrity::Sha1(hex)
                } else {
                    Integrity::Sha256(hex)
                }
            });
            Ok(Resolved {
                kind,
                name: release.name,
                version: Some(release.version),
                git_ref: None,
                manifest: Some(release.manifest),
                tarball_url: release.tarball_url,
                integrity,
            })
        }
        Source::Github(src) | Source::Gitlab(src) | Source::Bitbucket(src) => {
            let host = ArchiveHost::from_kind(kind)
                .ok_or_else(|| PkgError::spec_invalid(format!("Not an archive source: {source}")))?;
            let release = resolve_archive(client, host, src).await?;
            Ok(Resolved {
                kind,
                name: release.name,
                version: release.version,
                git_ref: (src.git_ref != DEFAULT_REF).then(|| src.git_ref.clone()),
                manifest: release.manifest,
                tarball_url: release.tarball_url,
                integrity: None,
            })
        }
    }
}
