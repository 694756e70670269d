//! Git-host archive sources (GitHub, GitLab, Bitbucket).

use super::error::PkgError;
use super::manifest::Manifest;
use super::registry::RegistryClient;
use super::spec::{ArchiveSource, SourceKind};
use tracing::warn;
use url::Url;

/// URL templates for one git host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveHost {
    Github,
    Gitlab,
    Bitbucket,
}

impl ArchiveHost {
    #[must_use]
    pub fn from_kind(kind: SourceKind) -> Option<Self> {
        match kind {
            SourceKind::Github => Some(Self::Github),
            SourceKind::Gitlab => Some(Self::Gitlab),
            SourceKind::Bitbucket => Some(Self::Bitbucket),
            SourceKind::Npm | SourceKind::Diamond => None,
        }
    }

    /// Raw `package.json` URL at the requested ref.
    ///
    /// # Errors
    /// Returns an error if the URL cannot be built.
    pub fn manifest_url(self, client: &RegistryClient, src: &ArchiveSource) -> Result<Url, PkgError> {
        let ep = client.endpoints();
        let ArchiveSource { owner, repo, git_ref } = src;
        match self {
            Self::Github => RegistryClient::url(
                &ep.github_raw,
                &format!("{owner}/{repo}/{git_ref}/package.json"),
            ),
            Self::Gitlab => RegistryClient::url(
                &ep.gitlab,
                &format!("{owner}/{repo}/raw/{git_ref}/package.json"),
            ),
            Self::Bitbucket => RegistryClient::url(
                &ep.bitbucket,
                &format!("{owner}/{repo}/raw/{git_ref}/package.json"),
            ),
        }
    }

    /// Source archive URL at the requested ref.
    ///
    /// # Errors
    /// Returns an error if the URL cannot be built.
    pub fn archive_url(self, client: &RegistryClient, src: &ArchiveSource) -> Result<Url, PkgError> {
        let ep = client.endpoints();
        let ArchiveSource { owner, repo, git_ref } = src;
        match self {
            Self::Github => RegistryClient::url(
                &ep.github,
                &format!("{owner}/{repo}/archive/{git_ref}.tar.gz"),
            ),
            Self::Gitlab => RegistryClient::url(
                &ep.gitlab,
                &format!("{owner}/{repo}/-/archive/{git_ref}/{repo}-{git_ref}.tar.gz"),
            ),
            Self::Bitbucket => RegistryClient::url(
                &ep.bitbucket,
                &format!("{owner}/{repo}/get/{git_ref}.tar.gz"),
            ),
        }
    }
}

/// What an archive source resolved to.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveRelease {
    pub name: String,
    pub version: Option<String>,
    pub manifest: Option<Manifest>,
    pub tarball_url: String,
}

/// Fetch the repository manifest and compute the archive URL.
///
/// A missing manifest (404) is tolerated: the name falls back to the
/// repository name and a warning is logged.
///
/// # Errors
/// Returns an error on any other failed request.
pub async fn resolve_archive(
    client: &RegistryClient,
    host: ArchiveHost,
    src: &ArchiveSource,
) -> Result<ArchiveRelease, PkgError> {
    let manifest_url = host.manifest_url(client, src)?;
    let manifest = match client.get_optional_text(&manifest_url).await? {
        Some(text) => Some(Manifest::from_text(&text)),
        None => {
            let missing = PkgError::manifest_not_found(&src.to_string());
            warn!(source = %src, code = missing.code(), "{}", missing.message());
            None
        }
    };

    let name = manifest
        .as_ref()
        .and_then(Manifest::name)
        .unwrap_or(&src.repo)
        .to_string();
    let version = manifest
        .as_ref()
        .and_then(Manifest::version)
        .map(String::from);

    Ok(ArchiveRelease {
        name,
        version,
        manifest,
        tarball_url: host.archive_url(client, src)?.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkg::registry::Endpoints;

    fn client() -> RegistryClient {
        RegistryClient::new(Endpoints::single_host("http://h").unwrap()).unwrap()
    }

    fn src() -> ArchiveSource {
        ArchiveSource {
            owner: "sierra".into(),
            repo: "library".into(),
            git_ref: "v2".into(),
        }
    }

    #[test]
    fn test_github_urls() {
        let c = client();
        assert_eq!(
            ArchiveHost::Github.manifest_url(&c, &src()).unwrap().as_str(),
            "http://h/raw/sierra/library/v2/package.json"
        );
        assert_eq!(
            ArchiveHost::Github.archive_url(&c, &src()).unwrap().as_str(),
            "http://h/github/sierra/library/archive/v2.tar.gz"
        );
    }

    #[test]
    fn test_gitlab_and_bitbucket_urls() {
        let c = client();
        assert_eq!(
            ArchiveHost::Gitlab.manifest_url(&c, &src()).unwrap().as_str(),
            "http://h/gitlab/sierra/library/raw/v2/package.json"
        );
        assert_eq!(
            ArchiveHost::Gitlab.archive_url(&c, &src()).unwrap().as_str(),
            "http://h/gitlab/sierra/library/-/archive/v2/library-v2.tar.gz"
        );
        assert_eq!(
            ArchiveHost::Bitbucket.archive_url(&c, &src()).unwrap().as_str(),
            "http://h/bitbucket/sierra/library/get/v2.tar.gz"
        );
    }

    #[test]
    fn test_from_kind() {
        assert_eq!(ArchiveHost::from_kind(SourceKind::Gitlab), Some(ArchiveHost::Gitlab));
        assert_eq!(ArchiveHost::from_kind(SourceKind::Npm), None);
    }
}
