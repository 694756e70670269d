//! HTTP plumbing and registry packument resolution.

use super::error::PkgError;
use super::manifest::Manifest;
use super::spec::{RegistrySource, SourceKind};
use super::version::resolve_version;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Default npm registry URL.
pub const DEFAULT_NPM_REGISTRY: &str = "https://registry.npmjs.org/";
/// Default first-party registry URL.
pub const DEFAULT_DIAMOND_REGISTRY: &str = "https://registry.diamond.js.org/";
pub const DEFAULT_GITHUB_RAW: &str = "https://raw.githubusercontent.com/";
pub const DEFAULT_GITHUB: &str = "https://github.com/";
pub const DEFAULT_GITLAB: &str = "https://gitlab.com/";
pub const DEFAULT_BITBUCKET: &str = "https://bitbucket.org/";

pub const NPM_REGISTRY_ENV: &str = "DIAMOND_NPM_REGISTRY";
pub const DIAMOND_REGISTRY_ENV: &str = "DIAMOND_REGISTRY";
pub const GITHUB_RAW_ENV: &str = "DIAMOND_GITHUB_RAW";
pub const GITHUB_ENV: &str = "DIAMOND_GITHUB";
pub const GITLAB_ENV: &str = "DIAMOND_GITLAB";
pub const BITBUCKET_ENV: &str = "DIAMOND_BITBUCKET";

/// Maximum archive size (200 MB).
pub const MAX_TARBALL_SIZE: u64 = 200 * 1024 * 1024;

const CONNECT_TIMEOUT_SECS: u64 = 5;
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Base URLs of every host the fetchers talk to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub npm: Url,
    pub diamond: Url,
    pub github_raw: Url,
    pub github: Url,
    pub gitlab: Url,
    pub bitbucket: Url,
}

impl Endpoints {
    /// Public hosts, each overridable through its environment variable.
    ///
    /// # Errors
    /// Returns an error if an override is not a valid URL.
    pub fn from_env() -> Result<Self, PkgError> {
        let pick = |env: &str, default: &str| {
            let raw = std::env::var(env).unwrap_or_else(|_| default.to_string());
            parse_base(&raw)
        };
        Ok(Self {
            npm: pick(NPM_REGISTRY_ENV, DEFAULT_NPM_REGISTRY)?,
            diamond: pick(DIAMOND_REGISTRY_ENV, DEFAULT_DIAMOND_REGISTRY)?,
            github_raw: pick(GITHUB_RAW_ENV, DEFAULT_GITHUB_RAW)?,
            github: pick(GITHUB_ENV, DEFAULT_GITHUB)?,
            gitlab: pick(GITLAB_ENV, DEFAULT_GITLAB)?,
            bitbucket: pick(BITBUCKET_ENV, DEFAULT_BITBUCKET)?,
        })
    }

    /// Point every endpoint at a single host. Used by tests and mirrors.
    ///
    /// Each endpoint gets its own path segment (`npm/`, `diamond/`, `raw/`,
    /// `github/`, `gitlab/`, `bitbucket/`).
    ///
    /// # Errors
    /// Returns an error if `base` is not a valid URL.
    pub fn single_host(base: &str) -> Result<Self, PkgError> {
        let base = parse_base(base)?;
        let join = |segment: &str| {
            base.join(segment)
                .map_err(|e| PkgError::fetch_failed(format!("Invalid endpoint '{segment}': {e}")))
        };
        Ok(Self {
            npm: join("npm/")?,
            diamond: join("diamond/")?,
            github_raw: join("raw/")?,
            github: join("github/")?,
            gitlab: join("gitlab/")?,
            bitbucket: join("bitbucket/")?,
        })
    }
}

/// Parse a base URL, forcing a trailing slash so `join` appends.
fn parse_base(raw: &str) -> Result<Url, PkgError> {
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&normalized)
        .map_err(|e| PkgError::fetch_failed(format!("Invalid base URL '{raw}': {e}")))
}

/// Shared HTTP client. Every request is attempted exactly once.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    endpoints: Endpoints,
    http: Client,
}

impl RegistryClient {
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(endpoints: Endpoints) -> Result<Self, PkgError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(concat!("diamond/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PkgError::fetch_failed(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { endpoints, http })
    }

    /// # Errors
    /// Returns an error if an endpoint override is invalid.
    pub fn from_env() -> Result<Self, PkgError> {
        Self::new(Endpoints::from_env()?)
    }

    #[must_use]
    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Build `base` + `path`.
    ///
    /// # Errors
    /// Returns an error if the result is not a valid URL.
    pub fn url(base: &Url, path: &str) -> Result<Url, PkgError> {
        base.join(path)
            .map_err(|e| PkgError::fetch_failed(format!("Failed to build URL for '{path}': {e}")))
    }

    /// GET a text body. `Ok(None)` on 404; any other non-2xx is an error.
    ///
    /// # Errors
    /// Returns an error on transport failure or a non-404 error status.
    pub async fn get_optional_text(&self, url: &Url) -> Result<Option<String>, PkgError> {
        debug!(url = %url, "Fetching");
        let response = self.http.get(url.as_str()).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(PkgError::fetch_failed(format!(
                "Request to '{url}' failed with status {}",
                response.status()
            )));
        }

        Ok(Some(response.text().await?))
    }

    /// Fetch the packument for `name` from a registry base.
    ///
    /// # Errors
    /// Returns an error if the request fails or the package does not exist.
    pub async fn fetch_packument(&self, base: &Url, name: &str) -> Result<Value, PkgError> {
        let encoded = if name.starts_with('@') {
            name.replace('/', "%2F")
        } else {
            name.to_string()
        };
        let url = Self::url(base, &encoded)?;

        let text = self
            .get_optional_text(&url)
            .await?
            .ok_or_else(|| PkgError::fetch_failed(format!("Package '{name}' not found at {base}")))?;

        Ok(serde_json::from_str(&text)?)
    }

    /// Download an archive body, refusing anything over `max_bytes`.
    ///
    /// # Errors
    /// Returns an error if the download fails or exceeds the size limit.
    pub async fn download(&self, url: &str, max_bytes: u64) -> Result<Bytes, PkgError> {
        debug!(url, "Downloading archive");
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| PkgError::fetch_failed(format!("Failed to download '{url}': {e}")))?;

        if !response.status().is_success() {
            return Err(PkgError::fetch_failed(format!(
                "Download failed with status {} for '{url}'",
                response.status()
            )));
        }

        if let Some(len) = response.content_length() {
            if len > max_bytes {
                return Err(PkgError::fetch_failed(format!(
                    "Archive too large: {len} bytes (max: {max_bytes})"
                )));
            }
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| PkgError::fetch_failed(format!("Failed to read response body: {e}")))?;

        if bytes.len() as u64 > max_bytes {
            return Err(PkgError::fetch_failed(format!(
                "Archive too large: {} bytes (max: {max_bytes})",
                bytes.len()
            )));
        }

        Ok(bytes)
    }
}

/// A version picked out of a packument.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryRelease {
    pub name: String,
    pub version: String,
    pub tarball_url: String,
    /// Hex digest declared by the registry (SHA-1 for npm, SHA-256 first-party).
    pub digest: Option<String>,
    pub manifest: Manifest,
}

/// Pick the release matching `source` out of a packument.
///
/// # Errors
/// Returns an error if no version matches or the version lacks a tarball.
pub fn select_release(
    packument: &Value,
    source: &RegistrySource,
    kind: SourceKind,
) -> Result<RegistryRelease, PkgError> {
    let version = resolve_version(packument, &source.selector)?;
    let meta = packument
        .get("versions")
        .and_then(|v| v.get(&version))
        .ok_or_else(|| PkgError::version_not_found(&source.name, &version))?;

    let dist = meta.get("dist");
    let tarball_url = dist
        .and_then(|d| d.get("tarball"))
        .and_then(Value::as_str)
        .ok_or_else(|| {
            PkgError::fetch_failed(format!(
                "No tarball URL for {}@{version}",
                source.name
            ))
        })?
        .to_string();

    let digest_field = if kind == SourceKind::Npm {
        "shasum"
    } else {
        "sha256"
    };
    let digest = dist
        .and_then(|d| d.get(digest_field))
        .and_then(Value::as_str)
        .map(str::to_ascii_lowercase);

    let name = meta
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or(&source.name)
        .to_string();

    Ok(RegistryRelease {
        name,
        version,
        tarball_url,
        digest,
        manifest: Manifest::new(meta.clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkg::spec::Selector;
    use serde_json::json;

    fn packument() -> Value {
        json!({
            "name": "foo",
            "dist-tags": { "latest": "2.3.1", "beta": "3.0.0-beta.1" },
            "versions": {
                "1.0.0": { "name": "foo", "version": "1.0.0",
                    "dist": { "tarball": "http://x/foo-1.0.0.tgz", "shasum": "AA11" } },
                "2.3.1": { "name": "foo", "version": "2.3.1", "sass": "foo.scss",
                    "dist": { "tarball": "http://x/foo-2.3.1.tgz", "shasum": "bb22", "sha256": "cc33" } },
                "3.0.0-beta.1": { "name": "foo", "version": "3.0.0-beta.1",
                    "dist": { "tarball": "http://x/foo-3.0.0-beta.1.tgz" } }
            }
        })
    }

    fn source(selector: Selector) -> RegistrySource {
        RegistrySource {
            name: "foo".to_string(),
            selector,
        }
    }

    #[test]
    fn test_select_range() {
        let release = select_release(
            &packument(),
            &source(Selector::Version("2.x".into())),
            SourceKind::Npm,
        )
        .unwrap();
        assert_eq!(release.version, "2.3.1");
        assert_eq!(release.tarball_url, "http://x/foo-2.3.1.tgz");
        assert_eq!(release.digest.as_deref(), Some("bb22"));
        assert_eq!(release.manifest.entry_point(SourceKind::Npm).as_deref(), Some("foo.scss"));
    }

    #[test]
    fn test_select_tag_and_digest_kind() {
        let release = select_release(
            &packument(),
            &source(Selector::Tag("latest".into())),
            SourceKind::Diamond,
        )
        .unwrap();
        assert_eq!(release.version, "2.3.1");
        assert_eq!(release.digest.as_deref(), Some("cc33"));

        let release = select_release(
            &packument(),
            &source(Selector::Version("1.0.0".into())),
            SourceKind::Npm,
        )
        .unwrap();
        assert_eq!(release.digest.as_deref(), Some("aa11"));
    }

    #[test]
    fn test_select_missing() {
        let err = select_release(
            &packument(),
            &source(Selector::Version("^9.0.0".into())),
            SourceKind::Npm,
        )
        .unwrap_err();
        assert_eq!(err.code(), crate::pkg::error::codes::PKG_VERSION_NOT_FOUND);

        let err = select_release(
            &packument(),
            &source(Selector::Tag("nightly".into())),
            SourceKind::Npm,
        )
        .unwrap_err();
        assert_eq!(err.code(), crate::pkg::error::codes::PKG_VERSION_NOT_FOUND);
    }

    #[test]
    fn test_single_host_endpoints() {
        let endpoints = Endpoints::single_host("http://127.0.0.1:4000").unwrap();
        assert_eq!(endpoints.npm.as_str(), "http://127.0.0.1:4000/npm/");
        assert_eq!(endpoints.github_raw.as_str(), "http://127.0.0.1:4000/raw/");
        assert_eq!(
            RegistryClient::url(&endpoints.npm, "foo").unwrap().as_str(),
            "http://127.0.0.1:4000/npm/foo"
        );
    }

    #[test]
    fn test_invalid_base() {
        assert!(Endpoints::single_host("not a url").is_err());
    }

    #[test]
    #[serial_test::serial]
    fn test_endpoints_from_env() {
        std::env::set_var(NPM_REGISTRY_ENV, "http://mirror.local/npm");
        let endpoints = Endpoints::from_env().unwrap();
        std::env::remove_var(NPM_REGISTRY_ENV);

        assert_eq!(endpoints.npm.as_str(), "http://mirror.local/npm/");
        assert_eq!(endpoints.github.as_str(), DEFAULT_GITHUB);
    }
}
