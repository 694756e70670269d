//! Package specifier parsing.
//!
//! Accepted forms, tried in this order:
//! - `gitlab:owner/repo[#ref]`, `gl:owner/repo[@ref]`
//! - `bitbucket:owner/repo[#ref]`, `bb:owner/repo[@ref]`
//! - `github:owner/repo[#ref]`, `gh:owner/repo`, bare `owner/repo`
//! - `npm:name[@range-or-tag]`
//! - `name[@range-or-tag]` (first-party registry)

use super::error::PkgError;
use super::version::is_valid_range;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

/// Ref used when an archive specifier names none.
pub const DEFAULT_REF: &str = "master";

/// Tag used when a registry specifier names neither range nor tag.
pub const DEFAULT_TAG: &str = "latest";

/// Names the legacy npm validator rejects outright.
const BLACKLISTED_NAMES: &[&str] = &["node_modules", "favicon.ico"];

/// Version selection for registry-style sources. Exactly one is always set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Selector {
    /// A valid semver range (exact versions included).
    Version(String),
    /// A dist-tag, stored verbatim.
    Tag(String),
}

impl Selector {
    /// Classify a trailing token: ranges become `Version`, anything else a `Tag`.
    #[must_use]
    pub fn from_token(token: Option<&str>) -> Self {
        match token {
            Some(t) if is_valid_range(t) => Self::Version(t.to_string()),
            Some(t) => Self::Tag(t.to_string()),
            None => Self::Tag(DEFAULT_TAG.to_string()),
        }
    }
}

/// An npm or first-party registry package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySource {
    pub name: String,
    #[serde(flatten)]
    pub selector: Selector,
}

/// A repository archive on a git host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveSource {
    pub owner: String,
    pub repo: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
}

/// A parsed package specifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Source {
    Npm(RegistrySource),
    Github(ArchiveSource),
    Gitlab(ArchiveSource),
    Bitbucket(ArchiveSource),
    Diamond(RegistrySource),
}

/// Source kind, without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Npm,
    Github,
    Gitlab,
    Bitbucket,
    Diamond,
}

impl SourceKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::Github => "github",
            Self::Gitlab => "gitlab",
            Self::Bitbucket => "bitbucket",
            Self::Diamond => "diamond",
        }
    }

    /// Archive sources wrap their contents in a `repo-ref/` directory.
    #[must_use]
    pub fn is_archive(self) -> bool {
        matches!(self, Self::Github | Self::Gitlab | Self::Bitbucket)
    }
}

fn archive_pattern(prefixes: &str) -> Regex {
    Regex::new(&format!(
        r"(?i)^({prefixes})([^/#@\s]+)/([^/#@\s]+)([#@](.+))?$"
    ))
    .expect("archive specifier pattern is valid")
}

fn gitlab_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| archive_pattern("gitlab:|gl:"))
}

fn bitbucket_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| archive_pattern("bitbucket:|bb:"))
}

fn github_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| archive_pattern("github:|gh:|"))
}

fn npm_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^npm:([^/@]+?)(@([^/]+))?$").expect("npm specifier pattern is valid")
    })
}

fn registry_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([^/@]+?)(@([^/]+))?$").expect("registry specifier pattern is valid")
    })
}

impl Source {
    /// Parse a free-form specifier.
    ///
    /// # Errors
    /// Returns `PKG_SPEC_INVALID` if no form matches or the name is invalid.
    pub fn parse(input: &str) -> Result<Self, PkgError> {
        Self::try_parse(input)
            .ok_or_else(|| PkgError::spec_invalid(format!("invalid package '{input}'")))
    }

    /// Parse a specifier, returning `None` on failure.
    #[must_use]
    pub fn try_parse(input: &str) -> Option<Self> {
        if let Some(archive) = parse_archive(gitlab_re(), input) {
            return Some(Self::Gitlab(archive));
        }
        if let Some(archive) = parse_archive(bitbucket_re(), input) {
            return Some(Self::Bitbucket(archive));
        }
        if let Some(archive) = parse_archive(github_re(), input) {
            return Some(Self::Github(archive));
        }
        if let Some(registry) = parse_registry(npm_re(), input) {
            return Some(Self::Npm(registry));
        }
        parse_registry(registry_re(), input).map(Self::Diamond)
    }

    /// Parse one `name -> specifier` entry of a dependency map.
    ///
    /// A value that is itself an archive or `npm:` specifier is used as is;
    /// anything else is a range or tag for the first-party package `name`.
    ///
    /// # Errors
    /// Returns `PKG_SPEC_INVALID` if neither reading parses.
    pub fn parse_entry(name: &str, value: &str) -> Result<Self, PkgError> {
        let value = value.trim();
        if let Some(source) = Self::try_parse(value) {
            if !matches!(source, Self::Diamond(_)) {
                return Ok(source);
            }
        }

        let combined = if value.is_empty() {
            name.to_string()
        } else {
            format!("{name}@{value}")
        };
        match Self::try_parse(&combined) {
            Some(source @ Self::Diamond(_)) => Ok(source),
            _ => Err(PkgError::spec_invalid(format!(
                "invalid dependency '{name}': '{value}'"
            ))),
        }
    }

    /// Parse every entry of a dependency map, in key order.
    ///
    /// # Errors
    /// Fails on the first invalid entry.
    pub fn parse_map(deps: &BTreeMap<String, String>) -> Result<Vec<Self>, PkgError> {
        deps.iter()
            .map(|(name, value)| Self::parse_entry(name, value))
            .collect()
    }

    #[must_use]
    pub fn kind(&self) -> SourceKind {
        match self {
            Self::Npm(_) => SourceKind::Npm,
            Self::Github(_) => SourceKind::Github,
            Self::Gitlab(_) => SourceKind::Gitlab,
            Self::Bitbucket(_) => SourceKind::Bitbucket,
            Self::Diamond(_) => SourceKind::Diamond,
        }
    }

    /// Package name known before any fetch (registry sources only).
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Npm(r) | Self::Diamond(r) => Some(&r.name),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_archive(&self) -> Option<&ArchiveSource> {
        match self {
            Self::Github(a) | Self::Gitlab(a) | Self::Bitbucket(a) => Some(a),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_registry(&self) -> Option<&RegistrySource> {
        match self {
            Self::Npm(r) | Self::Diamond(r) => Some(r),
            _ => None,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Npm(r) | Self::Diamond(r) => {
                if matches!(self, Self::Npm(_)) {
                    f.write_str("npm:")?;
                }
                match &r.selector {
                    Selector::Version(v) => write!(f, "{}@{v}", r.name),
                    Selector::Tag(t) => write!(f, "{}@{t}", r.name),
                }
            }
            Self::Github(a) | Self::Gitlab(a) | Self::Bitbucket(a) => {
                write!(f, "{}:{}", self.kind().as_str(), a)
            }
        }
    }
}

impl fmt::Display for ArchiveSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.git_ref)
    }
}

fn parse_archive(re: &Regex, input: &str) -> Option<ArchiveSource> {
    let caps = re.captures(input)?;
    Some(ArchiveSource {
        owner: caps.get(2)?.as_str().to_string(),
        repo: caps.get(3)?.as_str().to_string(),
        git_ref: caps
            .get(5)
            .map_or(DEFAULT_REF, |m| m.as_str())
            .to_string(),
    })
}

fn parse_registry(re: &Regex, input: &str) -> Option<RegistrySource> {
    let caps = re.captures(input)?;
    let name = caps.get(1)?.as_str();
    if !is_valid_legacy_name(name) {
        return None;
    }
    Some(RegistrySource {
        name: name.to_string(),
        selector: Selector::from_token(caps.get(3).map(|m| m.as_str())),
    })
}

/// Package name validity as the legacy npm registry applied it.
///
/// Uppercase letters and long names are allowed; URL-unsafe characters,
/// leading `.`/`_`, surrounding whitespace and reserved names are not.
#[must_use]
pub fn is_valid_legacy_name(name: &str) -> bool {
    if name.is_empty() || name.trim() != name {
        return false;
    }
    if name.starts_with('.') || name.starts_with('_') {
        return false;
    }
    if BLACKLISTED_NAMES.iter().any(|b| b.eq_ignore_ascii_case(name)) {
        return false;
    }
    name.chars().all(|c| {
        c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '!' | '~' | '*' | '\'' | '(' | ')')
    })
}

/// Whether a fetched package name can double as its install directory.
///
/// A legacy name, optionally under one `@scope/`.
#[must_use]
pub fn is_valid_install_name(name: &str) -> bool {
    match name.strip_prefix('@').and_then(|rest| rest.split_once('/')) {
        Some((scope, pkg)) => is_valid_legacy_name(scope) && is_valid_legacy_name(pkg),
        None => is_valid_legacy_name(name),
    }
}
