//! Version selection using semver.
//!
//! Registry-style specifiers carry either an npm-style range or a dist-tag.
//! Ranges are translated to `semver::VersionReq`, covering the npm extensions
//! the `semver` crate lacks (x-ranges, hyphen ranges, space-separated
//! comparators, `||` alternatives).

use super::error::PkgError;
use super::spec::Selector;
use semver::{Version, VersionReq};

/// Check whether `range` is a valid npm-style version range.
///
/// Tags such as `latest` or `beta` are not ranges.
#[must_use]
pub fn is_valid_range(range: &str) -> bool {
    let range = range.trim();
    if range.is_empty() {
        return false;
    }
    let alternatives: Vec<&str> = range.split("||").map(str::trim).collect();
    alternatives
        .iter()
        .all(|alt| !alt.is_empty() && parse_range(alt).is_ok())
}

/// Resolve a selector against a packument.
///
/// # Rules
/// - A tag resolves through `dist-tags`
/// - An exact version resolves to itself when published
/// - A range resolves to the highest satisfying published version
///
/// # Errors
/// Returns an error if nothing matches.
pub fn resolve_version(
    packument: &serde_json::Value,
    selector: &Selector,
) -> Result<String, PkgError> {
    let name = packument
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");

    match selector {
        Selector::Tag(tag) => packument
            .get("dist-tags")
            .and_then(|tags| tags.get(tag.as_str()))
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or_else(|| PkgError::version_not_found(name, &format!("tag '{tag}'"))),
        Selector::Version(range) => {
            let published: Vec<&str> = packument
                .get("versions")
                .and_then(|v| v.as_object())
                .map(|obj| obj.keys().map(String::as_str).collect())
                .unwrap_or_default();

            if published.contains(&range.as_str()) {
                return Ok(range.clone());
            }

            max_satisfying(&published, range)?
                .ok_or_else(|| PkgError::version_not_found(name, range))
        }
    }
}

/// Pick the highest version from `candidates` satisfying `range`.
///
/// Unparseable candidates are ignored. Supports OR ranges like `^1.0.0 || ^2.0.0`.
///
/// # Errors
/// Returns an error if the range itself is invalid.
pub fn max_satisfying(candidates: &[&str], range: &str) -> Result<Option<String>, PkgError> {
    let mut reqs: Vec<VersionReq> = Vec::new();
    for alt in range.split("||").map(str::trim) {
        if alt.is_empty() {
            continue;
        }
        reqs.push(parse_range(alt)?);
    }

    if reqs.is_empty() {
        return Err(PkgError::spec_invalid(format!(
            "Invalid version range '{range}': no valid alternatives"
        )));
    }

    let mut parsed: Vec<Version> = candidates
        .iter()
        .filter_map(|v| Version::parse(v).ok())
        .collect();
    parsed.sort_by(|a, b| b.cmp(a));

    Ok(parsed
        .into_iter()
        .find(|v| reqs.iter().any(|req| req.matches(v)))
        .map(|v| v.to_string()))
}

/// Translate one npm range alternative into a `VersionReq`.
fn parse_range(range: &str) -> Result<VersionReq, PkgError> {
    let range = range.trim().trim_start_matches('v');
    let translated = match range.split_once(" - ") {
        Some((low, high)) if !low.trim().is_empty() && !high.trim().is_empty() => {
            format!(">={}, <={}", low.trim(), high.trim())
        }
        _ => comparators(range)
            .iter()
            .map(|c| expand_comparator(c))
            .collect::<Vec<_>>()
            .join(", "),
    };
    VersionReq::parse(&translated)
        .map_err(|e| PkgError::spec_invalid(format!("Invalid version range '{range}': {e}")))
}

/// Split space-separated comparators (`>= 1.0.0 <2`), re-attaching detached operators.
fn comparators(range: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut pending = String::new();
    for token in range.split_whitespace() {
        pending.push_str(token);
        if token
            .chars()
            .any(|c| c.is_ascii_digit() || matches!(c, 'x' | 'X' | '*'))
        {
            out.push(std::mem::take(&mut pending));
        }
    }
    if !pending.is_empty() {
        out.push(pending);
    }
    out
}

/// npm comparator semantics on top of `semver`: x-ranges, and a bare
/// full version means exactly that version.
fn expand_comparator(comparator: &str) -> String {
    let wild = |part: &str| matches!(part, "x" | "X" | "*");
    let parts: Vec<&str> = comparator.split('.').collect();
    match parts.as_slice() {
        [only] if wild(only) => "*".to_string(),
        [major, minor] | [major, minor, _] if wild(minor) => match major.parse::<u64>() {
            Ok(m) => format!(">={m}.0.0, <{}.0.0", m + 1),
            Err(_) => comparator.to_string(),
        },
        [major, minor, patch] if wild(patch) => {
            match (major.parse::<u64>(), minor.parse::<u64>()) {
                (Ok(m), Ok(n)) => format!(">={m}.{n}.0, <{m}.{}.0", n + 1),
                _ => comparator.to_string(),
            }
        }
        _ if Version::parse(comparator).is_ok() => format!("={comparator}"),
        _ => comparator.to_string(),
    }
}
