//! The project's own `package.json`.
//!
//! Stylesheet dependencies live under `diamond.dependencies`; every other
//! field is preserved untouched when saving.

use super::error::PkgError;
use super::lockfile::PackageRecord;
use super::spec::{Selector, Source};
use diamond_util::fs::atomic_write;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ProjectManifest {
    path: PathBuf,
    root: Map<String, Value>,
}

impl ProjectManifest {
    /// Load `<dir>/package.json`. A missing file is an empty manifest.
    ///
    /// # Errors
    /// Returns `PKG_PACKAGE_JSON_INVALID` if the file is not a JSON object.
    pub fn load(dir: &Path) -> Result<Self, PkgError> {
        let path = dir.join("package.json");
        let root = match fs::read_to_string(&path) {
            Ok(content) => {
                let value: Value = serde_json::from_str(&content).map_err(|e| {
                    PkgError::package_json_invalid(format!("{}: invalid JSON: {e}", path.display()))
                })?;
                match value {
                    Value::Object(map) => map,
                    _ => {
                        return Err(PkgError::package_json_invalid(format!(
                            "{} must be a JSON object",
                            path.display()
                        )))
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => {
                return Err(PkgError::package_json_invalid(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )))
            }
        };
        Ok(Self { path, root })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.root.get("name")?.as_str()
    }

    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.root.get("version")?.as_str()
    }

    /// `diamond.dependencies`; non-string entries are skipped.
    #[must_use]
    pub fn dependencies(&self) -> BTreeMap<String, String> {
        self.root
            .get("diamond")
            .and_then(|d| d.get("dependencies"))
            .and_then(Value::as_object)
            .map(|deps| {
                deps.iter()
                    .filter_map(|(k, v)| Some((k.clone(), v.as_str()?.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Record `name -> specifier` in `diamond.dependencies`.
    pub fn set_dependency(&mut self, name: &str, specifier: &str) {
        let diamond = self
            .root
            .entry("diamond")
            .or_insert_with(|| Value::Object(Map::new()));
        if !diamond.is_object() {
            *diamond = Value::Object(Map::new());
        }
        let Value::Object(diamond) = diamond else {
            return;
        };

        let deps = diamond
            .entry("dependencies")
            .or_insert_with(|| Value::Object(Map::new()));
        if !deps.is_object() {
            *deps = Value::Object(Map::new());
        }
        if let Value::Object(deps) = deps {
            deps.insert(name.to_string(), Value::String(specifier.to_string()));
        }
    }

    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save(&self) -> Result<(), PkgError> {
        let mut json = serde_json::to_string_pretty(&self.root)?;
        json.push('\n');
        atomic_write(&self.path, json.as_bytes()).map_err(|e| {
            PkgError::package_json_invalid(format!("Failed to write {}: {e}", self.path.display()))
        })
    }
}

/// The specifier string saved for an installed top-level package.
///
/// npm: `npm:<name>@^<version>`; archives: `<host>:<owner>/<repo>#<ref>`;
/// first-party: `^<version>`, or the tag when no version is known.
#[must_use]
pub fn saved_specifier(record: &PackageRecord) -> String {
    match &record.source {
        Source::Npm(reg) => match &record.version {
            Some(v) => format!("npm:{}@^{v}", reg.name),
            None => record.source.to_string(),
        },
        Source::Github(_) | Source::Gitlab(_) | Source::Bitbucket(_) => record.source.to_string(),
        Source::Diamond(reg) => match (&record.version, &reg.selector) {
            (Some(v), _) => format!("^{v}"),
            (None, Selector::Tag(tag) | Selector::Version(tag)) => tag.clone(),
        },
    }
}
